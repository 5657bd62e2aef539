pub mod csv;
pub mod text;

pub use self::csv::{read_csv_leads, CsvLeads};
pub use text::{parse_samples, read_samples};
