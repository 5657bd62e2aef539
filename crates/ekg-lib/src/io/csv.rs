use crate::signal::TimeSeries;
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::path::Path;

/// Columns read from a multi-lead CSV recording.
#[derive(Debug, Clone)]
pub struct CsvLeads {
    pub primary: TimeSeries,
    pub second: Option<TimeSeries>,
}

/// Load one or two lead columns from a headed CSV file.
///
/// The sampling rate comes from `fs` when given, otherwise from the spacing of
/// a `time`/`timestamp` column (seconds).
pub fn read_csv_leads(
    path: &Path,
    lead: &str,
    second_lead: Option<&str>,
    fs: Option<f64>,
) -> Result<CsvLeads> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers().context("reading header")?.clone();
    let lead_idx = locate_column(&headers, lead)?;
    let second_idx = second_lead
        .map(|name| locate_column(&headers, name))
        .transpose()?;
    let time_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("time") || h.eq_ignore_ascii_case("timestamp"));

    let mut primary = Vec::new();
    let mut second = Vec::new();
    let mut times = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading record {}", row + 1))?;
        primary.push(parse_cell(&record, lead_idx, row)?);
        if let Some(idx) = second_idx {
            second.push(parse_cell(&record, idx, row)?);
        }
        if let Some(idx) = time_idx {
            times.push(parse_cell(&record, idx, row)?);
        }
    }
    if primary.is_empty() {
        anyhow::bail!("{} contains no samples", path.display());
    }

    let fs = match fs {
        Some(fs) => fs,
        None => infer_rate(&times).with_context(|| {
            format!(
                "{} has no usable time column; pass the sampling rate explicitly",
                path.display()
            )
        })?,
    };
    Ok(CsvLeads {
        primary: TimeSeries::new(fs, primary),
        second: second_idx.map(|_| TimeSeries::new(fs, second)),
    })
}

fn locate_column(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .with_context(|| format!("missing lead column '{}'", name))
}

fn parse_cell(record: &csv::StringRecord, idx: usize, row: usize) -> Result<f64> {
    let cell = record
        .get(idx)
        .with_context(|| format!("row {} is missing column {}", row + 1, idx + 1))?;
    cell.parse::<f64>()
        .with_context(|| format!("row {}: '{}' is not a number", row + 1, cell))
}

/// Median sample spacing of a time column, as a rate in Hz.
fn infer_rate(times: &[f64]) -> Option<f64> {
    let mut steps: Vec<f64> = times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|dt| dt.is_finite() && *dt > 0.0)
        .collect();
    if steps.is_empty() {
        return None;
    }
    steps.sort_by(|a, b| a.total_cmp(b));
    Some(1.0 / steps[steps.len() / 2])
}
