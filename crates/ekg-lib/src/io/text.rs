use crate::{
    error::{is_valid_sampling_rate, SampleError},
    signal::TimeSeries,
};
use std::path::Path;

/// Parse one sample per line into a window sampled at `fs`.
///
/// Blank lines and `#` comments are skipped. Every other line must hold a
/// finite number; the first one that does not is reported by line number.
pub fn parse_samples(text: &str, fs: f64) -> Result<TimeSeries, SampleError> {
    if !is_valid_sampling_rate(fs) {
        return Err(SampleError::InvalidSamplingRate(fs));
    }
    let mut data = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let field = line.trim();
        if field.is_empty() || field.starts_with('#') {
            continue;
        }
        let value: f64 = field.parse().map_err(|_| SampleError::NotANumber {
            line: idx + 1,
            text: field.to_string(),
        })?;
        if !value.is_finite() {
            return Err(SampleError::NonFinite {
                line: idx + 1,
                text: field.to_string(),
            });
        }
        data.push(value);
    }
    if data.is_empty() {
        return Err(SampleError::Empty);
    }
    Ok(TimeSeries::new(fs, data))
}

pub fn read_samples(path: &Path, fs: f64) -> Result<TimeSeries, SampleError> {
    let text = std::fs::read_to_string(path).map_err(|source| SampleError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_samples(&text, fs)
}
