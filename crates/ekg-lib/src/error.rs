use thiserror::Error;

/// Upper bound for a sampling rate accepted at the pipeline boundary (Hz).
pub const MAX_SAMPLING_RATE_HZ: f64 = 10_000.0;

/// Caller supplied an option or parameter the engine does not recognise.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unrecognized {option} value `{value}` (expected {expected})")]
    UnrecognizedOption {
        option: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by [`crate::pipeline::EcgPipeline`]. Noisy or short input is
/// never an error; only programming mistakes at the boundary are.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("sampling rate {0} Hz is outside (0, 10000]")]
    InvalidSamplingRate(f64),
    #[error(
        "second lead has {found_len} samples at {found_fs} Hz, expected {expected_len} at {expected_fs} Hz"
    )]
    LeadMismatch {
        expected_len: usize,
        expected_fs: f64,
        found_len: usize,
        found_fs: f64,
    },
}

/// A newline-delimited sample stream that cannot become a window.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("line {line} is not a sample: `{text}`")]
    NotANumber { line: usize, text: String },
    #[error("line {line} holds a non-finite sample: `{text}`")]
    NonFinite { line: usize, text: String },
    #[error("no samples found")]
    Empty,
    #[error("sampling rate {0} Hz is outside (0, 10000]")]
    InvalidSamplingRate(f64),
    #[error("failed to read samples from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returns true when `fs` is usable for filter design and time conversions.
pub fn is_valid_sampling_rate(fs: f64) -> bool {
    fs.is_finite() && fs > 0.0 && fs <= MAX_SAMPLING_RATE_HZ
}
