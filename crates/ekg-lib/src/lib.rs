pub mod conditioning;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod rhythm;
pub mod signal;

#[cfg(test)]
mod testing;

pub use conditioning::{ConditionedWindow, SignalConditioner};
pub use config::{BaselineMode, EmgSetting, EngineConfig, NotchSetting, StReference};
pub use detectors::*;
pub use error::{ConfigError, EngineError};
pub use metrics::*;
pub use pipeline::{EcgPipeline, LeadState, WindowAnalysis};
pub use rhythm::{RhythmAssessment, RhythmCategory, RhythmClassifier, RhythmLabel};
pub use signal::*;
