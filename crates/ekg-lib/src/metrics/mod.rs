pub mod intervals;
pub mod median_beat;
pub mod respiration;
pub mod rr;
pub mod sqi;

pub use intervals::{
    axis_from_sums, qt_bazett, qt_fridericia, MeasurementEngine, MeasurementRecord, StClass,
    StMeasurement,
};
pub use median_beat::{beat_quality, qrs_t_angle, wave_axis, AxisWave, MedianBeat, WaveAxes};
pub use respiration::respiration_rate_bpm;
pub use rr::{rr_stats, RrStats};
pub use sqi::SignalQuality;
