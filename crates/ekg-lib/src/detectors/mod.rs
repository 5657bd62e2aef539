pub mod ecg;
pub mod waves;

pub use ecg::{detect_r_peaks, BeatDetector, DetectorHistory};
pub use waves::{BeatLandmarks, WaveDelineator, WaveLandmarks};
