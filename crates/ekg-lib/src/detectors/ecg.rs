use crate::{
    conditioning::smoothing::{argmax, derivative, find_peaks, moving_average, square, thin_by_distance},
    config::{DetectorConfig, MAX_HISTORY_LEN},
    error::is_valid_sampling_rate,
    signal::{mean, median, peak_to_peak, std_dev, PeakSet},
};
use log::debug;
use std::collections::VecDeque;

/// Conditioned windows shorter than this never yield peaks.
pub const MIN_DETECTION_SAMPLES: usize = 10;

/// Envelope energy of recently accepted beats, carried from one window to the
/// next for a single lead. Windows without beats shrink it so a lasting drop in
/// signal gain is eventually forgotten.
#[derive(Debug, Clone)]
pub struct DetectorHistory {
    capacity: usize,
    levels: VecDeque<f64>,
}

impl DetectorHistory {
    /// History of at most `capacity` levels, capped at [`MAX_HISTORY_LEN`].
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_HISTORY_LEN);
        Self {
            capacity,
            levels: VecDeque::with_capacity(capacity),
        }
    }

    pub fn reset(&mut self) {
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Minimum envelope height implied by the remembered beats.
    pub fn floor(&self, fraction: f64) -> Option<f64> {
        if self.levels.is_empty() || fraction <= 0.0 {
            return None;
        }
        let levels: Vec<f64> = self.levels.iter().copied().collect();
        median(&levels).map(|m| m * fraction)
    }

    fn record(&mut self, level: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.levels.len() == self.capacity {
            self.levels.pop_front();
        }
        self.levels.push_back(level);
    }

    fn forget_oldest(&mut self) {
        self.levels.pop_front();
    }
}

impl Default for DetectorHistory {
    fn default() -> Self {
        Self::new(DetectorConfig::default().history_len)
    }
}

/// Energy-envelope R-peak detector (derivative, square, moving-window
/// integration) with a relaxing `mean + k * std` threshold.
#[derive(Debug, Clone, Default)]
pub struct BeatDetector {
    config: DetectorConfig,
}

impl BeatDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn new_history(&self) -> DetectorHistory {
        DetectorHistory::new(self.config.history_len)
    }

    /// Detect R peaks in an already conditioned window. Flat, short or
    /// unusable input yields an empty set.
    pub fn detect_r_peaks(
        &self,
        conditioned: &[f64],
        fs: f64,
        history: &mut DetectorHistory,
    ) -> PeakSet {
        let cfg = &self.config;
        if conditioned.len() < MIN_DETECTION_SAMPLES || !is_valid_sampling_rate(fs) {
            debug!(
                "R-peak detection skipped: {} samples at {} Hz",
                conditioned.len(),
                fs
            );
            return PeakSet::default();
        }
        if conditioned.iter().any(|x| !x.is_finite())
            || peak_to_peak(conditioned) < cfg.flat_tolerance
        {
            history.forget_oldest();
            return PeakSet::default();
        }

        let envelope = energy_envelope(conditioned, fs, cfg.integration_window_s);
        let env_mean = mean(&envelope);
        let env_std = std_dev(&envelope);
        if env_std <= 0.0 {
            history.forget_oldest();
            return PeakSet::default();
        }

        let distance = ((cfg.min_rr_s * fs).round() as usize).max(1);
        let floor = history.floor(cfg.history_floor_fraction).unwrap_or(0.0);
        let mut found = Vec::new();
        for &k in &cfg.threshold_ladder {
            let threshold = (env_mean + k * env_std).max(floor);
            found = find_peaks(&envelope, threshold, distance);
            if !found.is_empty() {
                debug!("{} envelope peaks at k = {}", found.len(), k);
                break;
            }
        }
        if found.is_empty() {
            history.forget_oldest();
            return PeakSet::default();
        }

        for &idx in &found {
            history.record(envelope[idx]);
        }

        // Refine on magnitude so leads with inverted polarity land on the QRS apex.
        let magnitude: Vec<f64> = conditioned.iter().map(|x| x.abs()).collect();
        let refine = (cfg.refine_window_s * fs).round() as usize;
        let refined: Vec<usize> = found
            .iter()
            .filter_map(|&idx| {
                let start = idx.saturating_sub(refine);
                argmax(&magnitude, start, idx + refine + 1)
            })
            .collect();
        PeakSet::from_indices(thin_by_distance(&magnitude, refined, distance))
    }
}

/// Squared first difference smoothed by a centred moving window.
pub fn energy_envelope(data: &[f64], fs: f64, window_s: f64) -> Vec<f64> {
    let win = ((window_s * fs).round() as usize).max(1);
    moving_average(&square(&derivative(data)), win)
}

/// One-shot detection with default parameters and no carried history.
pub fn detect_r_peaks(conditioned: &[f64], fs: f64) -> PeakSet {
    let detector = BeatDetector::default();
    let mut history = detector.new_history();
    detector.detect_r_peaks(conditioned, fs, &mut history)
}
