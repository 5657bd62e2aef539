//! Per-window filter chain: centering, mains notch, baseline wander removal,
//! EMG low-pass and optional QRS-gated sharpening.

pub mod iir;
pub mod smoothing;

use crate::config::{BaselineMode, ConditionerConfig};
use crate::error::is_valid_sampling_rate;
use crate::signal::{mean, std_dev, TimeSeries};
use iir::SosFilter;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use smoothing::{find_peaks, gradient, median_filter, moving_average, percentile};
use std::collections::HashSet;
use std::fmt;

/// Windows shorter than this pass through the conditioner untouched.
pub const MIN_FILTER_SAMPLES: usize = 10;
/// Windows shorter than this get mean subtraction instead of baseline estimation.
pub const MIN_BASELINE_SAMPLES: usize = 50;

const EMG_FILTER_ORDER: usize = 4;
const RESPIRATION_FILTER_ORDER: usize = 2;

/// Output of one conditioning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionedWindow {
    pub signal: Vec<f64>,
    /// Present only when the respiration-preserving baseline mode ran.
    pub respiration: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Stage {
    Notch,
    Respiration,
    Emg,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Notch => "notch",
            Stage::Respiration => "respiration band",
            Stage::Emg => "EMG low-pass",
        })
    }
}

/// Stateless filter chain. The only thing remembered between calls is which
/// degraded stages have already been reported, so a misconfigured rate logs
/// once instead of on every window.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    config: ConditionerConfig,
    reported: HashSet<(Stage, u64)>,
}

impl SignalConditioner {
    pub fn new(config: ConditionerConfig) -> Self {
        Self {
            config,
            reported: HashSet::new(),
        }
    }

    pub fn config(&self) -> &ConditionerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ConditionerConfig) {
        if config != self.config {
            self.config = config;
            self.reported.clear();
        }
    }

    /// Conditioned waveform for display and detection.
    pub fn condition(&mut self, window: &TimeSeries) -> Vec<f64> {
        self.condition_with_respiration(window).signal
    }

    /// Run the full chain. Output length always equals the input length.
    ///
    /// Non-finite samples are bridged by linear interpolation first. A window
    /// with no finite sample at all passes through unchanged.
    pub fn condition_with_respiration(&mut self, window: &TimeSeries) -> ConditionedWindow {
        let fs = window.fs;
        let n = window.len();
        let Some((mut x, repaired)) = bridge_gaps(&window.data) else {
            debug!("conditioning skipped: no finite sample in {} samples", n);
            return ConditionedWindow {
                signal: window.data.clone(),
                respiration: None,
            };
        };
        if repaired > 0 {
            debug!("bridged {} non-finite samples of {}", repaired, n);
        }
        if n < MIN_FILTER_SAMPLES || !is_valid_sampling_rate(fs) {
            debug!("conditioning skipped: {} samples at {} Hz", n, fs);
            return ConditionedWindow {
                signal: x,
                respiration: None,
            };
        }

        if self.config.center {
            let m = mean(&x);
            x.iter_mut().for_each(|v| *v -= m);
        }

        if let Some(f0) = self.config.notch_freq.frequency_hz() {
            match SosFilter::notch(fs, f0, self.config.notch_q) {
                Ok(filter) => x = filter.filtfilt(&x),
                Err(err) => self.degraded(Stage::Notch, fs, &err),
            }
        }

        let mut respiration = None;
        match self.config.baseline_mode {
            BaselineMode::MedianMean => x = self.remove_baseline(&x, fs),
            BaselineMode::RespirationPreserving => {
                let (clean, resp) = self.remove_drift_keep_respiration(&x, fs);
                x = clean;
                respiration = Some(resp);
            }
            BaselineMode::Off => {}
        }

        if let Some(cutoff) = self.config.emg_cutoff_hz.effective_cutoff_hz() {
            match SosFilter::butterworth_lowpass(EMG_FILTER_ORDER, fs, cutoff) {
                Ok(filter) => x = filter.filtfilt(&x),
                Err(err) => self.degraded(Stage::Emg, fs, &err),
            }
        }

        if self.config.enable_qrs_sharpening {
            x = self.sharpen_qrs(&x, fs);
        }

        ConditionedWindow {
            signal: x,
            respiration,
        }
    }

    /// Median (QRS-rejecting) then moving-average baseline, subtracted.
    fn remove_baseline(&self, x: &[f64], fs: f64) -> Vec<f64> {
        let n = x.len();
        if n < MIN_BASELINE_SAMPLES {
            let m = mean(x);
            return x.iter().map(|v| v - m).collect();
        }
        let med = median_filter(x, self.median_window(fs, n));
        let mean_win = ((self.config.mean_window_s * fs) as usize).clamp(10, n / 2);
        let baseline = moving_average(&med, mean_win);
        x.iter().zip(&baseline).map(|(v, b)| v - b).collect()
    }

    /// Returns `(clean, respiration)` with `clean = x - drift + respiration`.
    fn remove_drift_keep_respiration(&mut self, x: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
        let n = x.len();
        if n < MIN_BASELINE_SAMPLES {
            let m = mean(x);
            return (x.iter().map(|v| v - m).collect(), vec![0.0; n]);
        }
        let med = median_filter(x, self.median_window(fs, n));
        let drift_win = ((self.config.drift_mean_window_s * fs) as usize).clamp(10, n);
        let drift = moving_average(&med, drift_win);
        let respiration = self.extract_respiration(&drift, fs);
        let clean = x
            .iter()
            .zip(&drift)
            .zip(&respiration)
            .map(|((v, d), r)| v - d + r)
            .collect();
        (clean, respiration)
    }

    fn extract_respiration(&mut self, drift: &[f64], fs: f64) -> Vec<f64> {
        let cfg = &self.config;
        let band = SosFilter::butterworth_highpass(RESPIRATION_FILTER_ORDER, fs, cfg.respiration_low_hz)
            .and_then(|hp| {
                SosFilter::butterworth_lowpass(RESPIRATION_FILTER_ORDER, fs, cfg.respiration_high_hz)
                    .map(|lp| hp.then(lp))
            });
        let mut resp = match band {
            Ok(filter) => filter.filtfilt(drift),
            Err(err) => {
                self.degraded(Stage::Respiration, fs, &err);
                return vec![0.0; drift.len()];
            }
        };
        let m = mean(&resp);
        resp.iter_mut().for_each(|v| *v -= m);
        let peak = resp.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let limit = self.config.respiration_max_amplitude;
        if peak > limit {
            let scale = limit / peak;
            resp.iter_mut().for_each(|v| *v *= scale);
        }
        resp
    }

    /// Adds a scaled derivative inside ±gate of coarse QRS peaks only.
    fn sharpen_qrs(&self, x: &[f64], fs: f64) -> Vec<f64> {
        let mask = self.qrs_mask(x, fs);
        if !mask.iter().any(|&m| m) {
            return x.to_vec();
        }
        let mut deriv = gradient(x);
        deriv.iter_mut().for_each(|d| *d *= fs);
        let d_std = std_dev(&deriv);
        if d_std > 1e-10 {
            let scale = std_dev(x) / d_std;
            deriv.iter_mut().for_each(|d| *d *= scale);
        }
        let alpha = self.config.sharpening_alpha;
        x.iter()
            .zip(&deriv)
            .zip(&mask)
            .map(|((v, d), &gated)| if gated { v + alpha * d } else { *v })
            .collect()
    }

    fn qrs_mask(&self, x: &[f64], fs: f64) -> Vec<bool> {
        let n = x.len();
        let mut mask = vec![false; n];
        let magnitude: Vec<f64> = x.iter().map(|v| v.abs()).collect();
        let threshold = percentile(&magnitude, self.config.qrs_gate_percentile);
        let distance = ((self.config.qrs_gate_min_distance_s * fs) as usize).max(1);
        let half = (self.config.qrs_gate_half_width_s * fs) as usize;
        for peak in find_peaks(&magnitude, threshold, distance) {
            let start = peak.saturating_sub(half);
            let end = (peak + half + 1).min(n);
            mask[start..end].iter_mut().for_each(|m| *m = true);
        }
        mask
    }

    fn median_window(&self, fs: f64, n: usize) -> usize {
        let win = ((self.config.median_window_s * fs) as usize).clamp(3, (n / 2).max(3));
        if win % 2 == 0 {
            win + 1
        } else {
            win
        }
    }

    fn degraded(&mut self, stage: Stage, fs: f64, err: &iir::FilterDesignError) {
        if self.reported.insert((stage, fs.to_bits())) {
            warn!("{} stage skipped at {} Hz: {}", stage, fs, err);
        }
    }
}

/// Replace runs of non-finite samples by a straight line between their finite
/// neighbours; leading and trailing runs take the nearest finite value.
/// Returns the repaired copy and how many samples changed, or `None` when
/// nothing finite is left to anchor on.
fn bridge_gaps(data: &[f64]) -> Option<(Vec<f64>, usize)> {
    let first = data.iter().position(|x| x.is_finite())?;
    let mut out = data.to_vec();
    let mut repaired = 0;
    let mut last = first;
    out[..first].iter_mut().for_each(|v| *v = data[first]);
    repaired += first;
    for i in first + 1..data.len() {
        if !data[i].is_finite() {
            continue;
        }
        let gap = i - last;
        if gap > 1 {
            let (a, b) = (data[last], data[i]);
            for (k, v) in out[last + 1..i].iter_mut().enumerate() {
                *v = a + (b - a) * (k + 1) as f64 / gap as f64;
            }
            repaired += gap - 1;
        }
        last = i;
    }
    let tail = data[last];
    out[last + 1..].iter_mut().for_each(|v| *v = tail);
    repaired += data.len() - last - 1;
    Some((out, repaired))
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new(ConditionerConfig::default())
    }
}
