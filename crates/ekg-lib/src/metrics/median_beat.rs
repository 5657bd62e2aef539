//! Ensemble-median beat built from the cleanest beats of a window, and the
//! frontal P, QRS and T axes measured on a pair of median beats.

use crate::{
    config::MeasurementConfig,
    error::is_valid_sampling_rate,
    metrics::intervals::axis_from_sums,
    signal::{mean, median, peak_to_peak, std_dev, PeakSet},
};
use serde::{Deserialize, Serialize};

/// Half width of the QRS region scored for beat quality.
const QUALITY_QRS_HALF_WIDTH_S: f64 = 0.08;
/// Samples further than this many standard deviations from the beat median
/// count as spikes.
const SPIKE_SIGMAS: f64 = 5.0;
/// Shortest extracted span, as a fraction of the full beat, kept at the edges.
const MIN_BEAT_COVERAGE: f64 = 0.8;

/// Median of R-aligned beats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianBeat {
    pub fs: f64,
    /// Position of R inside `samples`.
    pub r_index: usize,
    pub samples: Vec<f64>,
    pub beats_used: usize,
}

/// Wave whose frontal axis is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisWave {
    P,
    Qrs,
    T,
}

impl AxisWave {
    /// Integration window relative to R, in seconds.
    fn window_s(self) -> (f64, f64) {
        match self {
            // First 60% of a P wave assumed to span R-200..R-120 ms, skipping
            // the atrial repolarisation tail.
            AxisWave::P => {
                let (onset, offset) = (-0.200, -0.120);
                let len = offset - onset;
                (onset + 0.05 * len, onset + 0.60 * len)
            }
            AxisWave::Qrs => (-0.050, 0.080),
            AxisWave::T => (0.120, 0.500),
        }
    }
}

/// Frontal axes from two orthogonal median beats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveAxes {
    pub p_deg: Option<f64>,
    pub qrs_deg: Option<f64>,
    pub t_deg: Option<f64>,
    /// Spatial disagreement of depolarisation and repolarisation, [0, 180].
    pub qrs_t_angle_deg: Option<f64>,
}

impl MedianBeat {
    /// Build the median of the best interior beats of a conditioned lead.
    ///
    /// The first and last R peak are skipped. Beats are scored with
    /// [`beat_quality`]; `None` when fewer than `median_min_beats` pass.
    pub fn build(
        signal: &[f64],
        r_peaks: &PeakSet,
        fs: f64,
        cfg: &MeasurementConfig,
    ) -> Option<Self> {
        if !is_valid_sampling_rate(fs) {
            return None;
        }
        let pre = (cfg.median_pre_r_s * fs).round() as usize;
        let post = (cfg.median_post_r_s * fs).round() as usize;
        let interior = r_peaks
            .indices
            .get(1..r_peaks.len().saturating_sub(1))
            .unwrap_or(&[]);

        let mut candidates: Vec<(Vec<f64>, f64)> = interior
            .iter()
            .filter_map(|&r| {
                let beat = extract_beat(signal, r, pre, post)?;
                let quality = beat_quality(&beat, pre, fs, cfg)?;
                (quality > cfg.beat_quality_min).then_some((beat, quality))
            })
            .collect();
        if candidates.len() < cfg.median_min_beats.max(1) {
            return None;
        }
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(cfg.median_max_beats.max(cfg.median_min_beats));

        let samples = (0..=pre + post)
            .map(|i| {
                let column: Vec<f64> = candidates.iter().map(|(beat, _)| beat[i]).collect();
                median(&column)
            })
            .collect::<Option<Vec<f64>>>()?;
        Some(Self {
            fs,
            r_index: pre,
            samples,
            beats_used: candidates.len(),
        })
    }

    /// Sample index `offset_s` from R, clamped into the beat.
    fn index_at(&self, offset_s: f64) -> usize {
        let idx = self.r_index as f64 + (offset_s * self.fs).round();
        idx.clamp(0.0, self.samples.len() as f64) as usize
    }

    /// Baseline-corrected net area of `wave` (trapezoidal, signal units x s).
    pub fn net_area(&self, wave: AxisWave, cfg: &MeasurementConfig) -> Option<f64> {
        let base_start = self.index_at(-cfg.axis_baseline_start_s);
        let base_end = self.index_at(-cfg.axis_baseline_end_s);
        if base_end <= base_start {
            return None;
        }
        let baseline = mean(&self.samples[base_start..base_end]);

        let (from, to) = wave.window_s();
        let start = self.index_at(from);
        let end = self.index_at(to);
        if end <= start + 1 {
            return None;
        }
        let dt = 1.0 / self.fs;
        let area = self.samples[start..end]
            .windows(2)
            .map(|w| 0.5 * (w[0] + w[1] - 2.0 * baseline) * dt)
            .sum();
        Some(area)
    }
}

/// Score an R-aligned beat from 0 (poor) to 1 (clean), `None` when unusable.
///
/// Combines QRS dominance over TP-segment noise (weight 0.4), TP flatness
/// (0.3) and the share of samples free of spikes (0.3).
pub fn beat_quality(beat: &[f64], r_index: usize, fs: f64, cfg: &MeasurementConfig) -> Option<f64> {
    if beat.len() < 3 || r_index >= beat.len() || peak_to_peak(beat) <= 0.0 {
        return None;
    }
    let half = (QUALITY_QRS_HALF_WIDTH_S * fs) as usize;
    let qrs_start = r_index.saturating_sub(half);
    let qrs_end = (r_index + half).min(beat.len());
    if qrs_end <= qrs_start {
        return None;
    }
    let qrs_amplitude = peak_to_peak(&beat[qrs_start..qrs_end]);
    if qrs_amplitude <= 0.0 {
        return None;
    }

    let tp_start = r_index.saturating_sub((cfg.tp_start_s * fs) as usize);
    let tp_end = r_index.saturating_sub((cfg.tp_end_s * fs) as usize);
    let tp = (tp_end > tp_start).then(|| &beat[tp_start..tp_end]);
    let noise = tp.map_or_else(|| 0.5 * std_dev(beat), std_dev);
    let snr = if noise == 0.0 {
        100.0
    } else {
        qrs_amplitude / (noise * 10.0)
    };
    let stability = tp.map_or(0.5, |tp| 1.0 - (peak_to_peak(tp) / qrs_amplitude).min(1.0));

    let centre = median(beat)?;
    let spread = std_dev(beat);
    let spikes = beat
        .iter()
        .filter(|x| (*x - centre).abs() > SPIKE_SIGMAS * spread)
        .count();
    let clean = 1.0 - (spikes as f64 / beat.len() as f64).min(1.0);

    let score = (snr / 10.0).min(1.0) * 0.4 + stability * 0.3 + clean * 0.3;
    Some(score.clamp(0.0, 1.0))
}

/// Frontal axis of `wave` from two orthogonal median beats aligned on the same R.
pub fn wave_axis(
    lead1: &MedianBeat,
    lead2: &MedianBeat,
    wave: AxisWave,
    cfg: &MeasurementConfig,
) -> Option<f64> {
    if lead1.r_index != lead2.r_index || lead1.samples.len() != lead2.samples.len() {
        return None;
    }
    let a1 = lead1.net_area(wave, cfg)?;
    let a2 = lead2.net_area(wave, cfg)?;
    if a1.abs() + a2.abs() < cfg.axis_min_area {
        return None;
    }
    axis_from_sums(a1, a2)
}

/// P, QRS and T axes plus the QRS-T angle.
pub fn wave_axes(lead1: &MedianBeat, lead2: &MedianBeat, cfg: &MeasurementConfig) -> WaveAxes {
    let qrs_deg = wave_axis(lead1, lead2, AxisWave::Qrs, cfg);
    let t_deg = wave_axis(lead1, lead2, AxisWave::T, cfg);
    WaveAxes {
        p_deg: wave_axis(lead1, lead2, AxisWave::P, cfg),
        qrs_deg,
        t_deg,
        qrs_t_angle_deg: qrs_deg.zip(t_deg).map(|(q, t)| qrs_t_angle(q, t)),
    }
}

/// Absolute angle between two axes, folded into [0, 180].
pub fn qrs_t_angle(qrs_deg: f64, t_deg: f64) -> f64 {
    let diff = (qrs_deg - t_deg).abs() % 360.0;
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// `signal[r - pre ..= r + post]`, edge-padded when the beat runs off the
/// window but at least [`MIN_BEAT_COVERAGE`] of it is present.
fn extract_beat(signal: &[f64], r: usize, pre: usize, post: usize) -> Option<Vec<f64>> {
    let len = pre + post + 1;
    let start = r.saturating_sub(pre);
    let end = (r + post + 1).min(signal.len());
    if end <= start || ((end - start) as f64) < len as f64 * MIN_BEAT_COVERAGE {
        return None;
    }
    let slice = &signal[start..end];
    let pad_left = pre - (r - start);
    let pad_right = len - slice.len() - pad_left;
    let mut beat = Vec::with_capacity(len);
    beat.extend(std::iter::repeat(slice[0]).take(pad_left));
    beat.extend_from_slice(slice);
    beat.extend(std::iter::repeat(slice[slice.len() - 1]).take(pad_right));
    Some(beat)
}
