use crate::{
    conditioning::smoothing::{argmax, argmin},
    config::DelineationConfig,
    error::is_valid_sampling_rate,
    signal::{std_dev, PeakSet},
};
use serde::{Deserialize, Serialize};

/// Landmarks found around one R peak. Each wave is independently optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatLandmarks {
    pub r: usize,
    pub p: Option<usize>,
    pub q: Option<usize>,
    pub s: Option<usize>,
    pub t: Option<usize>,
}

/// Per-beat landmarks plus one peak set per wave type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveLandmarks {
    pub beats: Vec<BeatLandmarks>,
    pub p: PeakSet,
    pub q: PeakSet,
    pub s: PeakSet,
    pub t: PeakSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extremum {
    Max,
    Min,
}

/// Searches bounded windows around each R peak for P, Q, S and T.
#[derive(Debug, Clone, Default)]
pub struct WaveDelineator {
    config: DelineationConfig,
}

impl WaveDelineator {
    pub fn new(config: DelineationConfig) -> Self {
        Self { config }
    }

    pub fn delineate(&self, conditioned: &[f64], r_peaks: &PeakSet, fs: f64) -> WaveLandmarks {
        let n = conditioned.len();
        if n == 0 || r_peaks.is_empty() || !is_valid_sampling_rate(fs) {
            return WaveLandmarks::default();
        }
        let cfg = &self.config;
        let min_prominence = cfg.wave_prominence_fraction * std_dev(conditioned);
        let secs = |s: f64| (s * fs).round() as usize;
        let peaks = &r_peaks.indices;

        let mut beats = Vec::with_capacity(peaks.len());
        for (i, &r) in peaks.iter().enumerate() {
            if r >= n {
                break;
            }
            let prev = i.checked_sub(1).map(|j| peaks[j]);
            let next = peaks.get(i + 1).copied();
            // Search zone: strictly between the neighbouring R peaks.
            let lo = prev.map_or(0, |p| p + 1);
            let hi = next.map_or(n, |nx| nx.min(n));
            let zone = |start: usize, end: usize| (start.max(lo), end.min(hi));

            let (qs, qe) = zone(r.saturating_sub(secs(cfg.q_window_s)), r);
            let q = find_extremum(conditioned, qs, qe, Extremum::Min, None);

            let (ss, se) = zone(r, r + secs(cfg.s_window_s) + 1);
            let s = find_extremum(conditioned, ss, se, Extremum::Min, None);

            let rr_samples = prev.map(|p| r - p).or_else(|| next.map(|nx| nx - r));
            let (p_start, p_end) = self.p_window_s(rr_samples.map(|rr| 60.0 * fs / rr as f64));
            let (ps, pe) = zone(r.saturating_sub(secs(p_start)), r.saturating_sub(secs(p_end)) + 1);
            let p = find_extremum(conditioned, ps, pe, Extremum::Max, Some(min_prominence));

            let (ts, te) = zone(r + secs(cfg.t_start_s), r + secs(cfg.t_end_s) + 1);
            let t = find_extremum(conditioned, ts, te, Extremum::Max, Some(min_prominence));

            beats.push(BeatLandmarks { r, p, q, s, t });
        }

        let collect = |f: fn(&BeatLandmarks) -> Option<usize>| {
            PeakSet::from_indices(beats.iter().filter_map(f).collect())
        };
        WaveLandmarks {
            p: collect(|b| b.p),
            q: collect(|b| b.q),
            s: collect(|b| b.s),
            t: collect(|b| b.t),
            beats,
        }
    }

    /// P search window (seconds before R), narrowed at fast instantaneous rates.
    fn p_window_s(&self, instantaneous_hr: Option<f64>) -> (f64, f64) {
        let cfg = &self.config;
        match instantaneous_hr {
            Some(hr) if hr > cfg.fast_rate_bpm => (cfg.fast_p_start_s, cfg.fast_p_end_s),
            _ => (cfg.p_start_s, cfg.p_end_s),
        }
    }
}

/// Interior extremum of `data[start..end]`; an extremum on the window edge is
/// the flank of a wave outside the window and is rejected.
fn find_extremum(
    data: &[f64],
    start: usize,
    end: usize,
    kind: Extremum,
    min_prominence: Option<f64>,
) -> Option<usize> {
    if end <= start + 2 {
        return None;
    }
    let idx = match kind {
        Extremum::Max => argmax(data, start, end)?,
        Extremum::Min => argmin(data, start, end)?,
    };
    if idx == start || idx + 1 >= end {
        return None;
    }
    if let Some(required) = min_prominence {
        if prominence(&data[start..end], idx - start, kind) < required {
            return None;
        }
    }
    Some(idx)
}

fn prominence(window: &[f64], idx: usize, kind: Extremum) -> f64 {
    let value = window[idx];
    match kind {
        Extremum::Max => {
            let left = window[..=idx].iter().copied().fold(f64::INFINITY, f64::min);
            let right = window[idx..].iter().copied().fold(f64::INFINITY, f64::min);
            value - left.max(right)
        }
        Extremum::Min => {
            let left = window[..=idx].iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let right = window[idx..].iter().copied().fold(f64::NEG_INFINITY, f64::max);
            left.min(right) - value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        beat_indices, ecg_beats, BeatShape, P_OFFSET_S, Q_OFFSET_S, S_OFFSET_S, T_OFFSET_S,
    };

    fn near(found: Option<usize>, expected: f64, fs: f64, tol: usize) -> bool {
        let expected = (expected * fs).round() as usize;
        found.is_some_and(|f| f.abs_diff(expected) <= tol)
    }

    #[test]
    fn finds_all_waves_on_clean_beats() {
        let fs = 250.0;
        let ts = ecg_beats(fs, 6.0, 60.0, BeatShape::default());
        let beats: Vec<f64> = (0..6).map(|k| 0.5 + k as f64).collect();
        let r = PeakSet::from_indices(beat_indices(fs, &beats));
        let marks = WaveDelineator::default().delineate(&ts.data, &r, fs);
        assert_eq!(marks.beats.len(), 6);
        for (beat, &bt) in marks.beats.iter().zip(&beats) {
            assert!(near(beat.p, bt + P_OFFSET_S, fs, 2), "{:?}", beat);
            assert!(near(beat.q, bt + Q_OFFSET_S, fs, 2), "{:?}", beat);
            assert!(near(beat.s, bt + S_OFFSET_S, fs, 2), "{:?}", beat);
            assert!(near(beat.t, bt + T_OFFSET_S, fs, 2), "{:?}", beat);
        }
        assert_eq!(marks.t.len(), 6);
        assert!(marks.p.is_strictly_increasing());
    }

    #[test]
    fn missing_p_waves_are_absent_not_invented() {
        let fs = 250.0;
        let ts = ecg_beats(fs, 6.0, 60.0, BeatShape::default().without_p());
        let beats: Vec<f64> = (0..6).map(|k| 0.5 + k as f64).collect();
        let r = PeakSet::from_indices(beat_indices(fs, &beats));
        let marks = WaveDelineator::default().delineate(&ts.data, &r, fs);
        assert!(marks.p.is_empty());
        assert_eq!(marks.q.len(), 6);
    }

    #[test]
    fn landmarks_stay_between_neighbouring_r_peaks() {
        let fs = 250.0;
        let ts = ecg_beats(fs, 5.0, 190.0, BeatShape::default());
        let beats: Vec<f64> = (0..15).map(|k| 0.5 + k as f64 * 60.0 / 190.0).collect();
        let r = PeakSet::from_indices(beat_indices(fs, &beats));
        let marks = WaveDelineator::default().delineate(&ts.data, &r, fs);
        for (i, beat) in marks.beats.iter().enumerate() {
            let lo = if i > 0 { r.indices[i - 1] } else { 0 };
            let hi = r.indices.get(i + 1).copied().unwrap_or(ts.len());
            for idx in [beat.p, beat.q, beat.s, beat.t].into_iter().flatten() {
                assert!(idx > lo && idx < hi, "beat {} landmark {} outside ({}, {})", i, idx, lo, hi);
            }
        }
    }

    #[test]
    fn narrows_p_window_at_fast_rates() {
        let d = WaveDelineator::default();
        assert_eq!(d.p_window_s(Some(72.0)), (0.20, 0.12));
        assert_eq!(d.p_window_s(None), (0.20, 0.12));
        assert_eq!(d.p_window_s(Some(130.0)), (0.15, 0.10));
    }

    #[test]
    fn empty_inputs_give_empty_landmarks() {
        let d = WaveDelineator::default();
        assert!(d.delineate(&[], &PeakSet::default(), 250.0).beats.is_empty());
        assert!(d.delineate(&[0.0; 100], &PeakSet::default(), 250.0).beats.is_empty());
        let marks = d.delineate(&[0.0; 100], &PeakSet::from_indices(vec![50]), 250.0);
        assert_eq!(marks.beats.len(), 1);
        assert!(marks.beats[0].q.is_none() && marks.beats[0].t.is_none());
    }

    #[test]
    fn edge_extrema_are_rejected() {
        let ramp: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert_eq!(find_extremum(&ramp, 2, 10, Extremum::Max, None), None);
        let mut bump = vec![0.0; 20];
        bump[6] = 1.0;
        assert_eq!(find_extremum(&bump, 2, 10, Extremum::Max, Some(0.5)), Some(6));
        assert_eq!(find_extremum(&bump, 2, 10, Extremum::Max, Some(2.0)), None);
    }
}
