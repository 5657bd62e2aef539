use crate::{
    config::{MeasurementConfig, StReference},
    detectors::WaveLandmarks,
    error::is_valid_sampling_rate,
    metrics::median_beat::{wave_axes, MedianBeat, WaveAxes},
    signal::{mean, median, PeakSet, RRSeries},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StClass {
    Elevated,
    Depressed,
    Isoelectric,
}

/// ST level relative to the configured reference, with a label when bands are set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StMeasurement {
    pub level: f64,
    pub class: Option<StClass>,
}

/// Per-window measurements. Every field is absent when its prerequisite
/// landmarks are missing or the raw value fails its physiological bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub heart_rate_bpm: Option<f64>,
    pub rr_ms: Option<f64>,
    pub pr_ms: Option<f64>,
    pub qrs_ms: Option<f64>,
    pub qt_ms: Option<f64>,
    /// Bazett
    pub qtc_ms: Option<f64>,
    /// Fridericia
    pub qtcf_ms: Option<f64>,
    pub st: Option<StMeasurement>,
    /// Frontal QRS axis in degrees, (-180, 180]
    pub axis_deg: Option<f64>,
    /// P and T axes from the two leads' median beats.
    pub p_axis_deg: Option<f64>,
    pub t_axis_deg: Option<f64>,
    pub qrs_t_angle_deg: Option<f64>,
    pub respiration_rate_bpm: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct MeasurementEngine {
    config: MeasurementConfig,
}

impl MeasurementEngine {
    pub fn new(config: MeasurementConfig) -> Self {
        Self { config }
    }

    /// RR intervals (seconds) inside the configured physiological range.
    pub fn valid_rr(&self, r_peaks: &PeakSet, fs: f64) -> RRSeries {
        if !is_valid_sampling_rate(fs) {
            return RRSeries::default();
        }
        RRSeries::from_peaks(r_peaks, fs)
            .physiological(self.config.rr_min_ms / 1000.0, self.config.rr_max_ms / 1000.0)
    }

    /// `60000 / median(valid RR ms)`.
    pub fn heart_rate(&self, r_peaks: &PeakSet, fs: f64) -> Option<f64> {
        let rr = self.valid_rr(r_peaks, fs);
        median(&rr.rr).map(|rr_s| 60.0 / rr_s)
    }

    pub fn measure(
        &self,
        conditioned: &[f64],
        r_peaks: &PeakSet,
        landmarks: &WaveLandmarks,
        fs: f64,
        second_lead: Option<&[f64]>,
    ) -> MeasurementRecord {
        if !is_valid_sampling_rate(fs) {
            return MeasurementRecord::default();
        }
        let cfg = &self.config;
        let to_ms = |samples: usize| samples as f64 * 1000.0 / fs;

        let rr_s = median(&self.valid_rr(r_peaks, fs).rr);
        let heart_rate_bpm = rr_s.map(|rr| 60.0 / rr);

        let pr_ms = median_of(landmarks.beats.iter().filter_map(|b| {
            b.p.map(|p| to_ms(b.r - p))
        }));
        let qrs_ms = median_of(landmarks.beats.iter().filter_map(|b| match (b.q, b.s) {
            (Some(q), Some(s)) => Some(to_ms(s - q)),
            _ => None,
        }));
        let qt_ms = median_of(landmarks.beats.iter().filter_map(|b| match (b.q, b.t) {
            (Some(q), Some(t)) => Some(to_ms(t - q)),
            _ => None,
        }))
        .filter(|qt| (cfg.qt_min_ms..=cfg.qt_max_ms).contains(qt));

        let (qtc_ms, qtcf_ms) = match (qt_ms, rr_s) {
            (Some(qt), Some(rr)) => (Some(qt_bazett(qt, rr)), Some(qt_fridericia(qt, rr))),
            _ => (None, None),
        };

        let axes = second_lead
            .map(|lead2| self.wave_axes(conditioned, lead2, r_peaks, fs))
            .unwrap_or_default();

        MeasurementRecord {
            heart_rate_bpm,
            rr_ms: rr_s.map(|rr| rr * 1000.0),
            pr_ms,
            qrs_ms,
            qt_ms,
            qtc_ms,
            qtcf_ms,
            st: self.st_level(conditioned, r_peaks, fs),
            axis_deg: second_lead.and_then(|lead2| self.qrs_axis(conditioned, lead2, r_peaks, fs)),
            p_axis_deg: axes.p_deg,
            t_axis_deg: axes.t_deg,
            qrs_t_angle_deg: axes.qrs_t_angle_deg,
            respiration_rate_bpm: None,
        }
    }

    /// Median of the cleanest beats of one lead.
    pub fn median_beat(&self, conditioned: &[f64], r_peaks: &PeakSet, fs: f64) -> Option<MedianBeat> {
        MedianBeat::build(conditioned, r_peaks, fs, &self.config)
    }

    /// Wave axes from the median beats of two orthogonal leads sharing `r_peaks`.
    pub fn wave_axes(&self, lead1: &[f64], lead2: &[f64], r_peaks: &PeakSet, fs: f64) -> WaveAxes {
        match (
            self.median_beat(lead1, r_peaks, fs),
            self.median_beat(lead2, r_peaks, fs),
        ) {
            (Some(beat1), Some(beat2)) => wave_axes(&beat1, &beat2, &self.config),
            _ => WaveAxes::default(),
        }
    }

    /// Mean of `signal[R + J + ST] - reference` over the beats where it can be sampled.
    pub fn st_level(&self, conditioned: &[f64], r_peaks: &PeakSet, fs: f64) -> Option<StMeasurement> {
        let cfg = &self.config;
        let offset = ((cfg.j_point_offset_s + cfg.st_offset_s) * fs).round() as usize;
        let tp_start = (cfg.tp_start_s * fs).round() as usize;
        let tp_end = (cfg.tp_end_s * fs).round() as usize;
        let zero = cfg.st_bands.map_or(0.0, |b| b.zero);

        let levels: Vec<f64> = r_peaks
            .indices
            .iter()
            .filter_map(|&r| {
                let value = *conditioned.get(r + offset)?;
                let reference = match cfg.st_reference {
                    StReference::CalibratedZero => zero,
                    StReference::TpSegment => {
                        let start = r.checked_sub(tp_start)?;
                        let end = r.checked_sub(tp_end)?;
                        if end <= start {
                            return None;
                        }
                        mean(&conditioned[start..end])
                    }
                };
                Some(value - reference)
            })
            .collect();
        if levels.is_empty() {
            return None;
        }
        let level = mean(&levels);
        let class = cfg.st_bands.map(|bands| {
            if level > bands.dead_band {
                StClass::Elevated
            } else if level < -bands.dead_band {
                StClass::Depressed
            } else {
                StClass::Isoelectric
            }
        });
        Some(StMeasurement { level, class })
    }

    /// Frontal axis from the net QRS area of two orthogonal leads around each R.
    pub fn qrs_axis(&self, lead1: &[f64], lead2: &[f64], r_peaks: &PeakSet, fs: f64) -> Option<f64> {
        let half = (self.config.axis_half_window_s * fs).round() as usize;
        let n = lead1.len().min(lead2.len());
        let mut sum1 = 0.0;
        let mut sum2 = 0.0;
        let mut used = 0usize;
        for &r in &r_peaks.indices {
            let Some(start) = r.checked_sub(half) else {
                continue;
            };
            let end = r + half + 1;
            if end > n {
                continue;
            }
            sum1 += lead1[start..end].iter().sum::<f64>();
            sum2 += lead2[start..end].iter().sum::<f64>();
            used += 1;
        }
        if used == 0 {
            return None;
        }
        axis_from_sums(sum1 / used as f64, sum2 / used as f64)
    }
}

/// Axis angle in degrees, normalised to (-180, 180]; `None` when both sums vanish.
pub fn axis_from_sums(lead1: f64, lead2: f64) -> Option<f64> {
    if !lead1.is_finite() || !lead2.is_finite() || (lead1 == 0.0 && lead2 == 0.0) {
        return None;
    }
    let deg = lead2.atan2(lead1).to_degrees();
    Some(if deg <= -180.0 { deg + 360.0 } else { deg })
}

pub fn qt_bazett(qt_ms: f64, rr_s: f64) -> f64 {
    qt_ms / rr_s.sqrt()
}

pub fn qt_fridericia(qt_ms: f64, rr_s: f64) -> f64 {
    qt_ms / rr_s.cbrt()
}

fn median_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let values: Vec<f64> = values.collect();
    median(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StBands;
    use crate::detectors::{BeatLandmarks, WaveDelineator};
    use crate::signal::TimeSeries;
    use crate::testing::{beat_indices, ecg_at, ecg_beats, BeatShape};

    fn peaks_at(fs: f64, times: &[f64]) -> PeakSet {
        PeakSet::from_indices(beat_indices(fs, times))
    }

    #[test]
    fn heart_rate_of_regular_train() {
        let fs = 250.0;
        let times: Vec<f64> = (0..12).map(|k| 0.5 + k as f64 * 60.0 / 72.0).collect();
        let hr = MeasurementEngine::default()
            .heart_rate(&peaks_at(fs, &times), fs)
            .unwrap();
        assert!((hr - 72.0).abs() <= 3.0, "hr {}", hr);
    }

    #[test]
    fn glitch_interval_does_not_move_heart_rate() {
        let fs = 250.0;
        let engine = MeasurementEngine::default();
        let clean = PeakSet::from_indices(vec![100, 300, 500, 700, 900]);
        let mut glitched = clean.indices.clone();
        // 50 ms after the third beat.
        glitched.push(512);
        let glitched = PeakSet::from_indices(glitched);
        let rr_clean = engine.valid_rr(&clean, fs);
        let rr_glitch = engine.valid_rr(&glitched, fs);
        assert_eq!(rr_glitch.rr.len(), rr_clean.rr.len());
        assert!(rr_glitch.rr.iter().all(|rr| *rr >= 0.3));
        let a = engine.heart_rate(&clean, fs).unwrap();
        let b = engine.heart_rate(&glitched, fs).unwrap();
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }

    #[test]
    fn no_peaks_means_no_measurements() {
        let record = MeasurementEngine::default().measure(
            &[0.0; 500],
            &PeakSet::default(),
            &WaveLandmarks::default(),
            250.0,
            None,
        );
        assert_eq!(record, MeasurementRecord::default());
    }

    #[test]
    fn intervals_from_clean_beats() {
        let fs = 250.0;
        let ts = ecg_beats(fs, 8.0, 60.0, BeatShape::default());
        let times: Vec<f64> = (0..8).map(|k| 0.5 + k as f64).collect();
        let r = peaks_at(fs, &times);
        let marks = WaveDelineator::default().delineate(&ts.data, &r, fs);
        let rec = MeasurementEngine::default().measure(&ts.data, &r, &marks, fs, None);
        assert!((rec.heart_rate_bpm.unwrap() - 60.0).abs() < 0.5);
        assert!((rec.rr_ms.unwrap() - 1000.0).abs() < 5.0);
        let pr = rec.pr_ms.unwrap();
        assert!((150.0..=170.0).contains(&pr), "pr {}", pr);
        let qrs = rec.qrs_ms.unwrap();
        assert!((50.0..=75.0).contains(&qrs), "qrs {}", qrs);
        let qt = rec.qt_ms.unwrap();
        assert!((265.0..=295.0).contains(&qt), "qt {}", qt);
        // RR of one second leaves QTc equal to QT.
        assert!((rec.qtc_ms.unwrap() - qt).abs() < 2.0);
        assert!(rec.axis_deg.is_none());
    }

    #[test]
    fn qtc_not_below_qt_for_fast_rates_and_absent_without_qt() {
        for rr_s in [0.4, 0.6, 0.8, 1.0] {
            for qt in [250.0, 350.0, 500.0] {
                assert!(qt_bazett(qt, rr_s) >= qt);
                assert!(qt_fridericia(qt, rr_s) >= qt);
            }
        }
        let fs = 250.0;
        let r = PeakSet::from_indices(vec![100, 300, 500]);
        let marks = WaveLandmarks {
            beats: r
                .indices
                .iter()
                .map(|&r| BeatLandmarks {
                    r,
                    p: None,
                    q: Some(r - 5),
                    s: Some(r + 5),
                    t: None,
                })
                .collect(),
            ..WaveLandmarks::default()
        };
        let rec = MeasurementEngine::default().measure(&[0.0; 600], &r, &marks, fs, None);
        assert!(rec.heart_rate_bpm.is_some());
        assert!(rec.qt_ms.is_none());
        assert!(rec.qtc_ms.is_none());
        assert!(rec.qtcf_ms.is_none());
    }

    #[test]
    fn out_of_range_qt_is_discarded() {
        let r = PeakSet::from_indices(vec![100, 300]);
        let marks = WaveLandmarks {
            beats: vec![BeatLandmarks {
                r: 100,
                p: None,
                q: Some(95),
                s: None,
                t: Some(120),
            }],
            ..WaveLandmarks::default()
        };
        let rec = MeasurementEngine::default().measure(&[0.0; 400], &r, &marks, 250.0, None);
        assert!(rec.qt_ms.is_none());
    }

    #[test]
    fn st_classification_uses_dead_band() {
        let fs = 250.0;
        let r = PeakSet::from_indices(vec![100, 350]);
        let st_idx = 100 + 30;
        let mut data = vec![0.0; 600];
        data[st_idx] = 0.3;
        data[350 + 30] = 0.3;
        let engine = MeasurementEngine::default();
        let st = engine.st_level(&data, &r, fs).unwrap();
        assert!((st.level - 0.3).abs() < 1e-12);
        assert_eq!(st.class, Some(StClass::Elevated));

        data[st_idx] = -0.05;
        data[350 + 30] = -0.05;
        assert_eq!(engine.st_level(&data, &r, fs).unwrap().class, Some(StClass::Isoelectric));

        let raw = MeasurementEngine::new(MeasurementConfig {
            st_bands: None,
            ..MeasurementConfig::default()
        });
        let st = raw.st_level(&data, &r, fs).unwrap();
        assert!(st.class.is_none());
        assert!((st.level + 0.05).abs() < 1e-12);
    }

    #[test]
    fn st_against_tp_segment_ignores_offset() {
        let fs = 250.0;
        let r = PeakSet::from_indices(vec![200, 450]);
        let data = vec![0.7; 700];
        let engine = MeasurementEngine::new(MeasurementConfig {
            st_reference: StReference::TpSegment,
            st_bands: Some(StBands {
                zero: 0.0,
                dead_band: 0.1,
            }),
            ..MeasurementConfig::default()
        });
        let st = engine.st_level(&data, &r, fs).unwrap();
        assert!(st.level.abs() < 1e-12);
        assert_eq!(st.class, Some(StClass::Isoelectric));
        // No TP window before the first sample means no ST at all.
        assert!(engine.st_level(&data, &PeakSet::from_indices(vec![20]), fs).is_none());
    }

    #[test]
    fn axis_from_two_leads() {
        let fs = 250.0;
        let times = [0.5, 1.5, 2.5];
        let lead1 = ecg_at(fs, 3.0, &times, BeatShape::default());
        let lead2 = TimeSeries::new(fs, lead1.data.iter().map(|v| v * -1.0).collect());
        let r = peaks_at(fs, &times);
        let engine = MeasurementEngine::default();
        let axis = engine.qrs_axis(&lead1.data, &lead1.data, &r, fs).unwrap();
        assert!((axis - 45.0).abs() < 1e-9);
        let axis = engine.qrs_axis(&lead1.data, &lead2.data, &r, fs).unwrap();
        assert!((axis + 45.0).abs() < 1e-9);
        assert!(engine
            .qrs_axis(&lead1.data, &lead1.data, &PeakSet::from_indices(vec![2]), fs)
            .is_none());
    }

    #[test]
    fn second_lead_adds_wave_axes() {
        let fs = 250.0;
        let ts = ecg_beats(fs, 12.0, 72.0, BeatShape::default());
        let times: Vec<f64> = (0..14).map(|k| 0.5 + k as f64 * 60.0 / 72.0).collect();
        let r = peaks_at(fs, &times);
        let marks = WaveDelineator::default().delineate(&ts.data, &r, fs);
        let engine = MeasurementEngine::default();

        let single = engine.measure(&ts.data, &r, &marks, fs, None);
        assert!(single.t_axis_deg.is_none());
        assert!(single.qrs_t_angle_deg.is_none());

        let paired = engine.measure(&ts.data, &r, &marks, fs, Some(&ts.data));
        assert!((paired.t_axis_deg.unwrap() - 45.0).abs() < 1e-9);
        assert!((paired.p_axis_deg.unwrap() - 45.0).abs() < 1e-9);
        assert_eq!(paired.qrs_t_angle_deg, Some(0.0));
    }

    #[test]
    fn axis_is_always_in_half_open_range() {
        let values = [-3.0, -1.0, -0.0, 0.0, 0.5, 2.0];
        for &a in &values {
            for &b in &values {
                if let Some(deg) = axis_from_sums(a, b) {
                    assert!(deg > -180.0 && deg <= 180.0, "{} {} -> {}", a, b, deg);
                }
            }
        }
        assert_eq!(axis_from_sums(-1.0, -0.0), Some(180.0));
        assert_eq!(axis_from_sums(0.0, 0.0), None);
        assert_eq!(axis_from_sums(0.0, 1.0), Some(90.0));
    }
}
