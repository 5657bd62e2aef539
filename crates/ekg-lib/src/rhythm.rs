//! Ordered rule set mapping window measurements to a rhythm suggestion.
//!
//! Labels are pattern-matching hints ("-like"), not diagnoses. Rules are
//! evaluated top to bottom and the first match wins.

use crate::{
    config::{RhythmConfig, MAX_HISTORY_LEN},
    metrics::rr::{rr_stats, RrStats},
    signal::RRSeries,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// The rhythm categories consumers group labels into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmCategory {
    NormalSinus,
    Bradycardia,
    Tachycardia,
    FibrillationLike,
    FlutterLike,
    PrematureBeatLike,
    HeartBlockLike,
    Asystole,
    Indeterminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RhythmLabel {
    NormalSinus,
    SinusBradycardia,
    SinusTachycardia,
    SupraventricularTachycardia,
    WideComplexTachycardia,
    /// Chaotic, fast, large-amplitude activity.
    VentricularFibrillationLike,
    /// Irregular RR with missing P waves.
    AtrialFibrillationLike,
    FlutterLike,
    PrematureBeatLike,
    PrematureVentricularLike,
    FirstDegreeBlockLike,
    DroppedBeatBlockLike,
    Asystole,
    /// No R peaks although the signal is not flat.
    NoQrsDetected,
    Indeterminate,
}

impl RhythmLabel {
    pub fn category(self) -> RhythmCategory {
        use RhythmLabel::*;
        match self {
            NormalSinus => RhythmCategory::NormalSinus,
            SinusBradycardia => RhythmCategory::Bradycardia,
            SinusTachycardia | SupraventricularTachycardia | WideComplexTachycardia => {
                RhythmCategory::Tachycardia
            }
            VentricularFibrillationLike | AtrialFibrillationLike => RhythmCategory::FibrillationLike,
            FlutterLike => RhythmCategory::FlutterLike,
            PrematureBeatLike | PrematureVentricularLike => RhythmCategory::PrematureBeatLike,
            FirstDegreeBlockLike | DroppedBeatBlockLike => RhythmCategory::HeartBlockLike,
            Asystole => RhythmCategory::Asystole,
            NoQrsDetected | Indeterminate => RhythmCategory::Indeterminate,
        }
    }

    pub fn description(self) -> &'static str {
        use RhythmLabel::*;
        match self {
            NormalSinus => "normal sinus rhythm",
            SinusBradycardia => "sinus bradycardia",
            SinusTachycardia => "sinus tachycardia",
            SupraventricularTachycardia => "supraventricular tachycardia",
            WideComplexTachycardia => "wide-complex tachycardia",
            VentricularFibrillationLike => "ventricular-fibrillation-like",
            AtrialFibrillationLike => "atrial-fibrillation-like",
            FlutterLike => "flutter-like",
            PrematureBeatLike => "premature-beat-like",
            PrematureVentricularLike => "premature-ventricular-beat-like",
            FirstDegreeBlockLike => "first-degree-block-like",
            DroppedBeatBlockLike => "block-like with dropped beats",
            Asystole => "asystole",
            NoQrsDetected => "no QRS detected",
            Indeterminate => "indeterminate",
        }
    }
}

impl fmt::Display for RhythmLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Everything the rules look at for one window.
#[derive(Debug, Clone, Copy)]
pub struct RhythmInput<'a> {
    pub heart_rate_bpm: Option<f64>,
    pub qrs_ms: Option<f64>,
    pub pr_ms: Option<f64>,
    /// Every RR interval between detected beats (seconds), including those
    /// shorter than the physiological floor of the measured heart rate.
    pub rr_intervals_s: &'a [f64],
    pub p_count: usize,
    pub r_count: usize,
    /// Conditioned amplitude; NaN when the window held no usable samples.
    pub peak_to_peak: f64,
    pub duration_s: f64,
}

/// Recent heart-rate estimates of one lead, used to steady the rate rules.
#[derive(Debug, Clone)]
pub struct RhythmHistory {
    capacity: usize,
    rates: VecDeque<f64>,
}

impl RhythmHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_HISTORY_LEN);
        Self {
            capacity,
            rates: VecDeque::with_capacity(capacity),
        }
    }

    pub fn reset(&mut self) {
        self.rates.clear();
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Mean of the remembered rates once `hr` has been added. Rates outside
    /// `[min, max]` are passed through without entering the history.
    fn smooth(&mut self, hr: Option<f64>, min: f64, max: f64) -> Option<f64> {
        let hr = hr?;
        if !(min..=max).contains(&hr) {
            return Some(hr);
        }
        if self.rates.len() == self.capacity {
            self.rates.pop_front();
        }
        self.rates.push_back(hr);
        Some(self.rates.iter().sum::<f64>() / self.rates.len() as f64)
    }
}

impl Default for RhythmHistory {
    fn default() -> Self {
        Self::new(RhythmConfig::default().hr_smoothing_window)
    }
}

/// Result of one classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RhythmAssessment {
    pub label: RhythmLabel,
    pub category: RhythmCategory,
    /// Heart rate the rate rules used, after smoothing.
    pub smoothed_heart_rate_bpm: Option<f64>,
}

impl RhythmAssessment {
    fn new(label: RhythmLabel, smoothed_heart_rate_bpm: Option<f64>) -> Self {
        Self {
            label,
            category: label.category(),
            smoothed_heart_rate_bpm,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RhythmClassifier {
    config: RhythmConfig,
}

impl RhythmClassifier {
    pub fn new(config: RhythmConfig) -> Self {
        Self { config }
    }

    pub fn new_history(&self) -> RhythmHistory {
        RhythmHistory::new(self.config.hr_smoothing_window)
    }

    pub fn classify(&self, input: &RhythmInput<'_>, history: &mut RhythmHistory) -> RhythmAssessment {
        let cfg = &self.config;
        let r_count = input.r_count;

        if r_count == 0 {
            history.reset();
            // A NaN amplitude means the window carried no usable signal.
            let label = if !input.peak_to_peak.is_finite() {
                RhythmLabel::Indeterminate
            } else if input.peak_to_peak < cfg.asystole_max_amplitude {
                RhythmLabel::Asystole
            } else {
                RhythmLabel::NoQrsDetected
            };
            return RhythmAssessment::new(label, None);
        }

        let hr = history.smooth(
            input.heart_rate_bpm,
            cfg.hr_smoothing_min_bpm,
            cfg.hr_smoothing_max_bpm,
        );
        let rr = rr_stats(&RRSeries {
            rr: input.rr_intervals_s.to_vec(),
        });
        let Some(hr) = hr.filter(|_| rr.n >= 2) else {
            return RhythmAssessment::new(RhythmLabel::Indeterminate, hr);
        };

        let label = self.apply_rules(input, &rr, hr);
        RhythmAssessment::new(label, Some(hr))
    }

    fn apply_rules(&self, input: &RhythmInput<'_>, rr: &RrStats, hr: f64) -> RhythmLabel {
        let cfg = &self.config;
        let r_count = input.r_count as f64;
        let regular = rr.is_regular(cfg.regular_rr_std_s);
        let wide = input.qrs_ms.is_some_and(|q| q > cfg.wide_qrs_ms);
        let narrow = input.qrs_ms.is_some_and(|q| q <= cfg.wide_qrs_ms);
        let few_p_waves = (input.p_count as f64) < cfg.p_wave_ratio * r_count;

        if input.r_count >= cfg.fibrillation_min_peaks
            && rr.std_s > cfg.fibrillation_rr_std_s
            && input.peak_to_peak > cfg.fibrillation_min_amplitude
            && hr > cfg.fibrillation_min_rate_bpm
        {
            return RhythmLabel::VentricularFibrillationLike;
        }
        if hr > cfg.tachycardia_rate_bpm && wide && regular {
            return RhythmLabel::WideComplexTachycardia;
        }
        if hr < cfg.bradycardia_rate_bpm && regular {
            return RhythmLabel::SinusBradycardia;
        }
        if hr > cfg.tachycardia_rate_bpm && narrow && regular {
            return if hr > cfg.supraventricular_rate_bpm {
                RhythmLabel::SupraventricularTachycardia
            } else {
                RhythmLabel::SinusTachycardia
            };
        }
        if !regular && few_p_waves {
            return RhythmLabel::AtrialFibrillationLike;
        }
        if hr > cfg.flutter_min_rate_bpm
            && hr < cfg.flutter_max_rate_bpm
            && regular
            && input.p_count > input.r_count
        {
            return RhythmLabel::FlutterLike;
        }
        if input.r_count >= cfg.premature_min_peaks && self.has_compensatory_pause(input.rr_intervals_s, rr.mean_s) {
            return RhythmLabel::PrematureBeatLike;
        }
        if wide && few_p_waves {
            return RhythmLabel::PrematureVentricularLike;
        }
        if input.pr_ms.is_some_and(|pr| pr > cfg.first_degree_pr_ms) {
            return RhythmLabel::FirstDegreeBlockLike;
        }
        let expected_beats = input.duration_s * hr / 60.0;
        if r_count < expected_beats * cfg.dropped_beat_ratio {
            return RhythmLabel::DroppedBeatBlockLike;
        }
        if regular && hr >= cfg.bradycardia_rate_bpm && hr <= cfg.tachycardia_rate_bpm {
            RhythmLabel::NormalSinus
        } else {
            RhythmLabel::Indeterminate
        }
    }

    /// A short interval immediately followed by a long one.
    fn has_compensatory_pause(&self, rr: &[f64], mean_s: f64) -> bool {
        let short = self.config.premature_short_ratio * mean_s;
        let long = self.config.premature_pause_ratio * mean_s;
        rr.windows(2).any(|w| w[0] < short && w[1] > long)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(hr: f64, rr: &[f64], r_count: usize, p_count: usize) -> RhythmInput<'_> {
        RhythmInput {
            heart_rate_bpm: Some(hr),
            qrs_ms: Some(80.0),
            pr_ms: Some(160.0),
            rr_intervals_s: rr,
            p_count,
            r_count,
            peak_to_peak: 1.2,
            duration_s: r_count as f64 * 60.0 / hr,
        }
    }

    fn classify(input: &RhythmInput<'_>) -> RhythmLabel {
        let classifier = RhythmClassifier::default();
        classifier.classify(input, &mut classifier.new_history()).label
    }

    #[test]
    fn flat_window_is_asystole_and_noise_is_no_qrs() {
        let mut flat = input(0.0, &[], 0, 0);
        flat.heart_rate_bpm = None;
        flat.peak_to_peak = 0.0;
        assert_eq!(classify(&flat), RhythmLabel::Asystole);
        assert_eq!(RhythmLabel::Asystole.category(), RhythmCategory::Asystole);

        flat.peak_to_peak = 0.4;
        assert_eq!(classify(&flat), RhythmLabel::NoQrsDetected);
    }

    #[test]
    fn unusable_amplitude_is_never_asystole() {
        let mut blank = input(0.0, &[], 0, 0);
        blank.heart_rate_bpm = None;
        blank.peak_to_peak = f64::NAN;
        assert_eq!(classify(&blank), RhythmLabel::Indeterminate);
    }

    #[test]
    fn too_few_intervals_are_indeterminate() {
        assert_eq!(classify(&input(75.0, &[0.8], 2, 2)), RhythmLabel::Indeterminate);
    }

    #[test]
    fn regular_rates_map_to_sinus_labels() {
        let normal = [0.8; 8];
        assert_eq!(classify(&input(75.0, &normal, 9, 9)), RhythmLabel::NormalSinus);
        let slow = [1.2; 8];
        assert_eq!(classify(&input(50.0, &slow, 9, 9)), RhythmLabel::SinusBradycardia);
        let fast = [0.5; 8];
        assert_eq!(classify(&input(120.0, &fast, 9, 9)), RhythmLabel::SinusTachycardia);
        let faster = [0.375; 8];
        assert_eq!(
            classify(&input(160.0, &faster, 9, 9)),
            RhythmLabel::SupraventricularTachycardia
        );
        assert_eq!(RhythmLabel::SupraventricularTachycardia.category(), RhythmCategory::Tachycardia);
    }

    #[test]
    fn wide_regular_fast_is_wide_complex() {
        let mut i = input(130.0, &[0.46; 8], 9, 9);
        i.qrs_ms = Some(150.0);
        assert_eq!(classify(&i), RhythmLabel::WideComplexTachycardia);
    }

    #[test]
    fn chaotic_fast_large_activity_is_fibrillation_like() {
        let rr = [0.31, 0.9, 0.32, 1.1, 0.35, 0.95, 0.3];
        let mut i = input(190.0, &rr, 8, 0);
        i.qrs_ms = None;
        assert_eq!(classify(&i), RhythmLabel::VentricularFibrillationLike);
        i.peak_to_peak = 0.05;
        assert_eq!(classify(&i), RhythmLabel::AtrialFibrillationLike);
    }

    #[test]
    fn irregular_without_p_waves_is_af_like() {
        let rr = [0.5, 1.2, 0.7, 1.5, 0.6, 1.0, 0.45];
        assert_eq!(classify(&input(75.0, &rr, 8, 1)), RhythmLabel::AtrialFibrillationLike);
        assert_eq!(
            RhythmLabel::AtrialFibrillationLike.category(),
            RhythmCategory::FibrillationLike
        );
    }

    #[test]
    fn flutter_needs_more_p_than_r_and_no_qrs_width() {
        let rr = [0.4; 10];
        let mut i = input(150.0, &rr, 11, 22);
        i.qrs_ms = None;
        assert_eq!(classify(&i), RhythmLabel::FlutterLike);
        i.p_count = 11;
        assert_eq!(classify(&i), RhythmLabel::Indeterminate);
    }

    #[test]
    fn compensatory_pause_is_premature_beat_like() {
        let rr = [0.8, 0.8, 0.5, 1.1, 0.8, 0.8];
        let i = input(75.0, &rr, 7, 7);
        assert_eq!(classify(&i), RhythmLabel::PrematureBeatLike);
    }

    #[test]
    fn wide_without_p_is_pvc_like() {
        let rr = [0.8, 0.86, 0.74, 0.9, 0.8];
        let mut i = input(75.0, &rr, 4, 1);
        i.qrs_ms = Some(140.0);
        assert_eq!(classify(&i), RhythmLabel::PrematureVentricularLike);
    }

    #[test]
    fn long_pr_is_first_degree_block_like() {
        let mut i = input(75.0, &[0.8; 8], 9, 9);
        i.pr_ms = Some(240.0);
        assert_eq!(classify(&i), RhythmLabel::FirstDegreeBlockLike);
    }

    #[test]
    fn missing_beats_are_block_like() {
        let mut i = input(75.0, &[0.8; 4], 5, 5);
        i.duration_s = 10.0;
        assert_eq!(classify(&i), RhythmLabel::DroppedBeatBlockLike);
        assert_eq!(RhythmLabel::DroppedBeatBlockLike.category(), RhythmCategory::HeartBlockLike);
    }

    #[test]
    fn history_smooths_rate_and_clears_on_asystole() {
        let classifier = RhythmClassifier::default();
        let mut history = classifier.new_history();
        let rr = [0.8; 8];
        for hr in [70.0, 80.0, 90.0] {
            classifier.classify(&input(hr, &rr, 9, 9), &mut history);
        }
        let out = classifier.classify(&input(100.0, &rr, 9, 9), &mut history);
        assert!((out.smoothed_heart_rate_bpm.unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(history.len(), 3);

        // Out-of-range estimates bypass the history.
        let out = classifier.classify(&input(250.0, &[0.24; 8], 9, 9), &mut history);
        assert_eq!(out.smoothed_heart_rate_bpm, Some(250.0));
        assert_eq!(history.len(), 3);

        let mut flat = input(0.0, &[], 0, 0);
        flat.peak_to_peak = 0.0;
        classifier.classify(&flat, &mut history);
        assert!(history.is_empty());
    }
}
