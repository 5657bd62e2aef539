use crate::{
    conditioning::SignalConditioner,
    config::EngineConfig,
    detectors::{BeatDetector, DetectorHistory, WaveDelineator, WaveLandmarks},
    error::{is_valid_sampling_rate, ConfigError, EngineError},
    metrics::{
        respiration_rate_bpm, rr::rr_stats, MeasurementEngine, MeasurementRecord, MedianBeat,
        RrStats, SignalQuality,
    },
    rhythm::{RhythmAssessment, RhythmClassifier, RhythmHistory, RhythmInput},
    signal::{median, PeakSet, RRSeries, TimeSeries},
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Cross-window state of one lead. Nothing else survives between windows.
#[derive(Debug, Clone)]
pub struct LeadState {
    pub detector: DetectorHistory,
    pub rhythm: RhythmHistory,
}

impl LeadState {
    pub fn reset(&mut self) {
        self.detector.reset();
        self.rhythm.reset();
    }
}

impl Default for LeadState {
    fn default() -> Self {
        Self {
            detector: DetectorHistory::default(),
            rhythm: RhythmHistory::default(),
        }
    }
}

/// Everything produced for one window of one lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowAnalysis {
    pub fs: f64,
    pub sample_count: usize,
    pub conditioned: Vec<f64>,
    pub respiration: Option<Vec<f64>>,
    pub r_peaks: PeakSet,
    pub landmarks: WaveLandmarks,
    pub measurements: MeasurementRecord,
    pub median_beat: Option<MedianBeat>,
    pub rr_stats: RrStats,
    pub quality: SignalQuality,
    pub rhythm: RhythmAssessment,
}

/// Condition, detect, delineate, measure and classify one window at a time.
#[derive(Debug, Clone)]
pub struct EcgPipeline {
    config: EngineConfig,
    conditioner: SignalConditioner,
    detector: BeatDetector,
    delineator: WaveDelineator,
    measurements: MeasurementEngine,
    classifier: RhythmClassifier,
}

impl EcgPipeline {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            conditioner: SignalConditioner::new(config.conditioner.clone()),
            detector: BeatDetector::new(config.detector.clone()),
            delineator: WaveDelineator::new(config.delineation.clone()),
            measurements: MeasurementEngine::new(config.measurement.clone()),
            classifier: RhythmClassifier::new(config.rhythm.clone()),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh per-lead state sized for this configuration.
    pub fn new_lead_state(&self) -> LeadState {
        LeadState {
            detector: self.detector.new_history(),
            rhythm: self.classifier.new_history(),
        }
    }

    /// Analyse one window. `second_lead` (same length and rate) enables the QRS axis.
    pub fn process(
        &mut self,
        window: &TimeSeries,
        second_lead: Option<&TimeSeries>,
        state: &mut LeadState,
    ) -> Result<WindowAnalysis, EngineError> {
        let fs = window.fs;
        if !is_valid_sampling_rate(fs) {
            return Err(EngineError::InvalidSamplingRate(fs));
        }
        if let Some(lead2) = second_lead {
            if lead2.len() != window.len() || lead2.fs != fs {
                return Err(EngineError::LeadMismatch {
                    expected_len: window.len(),
                    expected_fs: fs,
                    found_len: lead2.len(),
                    found_fs: lead2.fs,
                });
            }
        }

        let conditioned = self.conditioner.condition_with_respiration(window);
        let signal = &conditioned.signal;
        let second = second_lead.map(|lead2| self.conditioner.condition(lead2));

        let r_peaks = self.detector.detect_r_peaks(signal, fs, &mut state.detector);
        let landmarks = self.delineator.delineate(signal, &r_peaks, fs);
        let mut measurements =
            self.measurements
                .measure(signal, &r_peaks, &landmarks, fs, second.as_deref());
        if let Some(resp) = &conditioned.respiration {
            measurements.respiration_rate_bpm = respiration_rate_bpm(resp, fs);
        }

        let median_beat = self.measurements.median_beat(signal, &r_peaks, fs);
        let rr_stats = rr_stats(&self.measurements.valid_rr(&r_peaks, fs));
        let quality = SignalQuality::assess(signal, self.config.detector.flat_tolerance);
        let usable = signal.iter().all(|x| x.is_finite());
        let raw_rr = RRSeries::from_peaks(&r_peaks, fs);
        let rhythm = self.classifier.classify(
            &RhythmInput {
                heart_rate_bpm: rhythm_rate_bpm(
                    measurements.heart_rate_bpm,
                    &raw_rr,
                    self.config.measurement.rr_min_ms,
                ),
                qrs_ms: measurements.qrs_ms,
                pr_ms: measurements.pr_ms,
                rr_intervals_s: &raw_rr.rr,
                p_count: landmarks.p.len(),
                r_count: r_peaks.len(),
                peak_to_peak: if usable { quality.peak_to_peak } else { f64::NAN },
                duration_s: window.duration(),
            },
            &mut state.rhythm,
        );
        debug!(
            "window of {} samples: {} R peaks, {}",
            window.len(),
            r_peaks.len(),
            rhythm.label
        );

        Ok(WindowAnalysis {
            fs,
            sample_count: window.len(),
            conditioned: conditioned.signal,
            respiration: conditioned.respiration,
            r_peaks,
            landmarks,
            measurements,
            median_beat,
            rr_stats,
            quality,
            rhythm,
        })
    }
}

/// Ventricular rate handed to the rhythm rules.
///
/// The measured heart rate only sees RR intervals above `rr_min_ms`. When the
/// median raw interval is shorter than that, the ventricles beat faster than
/// the measured rate can express and the raw rate is used instead.
fn rhythm_rate_bpm(measured: Option<f64>, raw_rr: &RRSeries, rr_min_ms: f64) -> Option<f64> {
    let raw = median(&raw_rr.rr)
        .filter(|rr| *rr > 0.0)
        .map(|rr| 60.0 / rr);
    match raw {
        Some(rate) if rate > 60_000.0 / rr_min_ms => Some(rate),
        _ => measured.or(raw),
    }
}
