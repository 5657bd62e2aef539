use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

/// Lowest low-pass cutoff accepted for EMG suppression (Hz).
pub const EMG_MIN_CUTOFF_HZ: f64 = 35.0;
/// Highest low-pass cutoff accepted for EMG suppression (Hz).
pub const EMG_MAX_CUTOFF_HZ: f64 = 40.0;

/// Largest per-lead history (detector levels, smoothed rates) or median-beat
/// ensemble a configuration may ask for.
pub const MAX_HISTORY_LEN: usize = 1024;

/// Wire form of an option value: TOML lets users write `50`, `"50"` or `"off"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSetting {
    Number(f64),
    Text(String),
}

impl fmt::Display for RawSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawSetting::Number(n) => write!(f, "{}", n),
            RawSetting::Text(s) => f.write_str(s),
        }
    }
}

fn is_off(value: &str) -> bool {
    matches!(value, "off" | "none" | "disabled")
}

/// Power-line notch setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSetting", into = "RawSetting")]
pub enum NotchSetting {
    Off,
    Hz50,
    Hz60,
}

impl NotchSetting {
    pub fn frequency_hz(self) -> Option<f64> {
        match self {
            NotchSetting::Off => None,
            NotchSetting::Hz50 => Some(50.0),
            NotchSetting::Hz60 => Some(60.0),
        }
    }
}

impl FromStr for NotchSetting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        match value.trim_end_matches("hz") {
            v if is_off(v) => Ok(NotchSetting::Off),
            "50" | "50.0" => Ok(NotchSetting::Hz50),
            "60" | "60.0" => Ok(NotchSetting::Hz60),
            _ => Err(ConfigError::UnrecognizedOption {
                option: "notch_freq",
                value: s.to_string(),
                expected: "50, 60 or off",
            }),
        }
    }
}

impl TryFrom<RawSetting> for NotchSetting {
    type Error = ConfigError;

    fn try_from(raw: RawSetting) -> Result<Self, Self::Error> {
        raw.to_string().parse()
    }
}

impl From<NotchSetting> for RawSetting {
    fn from(value: NotchSetting) -> Self {
        match value.frequency_hz() {
            Some(hz) => RawSetting::Number(hz),
            None => RawSetting::Text("off".into()),
        }
    }
}

/// Muscle-artifact suppression setting. The cutoff is clamped into
/// [`EMG_MIN_CUTOFF_HZ`, `EMG_MAX_CUTOFF_HZ`] when the stage runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSetting", into = "RawSetting")]
pub enum EmgSetting {
    Off,
    LowPass { cutoff_hz: f64 },
}

impl EmgSetting {
    pub fn effective_cutoff_hz(self) -> Option<f64> {
        match self {
            EmgSetting::Off => None,
            EmgSetting::LowPass { cutoff_hz } => {
                Some(cutoff_hz.clamp(EMG_MIN_CUTOFF_HZ, EMG_MAX_CUTOFF_HZ))
            }
        }
    }
}

impl FromStr for EmgSetting {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        let value = value.trim_end_matches("hz");
        if is_off(value) {
            return Ok(EmgSetting::Off);
        }
        match value.parse::<f64>() {
            Ok(cutoff_hz) if cutoff_hz.is_finite() && cutoff_hz > 0.0 => {
                Ok(EmgSetting::LowPass { cutoff_hz })
            }
            _ => Err(ConfigError::UnrecognizedOption {
                option: "emg_cutoff_hz",
                value: s.to_string(),
                expected: "a positive cutoff in Hz (35-40) or off",
            }),
        }
    }
}

impl TryFrom<RawSetting> for EmgSetting {
    type Error = ConfigError;

    fn try_from(raw: RawSetting) -> Result<Self, Self::Error> {
        raw.to_string().parse()
    }
}

impl From<EmgSetting> for RawSetting {
    fn from(value: EmgSetting) -> Self {
        match value {
            EmgSetting::Off => RawSetting::Text("off".into()),
            EmgSetting::LowPass { cutoff_hz } => RawSetting::Number(cutoff_hz),
        }
    }
}

/// Baseline-wander removal strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSetting", into = "RawSetting")]
pub enum BaselineMode {
    /// Median (120 ms) then moving average (800 ms) estimate, subtracted.
    MedianMean,
    /// Drift removed, 0.1-0.35 Hz respiration component added back.
    RespirationPreserving,
    Off,
}

impl BaselineMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BaselineMode::MedianMean => "median_mean",
            BaselineMode::RespirationPreserving => "respiration_preserving",
            BaselineMode::Off => "off",
        }
    }
}

impl FromStr for BaselineMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase().replace('-', "_");
        match value.as_str() {
            "median_mean" => Ok(BaselineMode::MedianMean),
            "respiration_preserving" => Ok(BaselineMode::RespirationPreserving),
            v if is_off(v) => Ok(BaselineMode::Off),
            _ => Err(ConfigError::UnrecognizedOption {
                option: "baseline_mode",
                value: s.to_string(),
                expected: "median_mean, respiration_preserving or off",
            }),
        }
    }
}

impl TryFrom<RawSetting> for BaselineMode {
    type Error = ConfigError;

    fn try_from(raw: RawSetting) -> Result<Self, Self::Error> {
        raw.to_string().parse()
    }
}

impl From<BaselineMode> for RawSetting {
    fn from(value: BaselineMode) -> Self {
        RawSetting::Text(value.as_str().into())
    }
}

/// Filter chain settings for [`crate::conditioning::SignalConditioner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConditionerConfig {
    /// Subtract the window mean before filtering. Variance is never normalised.
    pub center: bool,
    pub notch_freq: NotchSetting,
    /// Quality factor of the notch (bandwidth = f0 / Q).
    pub notch_q: f64,
    pub emg_cutoff_hz: EmgSetting,
    pub baseline_mode: BaselineMode,
    /// Median kernel used by both baseline strategies (seconds).
    pub median_window_s: f64,
    /// Moving-average smoother for the median-mean baseline (seconds).
    pub mean_window_s: f64,
    /// Moving-average smoother for the respiration-preserving drift estimate (seconds).
    pub drift_mean_window_s: f64,
    pub respiration_low_hz: f64,
    pub respiration_high_hz: f64,
    /// Peak absolute value the re-added respiration component may reach.
    pub respiration_max_amplitude: f64,
    pub enable_qrs_sharpening: bool,
    pub sharpening_alpha: f64,
    /// Half width of each sharpening gate around a coarse QRS peak (seconds).
    pub qrs_gate_half_width_s: f64,
    /// Percentile of |x| a coarse QRS peak must exceed.
    pub qrs_gate_percentile: f64,
    pub qrs_gate_min_distance_s: f64,
}

impl Default for ConditionerConfig {
    fn default() -> Self {
        Self {
            center: true,
            notch_freq: NotchSetting::Hz50,
            notch_q: 25.0,
            emg_cutoff_hz: EmgSetting::LowPass { cutoff_hz: 35.0 },
            baseline_mode: BaselineMode::MedianMean,
            median_window_s: 0.120,
            mean_window_s: 0.800,
            drift_mean_window_s: 1.8,
            respiration_low_hz: 0.1,
            respiration_high_hz: 0.35,
            respiration_max_amplitude: 0.6,
            enable_qrs_sharpening: false,
            sharpening_alpha: 0.3,
            qrs_gate_half_width_s: 0.080,
            qrs_gate_percentile: 75.0,
            qrs_gate_min_distance_s: 0.300,
        }
    }
}

/// Parameters of the energy-envelope R-peak detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum distance between accepted peaks (seconds); 0.2 s caps the rate at 300 bpm.
    pub min_rr_s: f64,
    /// Successive k values for `mean + k * std`, tried until a peak is found.
    pub threshold_ladder: Vec<f64>,
    /// Half width of the search for the precise R sample around an envelope peak (seconds).
    pub refine_window_s: f64,
    /// Conditioned windows with a smaller peak-to-peak range are treated as flat.
    pub flat_tolerance: f64,
    /// Number of recent beat energies remembered across windows.
    pub history_len: usize,
    /// Envelope peaks below this fraction of the remembered median beat energy are ignored.
    pub history_floor_fraction: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            integration_window_s: 0.150,
            min_rr_s: 0.200,
            threshold_ladder: vec![0.3, 0.1, 0.05],
            refine_window_s: 0.075,
            flat_tolerance: 1e-9,
            history_len: 5,
            history_floor_fraction: 0.1,
        }
    }
}

/// Landmark search windows relative to each R peak, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DelineationConfig {
    pub q_window_s: f64,
    pub s_window_s: f64,
    pub p_start_s: f64,
    pub p_end_s: f64,
    pub fast_p_start_s: f64,
    pub fast_p_end_s: f64,
    /// Instantaneous rate above which the narrower P window is used.
    pub fast_rate_bpm: f64,
    pub t_start_s: f64,
    pub t_end_s: f64,
    /// P and T must stand out by this fraction of the window standard deviation.
    pub wave_prominence_fraction: f64,
}

impl Default for DelineationConfig {
    fn default() -> Self {
        Self {
            q_window_s: 0.08,
            s_window_s: 0.08,
            p_start_s: 0.20,
            p_end_s: 0.12,
            fast_p_start_s: 0.15,
            fast_p_end_s: 0.10,
            fast_rate_bpm: 100.0,
            t_start_s: 0.10,
            t_end_s: 0.30,
            wave_prominence_fraction: 0.1,
        }
    }
}

/// Where the ST level is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StReference {
    CalibratedZero,
    TpSegment,
}

/// Dead band around the calibrated zero used to label the ST level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StBands {
    pub zero: f64,
    pub dead_band: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeasurementConfig {
    pub rr_min_ms: f64,
    pub rr_max_ms: f64,
    pub qt_min_ms: f64,
    pub qt_max_ms: f64,
    pub j_point_offset_s: f64,
    pub st_offset_s: f64,
    /// `None` reports the raw ST level without a label.
    pub st_bands: Option<StBands>,
    pub st_reference: StReference,
    /// TP window used by [`StReference::TpSegment`], measured back from R.
    pub tp_start_s: f64,
    pub tp_end_s: f64,
    /// Half width of the QRS area window used for the frontal axis.
    pub axis_half_window_s: f64,
    /// Median-beat span around R.
    pub median_pre_r_s: f64,
    pub median_post_r_s: f64,
    /// Fewer clean beats than this and no median beat is built.
    pub median_min_beats: usize,
    /// Only the best-scoring beats up to this count enter the median.
    pub median_max_beats: usize,
    /// Beats scoring at or below this (0..1) are left out.
    pub beat_quality_min: f64,
    /// Isoelectric window of the median beat used as the P/QRS/T axis
    /// baseline, measured back from R.
    pub axis_baseline_start_s: f64,
    pub axis_baseline_end_s: f64,
    /// Combined net area (signal units x s) below which a wave axis is undefined.
    pub axis_min_area: f64,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            rr_min_ms: 300.0,
            rr_max_ms: 2000.0,
            qt_min_ms: 240.0,
            qt_max_ms: 520.0,
            j_point_offset_s: 0.040,
            st_offset_s: 0.080,
            st_bands: Some(StBands {
                zero: 0.0,
                dead_band: 0.1,
            }),
            st_reference: StReference::CalibratedZero,
            tp_start_s: 0.350,
            tp_end_s: 0.150,
            axis_half_window_s: 0.050,
            median_pre_r_s: 0.400,
            median_post_r_s: 0.900,
            median_min_beats: 8,
            median_max_beats: 12,
            beat_quality_min: 0.3,
            axis_baseline_start_s: 0.300,
            axis_baseline_end_s: 0.200,
            axis_min_area: 1e-4,
        }
    }
}

/// Cutoffs of the ordered rhythm rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RhythmConfig {
    pub asystole_max_amplitude: f64,
    pub fibrillation_min_amplitude: f64,
    pub fibrillation_min_peaks: usize,
    pub fibrillation_rr_std_s: f64,
    pub fibrillation_min_rate_bpm: f64,
    pub regular_rr_std_s: f64,
    pub bradycardia_rate_bpm: f64,
    pub tachycardia_rate_bpm: f64,
    pub supraventricular_rate_bpm: f64,
    pub wide_qrs_ms: f64,
    pub first_degree_pr_ms: f64,
    /// P count below this fraction of R count means P waves are missing.
    pub p_wave_ratio: f64,
    /// R count below this fraction of rate x duration means beats were dropped.
    pub dropped_beat_ratio: f64,
    pub flutter_min_rate_bpm: f64,
    pub flutter_max_rate_bpm: f64,
    pub premature_min_peaks: usize,
    pub premature_short_ratio: f64,
    pub premature_pause_ratio: f64,
    /// Heart-rate estimates averaged for the rate rules.
    pub hr_smoothing_window: usize,
    pub hr_smoothing_min_bpm: f64,
    pub hr_smoothing_max_bpm: f64,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        Self {
            asystole_max_amplitude: 0.05,
            fibrillation_min_amplitude: 0.1,
            fibrillation_min_peaks: 5,
            fibrillation_rr_std_s: 0.25,
            fibrillation_min_rate_bpm: 180.0,
            regular_rr_std_s: 0.12,
            bradycardia_rate_bpm: 60.0,
            tachycardia_rate_bpm: 100.0,
            supraventricular_rate_bpm: 150.0,
            wide_qrs_ms: 120.0,
            first_degree_pr_ms: 200.0,
            p_wave_ratio: 0.5,
            dropped_beat_ratio: 0.7,
            flutter_min_rate_bpm: 140.0,
            flutter_max_rate_bpm: 170.0,
            premature_min_peaks: 5,
            premature_short_ratio: 0.8,
            premature_pause_ratio: 1.2,
            hr_smoothing_window: 3,
            hr_smoothing_min_bpm: 30.0,
            hr_smoothing_max_bpm: 200.0,
        }
    }
}

/// Complete engine configuration, loadable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub conditioner: ConditionerConfig,
    pub detector: DetectorConfig,
    pub delineation: DelineationConfig,
    pub measurement: MeasurementConfig,
    pub rhythm: RhythmConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject parameter combinations no stage can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.conditioner;
        positive("conditioner.notch_q", c.notch_q)?;
        positive("conditioner.median_window_s", c.median_window_s)?;
        positive("conditioner.mean_window_s", c.mean_window_s)?;
        positive("conditioner.drift_mean_window_s", c.drift_mean_window_s)?;
        positive("conditioner.respiration_low_hz", c.respiration_low_hz)?;
        ordered(
            "conditioner.respiration_high_hz",
            c.respiration_low_hz,
            c.respiration_high_hz,
        )?;
        positive(
            "conditioner.respiration_max_amplitude",
            c.respiration_max_amplitude,
        )?;
        positive("conditioner.qrs_gate_half_width_s", c.qrs_gate_half_width_s)?;
        positive("conditioner.qrs_gate_min_distance_s", c.qrs_gate_min_distance_s)?;
        if !(0.0..=100.0).contains(&c.qrs_gate_percentile) {
            return Err(ConfigError::invalid(
                "conditioner.qrs_gate_percentile",
                format!("{} is not in 0..=100", c.qrs_gate_percentile),
            ));
        }

        let d = &self.detector;
        positive("detector.integration_window_s", d.integration_window_s)?;
        positive("detector.min_rr_s", d.min_rr_s)?;
        positive("detector.refine_window_s", d.refine_window_s)?;
        if d.threshold_ladder.is_empty() {
            return Err(ConfigError::invalid(
                "detector.threshold_ladder",
                "at least one k value is required",
            ));
        }
        bounded("detector.history_len", d.history_len, 0)?;
        if d.threshold_ladder.iter().any(|k| !k.is_finite()) {
            return Err(ConfigError::invalid(
                "detector.threshold_ladder",
                "k values must be finite",
            ));
        }

        let w = &self.delineation;
        positive("delineation.q_window_s", w.q_window_s)?;
        positive("delineation.s_window_s", w.s_window_s)?;
        ordered("delineation.p_start_s", w.p_end_s, w.p_start_s)?;
        ordered("delineation.fast_p_start_s", w.fast_p_end_s, w.fast_p_start_s)?;
        ordered("delineation.t_end_s", w.t_start_s, w.t_end_s)?;

        let m = &self.measurement;
        positive("measurement.rr_min_ms", m.rr_min_ms)?;
        ordered("measurement.rr_max_ms", m.rr_min_ms, m.rr_max_ms)?;
        positive("measurement.qt_min_ms", m.qt_min_ms)?;
        ordered("measurement.qt_max_ms", m.qt_min_ms, m.qt_max_ms)?;
        ordered("measurement.tp_start_s", m.tp_end_s, m.tp_start_s)?;
        positive("measurement.axis_half_window_s", m.axis_half_window_s)?;
        positive("measurement.median_pre_r_s", m.median_pre_r_s)?;
        positive("measurement.median_post_r_s", m.median_post_r_s)?;
        bounded("measurement.median_min_beats", m.median_min_beats, 1)?;
        bounded("measurement.median_max_beats", m.median_max_beats, m.median_min_beats)?;
        if !(0.0..1.0).contains(&m.beat_quality_min) {
            return Err(ConfigError::invalid(
                "measurement.beat_quality_min",
                format!("{} is not in 0..1", m.beat_quality_min),
            ));
        }
        ordered(
            "measurement.axis_baseline_start_s",
            m.axis_baseline_end_s,
            m.axis_baseline_start_s,
        )?;
        positive("measurement.axis_min_area", m.axis_min_area)?;
        if let Some(bands) = m.st_bands {
            if !(bands.dead_band >= 0.0) {
                return Err(ConfigError::invalid(
                    "measurement.st_bands.dead_band",
                    "must be non-negative",
                ));
            }
        }

        let r = &self.rhythm;
        ordered(
            "rhythm.tachycardia_rate_bpm",
            r.bradycardia_rate_bpm,
            r.tachycardia_rate_bpm,
        )?;
        ordered(
            "rhythm.flutter_max_rate_bpm",
            r.flutter_min_rate_bpm,
            r.flutter_max_rate_bpm,
        )?;
        bounded("rhythm.hr_smoothing_window", r.hr_smoothing_window, 1)?;
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(name, format!("{} must be > 0", value)))
    }
}

/// `value` must lie in `min..=MAX_HISTORY_LEN`.
fn bounded(name: &'static str, value: usize, min: usize) -> Result<(), ConfigError> {
    if (min..=MAX_HISTORY_LEN).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            name,
            format!("{} is not in {}..={}", value, min, MAX_HISTORY_LEN),
        ))
    }
}

fn ordered(name: &'static str, low: f64, high: f64) -> Result<(), ConfigError> {
    if low.is_finite() && high.is_finite() && low < high {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            name,
            format!("{} must be greater than {}", high, low),
        ))
    }
}
