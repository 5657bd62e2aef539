use crate::signal::peak_to_peak;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Quality indicators of one conditioned window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalQuality {
    pub peak_to_peak: f64,
    /// Pearson kurtosis; QRS-dominated ECG is strongly peaked (well above 3).
    pub kurtosis: f64,
    /// Shannon entropy of the normalised power spectrum, in bits.
    pub spectral_entropy: f64,
    pub flatline: bool,
}

impl SignalQuality {
    pub fn assess(conditioned: &[f64], flat_tolerance: f64) -> Self {
        let peak_to_peak = peak_to_peak(conditioned);
        Self {
            peak_to_peak,
            kurtosis: compute_kurtosis(conditioned),
            spectral_entropy: compute_spectral_entropy(conditioned),
            flatline: peak_to_peak < flat_tolerance,
        }
    }
}

pub fn compute_kurtosis(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().copied().sum::<f64>() / data.len() as f64;
    let m2 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
    if m2 == 0.0 {
        return 0.0;
    }
    let m4 = data.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / data.len() as f64;
    m4 / (m2 * m2)
}

pub fn compute_spectral_entropy(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / n as f64;
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<f64> = data.iter().map(|x| x - mean).collect();
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut buffer, &mut spectrum).is_err() {
        return 0.0;
    }
    let powers: Vec<f64> = spectrum.iter().map(|c| c.norm_sqr()).collect();
    let total_power: f64 = powers.iter().sum();
    if total_power == 0.0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for power in powers {
        if power <= 0.0 {
            continue;
        }
        let p = power / total_power;
        entropy -= p * p.log2();
    }
    entropy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ecg_beats, BeatShape};
    use std::f64::consts::PI;

    #[test]
    fn flat_window_is_flagged() {
        let q = SignalQuality::assess(&[0.5; 200], 1e-9);
        assert!(q.flatline);
        assert_eq!(q.peak_to_peak, 0.0);
        assert_eq!(q.kurtosis, 0.0);
        assert_eq!(q.spectral_entropy, 0.0);
    }

    #[test]
    fn ecg_is_peaked_and_pure_tone_has_low_entropy() {
        let ecg = ecg_beats(250.0, 8.0, 72.0, BeatShape::default());
        let q = SignalQuality::assess(&ecg.data, 1e-9);
        assert!(!q.flatline);
        assert!(q.kurtosis > 5.0, "kurtosis {}", q.kurtosis);

        let tone: Vec<f64> = (0..1000).map(|i| (2.0 * PI * 10.0 * i as f64 / 250.0).sin()).collect();
        let tone_entropy = compute_spectral_entropy(&tone);
        assert!(tone_entropy < 0.5, "tone entropy {}", tone_entropy);
        assert!(q.spectral_entropy > tone_entropy);
    }

    #[test]
    fn kurtosis_of_constant_is_zero() {
        assert_eq!(compute_kurtosis(&[1.0, 1.0, 1.0]), 0.0);
        assert_eq!(compute_kurtosis(&[]), 0.0);
    }
}
