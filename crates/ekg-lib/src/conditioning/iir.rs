//! Second-order-section IIR designs and zero-phase application.

use biquad::{Biquad, Coefficients, DirectForm1, Hertz, Type, Q_BUTTERWORTH_F64};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterDesignError {
    #[error("{kind} frequency {freq_hz} Hz must lie in (0, {nyquist_hz}) Hz")]
    OutsideNyquist {
        kind: &'static str,
        freq_hz: f64,
        nyquist_hz: f64,
    },
    #[error("biquad design rejected parameters: {0}")]
    Biquad(String),
}

/// Cascade of biquad sections applied in series.
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<Coefficients<f64>>,
}

impl SosFilter {
    /// Even-order Butterworth low-pass; odd orders are rounded up.
    pub fn butterworth_lowpass(
        order: usize,
        fs: f64,
        cutoff_hz: f64,
    ) -> Result<Self, FilterDesignError> {
        Self::butterworth(Band::Low, order, fs, cutoff_hz)
    }

    /// Even-order Butterworth high-pass; odd orders are rounded up.
    pub fn butterworth_highpass(
        order: usize,
        fs: f64,
        cutoff_hz: f64,
    ) -> Result<Self, FilterDesignError> {
        Self::butterworth(Band::High, order, fs, cutoff_hz)
    }

    /// Narrow band-reject centred on `f0_hz` with bandwidth `f0_hz / q`.
    pub fn notch(fs: f64, f0_hz: f64, q: f64) -> Result<Self, FilterDesignError> {
        check_band("notch", fs, f0_hz)?;
        let section = design(Type::Notch, fs, f0_hz, q)?;
        Ok(Self {
            sections: vec![section],
        })
    }

    fn butterworth(
        band: Band,
        order: usize,
        fs: f64,
        cutoff_hz: f64,
    ) -> Result<Self, FilterDesignError> {
        check_band(band.label(), fs, cutoff_hz)?;
        let pairs = order.max(2).div_ceil(2);
        let sections = if pairs == 1 {
            vec![design(band.kind(), fs, cutoff_hz, Q_BUTTERWORTH_F64)?]
        } else {
            butterworth_qs(pairs * 2)
                .into_iter()
                .map(|q| design(band.kind(), fs, cutoff_hz, q))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self { sections })
    }

    /// Chain `other` after `self`.
    pub fn then(mut self, other: SosFilter) -> Self {
        self.sections.extend(other.sections);
        self
    }

    /// Causal pass. Each section starts in the steady state for its first input
    /// sample, so a DC offset produces no start-up transient.
    pub fn filter(&self, data: &[f64]) -> Vec<f64> {
        let mut out = data.to_vec();
        for coeffs in &self.sections {
            run_section(coeffs, &mut out);
        }
        out
    }

    /// Forward-backward (zero-phase) filtering with odd-reflection edge padding.
    pub fn filtfilt(&self, data: &[f64]) -> Vec<f64> {
        let n = data.len();
        if n < 2 {
            return data.to_vec();
        }
        let padlen = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let first = data[0];
        let last = data[n - 1];
        let mut ext = Vec::with_capacity(n + 2 * padlen);
        ext.extend((1..=padlen).rev().map(|i| 2.0 * first - data[i]));
        ext.extend_from_slice(data);
        ext.extend((1..=padlen).map(|i| 2.0 * last - data[n - 1 - i]));

        let mut y = self.filter(&ext);
        y.reverse();
        let mut y = self.filter(&y);
        y.reverse();
        y[padlen..padlen + n].to_vec()
    }
}

#[derive(Debug, Clone, Copy)]
enum Band {
    Low,
    High,
}

impl Band {
    fn kind(self) -> Type<f64> {
        match self {
            Band::Low => Type::LowPass,
            Band::High => Type::HighPass,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Band::Low => "low-pass cutoff",
            Band::High => "high-pass cutoff",
        }
    }
}

/// Section Q values of an even-order Butterworth prototype.
fn butterworth_qs(order: usize) -> Vec<f64> {
    (0..order / 2)
        .map(|k| {
            let theta = std::f64::consts::PI * (2 * k + 1) as f64 / (2 * order) as f64;
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

fn check_band(kind: &'static str, fs: f64, freq_hz: f64) -> Result<(), FilterDesignError> {
    let nyquist_hz = fs / 2.0;
    if fs.is_finite() && freq_hz.is_finite() && freq_hz > 0.0 && freq_hz < nyquist_hz {
        Ok(())
    } else {
        Err(FilterDesignError::OutsideNyquist {
            kind,
            freq_hz,
            nyquist_hz,
        })
    }
}

fn design(
    kind: Type<f64>,
    fs: f64,
    f0: f64,
    q: f64,
) -> Result<Coefficients<f64>, FilterDesignError> {
    let rejected = |e: biquad::Errors| FilterDesignError::Biquad(format!("{:?}", e));
    let fs = Hertz::<f64>::from_hz(fs).map_err(rejected)?;
    let f0 = Hertz::<f64>::from_hz(f0).map_err(rejected)?;
    Coefficients::<f64>::from_params(kind, fs, f0, q).map_err(rejected)
}

fn dc_gain(c: &Coefficients<f64>) -> f64 {
    let den = 1.0 + c.a1 + c.a2;
    if den.abs() < f64::EPSILON {
        0.0
    } else {
        (c.b0 + c.b1 + c.b2) / den
    }
}

fn run_section(coeffs: &Coefficients<f64>, data: &mut [f64]) {
    let Some(&x0) = data.first() else {
        return;
    };
    let settled = dc_gain(coeffs) * x0;
    let mut section = DirectForm1::<f64>::new(*coeffs);
    for sample in data.iter_mut() {
        *sample = section.run(*sample - x0) + settled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(fs: f64, freq: f64, secs: f64) -> Vec<f64> {
        (0..(fs * secs) as usize)
            .map(|i| (2.0 * PI * freq * i as f64 / fs).sin())
            .collect()
    }

    fn rms(data: &[f64]) -> f64 {
        (data.iter().map(|x| x * x).sum::<f64>() / data.len() as f64).sqrt()
    }

    #[test]
    fn butterworth_fourth_order_q_values() {
        let qs = butterworth_qs(4);
        assert!((qs[0] - 0.5412).abs() < 1e-3);
        assert!((qs[1] - 1.3066).abs() < 1e-3);
    }

    #[test]
    fn notch_attenuates_mains() {
        let fs = 500.0;
        let filt = SosFilter::notch(fs, 50.0, 25.0).unwrap();
        let out = filt.filtfilt(&sine(fs, 50.0, 4.0));
        let mid = &out[500..1500];
        assert!(rms(mid) < 0.05, "residual {}", rms(mid));

        let passed = filt.filtfilt(&sine(fs, 10.0, 4.0));
        assert!(rms(&passed[500..1500]) > 0.65);
    }

    #[test]
    fn lowpass_keeps_dc_and_removes_high_band() {
        let fs = 250.0;
        let filt = SosFilter::butterworth_lowpass(4, fs, 40.0).unwrap();
        let dc = filt.filtfilt(&[3.0; 200]);
        assert!(dc.iter().all(|v| (v - 3.0).abs() < 1e-6));
        let hf = filt.filtfilt(&sine(fs, 100.0, 4.0));
        assert!(rms(&hf[200..800]) < 0.02);
    }

    #[test]
    fn highpass_removes_offset() {
        let filt = SosFilter::butterworth_highpass(2, 250.0, 0.5).unwrap();
        let out = filt.filter(&[5.0; 100]);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn rejects_cutoff_above_nyquist() {
        assert!(matches!(
            SosFilter::notch(100.0, 50.0, 25.0),
            Err(FilterDesignError::OutsideNyquist { .. })
        ));
        assert!(SosFilter::butterworth_lowpass(4, 60.0, 40.0).is_err());
    }

    #[test]
    fn filtfilt_handles_tiny_inputs() {
        let filt = SosFilter::butterworth_lowpass(2, 250.0, 40.0).unwrap();
        assert!(filt.filtfilt(&[]).is_empty());
        assert_eq!(filt.filtfilt(&[1.5]), vec![1.5]);
        assert_eq!(filt.filtfilt(&[1.0, 2.0, 3.0]).len(), 3);
    }
}
