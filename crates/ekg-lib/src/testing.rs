//! Synthetic ECG generators shared by the unit tests.

use crate::signal::TimeSeries;

/// Gaussian component amplitudes (mV) and timing of one synthetic PQRST complex.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BeatShape {
    pub p_amp: f64,
    pub q_amp: f64,
    pub r_amp: f64,
    pub s_amp: f64,
    pub t_amp: f64,
    /// Stretches Q/S offsets and QRS widths; 1.0 gives a ~60 ms QRS.
    pub qrs_spread: f64,
}

impl Default for BeatShape {
    fn default() -> Self {
        Self {
            p_amp: 0.15,
            q_amp: -0.1,
            r_amp: 1.0,
            s_amp: -0.2,
            t_amp: 0.3,
            qrs_spread: 1.0,
        }
    }
}

impl BeatShape {
    pub fn without_p(self) -> Self {
        Self { p_amp: 0.0, ..self }
    }
}

pub(crate) const P_OFFSET_S: f64 = -0.16;
pub(crate) const Q_OFFSET_S: f64 = -0.03;
pub(crate) const S_OFFSET_S: f64 = 0.03;
pub(crate) const T_OFFSET_S: f64 = 0.25;

/// Regular beats at `hr` bpm, the first at 0.5 s.
pub(crate) fn ecg_beats(fs: f64, duration: f64, hr: f64, shape: BeatShape) -> TimeSeries {
    let rr = 60.0 / hr;
    let mut times = Vec::new();
    let mut t = 0.5;
    while t < duration {
        times.push(t);
        t += rr;
    }
    ecg_at(fs, duration, &times, shape)
}

/// One PQRST complex centred on each R time in `beats` (seconds).
pub(crate) fn ecg_at(fs: f64, duration: f64, beats: &[f64], shape: BeatShape) -> TimeSeries {
    let samples = (duration * fs) as usize;
    let spread = shape.qrs_spread;
    let components = [
        (P_OFFSET_S, 0.025, shape.p_amp),
        (Q_OFFSET_S * spread, 0.008 * spread, shape.q_amp),
        (0.0, 0.010 * spread, shape.r_amp),
        (S_OFFSET_S * spread, 0.008 * spread, shape.s_amp),
        (T_OFFSET_S, 0.040, shape.t_amp),
    ];
    let mut data = vec![0.0; samples];
    for &bt in beats {
        for &(offset, width, amp) in &components {
            if amp == 0.0 {
                continue;
            }
            let centre = bt + offset;
            let lo = (((centre - 5.0 * width) * fs).floor().max(0.0)) as usize;
            let hi = (((centre + 5.0 * width) * fs).ceil() as usize).min(samples);
            for (i, v) in data.iter_mut().enumerate().take(hi).skip(lo) {
                let time = i as f64 / fs;
                *v += amp * (-0.5 * ((time - centre) / width).powi(2)).exp();
            }
        }
    }
    TimeSeries::new(fs, data)
}

/// Sample index of each beat time.
pub(crate) fn beat_indices(fs: f64, beats: &[f64]) -> Vec<usize> {
    beats.iter().map(|t| (t * fs).round() as usize).collect()
}
