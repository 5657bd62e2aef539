/// Breaths per minute from positive-going zero crossings of an ECG-derived
/// respiration waveform. `None` for windows under 10 samples or an invalid rate.
pub fn respiration_rate_bpm(resp: &[f64], fs: f64) -> Option<f64> {
    if resp.len() < 10 || !(fs > 0.0) {
        return None;
    }
    let sign = |v: f64| {
        if v > 0.0 {
            1
        } else if v < 0.0 {
            -1
        } else {
            0
        }
    };
    let breaths = resp
        .windows(2)
        .filter(|w| sign(w[1]) - sign(w[0]) > 0)
        .count();
    let minutes = resp.len() as f64 / fs / 60.0;
    Some(breaths as f64 / minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn counts_breaths_of_a_slow_sine() {
        let fs = 50.0;
        // 0.25 Hz for 60 s, phase shifted so no crossing falls on the first sample.
        let resp: Vec<f64> = (0..3000)
            .map(|i| (2.0 * PI * 0.25 * i as f64 / fs + 0.3).sin())
            .collect();
        let rate = respiration_rate_bpm(&resp, fs).unwrap();
        assert!((rate - 15.0).abs() <= 1.0, "rate {}", rate);
    }

    #[test]
    fn short_or_flat_input() {
        assert_eq!(respiration_rate_bpm(&[0.1; 5], 50.0), None);
        assert_eq!(respiration_rate_bpm(&[0.0; 100], 50.0), Some(0.0));
        assert_eq!(respiration_rate_bpm(&[0.0; 100], 0.0), None);
    }
}
