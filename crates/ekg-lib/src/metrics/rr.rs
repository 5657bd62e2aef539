use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};

/// Time-domain statistics over the physiologically valid RR intervals of a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RrStats {
    pub n: usize,
    /// Mean RR (seconds)
    pub mean_s: f64,
    /// Population standard deviation (seconds); the regularity measure.
    pub std_s: f64,
    /// Sample standard deviation (seconds)
    pub sdnn_s: f64,
    pub rmssd_s: f64,
    pub pnn50: f64,
    /// Coefficient of variation, `std_s / mean_s`
    pub cv: f64,
}

impl RrStats {
    /// Regular when there are at least two intervals and their spread is below `max_std_s`.
    pub fn is_regular(&self, max_std_s: f64) -> bool {
        self.n >= 2 && self.std_s < max_std_s
    }
}

pub fn rr_stats(rr: &RRSeries) -> RrStats {
    let n = rr.rr.len();
    if n == 0 {
        return RrStats::default();
    }
    let mean_s = rr.rr.iter().sum::<f64>() / n as f64;
    let sq_dev = rr.rr.iter().map(|x| (x - mean_s).powi(2)).sum::<f64>();
    let std_s = (sq_dev / n as f64).sqrt();
    let sdnn_s = if n > 1 {
        (sq_dev / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let rmssd_s = if n > 1 {
        let diffs = rr.rr.windows(2).map(|w| (w[1] - w[0]).powi(2));
        (diffs.sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let pnn50 = if n > 1 {
        let count = rr
            .rr
            .windows(2)
            .filter(|w| (w[1] - w[0]).abs() > 0.050)
            .count();
        count as f64 / (n as f64 - 1.0)
    } else {
        0.0
    };
    let cv = if mean_s > 0.0 { std_s / mean_s } else { 0.0 };

    RrStats {
        n,
        mean_s,
        std_s,
        sdnn_s,
        rmssd_s,
        pnn50,
        cv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {} got {}",
            expected,
            actual
        );
    }

    #[test]
    fn constant_rr_is_regular() {
        let stats = rr_stats(&RRSeries { rr: vec![0.8; 6] });
        assert_eq!(stats.n, 6);
        assert_close(stats.mean_s, 0.8, 1e-12);
        assert_close(stats.std_s, 0.0, 1e-12);
        assert_close(stats.cv, 0.0, 1e-12);
        assert!(stats.is_regular(0.12));
    }

    #[test]
    fn known_values() {
        let stats = rr_stats(&RRSeries {
            rr: vec![0.8, 0.9, 0.7, 1.0],
        });
        assert_close(stats.mean_s, 0.85, 1e-12);
        assert_close(stats.std_s, 0.111_803_398_9, 1e-9);
        assert_close(stats.sdnn_s, 0.129_099_444_9, 1e-9);
        assert_close(stats.rmssd_s, (0.14f64 / 3.0).sqrt(), 1e-9);
        assert_close(stats.pnn50, 1.0, 1e-12);
        assert!(!stats.is_regular(0.1));
    }

    #[test]
    fn too_few_intervals_are_not_regular() {
        assert!(!rr_stats(&RRSeries { rr: vec![0.8] }).is_regular(0.12));
        assert_eq!(rr_stats(&RRSeries::default()), RrStats::default());
    }
}
