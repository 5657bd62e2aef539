use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A window of uniformly sampled single-lead ECG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples, oldest first
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(fs: f64, data: Vec<f64>) -> Self {
        Self { fs, data }
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        if self.fs > 0.0 {
            self.data.len() as f64 / self.fs
        } else {
            0.0
        }
    }
    pub fn peak_to_peak(&self) -> f64 {
        peak_to_peak(&self.data)
    }
}

/// Sorted, de-duplicated sample indices into a window (R peaks, P waves, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakSet {
    pub indices: Vec<usize>,
}

impl PeakSet {
    pub fn from_indices(mut indices: Vec<usize>) -> Self {
        indices.sort_unstable();
        indices.dedup();
        Self { indices }
    }
    pub fn len(&self) -> usize {
        self.indices.len()
    }
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
    pub fn is_strictly_increasing(&self) -> bool {
        self.indices.windows(2).all(|w| w[0] < w[1])
    }
    /// True when every index addresses a sample of a window of `len` samples.
    pub fn within(&self, len: usize) -> bool {
        self.indices.last().map_or(true, |&last| last < len)
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_peaks(peaks: &PeakSet, fs: f64) -> Self {
        if fs <= 0.0 {
            return Self::default();
        }
        let rr = peaks
            .indices
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / fs)
            .collect();
        Self { rr }
    }

    /// Keep intervals inside `[min_s, max_s]`; glitches and pauses are dropped.
    pub fn physiological(&self, min_s: f64, max_s: f64) -> Self {
        Self {
            rr: self
                .rr
                .iter()
                .copied()
                .filter(|rr| *rr >= min_s && *rr <= max_s)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }
}

/// Bounded history of one lead's samples, from which analysis windows are cut.
///
/// The buffer keeps the most recent `capacity` samples. Changing the sampling
/// rate discards the history since old samples no longer share a time base.
#[derive(Debug, Clone)]
pub struct LeadBuffer {
    fs: f64,
    capacity: usize,
    samples: VecDeque<f64>,
    total_pushed: u64,
}

impl LeadBuffer {
    pub fn new(fs: f64, capacity: usize) -> Self {
        Self {
            fs,
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
            total_pushed: 0,
        }
    }

    /// Buffer sized to hold `seconds` of signal at `fs`.
    pub fn with_duration(fs: f64, seconds: f64) -> Self {
        let capacity = if fs > 0.0 && seconds > 0.0 {
            (fs * seconds).round() as usize
        } else {
            1
        };
        Self::new(fs, capacity)
    }

    pub fn fs(&self) -> f64 {
        self.fs
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_sampling_rate(&mut self, fs: f64) {
        if fs != self.fs {
            self.fs = fs;
            self.samples.clear();
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total_pushed += 1;
    }

    pub fn extend<I: IntoIterator<Item = f64>>(&mut self, samples: I) {
        for s in samples {
            self.push(s);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples ever pushed, including those already evicted.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// The most recent `len` samples, or `None` until that many are buffered.
    pub fn window(&self, len: usize) -> Option<TimeSeries> {
        if len == 0 || len > self.samples.len() {
            return None;
        }
        let start = self.samples.len() - len;
        Some(TimeSeries::new(
            self.fs,
            self.samples.range(start..).copied().collect(),
        ))
    }

    /// Everything currently buffered.
    pub fn latest_window(&self) -> TimeSeries {
        TimeSeries::new(self.fs, self.samples.iter().copied().collect())
    }

}

pub(crate) fn peak_to_peak(data: &[f64]) -> f64 {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &x in data {
        if x.is_finite() {
            lo = lo.min(x);
            hi = hi.max(x);
        }
    }
    if hi >= lo {
        hi - lo
    } else {
        0.0
    }
}

pub(crate) fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        0.0
    } else {
        data.iter().sum::<f64>() / data.len() as f64
    }
}

/// Population standard deviation.
pub(crate) fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    (data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Median of the finite values, `None` when there are none.
pub(crate) fn median(data: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rr_from_peaks_in_seconds() {
        let peaks = PeakSet::from_indices(vec![500, 0, 250, 250]);
        assert_eq!(peaks.indices, vec![0, 250, 500]);
        assert!(peaks.is_strictly_increasing());
        assert!(peaks.within(501));
        assert!(!peaks.within(500));
        let rr = RRSeries::from_peaks(&peaks, 250.0);
        assert_eq!(rr.rr, vec![1.0, 1.0]);
    }

    #[test]
    fn physiological_filter_drops_glitches() {
        let rr = RRSeries {
            rr: vec![0.8, 0.05, 0.8, 2.5],
        };
        assert_eq!(rr.physiological(0.3, 2.0).rr, vec![0.8, 0.8]);
    }

    #[test]
    fn lead_buffer_keeps_most_recent_samples() {
        let mut buf = LeadBuffer::new(100.0, 4);
        buf.extend((0..6).map(|i| i as f64));
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.total_pushed(), 6);
        assert_eq!(buf.window(2).unwrap().data, vec![4.0, 5.0]);
        assert!(buf.window(5).is_none());
        assert_eq!(buf.latest_window().data, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn lead_buffer_resets_on_rate_change() {
        let mut buf = LeadBuffer::with_duration(100.0, 1.0);
        buf.extend([1.0, 2.0, 3.0]);
        buf.set_sampling_rate(100.0);
        assert_eq!(buf.len(), 3);
        buf.set_sampling_rate(250.0);
        assert!(buf.is_empty());
        assert_eq!(buf.fs(), 250.0);
    }

    #[test]
    fn median_and_spread_helpers() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[f64::NAN]), None);
        assert_eq!(peak_to_peak(&[-1.0, 2.0, 0.5]), 3.0);
        assert_eq!(peak_to_peak(&[]), 0.0);
        assert!((std_dev(&[1.0, 1.0, 1.0])).abs() < 1e-12);
    }
}
