//! Rank and moving-window smoothers used by the conditioning chain.
//!
//! All smoothers return a vector of the same length as their input and
//! replicate the edge samples instead of zero padding, so a constant input
//! stays constant.

/// Running median with an odd kernel of `win` samples.
pub fn median_filter(data: &[f64], win: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 || win <= 1 {
        return data.to_vec();
    }
    let win = if win % 2 == 0 { win + 1 } else { win };
    let half = win / 2;
    let mut scratch = Vec::with_capacity(win);
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        scratch.clear();
        for k in 0..win {
            let idx = (i + k).saturating_sub(half).min(n - 1);
            scratch.push(data[idx]);
        }
        scratch.sort_by(|a, b| a.total_cmp(b));
        out.push(scratch[half]);
    }
    out
}

/// Centred moving average of width `win`, edges replicated.
pub fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    let n = data.len();
    if n == 0 || win <= 1 {
        return data.to_vec();
    }
    let left = (win - 1) / 2;
    let right = win - 1 - left;
    let at = |i: isize| -> f64 {
        let clamped = i.clamp(0, n as isize - 1) as usize;
        data[clamped]
    };
    let mut acc: f64 = (-(left as isize)..=right as isize).map(at).sum();
    let mut out = Vec::with_capacity(n);
    for i in 0..n as isize {
        out.push(acc / win as f64);
        acc += at(i + right as isize + 1) - at(i - left as isize);
    }
    out
}

/// Linear-interpolated percentile (`q` in 0..=100) of the finite values.
pub fn percentile(data: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Second-order central differences, one-sided at the ends (unit spacing).
pub fn gradient(data: &[f64]) -> Vec<f64> {
    let n = data.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let mut out = vec![0.0; n];
            out[0] = data[1] - data[0];
            out[n - 1] = data[n - 1] - data[n - 2];
            for i in 1..n - 1 {
                out[i] = (data[i + 1] - data[i - 1]) / 2.0;
            }
            out
        }
    }
}

/// First difference with a leading zero.
pub fn derivative(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

pub fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

/// Local maxima at least `height` high, thinned greedily by height so that no two
/// survivors are closer than `distance` samples. Plateaus report their first sample.
pub fn find_peaks(data: &[f64], height: f64, distance: usize) -> Vec<usize> {
    let n = data.len();
    if n < 3 {
        return Vec::new();
    }
    let mut candidates = Vec::new();
    let mut i = 1;
    while i < n - 1 {
        if data[i] > data[i - 1] {
            let mut j = i;
            while j + 1 < n && data[j + 1] == data[i] {
                j += 1;
            }
            if j + 1 < n && data[j + 1] < data[i] && data[i] >= height {
                candidates.push(i);
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    thin_by_distance(data, candidates, distance)
}

/// Keep the highest of any candidates closer than `distance`, returned in index order.
pub fn thin_by_distance(data: &[f64], mut candidates: Vec<usize>, distance: usize) -> Vec<usize> {
    if distance <= 1 || candidates.len() < 2 {
        candidates.sort_unstable();
        candidates.dedup();
        return candidates;
    }
    let mut by_height = candidates.clone();
    by_height.sort_by(|&a, &b| data[b].total_cmp(&data[a]).then(a.cmp(&b)));
    candidates.sort_unstable();
    candidates.dedup();
    let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());
    for idx in by_height {
        if kept.iter().all(|&k| k.abs_diff(idx) >= distance) {
            kept.push(idx);
        }
    }
    kept.sort_unstable();
    kept.dedup();
    kept
}

/// Index of the largest value in `data[start..end]`, `None` for an empty range.
pub fn argmax(data: &[f64], start: usize, end: usize) -> Option<usize> {
    let end = end.min(data.len());
    (start..end).reduce(|best, i| if data[i] > data[best] { i } else { best })
}

/// Index of the smallest value in `data[start..end]`, `None` for an empty range.
pub fn argmin(data: &[f64], start: usize, end: usize) -> Option<usize> {
    let end = end.min(data.len());
    (start..end).reduce(|best, i| if data[i] < data[best] { i } else { best })
}
