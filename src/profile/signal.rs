//! One-dimensional signal helpers shared by the corrections and the
//! retrieval.
//!
//! Missing values are `NaN`. Windowed statistics skip them; filters that
//! combine neighbours propagate them.

/// Index into `0..len` with half-sample symmetric reflection
/// (`d c b a | a b c d | d c b a`).
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

/// Centred running mean over `size` bins, reflecting at both ends.
pub(crate) fn running_mean(data: &[f64], size: usize) -> Vec<f64> {
    let size = size.max(1);
    let weights = vec![1. / size as f64; size];
    convolve_reflect(data, &weights)
}

/// Correlate `data` with a centred `kernel`, reflecting at both ends.
pub(crate) fn convolve_reflect(data: &[f64], kernel: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let offset = (kernel.len() / 2) as isize;
    (0..data.len())
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let j = reflect(i as isize + k as isize - offset, data.len());
                    w * data[j]
                })
                .sum()
        })
        .collect()
}

/// Normalized gaussian kernel truncated at 4σ, with σ in samples.
pub(crate) fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    if !(sigma.is_finite() && sigma > 0.) {
        return vec![1.];
    }
    let radius = (4. * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| f64::exp(-0.5 * (x as f64 / sigma).powi(2)))
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Mean and population standard deviation of the finite values.
fn mean_std<'a, I>(values: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = &'a f64>,
{
    let finite: Vec<f64> = values.into_iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// Signal to noise ratio (mean over standard deviation) within `step` bins
/// of `index`. `NaN` when undefined.
pub(crate) fn snr_at(data: &[f64], index: usize, step: usize) -> f64 {
    let start = index.saturating_sub(step);
    let end = (index + step + 1).min(data.len());
    if start >= end {
        return f64::NAN;
    }
    match mean_std(&data[start..end]) {
        Some((mean, std)) if std > 0. => mean / std,
        _ => f64::NAN,
    }
}

/// SNR of every bin over full windows of `2·step + 1` bins; the first and
/// last `step` bins are `NaN`.
pub(crate) fn rolling_snr(data: &[f64], step: usize) -> Vec<f64> {
    let mut snr = vec![f64::NAN; data.len()];
    let width = 2 * step + 1;
    if data.len() < width {
        return snr;
    }
    for (offset, window) in data.windows(width).enumerate() {
        snr[offset + step] = match mean_std(window) {
            Some((mean, std)) if std > 0. => mean / std,
            _ => f64::NAN,
        };
    }
    snr
}

/// Median of the finite values, `NaN` if there are none.
pub(crate) fn nan_median(values: &[f64]) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.sort_by(f64::total_cmp);
    let mid = finite.len() / 2;
    if finite.len() % 2 == 0 {
        0.5 * (finite[mid - 1] + finite[mid])
    } else {
        finite[mid]
    }
}

/// Centred rolling median over `window` samples. Windows are truncated at
/// both ends and need a single finite value.
pub(crate) fn rolling_median(data: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let before = window / 2;
    let after = window - 1 - before;
    (0..data.len())
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(data.len());
            nan_median(&data[start..end])
        })
        .collect()
}
