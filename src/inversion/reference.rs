//! Reference bin selection for the backward method.

use crate::profile::signal::{running_mean, snr_at};
use log::debug;

/// Bins on each side of the running-mean minimum searched for the reference
const AROUND_MINIMUM: usize = 3;
/// Half-width of the window used for the SNR at the reference
const SNR_STEP: usize = 4;

/// Pick the reference bin of a backward inversion within `imin..imax`.
///
/// The signal outside of the window is replaced by its maximum and smoothed
/// with a 3-bin running mean. Around the minimum of the smoothed signal, the
/// bin whose raw value is closest to the smoothed one is chosen, so that the
/// reference sits in a clean, low-signal region.
///
/// Returns `None` when the window is empty, holds no finite value, or when the
/// SNR at the chosen bin is below `min_snr`.
pub fn reference_index(signal: &[f64], imin: usize, imax: usize, min_snr: f64) -> Option<usize> {
    let imax = imax.min(signal.len());
    if imin >= imax {
        return None;
    }

    let maximum = signal
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !maximum.is_finite() {
        return None;
    }

    let clipped: Vec<f64> = signal
        .iter()
        .enumerate()
        .map(|(i, &v)| if (imin..imax).contains(&i) { v } else { maximum })
        .collect();
    let mean = running_mean(&clipped, 3);

    let lowest = (imin..imax)
        .filter(|&i| mean[i].is_finite())
        .min_by(|&a, &b| mean[a].total_cmp(&mean[b]))?;

    let start = lowest.saturating_sub(AROUND_MINIMUM).max(imin);
    let end = (lowest + AROUND_MINIMUM).min(imax);
    let chosen = (start..end.max(start + 1))
        .filter(|&i| clipped[i].is_finite() && mean[i].is_finite())
        .min_by(|&a, &b| {
            let da = (clipped[a] - mean[a]).abs();
            let db = (clipped[b] - mean[b]).abs();
            da.total_cmp(&db)
        })?;

    let snr = snr_at(signal, chosen, SNR_STEP);
    if min_snr > 0. && !(snr >= min_snr) {
        debug!("reference bin {chosen} rejected: SNR {snr:.2} below {min_snr}");
        return None;
    }
    Some(chosen)
}
