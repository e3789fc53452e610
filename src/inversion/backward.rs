//! Klett backward inversion.
//!
//! With `Z(i) = Y(i)·exp(2S∫ᵢʳ β_m dz)`, the total backscatter below the
//! reference bin `r` is
//!
//! `B(i) = Z(i) / (Z(r)/B(r) + 2S∫ᵢʳ Z dz)`
//!
//! and the aerosol transmission at `r` is taken as unity, so `B(r) = Y(r)`.
//! Integrals use the trapezoidal rule on the actual level spacing.

use super::{InversionInput, Pass};
use log::debug;

/// Invert bins `0..=reference` at a fixed lidar ratio.
///
/// A bin that cannot be used (non-finite signal, non-positive signal at the
/// reference or non-positive denominator) invalidates itself and everything
/// above, and the recursion starts again from the bin just below. The pass
/// records the reference it finally started from.
pub(super) fn pass(input: &InversionInput<'_>, reference: usize, lidar_ratio: f64) -> Pass {
    let mut top = Some(reference);
    while let Some(reference) = top {
        match sweep(input, reference, lidar_ratio) {
            Ok(extinction) => {
                let mut pass = Pass::new(extinction, input.grid.resolution(), false);
                pass.reference = Some(reference);
                return pass;
            }
            Err(barrier) => {
                debug!("backward inversion stopped at bin {barrier}, restarting below");
                top = barrier.checked_sub(1);
            }
        }
    }
    Pass::invalid(input.len())
}

/// Downward recursion from `reference`. On failure, returns the offending bin.
fn sweep(input: &InversionInput<'_>, reference: usize, lidar_ratio: f64) -> Result<Vec<f64>, usize> {
    let levels = input.grid.levels();
    let beta_m = input.molecular_backscatter;

    let y_ref = input.corrected(reference);
    if !(y_ref.is_finite() && y_ref > 0.) {
        return Err(reference);
    }

    let aerosol_extinction = |i: usize, total_backscatter: f64| {
        let extinction = lidar_ratio * (total_backscatter - beta_m[i]);
        if extinction.is_finite() && extinction >= 0. {
            extinction
        } else {
            f64::NAN
        }
    };

    let mut extinction = vec![f64::NAN; input.len()];
    extinction[reference] = aerosol_extinction(reference, y_ref);

    let mut molecular_integral = 0.;
    let mut denominator = 1.;
    let mut z_above = y_ref;
    for i in (0..reference).rev() {
        let y = input.corrected(i);
        if !y.is_finite() {
            return Err(i);
        }

        let dz = levels[i + 1] - levels[i];
        molecular_integral += 0.5 * (beta_m[i] + beta_m[i + 1]) * dz;
        let z = y * f64::exp(2. * lidar_ratio * molecular_integral);
        // 2S∫Z with the trapezoidal rule
        denominator += lidar_ratio * (z + z_above) * dz;
        if !(denominator.is_finite() && denominator > 0.) {
            return Err(i);
        }

        extinction[i] = aerosol_extinction(i, z / denominator);
        z_above = z;
    }

    Ok(extinction)
}
