//! Forward iterative inversion.
//!
//! Each bin is solved from the instrument upward. The aerosol transmission
//! below the bin is known from the bins already retrieved, and the bin's own
//! contribution is refined by fixed-point iteration:
//!
//! `α ← S·(Y·exp(2(τ_below + α·Δz)) − β_m)`
//!
//! starting from `α = 0`, i.e. from an aerosol transmission of unity.

use super::{InversionInput, Pass};
use log::debug;

/// Maximum number of fixed-point iterations in a single bin
const MAX_LAYER_ITERATIONS: usize = 50;
/// Relative change of the extinction at which a bin is solved
const LAYER_TOLERANCE: f64 = 1e-6;

enum Layer {
    Solved(f64),
    /// First guess is negative: the bin is left invalid
    Negative,
    Diverged,
}

/// Invert bins `0..=top` at a fixed lidar ratio.
///
/// A non-finite signal stops the pass: that bin and all bins above are
/// invalid. A bin whose iteration does not settle also stops the pass and
/// flags it as diverged.
pub(super) fn pass(input: &InversionInput<'_>, top: usize, lidar_ratio: f64) -> Pass {
    let dz = input.grid.resolution();
    let mut extinction = vec![f64::NAN; input.len()];
    let mut optical_depth = 0.;

    for i in 0..=top {
        let y = input.corrected(i);
        if !y.is_finite() {
            debug!("forward inversion stopped at bin {i}: non-finite signal");
            return Pass::new(extinction, dz, false);
        }

        match solve_layer(y, input.molecular_backscatter[i], optical_depth, dz, lidar_ratio) {
            Layer::Solved(value) => {
                extinction[i] = value;
                optical_depth += value * dz;
            }
            Layer::Negative => {}
            Layer::Diverged => {
                debug!("forward inversion diverged at bin {i} (S = {lidar_ratio:.3} sr)");
                return Pass::new(extinction, dz, true);
            }
        }
    }

    Pass::new(extinction, dz, false)
}

fn solve_layer(y: f64, beta_m: f64, optical_depth: f64, dz: f64, lidar_ratio: f64) -> Layer {
    let update = |extinction: f64| {
        lidar_ratio * (y * f64::exp(2. * (optical_depth + extinction * dz)) - beta_m)
    };

    let mut extinction = update(0.);
    if !extinction.is_finite() {
        return Layer::Diverged;
    }
    if extinction < 0. {
        return Layer::Negative;
    }

    for _ in 0..MAX_LAYER_ITERATIONS {
        let next = update(extinction);
        if !next.is_finite() {
            return Layer::Diverged;
        }
        if (next - extinction).abs() <= LAYER_TOLERANCE * next.abs() {
            return Layer::Solved(next);
        }
        extinction = next;
    }
    Layer::Diverged
}
