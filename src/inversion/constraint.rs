//! Lidar ratio search matching a target AOD.

use super::{InversionInput, InversionOptions, Method, Pass};
use log::debug;

/// Outcome of the search.
#[derive(Debug)]
pub(super) struct Search {
    pub(super) pass: Pass,
    pub(super) lidar_ratio: f64,
    pub(super) iterations: usize,
    pub(super) converged: bool,
}

/// Scale the lidar ratio until the AOD of `run` matches `target`.
///
/// The update is `S ← S·target/aod`. A diverged pass counts as an overshoot.
/// Once the target is bracketed, updates that leave the bracket are replaced
/// by the geometric mean of its bounds. When the iterations run out, the pass
/// closest to the target is returned as non-converged.
pub(super) fn search<F>(run: F, len: usize, target: f64, options: &InversionOptions) -> Search
where
    F: Fn(f64) -> Pass,
{
    let within = |aod: f64| (aod - target).abs() <= options.tolerance * target;

    let mut lidar_ratio = options.initial_lidar_ratio;
    let mut lower: Option<f64> = None;
    let mut upper: Option<f64> = None;
    let mut best: Option<(Pass, f64)> = None;

    for iteration in 1..=options.max_iterations {
        let pass = run(lidar_ratio);

        let proposal = if pass.diverged {
            upper = Some(lidar_ratio);
            match lower {
                Some(lower) => (lower * lidar_ratio).sqrt(),
                None => lidar_ratio / 2.,
            }
        } else {
            if !pass.has_valid() {
                debug!("AOD search: no valid bin at S = {lidar_ratio:.3} sr, giving up");
                return Search {
                    pass,
                    lidar_ratio,
                    iterations: iteration,
                    converged: false,
                };
            }
            if within(pass.aod) {
                debug!("AOD search converged after {iteration} passes, S = {lidar_ratio:.3} sr");
                return Search {
                    pass,
                    lidar_ratio,
                    iterations: iteration,
                    converged: true,
                };
            }

            if pass.aod < target {
                lower = Some(lidar_ratio);
            } else {
                upper = Some(lidar_ratio);
            }
            let proposal = if pass.aod > 0. {
                lidar_ratio * target / pass.aod
            } else {
                lidar_ratio * 2.
            };

            let closer = best
                .as_ref()
                .map_or(true, |(b, _)| (pass.aod - target).abs() < (b.aod - target).abs());
            if closer {
                best = Some((pass, lidar_ratio));
            }
            proposal
        };

        lidar_ratio = match (lower, upper) {
            (Some(lower), Some(upper)) if !(lower < proposal && proposal < upper) => {
                (lower * upper).sqrt()
            }
            _ => proposal,
        };
        debug!("AOD search pass {iteration}: next S = {lidar_ratio:.3} sr");
    }

    debug!("AOD search did not converge in {} passes", options.max_iterations);
    let (pass, lidar_ratio) = best.unwrap_or_else(|| (Pass::invalid(len), f64::NAN));
    Search {
        pass,
        lidar_ratio,
        iterations: options.max_iterations,
        converged: false,
    }
}

/// Closed-form solution when only the lowest bin is retrieved.
///
/// The whole target AOD sits in bin 0, and the lidar ratio follows from the
/// lidar equation of that bin.
pub(super) fn single_bin(input: &InversionInput<'_>, method: Method, target: f64) -> Search {
    let dz = input.grid.resolution();
    let y = input.corrected(0);
    let beta_m = input.molecular_backscatter[0];

    let extinction = target / dz;
    let aerosol_backscatter = match method {
        // Aerosol transmission is unity at the reference bin
        Method::Backward { .. } => y - beta_m,
        Method::Forward { .. } => y * f64::exp(2. * target) - beta_m,
    };
    let lidar_ratio = extinction / aerosol_backscatter;

    if lidar_ratio.is_finite() && lidar_ratio > 0. {
        let mut profile = vec![f64::NAN; input.len()];
        profile[0] = extinction;
        Search {
            pass: Pass::new(profile, dz, false),
            lidar_ratio,
            iterations: 1,
            converged: true,
        }
    } else {
        Search {
            pass: Pass::invalid(input.len()),
            lidar_ratio: f64::NAN,
            iterations: 1,
            converged: false,
        }
    }
}
