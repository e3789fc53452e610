//! Synthetic measurements from a known extinction profile.

use crate::error::{ConfigurationError, RetrievalError, RetrievalResult};
use crate::grid::AltitudeGrid;
use crate::rayleigh::RayleighProfile;

/// Attenuated backscatter (m⁻¹ sr⁻¹) seen through `extinction` (m⁻¹).
///
/// `β_att = (β_m + α/S)·T_m²·exp(−2 Σ α Δz)`, where the aerosol optical
/// depth at a bin includes the bin itself. The result inverts exactly with
/// the forward method at the same lidar ratio.
pub fn simulate_attenuated_backscatter(
    extinction: &[f64],
    rayleigh: &RayleighProfile,
    lidar_ratio: f64,
    grid: &AltitudeGrid,
) -> RetrievalResult<Vec<f64>> {
    let expected = grid.len();
    for found in [extinction.len(), rayleigh.backscatter().len()] {
        if found != expected {
            return Err(ConfigurationError::InconsistentShape { expected, found }.into());
        }
    }
    if !(lidar_ratio.is_finite() && lidar_ratio > 0.) {
        return Err(RetrievalError::InvalidApriori(lidar_ratio));
    }

    let dz = grid.resolution();
    let mut optical_depth = 0.;
    Ok(extinction
        .iter()
        .zip(rayleigh.backscatter())
        .zip(rayleigh.transmission())
        .map(|((&alpha, &beta_m), &transmission)| {
            optical_depth += alpha * dz;
            (beta_m + alpha / lidar_ratio) * transmission * f64::exp(-2. * optical_depth)
        })
        .collect())
}

/// Extinction of `value` (m⁻¹) below `height` and zero above.
pub fn step_extinction_model(levels: &[f64], height: f64, value: f64) -> Vec<f64> {
    levels
        .iter()
        .map(|&z| if z < height { value } else { 0. })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rayleigh::{AltitudeReference, StandardAtmosphere};
    use approx::assert_relative_eq;

    #[test]
    fn clear_sky_is_molecular() {
        let grid = AltitudeGrid::regular(15., 15., 200).unwrap();
        let rayleigh =
            RayleighProfile::new(&grid, AltitudeReference::SeaLevel, 1064., &StandardAtmosphere::default())
                .unwrap();
        let clear = vec![0.; 200];
        let signal = simulate_attenuated_backscatter(&clear, &rayleigh, 50., &grid).unwrap();
        for ((s, b), t) in signal
            .iter()
            .zip(rayleigh.backscatter())
            .zip(rayleigh.transmission())
        {
            assert_relative_eq!(*s, b * t, max_relative = 1e-12);
        }

        assert!(simulate_attenuated_backscatter(&clear[..10], &rayleigh, 50., &grid).is_err());
        assert!(simulate_attenuated_backscatter(&clear, &rayleigh, 0., &grid).is_err());
    }

    #[test]
    fn step_model() {
        let model = step_extinction_model(&[0., 1000., 2999., 3000., 4000.], 3000., 1e-4);
        assert_eq!(model, vec![1e-4, 1e-4, 1e-4, 0., 0.]);
    }
}
