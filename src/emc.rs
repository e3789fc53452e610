//! Extinction-to-mass coefficient (EMC) from aerosol microphysics.
//!
//! For a particle population with number size distribution `N(r)`, the
//! extinction coefficient is `σ = ∫ N(r) Q_ext(m, r, λ) π r² dr` and the mass
//! concentration `M = ∫ 4/3 π r³ ρ N(r) dr`. Their ratio does not depend on
//! the amplitude of `N`:
//!
//! `M = σ ρ c_v` with `c_v = 4/3 ∫ N r³ dr / ∫ N Q_ext r² dr`
//!
//! and `EMC = σ / M = 1 / (ρ c_v)`, in m² g⁻¹.

mod mie;
mod size_distribution;

pub use size_distribution::SizeDistribution;

use crate::error::ConfigurationError;
use log::debug;
use num_complex::Complex64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Complex refractive index of the particles (`real + i·imag`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefractiveIndex {
    /// Real part
    pub real: f64,
    /// Imaginary (absorbing) part; its sign is ignored
    pub imag: f64,
}

/// One lognormal mode of the volume size distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LognormalMode {
    /// Volume median radius, in µm
    pub median_radius: f64,
    /// Standard deviation of ln(r)
    pub sigma: f64,
    /// Volume concentration of the mode, in µm³ µm⁻²
    pub volume: f64,
}

/// Microphysical description of an aerosol type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Microphysics {
    /// Particle density, in g cm⁻³
    pub density: f64,
    /// Refractive index at the wavelengths of interest
    pub refractive_index: RefractiveIndex,
    /// Modes of the volume size distribution (usually fine and coarse)
    pub modes: SmallVec<[LognormalMode; 2]>,
}

impl Microphysics {
    pub(crate) fn validate(&self, aerosol_type: &str) -> Result<(), ConfigurationError> {
        let positive = |v: f64| v.is_finite() && v > 0.;
        if !positive(self.density) {
            return Err(ConfigurationError::InvalidSetting("particle density must be positive"));
        }
        if !positive(self.refractive_index.real) || !self.refractive_index.imag.is_finite() {
            return Err(ConfigurationError::InvalidSetting("invalid refractive index"));
        }
        if self.modes.is_empty() {
            return Err(ConfigurationError::MissingMassExtinction(aerosol_type.to_string()));
        }
        if self
            .modes
            .iter()
            .any(|mode| !positive(mode.median_radius) || !positive(mode.sigma) || !positive(mode.volume))
        {
            return Err(ConfigurationError::InvalidSetting(
                "size modes need positive radius, width and volume",
            ));
        }
        Ok(())
    }
}

/// Result of an EMC computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmcData {
    /// Wavelength in nm
    pub wavelength: f64,
    /// Conversion factor `c_v`, in m
    pub conversion_factor: f64,
    /// Extinction-to-mass coefficient, in m² g⁻¹
    pub emc: f64,
}

/// Compute the EMC of a particle population at `wavelength` (nm).
pub fn extinction_to_mass_coefficient(
    microphysics: &Microphysics,
    wavelength: f64,
) -> Result<EmcData, ConfigurationError> {
    if !(wavelength.is_finite() && wavelength > 0.) {
        return Err(ConfigurationError::InvalidWavelength(wavelength));
    }

    let sd = SizeDistribution::new(&microphysics.modes);
    let m = Complex64::new(
        microphysics.refractive_index.real,
        microphysics.refractive_index.imag.abs(),
    );
    // Radius in µm and wavelength in nm
    let wavelength_um = wavelength * 1e-3;

    let (numerator, denominator) = sd
        .radius
        .par_iter()
        .zip(&sd.nsd)
        .map(|(&r, &n)| {
            let x = 2. * std::f64::consts::PI * r / wavelength_um;
            let qext = mie::extinction_efficiency(m, x);
            (n * r.powi(3), n * qext * r.powi(2))
        })
        .reduce(|| (0., 0.), |a, b| (a.0 + b.0, a.1 + b.1));

    // Same radius step in both integrals; µm to m
    let conversion_factor = 4. / 3. * (numerator / denominator) * 1e-6;
    // Density from g/cm³ to g/m³
    let emc = 1. / (conversion_factor * microphysics.density * 1e6);
    debug!("EMC at {wavelength} nm: c_v = {conversion_factor:.3e} m, EMC = {emc:.3} m2/g");

    if !(emc.is_finite() && emc > 0.) {
        return Err(ConfigurationError::InvalidSetting(
            "size distribution yields no extinction",
        ));
    }

    Ok(EmcData {
        wavelength,
        conversion_factor,
        emc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn urban() -> Microphysics {
        Microphysics {
            density: 1.5,
            refractive_index: RefractiveIndex {
                real: 1.41,
                imag: 0.003,
            },
            modes: smallvec![
                LognormalMode {
                    median_radius: 0.15,
                    sigma: 0.4,
                    volume: 0.12,
                },
                LognormalMode {
                    median_radius: 3.0,
                    sigma: 0.75,
                    volume: 0.05,
                },
            ],
        }
    }

    #[test]
    fn fine_particles_are_more_efficient_at_short_wavelengths() {
        let at_532 = extinction_to_mass_coefficient(&urban(), 532.).unwrap();
        let at_1064 = extinction_to_mass_coefficient(&urban(), 1064.).unwrap();

        assert!(at_532.emc > at_1064.emc);
        assert!(at_532.emc > 1. && at_532.emc < 4., "{}", at_532.emc);
        assert!(at_1064.emc > 0.2 && at_1064.emc < 1., "{}", at_1064.emc);
        // c_v and EMC are reciprocal through the density
        approx::assert_relative_eq!(
            at_1064.emc * at_1064.conversion_factor * 1.5e6,
            1.,
            max_relative = 1e-12
        );
    }

    #[test]
    fn imaginary_sign_is_ignored() {
        let mut flipped = urban();
        flipped.refractive_index.imag = -0.003;
        let a = extinction_to_mass_coefficient(&urban(), 905.).unwrap();
        let b = extinction_to_mass_coefficient(&flipped, 905.).unwrap();
        approx::assert_relative_eq!(a.emc, b.emc, max_relative = 1e-12);
    }

    #[test]
    fn validation() {
        let mut empty = urban();
        empty.modes.clear();
        assert!(matches!(
            empty.validate("urban"),
            Err(ConfigurationError::MissingMassExtinction(_))
        ));
        assert!(extinction_to_mass_coefficient(&urban(), -1.).is_err());
    }
}
