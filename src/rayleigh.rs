//! Molecular (Rayleigh) optics in a standard atmosphere.
//!
//! Temperature follows a three-layer piecewise-linear profile (troposphere,
//! stratosphere, mesosphere) and pressure an exponential barometric law with
//! an 8 km scale height. The cross section comes from Bucholtz (1995) with the
//! Peck and Reeder (1972) refractive index of air and a constant King factor.

use crate::error::ConfigurationError;
use crate::grid::AltitudeGrid;

/// Extinction-to-backscatter ratio of air molecules, in sr.
pub const MOLECULAR_LIDAR_RATIO: f64 = 8.0 * std::f64::consts::PI / 3.0;

/// Ground conditions the standard atmosphere starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardAtmosphere {
    /// Temperature at the bottom of the atmosphere, in K
    pub surface_temperature: f64,
    /// Pressure at the bottom of the atmosphere, in hPa
    pub surface_pressure: f64,
}

impl Default for StandardAtmosphere {
    fn default() -> Self {
        Self {
            surface_temperature: 298.,
            surface_pressure: 1013.,
        }
    }
}

/// What the altitude levels are measured from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AltitudeReference {
    /// Levels are altitudes above sea level
    SeaLevel,
    /// Levels are heights above a station at this altitude (m above sea level)
    Ground {
        /// Station altitude above sea level, in m
        station_altitude: f64,
    },
}

impl AltitudeReference {
    fn to_sea_level(self, level: f64) -> f64 {
        match self {
            AltitudeReference::SeaLevel => level,
            AltitudeReference::Ground { station_altitude } => level + station_altitude,
        }
    }
}

/// Molecular profile for one altitude grid and wavelength.
///
/// Immutable once computed; share it between all time steps of a station.
#[derive(Debug, Clone)]
pub struct RayleighProfile {
    wavelength: f64,
    cross_section: f64,
    extinction: Vec<f64>,
    backscatter: Vec<f64>,
    transmission: Vec<f64>,
    optical_depth: f64,
}

impl RayleighProfile {
    /// Compute the molecular profile on `grid` for a `wavelength` in nm.
    pub fn new(
        grid: &AltitudeGrid,
        reference: AltitudeReference,
        wavelength: f64,
        atmosphere: &StandardAtmosphere,
    ) -> Result<Self, ConfigurationError> {
        /// Loschmidt number (molecules/cm³), from Avogadro and the molar volume
        const NS: f64 = 6.02214e23 / 22.4141 / 1000.;
        /// King correction factor for depolarization (Tomasi et al., 2005)
        const KING_FACTOR: f64 = 1.05;
        use std::f64::consts::PI;

        if !(wavelength.is_finite() && wavelength > 0.) {
            return Err(ConfigurationError::InvalidWavelength(wavelength));
        }
        if !(atmosphere.surface_temperature > 0. && atmosphere.surface_pressure > 0.) {
            return Err(ConfigurationError::InvalidSetting(
                "surface temperature and pressure must be positive",
            ));
        }

        // Cross section in cm²
        let n = refractive_index_air(wavelength * 1e-3);
        let cross_section = 24. * PI.powi(3) * (n.powi(2) - 1.).powi(2)
            / ((wavelength * 1e-7).powi(4) * NS.powi(2) * (n.powi(2) + 2.).powi(2))
            * KING_FACTOR;

        let t0 = atmosphere.surface_temperature;
        let p0 = atmosphere.surface_pressure;
        let extinction = grid
            .levels()
            .iter()
            .map(|&level| {
                let z_km = reference.to_sea_level(level) * 1e-3;
                let temperature = temperature_at(z_km, t0)
                    .ok_or(ConfigurationError::AltitudeAboveModelTop { altitude: level })?;
                let pressure = pressure_at(z_km, p0);
                // Molecules/cm³, normalized to the ground conditions
                let density = NS * (t0 / p0) * (pressure / temperature);
                // From cm⁻¹ to m⁻¹
                Ok(density * cross_section * 1e2)
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let backscatter = extinction.iter().map(|a| a / MOLECULAR_LIDAR_RATIO).collect();

        let dz = grid.resolution();
        let mut optical_depth = 0.;
        let transmission = extinction
            .iter()
            .map(|a| {
                optical_depth += a * dz;
                f64::exp(-2. * optical_depth)
            })
            .collect();

        Ok(Self {
            wavelength,
            cross_section,
            extinction,
            backscatter,
            transmission,
            optical_depth,
        })
    }

    /// Wavelength in nm.
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    /// Rayleigh cross section per molecule, in cm².
    pub fn cross_section(&self) -> f64 {
        self.cross_section
    }

    /// Molecular extinction coefficient in m⁻¹.
    pub fn extinction(&self) -> &[f64] {
        &self.extinction
    }

    /// Molecular backscatter coefficient in m⁻¹ sr⁻¹.
    pub fn backscatter(&self) -> &[f64] {
        &self.backscatter
    }

    /// Two-way molecular transmission from the lowest level to each level.
    pub fn transmission(&self) -> &[f64] {
        &self.transmission
    }

    /// Molecular optical depth of the whole grid.
    pub fn optical_depth(&self) -> f64 {
        self.optical_depth
    }
}

/// Refractive index of standard air for a wavelength in µm (Peck and Reeder,
/// 1972).
pub fn refractive_index_air(wavelength: f64) -> f64 {
    let inv_sq = wavelength.powi(-2);
    let n = 8060.51 + 2480990. / (132.274 - inv_sq) + 17455.7 / (39.32957 - inv_sq);
    1. + n * 1e-8
}

/// Temperature in K at an altitude in km, or `None` above the model top.
fn temperature_at(z_km: f64, surface_temperature: f64) -> Option<f64> {
    /// (layer top in km, lapse rate in K/km); the layers are contiguous from 0
    const LAYERS: [(f64, f64); 3] = [(13., -6.5), (55., 1.4), (100., -2.4)];

    if z_km > LAYERS[LAYERS.len() - 1].0 {
        return None;
    }

    let mut bottom = 0.;
    let mut temperature = surface_temperature;
    for (top, gradient) in LAYERS {
        if z_km < top {
            return Some(temperature + gradient * (z_km - bottom));
        }
        temperature += gradient * (top - bottom);
        bottom = top;
    }
    Some(temperature)
}

/// Pressure in hPa at an altitude in km.
fn pressure_at(z_km: f64, surface_pressure: f64) -> f64 {
    /// Pressure scale height in km
    const SCALE_HEIGHT: f64 = 8.;
    surface_pressure * f64::exp(-z_km / SCALE_HEIGHT)
}
