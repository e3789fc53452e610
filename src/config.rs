//! Per-aerosol-type configuration.
//!
//! The table is read once at the start of a batch and then passed around by
//! reference; nothing in the crate holds it globally.

use crate::emc::{extinction_to_mass_coefficient, Microphysics};
use crate::error::{ConfigurationError, RetrievalError, RetrievalResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Table shipped with the crate.
const BUILTIN_TABLE: &str = include_str!("../config/aerosol_types.json");

/// Optical and microphysical properties of one aerosol type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AerosolProperties {
    /// Aerosol lidar ratio, in sr
    pub lidar_ratio: f64,
    /// Fixed extinction-to-mass coefficient, in m² g⁻¹. Takes precedence over
    /// `microphysics`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_extinction_coefficient: Option<f64>,
    /// Size distribution, density and refractive index, used to compute the
    /// extinction-to-mass coefficient at any wavelength
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub microphysics: Option<Microphysics>,
}

/// Mapping from aerosol type name to its properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AerosolTable {
    types: BTreeMap<String, AerosolProperties>,
}

impl AerosolTable {
    /// The table shipped with the crate: `urban`, `desert_dust`,
    /// `biomass_burning` and `volcanic_ash`.
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_json_str(BUILTIN_TABLE)
    }

    /// Parse and validate a JSON table.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Parse and validate a JSON table from a reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigurationError> {
        let table: Self = serde_json::from_reader(reader)?;
        table.validate()?;
        Ok(table)
    }

    /// Parse and validate a JSON table file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Build a table from entries already in memory.
    pub fn from_entries<I>(entries: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (String, AerosolProperties)>,
    {
        let table = Self {
            types: entries.into_iter().collect(),
        };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, properties) in &self.types {
            let lr = properties.lidar_ratio;
            if !(lr.is_finite() && lr > 0.) {
                return Err(ConfigurationError::InvalidSetting(
                    "lidar ratios must be positive and finite",
                ));
            }
            if let Some(emc) = properties.mass_extinction_coefficient {
                if !(emc.is_finite() && emc > 0.) {
                    return Err(ConfigurationError::InvalidSetting(
                        "mass extinction coefficients must be positive and finite",
                    ));
                }
            }
            if let Some(microphysics) = &properties.microphysics {
                microphysics.validate(name)?;
            }
        }
        Ok(())
    }

    /// Properties of an aerosol type.
    pub fn get(&self, aerosol_type: &str) -> Option<&AerosolProperties> {
        self.types.get(aerosol_type)
    }

    /// Configured type names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Number of configured types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True when no type is configured.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Extinction-to-mass coefficient (m² g⁻¹) of a type at `wavelength` (nm).
    pub fn mass_extinction_coefficient(
        &self,
        aerosol_type: &str,
        wavelength: f64,
    ) -> RetrievalResult<f64> {
        let properties = self
            .get(aerosol_type)
            .ok_or_else(|| RetrievalError::UnknownAerosolType(aerosol_type.to_string()))?;

        match (properties.mass_extinction_coefficient, &properties.microphysics) {
            (Some(emc), _) => Ok(emc),
            (None, Some(microphysics)) => {
                Ok(extinction_to_mass_coefficient(microphysics, wavelength)?.emc)
            }
            (None, None) => Err(ConfigurationError::MissingMassExtinction(
                aerosol_type.to_string(),
            )
            .into()),
        }
    }
}
