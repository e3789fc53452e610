//! Time × altitude profile container.
//!
//! A [`Profile`] holds the attenuated backscatter of one instrument as a
//! `(time, altitude)` array, plus per-time station metadata. Correction steps
//! modify the backscatter in place and leave an attribute behind; retrieval
//! results are attached as named [`DerivedVariable`]s.

mod corrections;
pub(crate) mod signal;

use crate::error::ConfigurationError;
use crate::grid::AltitudeGrid;
use chrono::{Duration, NaiveDateTime};
use ndarray::{Array2, Axis};
use std::collections::BTreeMap;

/// Units of the attenuated backscatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackscatterUnits {
    /// m⁻¹ sr⁻¹
    PerMetre,
    /// Mm⁻¹ sr⁻¹, as distributed by most ceilometer networks
    PerMegametre,
    /// No physical units, e.g. after range correction
    Arbitrary,
}

impl BackscatterUnits {
    /// Factor to m⁻¹ sr⁻¹. Arbitrary units are taken as calibrated.
    pub fn to_per_metre(self) -> f64 {
        match self {
            BackscatterUnits::PerMetre | BackscatterUnits::Arbitrary => 1.,
            BackscatterUnits::PerMegametre => 1e-6,
        }
    }

    /// Units label.
    pub fn label(self) -> &'static str {
        match self {
            BackscatterUnits::PerMetre => "m-1 sr-1",
            BackscatterUnits::PerMegametre => "Mm-1 sr-1",
            BackscatterUnits::Arbitrary => "",
        }
    }
}

/// Instrument position at one time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Station {
    /// Altitude above sea level, in m
    pub altitude: f64,
    /// Latitude in degrees north
    pub latitude: f64,
    /// Longitude in degrees east
    pub longitude: f64,
}

/// Metadata value attached to a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Boolean flag
    Flag(bool),
    /// Numeric value
    Number(f64),
    /// Free text
    Text(String),
}

/// Values of a derived variable.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedData {
    /// `(time, altitude)` values with their validity mask
    Profiles {
        /// Values, `NaN` where invalid
        values: Array2<f64>,
        /// Validity mask
        valid: Array2<bool>,
    },
    /// One value per time step, `NaN` where missing
    Series(Vec<f64>),
    /// One flag per time step
    Flags(Vec<bool>),
    /// One count per time step
    Counts(Vec<usize>),
}

impl DerivedData {
    /// Number of time steps covered.
    pub fn time_len(&self) -> usize {
        match self {
            DerivedData::Profiles { values, .. } => values.len_of(Axis(0)),
            DerivedData::Series(values) => values.len(),
            DerivedData::Flags(values) => values.len(),
            DerivedData::Counts(values) => values.len(),
        }
    }
}

/// Result attached to a profile under a name.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedVariable {
    /// Values
    pub data: DerivedData,
    /// Human-readable description
    pub long_name: String,
    /// Units label, empty when unitless
    pub units: String,
    /// Extra metadata (method, settings, ...)
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl DerivedVariable {
    /// Variable without extra attributes.
    pub fn new(data: DerivedData, long_name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            data,
            long_name: long_name.into(),
            units: units.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Attenuated backscatter profiles of one instrument.
#[derive(Debug, Clone)]
pub struct Profile {
    time: Vec<NaiveDateTime>,
    grid: AltitudeGrid,
    attenuated_backscatter: Array2<f64>,
    units: BackscatterUnits,
    wavelength: f64,
    stations: Vec<Station>,
    quality_flags: Option<Array2<u8>>,
    cloud_bases: Option<Array2<bool>>,
    attributes: BTreeMap<String, AttributeValue>,
    derived: BTreeMap<String, DerivedVariable>,
}

impl Profile {
    /// Assemble a profile.
    ///
    /// `grid` holds altitudes above sea level. `attenuated_backscatter` has
    /// shape `(time.len(), grid.len())` and `stations` one entry per time
    /// step. Times must be strictly increasing.
    pub fn new(
        time: Vec<NaiveDateTime>,
        grid: AltitudeGrid,
        attenuated_backscatter: Array2<f64>,
        units: BackscatterUnits,
        wavelength: f64,
        stations: Vec<Station>,
    ) -> Result<Self, ConfigurationError> {
        let (num_times, num_levels) = attenuated_backscatter.dim();
        if num_times != time.len() {
            return Err(ConfigurationError::InconsistentShape {
                expected: time.len(),
                found: num_times,
            });
        }
        if num_levels != grid.len() {
            return Err(ConfigurationError::InconsistentShape {
                expected: grid.len(),
                found: num_levels,
            });
        }
        if stations.len() != time.len() {
            return Err(ConfigurationError::InconsistentShape {
                expected: time.len(),
                found: stations.len(),
            });
        }
        if time.is_empty() {
            return Err(ConfigurationError::InvalidSetting("a profile needs at least one time step"));
        }
        if time.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(ConfigurationError::InvalidSetting(
                "time axis must be strictly increasing",
            ));
        }
        if !(wavelength.is_finite() && wavelength > 0.) {
            return Err(ConfigurationError::InvalidWavelength(wavelength));
        }
        if stations.iter().any(|s| !s.altitude.is_finite()) {
            return Err(ConfigurationError::InvalidSetting("station altitude must be finite"));
        }

        Ok(Self {
            time,
            grid,
            attenuated_backscatter,
            units,
            wavelength,
            stations,
            quality_flags: None,
            cloud_bases: None,
            attributes: BTreeMap::new(),
            derived: BTreeMap::new(),
        })
    }

    /// Attach quality flags, with the backscatter shape. Non-zero flags mark
    /// bad measurements.
    pub fn with_quality_flags(mut self, flags: Array2<u8>) -> Result<Self, ConfigurationError> {
        self.check_shape(flags.dim())?;
        self.quality_flags = Some(flags);
        Ok(self)
    }

    /// Attach the output of a cloud detection: true where a cloud base is.
    pub fn with_cloud_bases(mut self, bases: Array2<bool>) -> Result<Self, ConfigurationError> {
        self.check_shape(bases.dim())?;
        self.cloud_bases = Some(bases);
        Ok(self)
    }

    fn check_shape(&self, dim: (usize, usize)) -> Result<(), ConfigurationError> {
        let expected = self.attenuated_backscatter.dim();
        if dim.0 != expected.0 {
            return Err(ConfigurationError::InconsistentShape {
                expected: expected.0,
                found: dim.0,
            });
        }
        if dim.1 != expected.1 {
            return Err(ConfigurationError::InconsistentShape {
                expected: expected.1,
                found: dim.1,
            });
        }
        Ok(())
    }

    /// Time of each profile.
    pub fn time(&self) -> &[NaiveDateTime] {
        &self.time
    }

    /// Altitude axis, above sea level.
    pub fn grid(&self) -> &AltitudeGrid {
        &self.grid
    }

    /// Attenuated backscatter, `(time, altitude)`.
    pub fn attenuated_backscatter(&self) -> &Array2<f64> {
        &self.attenuated_backscatter
    }

    /// Units of the attenuated backscatter.
    pub fn units(&self) -> BackscatterUnits {
        self.units
    }

    /// Laser wavelength in nm.
    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    /// Station position at each time step.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Quality flags, if any.
    pub fn quality_flags(&self) -> Option<&Array2<u8>> {
        self.quality_flags.as_ref()
    }

    /// Cloud base mask, if a cloud detection was attached.
    pub fn cloud_bases(&self) -> Option<&Array2<bool>> {
        self.cloud_bases.as_ref()
    }

    /// Attributes recorded by the correction steps.
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// Number of time steps.
    pub fn num_times(&self) -> usize {
        self.time.len()
    }

    /// Derived variable attached under `name`.
    pub fn derived(&self, name: &str) -> Option<&DerivedVariable> {
        self.derived.get(name)
    }

    /// All derived variables, by name.
    pub fn derived_variables(&self) -> &BTreeMap<String, DerivedVariable> {
        &self.derived
    }

    /// Attach a derived variable, replacing any previous one with that name.
    pub fn insert_derived(
        &mut self,
        name: impl Into<String>,
        variable: DerivedVariable,
    ) -> Result<(), ConfigurationError> {
        let found = variable.data.time_len();
        if found != self.num_times() {
            return Err(ConfigurationError::InconsistentShape {
                expected: self.num_times(),
                found,
            });
        }
        if let DerivedData::Profiles { values, valid } = &variable.data {
            self.check_shape(values.dim())?;
            self.check_shape(valid.dim())?;
        }
        self.derived.insert(name.into(), variable);
        Ok(())
    }

    /// Index of the level closest to `altitude` m above the station, at time
    /// step `step`.
    pub fn index_from_altitude_agl(&self, step: usize, altitude: f64) -> usize {
        self.grid.closest_index(altitude + self.stations[step].altitude)
    }

    /// Smallest interval between two time steps, `None` with a single step.
    pub fn time_resolution(&self) -> Option<Duration> {
        self.time
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .min()
    }

    /// Altitude (m above sea level) of the lowest cloud base at each time
    /// step, `None` when no cloud was detected or no detection is attached.
    pub fn lowest_cloud(&self) -> Vec<Option<f64>> {
        let levels = self.grid.levels();
        match &self.cloud_bases {
            Some(bases) => bases
                .outer_iter()
                .map(|row| row.iter().position(|&b| b).map(|i| levels[i]))
                .collect(),
            None => vec![None; self.num_times()],
        }
    }

    fn set_attribute(&mut self, key: &str, value: AttributeValue) {
        self.attributes.insert(key.to_string(), value);
    }
}
