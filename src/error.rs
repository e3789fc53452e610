/// Problems with static inputs: grids, settings and the aerosol table.
///
/// These abort the single profile (or time step) being processed, never a
/// whole batch run.
#[derive(Debug)]
pub enum ConfigurationError {
    /// The altitude grid has no levels
    EmptyAltitudeGrid,
    /// The altitude grid is not strictly increasing at this index
    NonMonotonicAltitude {
        /// First index whose altitude is not above the previous one
        index: usize,
    },
    /// An altitude is above the top of the standard atmosphere
    AltitudeAboveModelTop {
        /// Offending altitude, in m
        altitude: f64,
    },
    /// Wavelength is not a positive finite number of nm
    InvalidWavelength(f64),
    /// Vertical resolution is not a positive finite number of m
    InvalidResolution(f64),
    /// Arrays that should be aligned have different lengths
    InconsistentShape {
        /// Expected length
        expected: usize,
        /// Actual length
        found: usize,
    },
    /// Reference index is outside of the profile
    ReferenceOutOfRange {
        /// Requested reference index
        index: usize,
        /// Number of altitude bins
        len: usize,
    },
    /// A setting has a value outside of its domain
    InvalidSetting(&'static str),
    /// The aerosol type has neither a fixed mass extinction coefficient nor
    /// microphysical properties to compute one
    MissingMassExtinction(String),
    /// Reading a configuration file failed
    Io(std::io::Error),
    /// Parsing a configuration file failed
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::EmptyAltitudeGrid => write!(f, "altitude grid is empty"),
            ConfigurationError::NonMonotonicAltitude { index } => {
                write!(f, "altitude grid is not strictly increasing at index {index}")
            }
            ConfigurationError::AltitudeAboveModelTop { altitude } => {
                write!(f, "altitude {altitude} m is above the standard atmosphere top")
            }
            ConfigurationError::InvalidWavelength(wavelength) => {
                write!(f, "invalid wavelength: {wavelength} nm")
            }
            ConfigurationError::InvalidResolution(resolution) => {
                write!(f, "invalid vertical resolution: {resolution} m")
            }
            ConfigurationError::InconsistentShape { expected, found } => {
                write!(f, "inputs have inconsistent lengths: expected {expected}, found {found}")
            }
            ConfigurationError::ReferenceOutOfRange { index, len } => {
                write!(f, "reference index {index} is outside of a profile of {len} bins")
            }
            ConfigurationError::InvalidSetting(what) => write!(f, "invalid setting: {what}"),
            ConfigurationError::MissingMassExtinction(aerosol_type) => write!(
                f,
                "no mass extinction coefficient or microphysics configured for `{aerosol_type}`"
            ),
            ConfigurationError::Io(e) => write!(f, "I/O error: {e}"),
            ConfigurationError::Json(e) => write!(f, "failed to parse JSON: {e}"),
        }
    }
}

impl std::error::Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigurationError::Io(e) => Some(e),
            ConfigurationError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigurationError {
    fn from(err: std::io::Error) -> ConfigurationError {
        ConfigurationError::Io(err)
    }
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(err: serde_json::Error) -> ConfigurationError {
        ConfigurationError::Json(err)
    }
}

/// Possible retrieval errors.
///
/// Numerical trouble during an inversion is not an error: it shows up in the
/// validity mask and the convergence diagnostics of the result instead.
#[derive(Debug)]
pub enum RetrievalError {
    /// Malformed static inputs
    Configuration(ConfigurationError),
    /// The a-priori lidar ratio or AOD is not a positive finite number
    InvalidApriori(f64),
    /// The aerosol type is not in the table and no override was given
    UnknownAerosolType(String),
    /// An altitude-resolved coefficient does not match the altitude grid
    DimensionMismatch {
        /// Number of altitude bins
        expected: usize,
        /// Length of the coefficient array
        found: usize,
    },
    /// The operation was aborted early
    Cancelled,
}

impl std::fmt::Display for RetrievalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalError::Configuration(e) => write!(f, "configuration error: {e}"),
            RetrievalError::InvalidApriori(value) => {
                write!(f, "a-priori value must be positive and finite, got {value}")
            }
            RetrievalError::UnknownAerosolType(aerosol_type) => {
                write!(f, "unknown aerosol type `{aerosol_type}`")
            }
            RetrievalError::DimensionMismatch { expected, found } => write!(
                f,
                "coefficient has {found} values but the altitude grid has {expected} bins"
            ),
            RetrievalError::Cancelled => write!(f, "operation cancelled early"),
        }
    }
}

impl std::error::Error for RetrievalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetrievalError::Configuration(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for RetrievalError {
    fn from(err: ConfigurationError) -> RetrievalError {
        RetrievalError::Configuration(err)
    }
}

impl From<std::io::Error> for RetrievalError {
    fn from(err: std::io::Error) -> RetrievalError {
        RetrievalError::Configuration(err.into())
    }
}

impl From<serde_json::Error> for RetrievalError {
    fn from(err: serde_json::Error) -> RetrievalError {
        RetrievalError::Configuration(err.into())
    }
}

/// Convenience type for `Result<T, RetrievalError>`.
pub type RetrievalResult<T> = Result<T, RetrievalError>;
