//! Aerosol extinction retrieval from one attenuated backscatter profile.
//!
//! Both methods work on the molecular-corrected signal `Y = β_att / T_m²`,
//! where `T_m²` is the two-way molecular transmission, and assume an
//! altitude-independent aerosol lidar ratio `S`:
//!
//! - the backward (Klett) method integrates from a reference bin down to the
//!   instrument, using the closed-form solution of the lidar equation;
//! - the forward method walks up from the instrument, solving each bin for
//!   the extinction that is consistent with the aerosol optical depth below.
//!
//! When the a-priori is a column AOD instead of a lidar ratio, the lidar ratio
//! is searched until the retrieved AOD matches the target.
//!
//! Numerical trouble never raises an error: the bins involved are flagged in
//! the validity mask and hold `NaN`.

mod backward;
mod constraint;
mod forward;
mod reference;

#[cfg(test)]
mod tests;

pub use reference::reference_index;

use crate::apriori::{Apriori, DEFAULT_LIDAR_RATIO};
use crate::error::{ConfigurationError, RetrievalResult};
use crate::grid::AltitudeGrid;
use crate::rayleigh::RayleighProfile;
use log::debug;

/// One time step of inputs, aligned on an altitude grid.
#[derive(Debug, Clone, Copy)]
pub struct InversionInput<'a> {
    backscatter: &'a [f64],
    molecular_backscatter: &'a [f64],
    transmission: &'a [f64],
    grid: &'a AltitudeGrid,
}

impl<'a> InversionInput<'a> {
    /// Check that all arrays match the grid.
    ///
    /// `backscatter` is the calibrated attenuated backscatter in m⁻¹ sr⁻¹ and
    /// may contain `NaN`. The molecular backscatter must be finite and
    /// non-negative, and the two-way transmission finite and positive.
    pub fn new(
        backscatter: &'a [f64],
        molecular_backscatter: &'a [f64],
        transmission: &'a [f64],
        grid: &'a AltitudeGrid,
    ) -> Result<Self, ConfigurationError> {
        let expected = grid.len();
        for found in [
            backscatter.len(),
            molecular_backscatter.len(),
            transmission.len(),
        ] {
            if found != expected {
                return Err(ConfigurationError::InconsistentShape { expected, found });
            }
        }
        if molecular_backscatter
            .iter()
            .any(|b| !(b.is_finite() && *b >= 0.))
        {
            return Err(ConfigurationError::InvalidSetting(
                "molecular backscatter must be finite and non-negative",
            ));
        }
        if transmission.iter().any(|t| !(t.is_finite() && *t > 0.)) {
            return Err(ConfigurationError::InvalidSetting(
                "molecular transmission must be finite and positive",
            ));
        }

        Ok(Self {
            backscatter,
            molecular_backscatter,
            transmission,
            grid,
        })
    }

    /// Use the molecular profile computed on the same grid.
    pub fn from_rayleigh(
        backscatter: &'a [f64],
        rayleigh: &'a RayleighProfile,
        grid: &'a AltitudeGrid,
    ) -> Result<Self, ConfigurationError> {
        Self::new(
            backscatter,
            rayleigh.backscatter(),
            rayleigh.transmission(),
            grid,
        )
    }

    /// Number of altitude bins.
    pub fn len(&self) -> usize {
        self.backscatter.len()
    }

    /// Always false, a grid has at least one level.
    pub fn is_empty(&self) -> bool {
        self.backscatter.is_empty()
    }

    /// Signal corrected for the molecular attenuation, at bin `i`.
    fn corrected(&self, i: usize) -> f64 {
        self.backscatter[i] / self.transmission[i]
    }
}

/// Retrieval method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Klett inversion from a reference bin downward. Defaults to the top bin.
    Backward {
        /// Reference bin, where the aerosol transmission is taken as unity
        reference: Option<usize>,
    },
    /// Iterative inversion from the instrument upward. Defaults to the whole
    /// profile.
    Forward {
        /// Highest bin retrieved
        top: Option<usize>,
    },
}

impl Default for Method {
    fn default() -> Self {
        Method::Forward { top: None }
    }
}

impl Method {
    /// Short name, as stored in output metadata.
    pub fn name(self) -> &'static str {
        match self {
            Method::Backward { .. } => "backward",
            Method::Forward { .. } => "forward",
        }
    }

    /// Same method bounded at another bin.
    pub fn with_limit(self, index: Option<usize>) -> Self {
        match self {
            Method::Backward { .. } => Method::Backward { reference: index },
            Method::Forward { .. } => Method::Forward { top: index },
        }
    }
}

/// Controls the lidar ratio search used with an AOD a-priori.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InversionOptions {
    /// Relative tolerance on the retrieved AOD
    pub tolerance: f64,
    /// Maximum number of inversion passes
    pub max_iterations: usize,
    /// Lidar ratio of the first pass, in sr
    pub initial_lidar_ratio: f64,
}

impl Default for InversionOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_iterations: 30,
            initial_lidar_ratio: DEFAULT_LIDAR_RATIO,
        }
    }
}

impl InversionOptions {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.) {
            return Err(ConfigurationError::InvalidSetting(
                "tolerance must be positive and finite",
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigurationError::InvalidSetting(
                "at least one iteration is needed",
            ));
        }
        if !(self.initial_lidar_ratio.is_finite() && self.initial_lidar_ratio > 0.) {
            return Err(ConfigurationError::InvalidSetting(
                "initial lidar ratio must be positive and finite",
            ));
        }
        Ok(())
    }
}

/// How an iterative retrieval ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Convergence {
    /// Number of inversion passes
    pub iterations: usize,
    /// AOD of the returned profile
    pub aod: f64,
    /// Whether the profile satisfies the constraint
    pub converged: bool,
}

/// Aerosol extinction retrieved for one time step.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtinctionProfile {
    /// Extinction coefficient in m⁻¹, `NaN` where invalid
    pub extinction: Vec<f64>,
    /// Validity mask; a valid bin always holds a finite non-negative value
    pub valid: Vec<bool>,
    /// Lidar ratio of the retrieval, in sr
    pub lidar_ratio: f64,
    /// Column AOD of the valid bins
    pub aod: f64,
    /// Reference bin the backward recursion actually started from, after any
    /// restart below an unusable bin, or the highest bin of the forward
    /// method
    pub reference_index: usize,
    /// Diagnostics of the forward method or of the AOD search
    pub convergence: Option<Convergence>,
}

impl ExtinctionProfile {
    /// Number of altitude bins.
    pub fn len(&self) -> usize {
        self.extinction.len()
    }

    /// True when the profile has no bins.
    pub fn is_empty(&self) -> bool {
        self.extinction.is_empty()
    }

    /// Number of valid bins.
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// False when an iterative retrieval failed to converge, or when no bin
    /// could be retrieved at all.
    pub fn converged(&self) -> bool {
        self.valid_count() > 0 && self.convergence.map_or(true, |c| c.converged)
    }
}

/// Result of a single inversion pass at a fixed lidar ratio.
#[derive(Debug, Clone)]
struct Pass {
    extinction: Vec<f64>,
    valid: Vec<bool>,
    aod: f64,
    diverged: bool,
    /// Reference the backward recursion settled on
    reference: Option<usize>,
}

impl Pass {
    /// Derive the mask and the AOD from extinctions that are `NaN` where
    /// invalid.
    fn new(extinction: Vec<f64>, resolution: f64, diverged: bool) -> Self {
        let valid: Vec<bool> = extinction
            .iter()
            .map(|e| e.is_finite() && *e >= 0.)
            .collect();
        let aod = extinction
            .iter()
            .zip(&valid)
            .filter(|(_, v)| **v)
            .fold(0., |aod, (e, _)| aod + e * resolution);
        Self {
            extinction,
            valid,
            aod,
            diverged,
            reference: None,
        }
    }

    fn invalid(len: usize) -> Self {
        Self {
            extinction: vec![f64::NAN; len],
            valid: vec![false; len],
            aod: 0.,
            diverged: false,
            reference: None,
        }
    }

    fn has_valid(&self) -> bool {
        self.valid.iter().any(|&v| v)
    }
}

/// Retrieve the extinction profile of one time step.
///
/// Fails only on invalid settings: a non-positive a-priori, a reference bin
/// outside the profile or unusable search options. A profile that cannot be
/// inverted at all comes back with every bin invalid.
pub fn invert(
    input: &InversionInput<'_>,
    method: Method,
    apriori: Apriori,
    options: &InversionOptions,
) -> RetrievalResult<ExtinctionProfile> {
    let apriori = apriori.validated()?;
    options.validate()?;

    let len = input.len();
    let limit = match method {
        Method::Backward { reference } => reference,
        Method::Forward { top } => top,
    };
    let limit = limit.unwrap_or(len - 1);
    if limit >= len {
        return Err(ConfigurationError::ReferenceOutOfRange { index: limit, len }.into());
    }

    let run = |lidar_ratio: f64| match method {
        Method::Backward { .. } => backward::pass(input, limit, lidar_ratio),
        Method::Forward { .. } => forward::pass(input, limit, lidar_ratio),
    };

    let (pass, lidar_ratio, convergence) = match apriori {
        Apriori::LidarRatio(lidar_ratio) => {
            let pass = run(lidar_ratio);
            let convergence = match method {
                Method::Forward { .. } => Some(Convergence {
                    iterations: 1,
                    aod: pass.aod,
                    converged: !pass.diverged && pass.has_valid(),
                }),
                Method::Backward { .. } => None,
            };
            (pass, lidar_ratio, convergence)
        }
        Apriori::Aod(target) => {
            let search = if limit == 0 {
                constraint::single_bin(input, method, target)
            } else {
                constraint::search(run, len, target, options)
            };
            let convergence = Convergence {
                iterations: search.iterations,
                aod: search.pass.aod,
                converged: search.converged,
            };
            (search.pass, search.lidar_ratio, Some(convergence))
        }
    };

    debug!(
        "{} inversion: {}/{len} valid bins, AOD {:.4}, lidar ratio {lidar_ratio:.2} sr",
        method.name(),
        pass.valid.iter().filter(|&&v| v).count(),
        pass.aod
    );

    Ok(ExtinctionProfile {
        extinction: pass.extinction,
        valid: pass.valid,
        lidar_ratio,
        aod: pass.aod,
        reference_index: pass.reference.unwrap_or(limit),
        convergence,
    })
}
