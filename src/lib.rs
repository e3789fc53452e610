//! Aerosol extinction and mass concentration profiles from lidar and
//! ceilometer attenuated backscatter.
//!
//! The core is [`inversion::invert`], which solves the lidar equation for one
//! profile with either the backward (Klett) or the forward method, for a
//! fixed lidar ratio or for the lidar ratio matching a target aerosol optical
//! depth. Around it:
//!
//! - [`rayleigh`] computes the molecular backscatter and transmission of a
//!   standard atmosphere,
//! - [`apriori`] and [`config`] provide the lidar ratio or AOD constraint per
//!   aerosol type,
//! - [`mass`] and [`emc`] convert extinction to mass concentration,
//! - [`profile`] holds time/altitude data with its corrections, and
//!   [`retrieval`] runs the inversion over every time step in parallel.
//!
//! NOTE: with the `python` feature, the `python` module exposes the inversion
//! to Python. The real work happens in the other modules, which do not use
//! `pyo3`.

pub mod apriori;
pub mod config;
pub mod emc;
pub mod error;
pub mod grid;
pub mod inversion;
pub mod mass;
pub mod profile;
pub mod rayleigh;
pub mod retrieval;
pub mod simulation;

#[cfg(feature = "python")]
mod python;

pub use apriori::{Apriori, AprioriProvider};
pub use config::{AerosolProperties, AerosolTable};
pub use error::{ConfigurationError, RetrievalError, RetrievalResult};
pub use grid::AltitudeGrid;
pub use inversion::{invert, ExtinctionProfile, InversionInput, InversionOptions, Method};
pub use mass::{to_extinction, to_mass_concentration, Coefficient, MassConcentration};
pub use profile::Profile;
pub use rayleigh::{AltitudeReference, RayleighProfile, StandardAtmosphere};
pub use retrieval::{concentration_profiles, retrieve, Cancellation, InversionSettings};
