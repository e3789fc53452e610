//! Extinction and mass concentration retrieval over all time steps of a
//! profile.

use crate::apriori::{Apriori, AprioriProvider};
use crate::config::AerosolTable;
use crate::error::{ConfigurationError, RetrievalError, RetrievalResult};
use crate::inversion::{
    invert, reference_index, ExtinctionProfile, InversionInput, InversionOptions, Method,
};
use crate::mass::{to_mass_concentration, Coefficient, MassConcentration};
use crate::profile::{AttributeValue, DerivedData, DerivedVariable, Profile};
use crate::rayleigh::{AltitudeReference, RayleighProfile, StandardAtmosphere};

use log::{debug, info, warn};
use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Settings of a batch retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct InversionSettings {
    /// Inversion method. Its reference (or top) bin is chosen per time step.
    pub method: Method,
    /// Aerosol type used to look up the lidar ratio
    pub aerosol_type: String,
    /// Constraint overriding the aerosol type's lidar ratio
    pub apriori: Option<Apriori>,
    /// Length of the rolling median applied in time, in minutes
    pub time_avg_minutes: f64,
    /// Altitude range (m above ground) searched for the reference bin
    pub reference_window: (f64, f64),
    /// Minimum SNR at the reference bin of the backward method
    pub min_snr: f64,
    /// Keep the reference bin below the lowest cloud base
    pub under_clouds: bool,
    /// Drop time steps whose AOD is outside of `aod_range`
    pub remove_outliers: bool,
    /// Acceptable AOD range when removing outliers
    pub aod_range: (f64, f64),
    /// AOD search options
    pub options: InversionOptions,
}

impl Default for InversionSettings {
    fn default() -> Self {
        Self {
            method: Method::Forward { top: None },
            aerosol_type: "urban".to_string(),
            apriori: Some(Apriori::LidarRatio(50.)),
            time_avg_minutes: 1.,
            reference_window: (4000., 6000.),
            min_snr: 0.,
            under_clouds: false,
            remove_outliers: false,
            aod_range: (0., 2.),
            options: InversionOptions::default(),
        }
    }
}

impl InversionSettings {
    fn validate(&self) -> Result<(), ConfigurationError> {
        let (zmin, zmax) = self.reference_window;
        if !(zmin.is_finite() && zmax.is_finite() && zmin < zmax) {
            return Err(ConfigurationError::InvalidSetting(
                "reference window must be an increasing altitude range",
            ));
        }
        if !(self.aod_range.0 <= self.aod_range.1) {
            return Err(ConfigurationError::InvalidSetting("invalid AOD range"));
        }
        if self.min_snr.is_nan() {
            return Err(ConfigurationError::InvalidSetting("minimum SNR is NaN"));
        }
        Ok(())
    }
}

/// Shared flag to stop a batch between time steps, and a counter of the
/// time steps processed so far.
#[derive(Debug, Default)]
pub struct Cancellation {
    cancelled: AtomicBool,
    completed: AtomicUsize,
}

impl Cancellation {
    /// Fresh, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the batch to stop. Time steps already running finish normally.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Number of time steps processed.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

/// What happened to one time step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepStatus {
    /// Extinction retrieved; see the `converged` variable for the search
    Retrieved,
    /// No usable reference bin in the search window
    NoReference,
    /// AOD outside of the accepted range
    Outlier,
    /// A configuration or a-priori error; the message is kept
    Failed(String),
}

/// Outcome of a batch retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalSummary {
    /// Status of each time step
    pub statuses: Vec<StepStatus>,
    /// Number of retrieved time steps that did not converge
    pub non_converged: usize,
}

impl RetrievalSummary {
    /// Number of time steps with a retrieved profile.
    pub fn retrieved(&self) -> usize {
        self.statuses
            .iter()
            .filter(|s| **s == StepStatus::Retrieved)
            .count()
    }
}

/// Time step result before it is written into the profile.
struct Step {
    status: StepStatus,
    retrieval: Option<ExtinctionProfile>,
    reference_altitude: f64,
}

/// Retrieve the aerosol extinction of every time step and attach it to
/// `profile`.
///
/// The signal is first smoothed in time, converted to m⁻¹ sr⁻¹ and masked
/// where quality flags are raised. Each time step is then inverted on its own,
/// in parallel; errors that concern a single step are logged and recorded in
/// its status. The variables `extinction`, `aod`, `lidar_ratio`, `z_ref`,
/// `converged` and `iterations` are attached to the profile.
///
/// Returns [`RetrievalError::Cancelled`] if `cancellation` is raised before
/// all steps are processed, leaving the profile unchanged.
pub fn retrieve(
    profile: &mut Profile,
    settings: &InversionSettings,
    table: &AerosolTable,
    cancellation: &Cancellation,
) -> RetrievalResult<RetrievalSummary> {
    settings.validate()?;

    let num_times = profile.num_times();
    let num_levels = profile.grid().len();
    info!(
        "Retrieving extinction for {num_times} profiles ({} method)",
        settings.method.name()
    );

    // Reduce the noise before inverting
    let averaged = profile.time_averaged(settings.time_avg_minutes)?;
    let scale = profile.units().to_per_metre();
    let mut calibrated = averaged.mapv(|v| v * scale);
    if let Some(flags) = profile.quality_flags() {
        ndarray::Zip::from(&mut calibrated)
            .and(flags)
            .for_each(|v, &flag| {
                if flag != 0 {
                    *v = f64::NAN;
                }
            });
    }

    let rayleigh = RayleighProfile::new(
        profile.grid(),
        AltitudeReference::SeaLevel,
        profile.wavelength(),
        &StandardAtmosphere::default(),
    )?;
    debug!(
        "molecular optical depth {:.5} at {} nm",
        rayleigh.optical_depth(),
        profile.wavelength()
    );

    let provider = AprioriProvider::new(table);
    let options = InversionOptions {
        initial_lidar_ratio: provider.initial_lidar_ratio(&settings.aerosol_type),
        ..settings.options
    };
    let lowest_clouds = profile.lowest_cloud();
    let grid = profile.grid();

    let steps: Vec<Result<Step, RetrievalError>> = (0..num_times)
        .into_par_iter()
        .map(|i| {
            if cancellation.is_cancelled() {
                return Err(RetrievalError::Cancelled);
            }

            let signal = calibrated.index_axis(Axis(0), i).to_vec();

            // The window is above the station, which may move between steps
            let station_altitude = profile.stations()[i].altitude;
            let imin = profile.index_from_altitude_agl(i, settings.reference_window.0);
            let mut zmax = settings.reference_window.1;
            if settings.under_clouds {
                if let Some(cloud) = lowest_clouds[i] {
                    zmax = zmax.min(cloud - station_altitude);
                }
            }
            let imax = profile.index_from_altitude_agl(i, zmax);

            let limit = match settings.method {
                Method::Backward { .. } => reference_index(&signal, imin, imax, settings.min_snr),
                Method::Forward { .. } => Some(imax),
            };
            let Some(limit) = limit else {
                debug!("time step {i}: no reference bin between {imin} and {imax}");
                return Ok(Step {
                    status: StepStatus::NoReference,
                    retrieval: None,
                    reference_altitude: f64::NAN,
                });
            };

            let outcome = provider
                .resolve(&settings.aerosol_type, settings.apriori)
                .and_then(|apriori| {
                    let input = InversionInput::from_rayleigh(&signal, &rayleigh, grid)?;
                    invert(&input, settings.method.with_limit(Some(limit)), apriori, &options)
                });

            let step = match outcome {
                Ok(retrieval) => {
                    let (low, high) = settings.aod_range;
                    if settings.remove_outliers && !(low..=high).contains(&retrieval.aod) {
                        debug!("time step {i}: AOD {:.3} rejected as outlier", retrieval.aod);
                        Step {
                            status: StepStatus::Outlier,
                            retrieval: None,
                            reference_altitude: grid.levels()[retrieval.reference_index],
                        }
                    } else {
                        Step {
                            status: StepStatus::Retrieved,
                            reference_altitude: grid.levels()[retrieval.reference_index],
                            retrieval: Some(retrieval),
                        }
                    }
                }
                Err(RetrievalError::Cancelled) => return Err(RetrievalError::Cancelled),
                Err(e) => {
                    warn!("time step {i} skipped: {e}");
                    Step {
                        status: StepStatus::Failed(e.to_string()),
                        retrieval: None,
                        reference_altitude: f64::NAN,
                    }
                }
            };
            Ok(step)
        })
        .inspect(|_| {
            cancellation.completed.fetch_add(1, Ordering::Relaxed);
        })
        .collect();

    if cancellation.is_cancelled() {
        return Err(RetrievalError::Cancelled);
    }
    let steps = steps.into_iter().collect::<Result<Vec<_>, _>>()?;

    let mut extinction = Array2::from_elem((num_times, num_levels), f64::NAN);
    let mut valid = Array2::from_elem((num_times, num_levels), false);
    let mut aod = vec![f64::NAN; num_times];
    let mut lidar_ratio = vec![f64::NAN; num_times];
    let mut z_ref = vec![f64::NAN; num_times];
    let mut converged = vec![false; num_times];
    let mut iterations = vec![0; num_times];
    let mut statuses = Vec::with_capacity(num_times);

    for (i, step) in steps.into_iter().enumerate() {
        z_ref[i] = step.reference_altitude;
        if let Some(retrieval) = step.retrieval {
            extinction
                .index_axis_mut(Axis(0), i)
                .assign(&ArrayView1::from(retrieval.extinction.as_slice()));
            valid
                .index_axis_mut(Axis(0), i)
                .assign(&ArrayView1::from(retrieval.valid.as_slice()));
            aod[i] = retrieval.aod;
            lidar_ratio[i] = retrieval.lidar_ratio;
            converged[i] = retrieval.converged();
            iterations[i] = retrieval.convergence.map_or(1, |c| c.iterations);
        }
        statuses.push(step.status);
    }

    let summary = RetrievalSummary {
        non_converged: statuses
            .iter()
            .zip(&converged)
            .filter(|(s, c)| **s == StepStatus::Retrieved && !**c)
            .count(),
        statuses,
    };
    if summary.non_converged > 0 {
        warn!("{} profiles did not converge", summary.non_converged);
    }
    info!(
        "Retrieved {}/{num_times} extinction profiles",
        summary.retrieved()
    );

    let wavelength = profile.wavelength();
    let mut extinction_variable = DerivedVariable::new(
        DerivedData::Profiles {
            values: extinction,
            valid,
        },
        format!("Extinction Coefficient @ {wavelength:.0} nm"),
        "m-1",
    )
    .with_attribute(
        "method",
        AttributeValue::Text(format!("{} Klett", settings.method.name())),
    )
    .with_attribute("time_avg", AttributeValue::Number(settings.time_avg_minutes))
    .with_attribute("zmin", AttributeValue::Number(settings.reference_window.0))
    .with_attribute("zmax", AttributeValue::Number(settings.reference_window.1))
    .with_attribute(
        "aerosol_type",
        AttributeValue::Text(settings.aerosol_type.clone()),
    );
    if let Some(apriori) = settings.apriori {
        extinction_variable = extinction_variable
            .with_attribute(
                "apriori_variable",
                AttributeValue::Text(apriori.variable().to_string()),
            )
            .with_attribute("apriori_value", AttributeValue::Number(apriori.value()));
    }

    profile.insert_derived("extinction", extinction_variable)?;
    profile.insert_derived(
        "aod",
        DerivedVariable::new(
            DerivedData::Series(aod),
            format!("Aerosol Optical Depth @ {wavelength:.0} nm"),
            "",
        ),
    )?;
    profile.insert_derived(
        "lidar_ratio",
        DerivedVariable::new(
            DerivedData::Series(lidar_ratio),
            format!("Lidar Ratio @ {wavelength:.0} nm"),
            "sr",
        ),
    )?;
    profile.insert_derived(
        "z_ref",
        DerivedVariable::new(DerivedData::Series(z_ref), "Reference altitude ASL", "m"),
    )?;
    profile.insert_derived(
        "converged",
        DerivedVariable::new(DerivedData::Flags(converged), "Retrieval converged", ""),
    )?;
    profile.insert_derived(
        "iterations",
        DerivedVariable::new(DerivedData::Counts(iterations), "Inversion passes", ""),
    )?;

    Ok(summary)
}

/// Attach `mass_concentration:<type>` (µg m⁻³) for every aerosol type of
/// `table`, from the `extinction` variable of a previous [`retrieve`].
///
/// Types without a way to compute their extinction-to-mass coefficient are
/// skipped with a warning. Returns the names of the attached variables.
pub fn concentration_profiles(
    profile: &mut Profile,
    table: &AerosolTable,
) -> RetrievalResult<Vec<String>> {
    let (extinction, valid) = match profile.derived("extinction").map(|v| &v.data) {
        Some(DerivedData::Profiles { values, valid }) => (values.clone(), valid.clone()),
        _ => {
            return Err(ConfigurationError::InvalidSetting(
                "mass concentration needs a retrieved extinction",
            )
            .into())
        }
    };

    let wavelength = profile.wavelength();
    let mut names = Vec::new();
    for aerosol_type in table.names() {
        let emc = match table.mass_extinction_coefficient(aerosol_type, wavelength) {
            Ok(emc) => emc,
            Err(RetrievalError::Configuration(ConfigurationError::MissingMassExtinction(_))) => {
                warn!("no mass extinction coefficient for `{aerosol_type}`, skipped");
                continue;
            }
            Err(e) => return Err(e),
        };
        debug!("{aerosol_type}: EMC {emc:.3} m2/g at {wavelength} nm");

        let mut values = Array2::from_elem(extinction.dim(), f64::NAN);
        let mut mask = Array2::from_elem(extinction.dim(), false);
        for (i, (row, row_valid)) in extinction.outer_iter().zip(valid.outer_iter()).enumerate() {
            let MassConcentration {
                concentration,
                valid: converted_valid,
            } = to_mass_concentration(
                &row.to_vec(),
                &row_valid.to_vec(),
                &Coefficient::Scalar(emc),
            )?;
            values
                .index_axis_mut(Axis(0), i)
                .assign(&ArrayView1::from(concentration.as_slice()));
            mask.index_axis_mut(Axis(0), i)
                .assign(&ArrayView1::from(converted_valid.as_slice()));
        }

        let name = format!("mass_concentration:{aerosol_type}");
        let variable = DerivedVariable::new(
            DerivedData::Profiles {
                values,
                valid: mask,
            },
            format!(
                "Mass concentration [{} particles]",
                aerosol_type.replace('_', " ")
            ),
            MassConcentration::UNITS,
        )
        .with_attribute("emc", AttributeValue::Number(emc));
        profile.insert_derived(name.clone(), variable)?;
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::AltitudeGrid;
    use crate::profile::{BackscatterUnits, Station};
    use crate::simulation::{simulate_attenuated_backscatter, step_extinction_model};
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};

    /// Four profiles a minute apart of a 1.5 km deep layer of 1e-4 m⁻¹ seen
    /// with a lidar ratio of 50 sr, on levels 115 to 6100 m ASL.
    fn simulated() -> Profile {
        let grid = AltitudeGrid::regular(115., 15., 400).unwrap();
        let station = Station {
            altitude: 100.,
            latitude: 48.7,
            longitude: 2.2,
        };
        let rayleigh = RayleighProfile::new(
            &grid,
            AltitudeReference::SeaLevel,
            1064.,
            &StandardAtmosphere::default(),
        )
        .unwrap();
        let heights: Vec<f64> = grid.levels().iter().map(|z| z - station.altitude).collect();
        let extinction = step_extinction_model(&heights, 1500., 1e-4);
        let signal = simulate_attenuated_backscatter(&extinction, &rayleigh, 50., &grid).unwrap();

        let start = NaiveDate::from_ymd_opt(2021, 9, 9)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let time = (0..4).map(|i| start + Duration::minutes(i)).collect();
        let data = Array2::from_shape_fn((4, 400), |(_, z)| signal[z] * 1e6);
        Profile::new(
            time,
            grid,
            data,
            BackscatterUnits::PerMegametre,
            1064.,
            vec![station; 4],
        )
        .unwrap()
    }

    fn series<'a>(profile: &'a Profile, name: &str) -> &'a [f64] {
        match &profile.derived(name).unwrap().data {
            DerivedData::Series(values) => values,
            other => panic!("{name} is not a series: {other:?}"),
        }
    }

    #[test]
    fn forward_retrieval_of_every_step() {
        let mut profile = simulated();
        let table = AerosolTable::builtin().unwrap();
        let cancellation = Cancellation::new();
        let summary = retrieve(
            &mut profile,
            &InversionSettings::default(),
            &table,
            &cancellation,
        )
        .unwrap();

        assert_eq!(summary.statuses, vec![StepStatus::Retrieved; 4]);
        assert_eq!(summary.non_converged, 0);
        assert_eq!(cancellation.completed(), 4);
        for aod in series(&profile, "aod") {
            assert_relative_eq!(*aod, 0.1485, max_relative = 1e-6);
        }
        assert_eq!(series(&profile, "lidar_ratio"), &[50.; 4]);
        // 6000 m above the station
        assert_eq!(series(&profile, "z_ref"), &[6100.; 4]);

        let extinction = profile.derived("extinction").unwrap();
        assert_eq!(extinction.units, "m-1");
        assert_eq!(
            extinction.attributes.get("apriori_variable"),
            Some(&AttributeValue::Text("lr".to_string()))
        );
        match &extinction.data {
            DerivedData::Profiles { values, valid } => {
                assert_relative_eq!(values[[2, 10]], 1e-4, max_relative = 1e-6);
                assert!(valid[[2, 10]]);
            }
            other => panic!("unexpected extinction data {other:?}"),
        }
        match &profile.derived("iterations").unwrap().data {
            DerivedData::Counts(counts) => assert_eq!(counts, &vec![1; 4]),
            other => panic!("unexpected iterations {other:?}"),
        }
    }

    #[test]
    fn backward_retrieval_with_aod_constraint() {
        let mut flags = Array2::zeros((4, 400));
        flags.row_mut(2).fill(1u8);
        let mut profile = simulated().with_quality_flags(flags).unwrap();
        let table = AerosolTable::builtin().unwrap();
        let settings = InversionSettings {
            method: Method::Backward { reference: None },
            apriori: Some(Apriori::Aod(0.1485)),
            ..Default::default()
        };
        let summary = retrieve(&mut profile, &settings, &table, &Cancellation::new()).unwrap();

        assert_eq!(summary.statuses[2], StepStatus::NoReference);
        assert_eq!(summary.retrieved(), 3);
        assert_eq!(summary.non_converged, 0);

        let aod = series(&profile, "aod");
        let z_ref = series(&profile, "z_ref");
        for i in [0, 1, 3] {
            assert_relative_eq!(aod[i], 0.1485, max_relative = 1e-3);
            assert!((4100. ..6100.).contains(&z_ref[i]), "{}", z_ref[i]);
        }
        assert!(aod[2].is_nan() && z_ref[2].is_nan());
    }

    #[test]
    fn cloud_bases_lower_the_top() {
        let mut bases = Array2::from_elem((4, 400), false);
        // 2005 m ASL
        bases[[1, 126]] = true;
        let mut profile = simulated().with_cloud_bases(bases).unwrap();
        let table = AerosolTable::builtin().unwrap();
        let settings = InversionSettings {
            under_clouds: true,
            ..Default::default()
        };
        retrieve(&mut profile, &settings, &table, &Cancellation::new()).unwrap();

        let z_ref = series(&profile, "z_ref");
        assert_eq!(z_ref[0], 6100.);
        assert_eq!(z_ref[1], 2005.);
    }

    #[test]
    fn reference_window_follows_the_station() {
        let grid = AltitudeGrid::regular(115., 15., 800).unwrap();
        let rayleigh = RayleighProfile::new(
            &grid,
            AltitudeReference::SeaLevel,
            1064.,
            &StandardAtmosphere::default(),
        )
        .unwrap();
        let extinction = step_extinction_model(grid.levels(), 1500., 1e-4);
        let signal = simulate_attenuated_backscatter(&extinction, &rayleigh, 50., &grid).unwrap();

        let start = NaiveDate::from_ymd_opt(2021, 9, 9)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let time = vec![start, start + Duration::minutes(1)];
        let stations = [100., 3100.]
            .map(|altitude| Station {
                altitude,
                latitude: 48.7,
                longitude: 2.2,
            })
            .to_vec();
        let data = Array2::from_shape_fn((2, 800), |(_, z)| signal[z]);
        let mut profile = Profile::new(
            time,
            grid,
            data,
            BackscatterUnits::PerMetre,
            1064.,
            stations,
        )
        .unwrap();

        let mut bases = Array2::from_elem((2, 800), false);
        // 8005 m ASL, 4905 m above the second station
        bases[[1, 526]] = true;
        let mut clouded = profile.clone().with_cloud_bases(bases).unwrap();

        let table = AerosolTable::builtin().unwrap();
        retrieve(
            &mut profile,
            &InversionSettings::default(),
            &table,
            &Cancellation::new(),
        )
        .unwrap();
        // 6000 m above each station
        assert_eq!(series(&profile, "z_ref"), &[6100., 9100.]);

        let settings = InversionSettings {
            under_clouds: true,
            ..Default::default()
        };
        retrieve(&mut clouded, &settings, &table, &Cancellation::new()).unwrap();
        assert_eq!(series(&clouded, "z_ref"), &[6100., 8005.]);
    }

    #[test]
    fn outliers_are_removed() {
        let mut profile = simulated();
        let table = AerosolTable::builtin().unwrap();
        let settings = InversionSettings {
            remove_outliers: true,
            aod_range: (0., 0.1),
            ..Default::default()
        };
        let summary = retrieve(&mut profile, &settings, &table, &Cancellation::new()).unwrap();
        assert_eq!(summary.statuses, vec![StepStatus::Outlier; 4]);
        assert_eq!(summary.retrieved(), 0);
        assert!(series(&profile, "aod").iter().all(|a| a.is_nan()));
    }

    #[test]
    fn unknown_type_fails_each_step() {
        let mut profile = simulated();
        let table = AerosolTable::builtin().unwrap();
        let settings = InversionSettings {
            aerosol_type: "sea_spray".to_string(),
            apriori: None,
            ..Default::default()
        };
        let summary = retrieve(&mut profile, &settings, &table, &Cancellation::new()).unwrap();
        assert!(summary
            .statuses
            .iter()
            .all(|s| matches!(s, StepStatus::Failed(_))));
    }

    #[test]
    fn cancelled_batch_leaves_the_profile_unchanged() {
        let mut profile = simulated();
        let table = AerosolTable::builtin().unwrap();
        let cancellation = Cancellation::new();
        cancellation.cancel();
        let result = retrieve(
            &mut profile,
            &InversionSettings::default(),
            &table,
            &cancellation,
        );
        assert!(matches!(result, Err(RetrievalError::Cancelled)));
        assert!(profile.derived_variables().is_empty());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let mut profile = simulated();
        let table = AerosolTable::builtin().unwrap();
        let settings = InversionSettings {
            reference_window: (6000., 4000.),
            ..Default::default()
        };
        assert!(retrieve(&mut profile, &settings, &table, &Cancellation::new()).is_err());
    }

    #[test]
    fn mass_concentration_for_every_type() {
        let mut profile = simulated();
        let table = AerosolTable::builtin().unwrap();
        assert!(concentration_profiles(&mut profile, &table).is_err());

        retrieve(
            &mut profile,
            &InversionSettings::default(),
            &table,
            &Cancellation::new(),
        )
        .unwrap();
        let names = concentration_profiles(&mut profile, &table).unwrap();
        assert!(names.contains(&"mass_concentration:urban".to_string()));

        let emc = table.mass_extinction_coefficient("urban", 1064.).unwrap();
        let variable = profile.derived("mass_concentration:urban").unwrap();
        assert_eq!(variable.units, MassConcentration::UNITS);
        match &variable.data {
            DerivedData::Profiles { values, valid } => {
                assert_relative_eq!(values[[0, 10]], 1e-4 / emc * 1e6, max_relative = 1e-5);
                assert!(valid[[0, 10]]);
            }
            other => panic!("unexpected mass concentration {other:?}"),
        }
    }
}
