//! Python bindings.
//!
//! NOTE: this module is only the interface between Rust and Python. The real
//! work happens in the other modules, which do not use `pyo3`.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use crate::apriori::Apriori;
use crate::error::{ConfigurationError, RetrievalError};
use crate::grid::AltitudeGrid;
use crate::inversion::{invert, InversionInput, InversionOptions, Method};
use crate::mass::{to_mass_concentration, Coefficient};
use crate::rayleigh::{AltitudeReference, RayleighProfile, StandardAtmosphere};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use numpy::prelude::*;
use numpy::{PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rayon::prelude::*;

impl From<RetrievalError> for PyErr {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::Configuration(_) => PyValueError::new_err(e.to_string()),
            RetrievalError::InvalidApriori(_) => PyValueError::new_err(e.to_string()),
            RetrievalError::UnknownAerosolType(_) => PyValueError::new_err(e.to_string()),
            RetrievalError::DimensionMismatch { .. } => PyValueError::new_err(e.to_string()),
            RetrievalError::Cancelled => PyValueError::new_err(e.to_string()),
        }
    }
}

impl From<ConfigurationError> for PyErr {
    fn from(e: ConfigurationError) -> Self {
        RetrievalError::from(e).into()
    }
}

/// Molecular profile: backscatter (m⁻¹ sr⁻¹), extinction (m⁻¹) and two-way
/// transmission, each with shape (`num_levels`, ).
#[pyclass]
struct MolecularProfile {
    backscatter: Array1<f64>,
    extinction: Array1<f64>,
    transmission: Array1<f64>,
    #[pyo3(get)]
    optical_depth: f64,
    #[pyo3(get)]
    cross_section: f64,
}

#[pymethods]
impl MolecularProfile {
    #[getter]
    fn backscatter<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.backscatter.to_pyarray(py)
    }

    #[getter]
    fn extinction<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.extinction.to_pyarray(py)
    }

    #[getter]
    fn transmission<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.transmission.to_pyarray(py)
    }
}

/// Retrieved extinction.
///
/// `extinction` (m⁻¹, `NaN` where invalid) and `valid` have shape
/// (`num_times`, `num_levels`); `aod`, `lidar_ratio`, `iterations` and
/// `converged` have shape (`num_times`, ).
#[pyclass]
struct Extinction {
    extinction: Array2<f64>,
    valid: Array2<bool>,
    aod: Array1<f64>,
    lidar_ratio: Array1<f64>,
    iterations: Array1<u32>,
    converged: Array1<bool>,
}

#[pymethods]
impl Extinction {
    #[getter]
    fn extinction<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        self.extinction.to_pyarray(py)
    }

    #[getter]
    fn valid<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<bool>> {
        self.valid.to_pyarray(py)
    }

    #[getter]
    fn aod<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.aod.to_pyarray(py)
    }

    #[getter]
    fn lidar_ratio<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.lidar_ratio.to_pyarray(py)
    }

    #[getter]
    fn iterations<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<u32>> {
        self.iterations.to_pyarray(py)
    }

    #[getter]
    fn converged<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<bool>> {
        self.converged.to_pyarray(py)
    }
}

impl Extinction {
    fn new(num_times: usize, num_levels: usize) -> Self {
        Self {
            extinction: Array2::from_elem([num_times, num_levels], f64::NAN),
            valid: Array2::from_elem([num_times, num_levels], false),
            aod: Array1::from_elem(num_times, f64::NAN),
            lidar_ratio: Array1::from_elem(num_times, f64::NAN),
            iterations: Array1::zeros(num_times),
            converged: Array1::from_elem(num_times, false),
        }
    }
}

fn altitude_grid(
    altitude: PyReadonlyArray1<'_, f64>,
    resolution: Option<f64>,
) -> Result<AltitudeGrid, ConfigurationError> {
    let levels = altitude.as_array().to_vec();
    match resolution {
        Some(resolution) => AltitudeGrid::with_resolution(levels, resolution),
        None => AltitudeGrid::new(levels),
    }
}

/// Compute the molecular profile of a standard atmosphere.
///
/// `altitude`: altitude levels in m, ascending. Above sea level, unless
/// `station_altitude` is given, in which case they are above the station.
///
/// `wavelength`: laser wavelength in nm.
///
/// `surface_temperature` (K) and `surface_pressure` (hPa) default to 298 K
/// and 1013 hPa.
///
/// `resolution`: bin thickness in m. By default the smallest spacing between
/// levels, or the altitude of a single level.
#[pyfunction]
#[pyo3(signature = (altitude, wavelength, station_altitude=None, surface_temperature=298., surface_pressure=1013., resolution=None))]
fn rayleigh_profile(
    altitude: PyReadonlyArray1<'_, f64>,
    wavelength: f64,
    station_altitude: Option<f64>,
    surface_temperature: f64,
    surface_pressure: f64,
    resolution: Option<f64>,
) -> PyResult<MolecularProfile> {
    let grid = altitude_grid(altitude, resolution)?;
    let reference = match station_altitude {
        Some(station_altitude) => AltitudeReference::Ground { station_altitude },
        None => AltitudeReference::SeaLevel,
    };
    let atmosphere = StandardAtmosphere {
        surface_temperature,
        surface_pressure,
    };
    let rayleigh = RayleighProfile::new(&grid, reference, wavelength, &atmosphere)?;

    Ok(MolecularProfile {
        backscatter: Array1::from(rayleigh.backscatter().to_vec()),
        extinction: Array1::from(rayleigh.extinction().to_vec()),
        transmission: Array1::from(rayleigh.transmission().to_vec()),
        optical_depth: rayleigh.optical_depth(),
        cross_section: rayleigh.cross_section(),
    })
}

/// Invert attenuated backscatter profiles.
///
/// `backscatter`: calibrated attenuated backscatter in m⁻¹ sr⁻¹, with shape
/// (`num_times`, `num_levels`). May contain NaN.
///
/// `altitude`: altitude levels in m, with shape (`num_levels`, ).
/// `resolution` overrides their bin thickness, as in `rayleigh_profile`.
///
/// `molecular_backscatter` and `transmission`: molecular backscatter in
/// m⁻¹ sr⁻¹ and two-way molecular transmission, with shape (`num_levels`, ),
/// e.g. from `rayleigh_profile`.
///
/// `method`: either "backward" or "forward". `reference` is the reference bin
/// of the backward method, or the top bin of the forward method (default:
/// the last bin).
///
/// Exactly one of `lidar_ratio` (sr) and `aod` must be given. With `aod`, the
/// lidar ratio is searched to match the target within `tolerance` using at
/// most `max_iterations` passes.
///
/// The number of worker threads is controlled by `num_threads`. It must be a
/// positive integer, or `None` to automatically choose the number of threads.
#[pyfunction]
#[pyo3(signature = (backscatter, altitude, molecular_backscatter, transmission, method="forward", lidar_ratio=None, aod=None, reference=None, tolerance=1e-3, max_iterations=30, num_threads=None, resolution=None))]
#[allow(clippy::too_many_arguments)]
fn invert_profiles(
    py: Python<'_>,
    backscatter: PyReadonlyArray2<'_, f64>,
    altitude: PyReadonlyArray1<'_, f64>,
    molecular_backscatter: PyReadonlyArray1<'_, f64>,
    transmission: PyReadonlyArray1<'_, f64>,
    method: &str,
    lidar_ratio: Option<f64>,
    aod: Option<f64>,
    reference: Option<usize>,
    tolerance: f64,
    max_iterations: usize,
    num_threads: Option<usize>,
    resolution: Option<f64>,
) -> PyResult<Extinction> {
    let num_times = backscatter.shape()[0];
    let num_levels = backscatter.shape()[1];

    let method = match method {
        "backward" => Method::Backward { reference },
        "forward" => Method::Forward { top: reference },
        _ => {
            return Err(PyValueError::new_err(format!(
                "unknown method `{method}`, expected `backward` or `forward`"
            )))
        }
    };
    let apriori = match (lidar_ratio, aod) {
        (Some(lidar_ratio), None) => Apriori::LidarRatio(lidar_ratio),
        (None, Some(aod)) => Apriori::Aod(aod),
        _ => {
            return Err(PyValueError::new_err(
                "exactly one of `lidar_ratio` and `aod` must be given",
            ))
        }
    };
    let options = InversionOptions {
        tolerance,
        max_iterations,
        ..Default::default()
    };

    let grid = altitude_grid(altitude, resolution)?;
    if grid.len() != num_levels {
        return Err(ConfigurationError::InconsistentShape {
            expected: grid.len(),
            found: num_levels,
        }
        .into());
    }
    let molecular_backscatter = molecular_backscatter.as_slice()?;
    let transmission = transmission.as_slice()?;
    let backscatter = backscatter.as_array();

    // Check everything once before spawning the workers
    InversionInput::new(
        &vec![f64::NAN; num_levels],
        molecular_backscatter,
        transmission,
        &grid,
    )?;
    apriori.validated()?;
    debug!("input shapes are consistent");

    let mut results = Vec::new();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .build()
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    // These atomics keep track of how many profiles have finished and whether
    // it's time to cancel the computation or not
    let num_completed = AtomicUsize::new(0);
    let cancelled = AtomicBool::new(false);

    info!("Inverting {num_times} profiles ({} method)", method.name());

    pool.in_place_scope(|s| -> Result<(), PyErr> {
        s.spawn(|_| {
            (0..num_times)
                .into_par_iter()
                .map(|time| -> Result<_, RetrievalError> {
                    if cancelled.load(Ordering::Relaxed) {
                        return Err(RetrievalError::Cancelled);
                    }

                    let signal = backscatter.index_axis(Axis(0), time).to_vec();
                    let input =
                        InversionInput::new(&signal, molecular_backscatter, transmission, &grid)?;
                    invert(&input, method, apriori, &options)
                })
                .inspect(|_| {
                    num_completed.fetch_add(1, Ordering::Relaxed);
                })
                .collect_into_vec(&mut results);
        });

        // The work is done in the thread pool, but back here in the main
        // thread, handle progress reporting and checking for early
        // cancellation
        while !cancelled.load(Ordering::Relaxed) {
            if let Err(e) = py.check_signals() {
                cancelled.store(true, Ordering::Relaxed);
                return Err(e);
            }

            let num_completed = num_completed.load(Ordering::Relaxed);
            let progress = num_completed as f32 / num_times.max(1) as f32 * 100.;
            info!("Inverted {num_completed}/{num_times} profiles ({progress:0.2}%)");

            if num_completed == num_times {
                break;
            }

            py.allow_threads(|| {
                std::thread::sleep(Duration::from_millis(500));
            });
        }

        Ok(())
    })?;

    debug!("copying inversion output");
    let mut output = Extinction::new(num_times, num_levels);
    results
        .into_iter()
        .enumerate()
        .try_for_each(|(index, retrieval)| -> Result<_, RetrievalError> {
            let retrieval = retrieval?;

            let rhs = ArrayView1::from(retrieval.extinction.as_slice());
            output.extinction.index_axis_mut(Axis(0), index).assign(&rhs);

            let rhs = ArrayView1::from(retrieval.valid.as_slice());
            output.valid.index_axis_mut(Axis(0), index).assign(&rhs);

            output.aod[index] = retrieval.aod;
            output.lidar_ratio[index] = retrieval.lidar_ratio;
            output.converged[index] = retrieval.converged();
            output.iterations[index] = retrieval
                .convergence
                .map_or(1, |c| u32::try_from(c.iterations).unwrap_or(u32::MAX));

            Ok(())
        })?;

    Ok(output)
}

/// Convert extinction (m⁻¹) to mass concentration (µg m⁻³) with an
/// extinction-to-mass coefficient `emc` in m² g⁻¹. NaN extinction stays NaN.
#[pyfunction]
fn mass_concentration<'py>(
    py: Python<'py>,
    extinction: PyReadonlyArray2<'py, f64>,
    emc: f64,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let extinction = extinction.as_array();
    let mut output = Array2::from_elem(extinction.dim(), f64::NAN);
    let coefficient = Coefficient::Scalar(emc);

    for (mut out, row) in output.outer_iter_mut().zip(extinction.outer_iter()) {
        let row = row.to_vec();
        let valid: Vec<bool> = row.iter().map(|e| e.is_finite()).collect();
        let mass = to_mass_concentration(&row, &valid, &coefficient)?;
        out.assign(&ArrayView1::from(mass.concentration.as_slice()));
    }

    Ok(output.to_pyarray(py))
}

/// A Python module implemented in Rust.
#[pymodule]
fn aerosol_profiles(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_function(wrap_pyfunction!(rayleigh_profile, m)?)?;
    m.add_function(wrap_pyfunction!(invert_profiles, m)?)?;
    m.add_function(wrap_pyfunction!(mass_concentration, m)?)?;
    m.add_class::<MolecularProfile>()?;
    m.add_class::<Extinction>()?;
    Ok(())
}
