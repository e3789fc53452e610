use super::*;
use crate::error::RetrievalError;
use approx::assert_relative_eq;

/// 101 levels from 0 to 10 km, every 100 m
fn grid() -> AltitudeGrid {
    AltitudeGrid::regular(0., 100., 101).unwrap()
}

struct Flat {
    backscatter: Vec<f64>,
    molecular: Vec<f64>,
    transmission: Vec<f64>,
}

impl Flat {
    fn new(value: f64) -> Self {
        Self {
            backscatter: vec![value; 101],
            molecular: vec![1e-6; 101],
            transmission: vec![1.; 101],
        }
    }

    fn input<'a>(&'a self, grid: &'a AltitudeGrid) -> InversionInput<'a> {
        InversionInput::new(&self.backscatter, &self.molecular, &self.transmission, grid).unwrap()
    }
}

fn backward(reference: usize) -> Method {
    Method::Backward {
        reference: Some(reference),
    }
}

const FORWARD: Method = Method::Forward { top: None };

#[test]
fn backward_flat_profile() {
    let grid = grid();
    let flat = Flat::new(1e-5);
    let profile = invert(
        &flat.input(&grid),
        backward(100),
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();

    assert_eq!(profile.len(), 101);
    assert_eq!(profile.valid_count(), 101);
    assert!(profile.extinction.iter().all(|&e| e > 0.));
    assert!(profile.extinction.windows(2).all(|w| w[0] <= w[1]));
    // Reference bin: S·(Y − β_m)
    assert_relative_eq!(profile.extinction[100], 4.5e-4, max_relative = 1e-12);
    assert_relative_eq!(profile.extinction[0], 2.4748e-5, max_relative = 1e-4);
    assert_eq!(profile.reference_index, 100);
    assert_eq!(profile.convergence, None);
    assert!(profile.converged());
}

#[test]
fn forward_matches_target_aod() {
    let grid = grid();
    let flat = Flat::new(1e-5);
    let options = InversionOptions {
        max_iterations: 50,
        ..Default::default()
    };
    let profile = invert(&flat.input(&grid), FORWARD, Apriori::Aod(0.3), &options).unwrap();

    let convergence = profile.convergence.unwrap();
    assert!(convergence.converged);
    assert!(convergence.iterations <= 50);
    assert!((convergence.aod - 0.3).abs() <= 1e-3 * 0.3);
    assert_eq!(convergence.aod, profile.aod);
    assert_relative_eq!(profile.lidar_ratio, 2.41, max_relative = 0.01);
    assert_eq!(profile.valid_count(), 101);
}

#[test]
fn backward_matches_target_aod() {
    let grid = grid();
    let flat = Flat::new(1e-5);
    let profile = invert(
        &flat.input(&grid),
        Method::Backward { reference: None },
        Apriori::Aod(0.3),
        &InversionOptions::default(),
    )
    .unwrap();

    assert!(profile.converged());
    assert!((profile.aod - 0.3).abs() <= 3e-4);
    assert_relative_eq!(profile.lidar_ratio, 4.72, max_relative = 0.01);
}

#[test]
fn nan_invalidates_bins_above() {
    let grid = grid();

    let mut flat = Flat::new(1e-5);
    flat.backscatter[50] = f64::NAN;
    let profile = invert(
        &flat.input(&grid),
        backward(100),
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();
    assert!(profile.valid[..50].iter().all(|&v| v));
    assert!(profile.valid[50..].iter().all(|&v| !v));
    assert!(profile.extinction[50..].iter().all(|e| e.is_nan()));

    // Smaller signal, so that the forward method is stable with S = 50 sr
    let clean = Flat::new(2e-6);
    let mut flat = Flat::new(2e-6);
    flat.backscatter[50] = f64::NAN;
    let reference = invert(
        &clean.input(&grid),
        FORWARD,
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();
    let profile = invert(
        &flat.input(&grid),
        FORWARD,
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();
    assert!(profile.valid[..50].iter().all(|&v| v));
    assert!(profile.valid[50..].iter().all(|&v| !v));
    assert_eq!(profile.extinction[..50], reference.extinction[..50]);
    assert!(profile.converged());
}

#[test]
fn forward_divergence_is_flagged() {
    let grid = grid();
    let flat = Flat::new(1e-5);
    let profile = invert(
        &flat.input(&grid),
        FORWARD,
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();

    let convergence = profile.convergence.unwrap();
    assert!(!convergence.converged);
    assert_eq!(convergence.iterations, 1);
    assert!(profile.valid[..8].iter().all(|&v| v));
    assert!(profile.valid[8..].iter().all(|&v| !v));
}

#[test]
fn all_nan_profiles_are_invalid() {
    let grid = grid();
    let flat = Flat::new(f64::NAN);
    let options = InversionOptions::default();

    for method in [backward(100), FORWARD] {
        for apriori in [Apriori::LidarRatio(50.), Apriori::Aod(0.2)] {
            let profile = invert(&flat.input(&grid), method, apriori, &options).unwrap();
            assert_eq!(profile.len(), 101);
            assert_eq!(profile.valid_count(), 0);
            assert!(profile.extinction.iter().all(|e| e.is_nan()));
            assert_eq!(profile.aod, 0.);
        }
    }
}

#[test]
fn forward_is_deterministic() {
    let grid = grid();
    let mut flat = Flat::new(1e-5);
    for (i, value) in flat.backscatter.iter_mut().enumerate() {
        *value *= 1. + 0.1 * (i as f64 * 0.7).sin();
    }
    let run = || {
        invert(
            &flat.input(&grid),
            FORWARD,
            Apriori::Aod(0.25),
            &InversionOptions::default(),
        )
        .unwrap()
    };

    let first = run();
    let second = run();
    let bits = |profile: &ExtinctionProfile| {
        profile
            .extinction
            .iter()
            .map(|e| e.to_bits())
            .collect::<Vec<_>>()
    };
    assert_eq!(bits(&first), bits(&second));
    assert_eq!(first.valid, second.valid);
    assert_eq!(first.convergence, second.convergence);
    assert_eq!(first.lidar_ratio.to_bits(), second.lidar_ratio.to_bits());
}

#[test]
fn single_bin() {
    let grid = AltitudeGrid::new(vec![100.]).unwrap();
    let backscatter = [1e-5];
    let molecular = [1e-6];
    let transmission = [1.];
    let input = InversionInput::new(&backscatter, &molecular, &transmission, &grid).unwrap();

    let profile = invert(
        &input,
        Method::Backward { reference: None },
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();
    assert_relative_eq!(profile.extinction[0], 50. * 9e-6, max_relative = 1e-12);

    let profile = invert(&input, FORWARD, Apriori::Aod(0.1), &InversionOptions::default()).unwrap();
    let convergence = profile.convergence.unwrap();
    assert!(convergence.converged);
    assert_eq!(convergence.iterations, 1);
    assert_relative_eq!(profile.aod, 0.1, max_relative = 1e-12);
    assert_relative_eq!(profile.extinction[0], 1e-3, max_relative = 1e-12);
    // The closed-form lidar ratio reproduces the same bin in a plain pass
    let check = invert(
        &input,
        FORWARD,
        Apriori::LidarRatio(profile.lidar_ratio),
        &InversionOptions::default(),
    )
    .unwrap();
    assert_relative_eq!(check.extinction[0], 1e-3, max_relative = 1e-5);
}

#[test]
fn single_level_at_or_below_sea_level() {
    use crate::rayleigh::{AltitudeReference, StandardAtmosphere};

    for level in [0., -20.] {
        let grid = AltitudeGrid::new(vec![level]).unwrap();
        let rayleigh = RayleighProfile::new(
            &grid,
            AltitudeReference::SeaLevel,
            1064.,
            &StandardAtmosphere::default(),
        )
        .unwrap();
        let backscatter = [(rayleigh.backscatter()[0] + 1e-5) * rayleigh.transmission()[0]];
        let input = InversionInput::from_rayleigh(&backscatter, &rayleigh, &grid).unwrap();

        let profile = invert(
            &input,
            Method::Backward { reference: None },
            Apriori::LidarRatio(50.),
            &InversionOptions::default(),
        )
        .unwrap();
        assert_eq!(profile.valid_count(), 1);
        assert_relative_eq!(profile.extinction[0], 5e-4, max_relative = 1e-9);

        let profile =
            invert(&input, FORWARD, Apriori::Aod(1e-3), &InversionOptions::default()).unwrap();
        assert!(profile.converged());
        assert_relative_eq!(profile.aod, 1e-3, max_relative = 1e-9);
    }
}

#[test]
fn negative_extinction_only_masks_its_bin() {
    let grid = grid();
    let mut flat = Flat::new(1e-5);
    flat.backscatter[30] = 1e-7;
    let profile = invert(
        &flat.input(&grid),
        backward(100),
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();

    assert!(!profile.valid[30]);
    assert!(profile.extinction[30].is_nan());
    assert!(profile.valid[29] && profile.valid[31]);
    assert_eq!(profile.valid_count(), 100);
}

#[test]
fn negative_denominator_restarts_below() {
    let grid = grid();
    let mut flat = Flat::new(1e-5);
    flat.backscatter[20] = -1e-2;
    let profile = invert(
        &flat.input(&grid),
        backward(100),
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();

    assert!(profile.valid[..20].iter().all(|&v| v));
    assert!(profile.valid[20..].iter().all(|&v| !v));
    assert_eq!(profile.reference_index, 19);
    assert!(profile
        .extinction
        .iter()
        .filter(|e| !e.is_nan())
        .all(|&e| e >= 0.));
}

#[test]
fn reference_moves_below_unusable_bins() {
    let grid = grid();
    let mut flat = Flat::new(1e-5);
    flat.backscatter[90..].fill(-1e-5);
    let profile = invert(
        &flat.input(&grid),
        backward(100),
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();

    assert_eq!(profile.valid_count(), 90);
    assert_eq!(profile.valid.iter().position(|&v| !v), Some(90));
    assert_eq!(profile.reference_index, 89);
    assert_relative_eq!(profile.extinction[89], 4.5e-4, max_relative = 1e-12);
}

#[test]
fn signal_below_molecular_is_not_converged() {
    let grid = grid();
    let flat = Flat::new(5e-7);

    for method in [backward(100), FORWARD] {
        let profile = invert(
            &flat.input(&grid),
            method,
            Apriori::LidarRatio(50.),
            &InversionOptions::default(),
        )
        .unwrap();
        assert_eq!(profile.valid_count(), 0);
        assert_eq!(profile.aod, 0.);
        assert!(profile.aod.is_sign_positive());
        assert!(!profile.converged());
    }
}

#[test]
fn bins_above_the_reference_are_invalid() {
    let grid = grid();
    let flat = Flat::new(1e-5);
    let profile = invert(
        &flat.input(&grid),
        backward(60),
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();
    assert_eq!(profile.valid_count(), 61);
    assert!(profile.valid[61..].iter().all(|&v| !v));
    assert_relative_eq!(profile.extinction[60], 4.5e-4, max_relative = 1e-12);
}

#[test]
fn rejects_invalid_settings() {
    let grid = grid();
    let flat = Flat::new(1e-5);
    let input = flat.input(&grid);
    let options = InversionOptions::default();

    for apriori in [
        Apriori::LidarRatio(0.),
        Apriori::LidarRatio(-50.),
        Apriori::Aod(f64::INFINITY),
    ] {
        assert!(matches!(
            invert(&input, FORWARD, apriori, &options),
            Err(RetrievalError::InvalidApriori(_))
        ));
    }
    assert!(matches!(
        invert(&input, backward(101), Apriori::LidarRatio(50.), &options),
        Err(RetrievalError::Configuration(
            ConfigurationError::ReferenceOutOfRange { index: 101, len: 101 }
        ))
    ));
    let options = InversionOptions {
        max_iterations: 0,
        ..Default::default()
    };
    assert!(invert(&input, FORWARD, Apriori::Aod(0.1), &options).is_err());

    let short = [1e-6; 10];
    assert!(matches!(
        InversionInput::new(&flat.backscatter, &short, &flat.transmission, &grid),
        Err(ConfigurationError::InconsistentShape {
            expected: 101,
            found: 10
        })
    ));
}

/// Signal of a 1.5 km deep layer of 1e-4 m⁻¹ seen with a lidar ratio of
/// 50 sr at 1064 nm.
struct Simulated {
    grid: AltitudeGrid,
    rayleigh: RayleighProfile,
    signal: Vec<f64>,
}

impl Simulated {
    fn new() -> Self {
        use crate::rayleigh::{AltitudeReference, StandardAtmosphere};
        use crate::simulation::{simulate_attenuated_backscatter, step_extinction_model};

        let grid = AltitudeGrid::regular(15., 15., 400).unwrap();
        let rayleigh = RayleighProfile::new(
            &grid,
            AltitudeReference::SeaLevel,
            1064.,
            &StandardAtmosphere::default(),
        )
        .unwrap();
        let extinction = step_extinction_model(grid.levels(), 1500., 1e-4);
        let signal = simulate_attenuated_backscatter(&extinction, &rayleigh, 50., &grid).unwrap();
        Self {
            grid,
            rayleigh,
            signal,
        }
    }

    fn input(&self) -> InversionInput<'_> {
        InversionInput::from_rayleigh(&self.signal, &self.rayleigh, &self.grid).unwrap()
    }
}

#[test]
fn forward_recovers_simulated_layer() {
    let simulated = Simulated::new();
    let profile = invert(
        &simulated.input(),
        FORWARD,
        Apriori::LidarRatio(50.),
        &InversionOptions::default(),
    )
    .unwrap();

    // 99 levels below 1500 m
    for e in &profile.extinction[..99] {
        assert_relative_eq!(*e, 1e-4, max_relative = 1e-6);
    }
    assert!(profile.valid[..99].iter().all(|&v| v));
    assert_relative_eq!(profile.aod, 0.1485, max_relative = 1e-6);
    assert!(profile.converged());
}

#[test]
fn aod_search_on_simulated_layer() {
    let simulated = Simulated::new();
    let options = InversionOptions {
        initial_lidar_ratio: 30.,
        ..Default::default()
    };

    let forward = invert(&simulated.input(), FORWARD, Apriori::Aod(0.1485), &options).unwrap();
    assert!(forward.converged());
    assert_relative_eq!(forward.lidar_ratio, 50., max_relative = 1e-2);
    assert_relative_eq!(forward.aod, 0.1485, max_relative = 1e-3);

    // The simulated layer has no aerosol at the reference bin, but the
    // reference condition attributes Y(r) − β_m(r) to aerosol and ignores
    // the attenuation below, so a larger lidar ratio gives the same AOD
    let klett = invert(&simulated.input(), backward(399), Apriori::Aod(0.1485), &options).unwrap();
    assert!(klett.converged());
    assert_relative_eq!(klett.aod, 0.1485, max_relative = 1e-3);
    assert!(klett.lidar_ratio > 60. && klett.lidar_ratio < 75.);
}
