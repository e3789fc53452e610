//! Vertical axis of a profile.

use crate::error::ConfigurationError;

/// Bin thickness of a single level at or below the altitude reference, in m
pub const SINGLE_LEVEL_RESOLUTION: f64 = 1.;

/// Ascending altitude levels in m, with the vertical resolution used as bin
/// thickness for optical depth integrals.
#[derive(Debug, Clone, PartialEq)]
pub struct AltitudeGrid {
    levels: Vec<f64>,
    resolution: f64,
}

impl AltitudeGrid {
    /// Validate the levels and infer the resolution.
    ///
    /// The resolution is the smallest spacing between consecutive levels. A
    /// single level is taken to represent the column below it, so its
    /// altitude is the resolution. A single level at or below zero has no
    /// such column and gets [`SINGLE_LEVEL_RESOLUTION`]. Use
    /// [`AltitudeGrid::with_resolution`] when neither holds.
    pub fn new(levels: Vec<f64>) -> Result<Self, ConfigurationError> {
        check_levels(&levels)?;
        let resolution = if levels.len() == 1 {
            if levels[0] > 0. {
                levels[0]
            } else {
                SINGLE_LEVEL_RESOLUTION
            }
        } else {
            levels
                .windows(2)
                .map(|pair| pair[1] - pair[0])
                .fold(f64::INFINITY, f64::min)
        };
        Self::with_resolution(levels, resolution)
    }

    /// Validate the levels and use an explicit resolution in m.
    pub fn with_resolution(levels: Vec<f64>, resolution: f64) -> Result<Self, ConfigurationError> {
        check_levels(&levels)?;
        if !(resolution.is_finite() && resolution > 0.) {
            return Err(ConfigurationError::InvalidResolution(resolution));
        }
        Ok(Self { levels, resolution })
    }

    /// Evenly spaced levels starting at `start`.
    pub fn regular(start: f64, step: f64, len: usize) -> Result<Self, ConfigurationError> {
        let levels = (0..len).map(|i| start + step * i as f64).collect();
        Self::with_resolution(levels, step)
    }

    /// Altitude levels in m.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Bin thickness in m.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Always false for a validated grid, kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Index of the level closest to `altitude` (same reference as the grid).
    pub fn closest_index(&self, altitude: f64) -> usize {
        self.levels
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - altitude).abs().total_cmp(&(*b - altitude).abs()))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }
}

fn check_levels(levels: &[f64]) -> Result<(), ConfigurationError> {
    if levels.is_empty() {
        return Err(ConfigurationError::EmptyAltitudeGrid);
    }
    if let Some(index) = levels.iter().position(|z| !z.is_finite()) {
        return Err(ConfigurationError::NonMonotonicAltitude { index });
    }
    if let Some(index) = (1..levels.len()).find(|&i| levels[i] <= levels[i - 1]) {
        return Err(ConfigurationError::NonMonotonicAltitude { index });
    }
    Ok(())
}
