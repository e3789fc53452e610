//! In-place correction steps applied before the retrieval.

use super::signal::{convolve_reflect, gaussian_kernel, rolling_median, rolling_snr};
use super::{AttributeValue, BackscatterUnits, DerivedData, DerivedVariable, Profile};
use crate::error::ConfigurationError;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};

impl Profile {
    /// Multiply the signal by the squared range from the instrument, to undo
    /// the 1/z² decrease of the collected power.
    ///
    /// Do not apply it twice. The units become arbitrary.
    pub fn range_correction(&mut self) {
        let levels = self.grid.levels().to_vec();
        for (mut row, station) in self
            .attenuated_backscatter
            .outer_iter_mut()
            .zip(&self.stations)
        {
            for (value, level) in row.iter_mut().zip(&levels) {
                let range = level - station.altitude;
                *value *= range * range;
            }
        }
        self.units = BackscatterUnits::Arbitrary;
        self.set_attribute("range_correction", AttributeValue::Flag(true));
    }

    /// Replace the signal below `altitude` m above ground by the value at
    /// that altitude.
    ///
    /// The lowest layers of many ceilometers are perturbed by the overlap
    /// function and after-pulses; 150 m is a typical choice.
    pub fn extrapolate_below(&mut self, altitude: f64) {
        for (i, mut row) in self.attenuated_backscatter.outer_iter_mut().enumerate() {
            let top = self.grid.closest_index(altitude + self.stations[i].altitude);
            let value = row[top];
            row.slice_mut(ndarray::s![..top]).fill(value);
        }
        self.set_attribute(
            "extrapolation_low_layers_altitude_agl",
            AttributeValue::Number(altitude),
        );
        self.set_attribute(
            "extrapolation_low_layers_method",
            AttributeValue::Text("cst".to_string()),
        );
    }

    /// Take the absolute value of the signal below `altitude` m above
    /// ground, undoing the sign flips of a saturated detector under low
    /// clouds.
    pub fn desaturate_below(&mut self, altitude: f64) {
        for (i, mut row) in self.attenuated_backscatter.outer_iter_mut().enumerate() {
            let top = self.grid.closest_index(altitude + self.stations[i].altitude);
            row.slice_mut(ndarray::s![..top]).mapv_inplace(f64::abs);
        }
        self.set_attribute("desaturated", AttributeValue::Flag(true));
    }

    /// Smooth the signal with a 2-D gaussian filter. `sigma` is the standard
    /// deviation of the kernel in samples, along time and along altitude.
    ///
    /// The kernel is truncated at 4σ and the borders are reflected. Missing
    /// values spread to their neighbours.
    pub fn gaussian_filter(&mut self, sigma: (f64, f64)) -> Result<(), ConfigurationError> {
        if [sigma.0, sigma.1].iter().any(|s| !(s.is_finite() && *s >= 0.)) {
            return Err(ConfigurationError::InvalidSetting(
                "gaussian filter width must be non-negative",
            ));
        }

        for (axis, sigma) in [(Axis(0), sigma.0), (Axis(1), sigma.1)] {
            let kernel = gaussian_kernel(sigma);
            if kernel.len() == 1 {
                continue;
            }
            for mut lane in self.attenuated_backscatter.lanes_mut(axis) {
                let filtered = convolve_reflect(&lane.to_vec(), &kernel);
                lane.assign(&ArrayView1::from(filtered.as_slice()));
            }
        }

        let label = if sigma.0 == sigma.1 {
            AttributeValue::Number(sigma.0)
        } else {
            AttributeValue::Text(format!("{}, {}", sigma.0, sigma.1))
        };
        self.set_attribute("gaussian_filter", label);
        Ok(())
    }

    /// Rolling median of the signal over `minutes`, centred on each time
    /// step.
    pub fn time_average(&mut self, minutes: f64) -> Result<(), ConfigurationError> {
        self.attenuated_backscatter = self.time_averaged(minutes)?;
        self.set_attribute("time_averaged_minutes", AttributeValue::Number(minutes));
        Ok(())
    }

    /// Copy of the signal with a rolling median over `minutes`.
    pub fn time_averaged(&self, minutes: f64) -> Result<Array2<f64>, ConfigurationError> {
        if !(minutes.is_finite() && minutes >= 0.) {
            return Err(ConfigurationError::InvalidSetting(
                "time averaging window must be non-negative",
            ));
        }

        let window = match self.time_resolution() {
            Some(resolution) if resolution.num_milliseconds() > 0 => {
                let seconds = resolution.num_milliseconds() as f64 * 1e-3;
                ((minutes * 60. / seconds).round() as usize).max(1)
            }
            _ => 1,
        };
        debug!("time averaging over {window} profiles");

        let mut averaged = self.attenuated_backscatter.clone();
        if window > 1 {
            for mut column in averaged.lanes_mut(Axis(0)) {
                let median = rolling_median(&column.to_vec(), window);
                column.assign(&Array1::from(median));
            }
        }
        Ok(averaged)
    }

    /// Attach the signal to noise ratio as the `snr` variable. Each bin uses
    /// `step` bins on either side; bins too close to the ends are `NaN`.
    pub fn snr(&mut self, step: usize) -> Result<(), ConfigurationError> {
        let mut values = Array2::from_elem(self.attenuated_backscatter.dim(), f64::NAN);
        for (mut out, row) in values
            .outer_iter_mut()
            .zip(self.attenuated_backscatter.outer_iter())
        {
            let snr = rolling_snr(&row.to_vec(), step);
            out.assign(&ArrayView1::from(snr.as_slice()));
        }
        let valid = values.mapv(f64::is_finite);

        let variable = DerivedVariable::new(
            DerivedData::Profiles { values, valid },
            "Signal to Noise Ratio",
            "",
        )
        .with_attribute("step", AttributeValue::Number(step as f64));
        self.insert_derived("snr", variable)
    }
}
