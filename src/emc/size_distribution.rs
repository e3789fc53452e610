//! Volume and number size distributions built from lognormal modes.

use super::LognormalMode;

/// Smallest radius of the grid, in µm
const RADIUS_MIN: f64 = 1e-2;
/// Largest radius of the grid (exclusive), in µm
const RADIUS_MAX: f64 = 2e1;
/// Radius step, in µm
pub(crate) const RADIUS_STEP: f64 = 1e-3;

/// Size distribution sampled on a linear radius grid.
#[derive(Debug, Clone)]
pub struct SizeDistribution {
    /// Radius in µm
    pub radius: Vec<f64>,
    /// Volume size distribution dV/dln(r), in µm³ µm⁻³
    pub vsd: Vec<f64>,
    /// Number size distribution, in µm⁻³ µm⁻¹
    pub nsd: Vec<f64>,
}

impl SizeDistribution {
    /// Sum the lognormal `modes` on the default radius grid.
    pub fn new(modes: &[LognormalMode]) -> Self {
        let len = ((RADIUS_MAX - RADIUS_MIN) / RADIUS_STEP).round() as usize;
        let radius: Vec<f64> = (0..len)
            .map(|i| RADIUS_MIN + RADIUS_STEP * i as f64)
            .collect();

        let vsd: Vec<f64> = radius
            .iter()
            .map(|&r| modes.iter().map(|mode| mode.volume_density(r)).sum())
            .collect();

        let nsd = radius
            .iter()
            .zip(&vsd)
            .map(|(r, v)| v * 3. / (4. * std::f64::consts::PI * r.powi(4)))
            .collect();

        Self { radius, vsd, nsd }
    }
}

impl LognormalMode {
    /// Volume density of this mode at radius `r` (µm): a gaussian in ln(r).
    pub fn volume_density(&self, r: f64) -> f64 {
        let sigma = self.sigma;
        let offset = r.ln() - self.median_radius.ln();
        self.volume / (sigma * (2. * std::f64::consts::PI).sqrt())
            * f64::exp(-offset.powi(2) / (2. * sigma.powi(2)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_and_peak() {
        let mode = LognormalMode {
            median_radius: 0.5,
            sigma: 0.4,
            volume: 1.,
        };
        let sd = SizeDistribution::new(&[mode]);

        assert_eq!(sd.radius.len(), 19990);
        assert_eq!(sd.vsd.len(), sd.radius.len());

        let peak = sd
            .vsd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| sd.radius[i])
            .unwrap();
        assert!((peak - 0.5).abs() < 2e-3, "{peak}");
        assert!(sd.nsd.iter().all(|&n| n >= 0.));
    }
}
