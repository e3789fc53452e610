//! Mie extinction efficiency for homogeneous spheres.
//!
//! Series from Bohren and Huffman (1983), appendix A (BHMIE), keeping only
//! the terms needed for extinction. The logarithmic derivative is computed
//! with downward recurrence, which stays stable for absorbing particles.

use num_complex::Complex64;

/// Extinction efficiency `Q_ext` for a relative refractive index `m` and a
/// size parameter `x = 2πr/λ`.
///
/// The imaginary part of `m` must be non-negative for absorbing particles
/// (`m = n + ik`).
pub(crate) fn extinction_efficiency(m: Complex64, x: f64) -> f64 {
    if !(x.is_finite() && x > 0.) {
        return 0.;
    }

    // Number of terms in the series (Wiscombe criterion as used in BHMIE)
    let nstop = (x + 4. * x.cbrt() + 2.) as usize;
    let y = m * x;
    let nmx = nstop.max(y.norm() as usize) + 15;

    let mut d = vec![Complex64::new(0., 0.); nmx + 1];
    for n in (2..=nmx).rev() {
        let en = n as f64;
        d[n - 1] = en / y - 1. / (d[n] + en / y);
    }

    let (sin_x, cos_x) = x.sin_cos();
    let mut psi0 = cos_x;
    let mut psi1 = sin_x;
    let mut chi0 = -sin_x;
    let mut chi1 = cos_x;
    let mut xi1 = Complex64::new(psi1, -chi1);

    let mut sum = 0.;
    for n in 1..=nstop {
        let en = n as f64;
        let psi = (2. * en - 1.) * psi1 / x - psi0;
        let chi = (2. * en - 1.) * chi1 / x - chi0;
        let xi = Complex64::new(psi, -chi);

        let da = d[n] / m + en / x;
        let db = m * d[n] + en / x;
        let an = (da * psi - psi1) / (da * xi - xi1);
        let bn = (db * psi - psi1) / (db * xi - xi1);
        sum += (2. * en + 1.) * (an + bn).re;

        psi0 = psi1;
        psi1 = psi;
        chi0 = chi1;
        chi1 = chi;
        xi1 = Complex64::new(psi1, -chi1);
    }

    2. / x.powi(2) * sum
}
