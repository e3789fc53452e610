//! Extinction to mass concentration conversion.

use crate::error::{RetrievalError, RetrievalResult};

/// Grams to micrograms
const UG_PER_G: f64 = 1e6;

/// Extinction-to-mass coefficient (EMC), in m² g⁻¹.
#[derive(Debug, Clone, PartialEq)]
pub enum Coefficient {
    /// Same coefficient at every altitude
    Scalar(f64),
    /// One coefficient per altitude bin
    Profile(Vec<f64>),
}

impl Coefficient {
    fn at(&self, index: usize) -> f64 {
        match self {
            Coefficient::Scalar(value) => *value,
            Coefficient::Profile(values) => values[index],
        }
    }

    fn check_len(&self, expected: usize) -> RetrievalResult<()> {
        match self {
            Coefficient::Profile(values) if values.len() != expected => {
                Err(RetrievalError::DimensionMismatch {
                    expected,
                    found: values.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Mass concentration profile of one aerosol type.
#[derive(Debug, Clone, PartialEq)]
pub struct MassConcentration {
    /// Mass concentration in µg m⁻³, `NaN` where invalid
    pub concentration: Vec<f64>,
    /// Validity mask, carried over from the extinction profile
    pub valid: Vec<bool>,
}

impl MassConcentration {
    /// Units of `concentration`.
    pub const UNITS: &'static str = "µg m-3";
}

/// Convert an extinction profile (m⁻¹) to mass concentration (µg m⁻³).
///
/// Bins that are invalid on input, or whose coefficient is not positive and
/// finite, come out invalid.
pub fn to_mass_concentration(
    extinction: &[f64],
    valid: &[bool],
    coefficient: &Coefficient,
) -> RetrievalResult<MassConcentration> {
    convert(extinction, valid, coefficient, |e, emc| e / emc * UG_PER_G)
        .map(|(concentration, valid)| MassConcentration {
            concentration,
            valid,
        })
}

/// Inverse of [`to_mass_concentration`]: extinction in m⁻¹ from a mass
/// concentration in µg m⁻³.
pub fn to_extinction(
    concentration: &MassConcentration,
    coefficient: &Coefficient,
) -> RetrievalResult<(Vec<f64>, Vec<bool>)> {
    convert(
        &concentration.concentration,
        &concentration.valid,
        coefficient,
        |m, emc| m / UG_PER_G * emc,
    )
}

fn convert<F>(
    values: &[f64],
    valid: &[bool],
    coefficient: &Coefficient,
    f: F,
) -> RetrievalResult<(Vec<f64>, Vec<bool>)>
where
    F: Fn(f64, f64) -> f64,
{
    let len = values.len();
    if valid.len() != len {
        return Err(RetrievalError::DimensionMismatch {
            expected: len,
            found: valid.len(),
        });
    }
    coefficient.check_len(len)?;

    let (converted, mask) = values
        .iter()
        .zip(valid)
        .enumerate()
        .map(|(i, (&value, &is_valid))| {
            let emc = coefficient.at(i);
            let result = f(value, emc);
            if is_valid && emc.is_finite() && emc > 0. && result.is_finite() {
                (result, true)
            } else {
                (f64::NAN, false)
            }
        })
        .unzip();
    Ok((converted, mask))
}
