//! A-priori constraints that close the lidar equation.

use crate::config::AerosolTable;
use crate::error::{RetrievalError, RetrievalResult};

/// Lidar ratio used when nothing better is known, in sr.
pub const DEFAULT_LIDAR_RATIO: f64 = 50.;

/// The one constraint used by an inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Apriori {
    /// Fixed aerosol lidar ratio, in sr
    LidarRatio(f64),
    /// Target column aerosol optical depth (unitless)
    Aod(f64),
}

impl Apriori {
    /// The scalar carried by the constraint.
    pub fn value(self) -> f64 {
        match self {
            Apriori::LidarRatio(value) | Apriori::Aod(value) => value,
        }
    }

    /// Name of the constrained variable, as stored in output metadata.
    pub fn variable(self) -> &'static str {
        match self {
            Apriori::LidarRatio(_) => "lr",
            Apriori::Aod(_) => "aod",
        }
    }

    /// Check the value is positive and finite.
    pub fn validated(self) -> RetrievalResult<Self> {
        let value = self.value();
        if value.is_finite() && value > 0. {
            Ok(self)
        } else {
            Err(RetrievalError::InvalidApriori(value))
        }
    }
}

/// Resolves the a-priori of a retrieval from the aerosol table, unless the
/// caller overrides it.
#[derive(Debug, Clone, Copy)]
pub struct AprioriProvider<'a> {
    table: &'a AerosolTable,
}

impl<'a> AprioriProvider<'a> {
    /// Provider backed by `table`.
    pub fn new(table: &'a AerosolTable) -> Self {
        Self { table }
    }

    /// The constraint for `aerosol_type`: the override when given, otherwise
    /// the type's configured lidar ratio.
    pub fn resolve(
        &self,
        aerosol_type: &str,
        override_value: Option<Apriori>,
    ) -> RetrievalResult<Apriori> {
        match override_value {
            Some(apriori) => apriori.validated(),
            None => self
                .table
                .get(aerosol_type)
                .map(|properties| Apriori::LidarRatio(properties.lidar_ratio))
                .ok_or_else(|| RetrievalError::UnknownAerosolType(aerosol_type.to_string()))?
                .validated(),
        }
    }

    /// Starting lidar ratio for an AOD-constrained search.
    pub fn initial_lidar_ratio(&self, aerosol_type: &str) -> f64 {
        self.table
            .get(aerosol_type)
            .map_or(DEFAULT_LIDAR_RATIO, |properties| properties.lidar_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_from_table_or_override() {
        let table = AerosolTable::builtin().unwrap();
        let provider = AprioriProvider::new(&table);

        assert_eq!(
            provider.resolve("urban", None).unwrap(),
            Apriori::LidarRatio(55.)
        );
        assert_eq!(
            provider.resolve("urban", Some(Apriori::Aod(0.2))).unwrap(),
            Apriori::Aod(0.2)
        );
        // Overrides do not need a configured type
        assert_eq!(
            provider
                .resolve("sea_salt", Some(Apriori::LidarRatio(25.)))
                .unwrap()
                .value(),
            25.
        );
    }

    #[test]
    fn errors() {
        let table = AerosolTable::builtin().unwrap();
        let provider = AprioriProvider::new(&table);

        assert!(matches!(
            provider.resolve("sea_salt", None),
            Err(RetrievalError::UnknownAerosolType(name)) if name == "sea_salt"
        ));
        assert!(matches!(
            provider.resolve("urban", Some(Apriori::LidarRatio(0.))),
            Err(RetrievalError::InvalidApriori(_))
        ));
        assert!(matches!(
            Apriori::Aod(f64::NAN).validated(),
            Err(RetrievalError::InvalidApriori(_))
        ));
        assert_eq!(provider.initial_lidar_ratio("sea_salt"), DEFAULT_LIDAR_RATIO);
    }
}
