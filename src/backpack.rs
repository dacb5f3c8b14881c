//! The backpack: the complete input for one optimisation of a community.
//!
//! A backpack is read from a TOML file and must be resolved (i.e. validated) into a [`Horizon`]
//! before a model can be built from it.
use crate::horizon::Horizon;
use crate::input::read_toml;
use crate::meter::{MeterID, MeterMap};
use crate::units::Hours;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::path::Path;

/// Default for the number of full equivalent cycles per day paid for by the storage investment
fn default_nominal_daily_cycles() -> f64 {
    1.0
}

/// Indicates that the backpack is malformed or inconsistent
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationError {
    /// The meter the error relates to, if any
    pub meter: Option<MeterID>,
    /// The offending field
    pub field: &'static str,
    /// What is wrong with it
    pub message: String,
}

impl ConfigurationError {
    /// Create a new error for a community-level field
    pub fn new(field: &'static str, message: String) -> Self {
        Self {
            meter: None,
            field,
            message,
        }
    }

    /// Create a new error for a field of the given meter
    pub fn for_meter(meter: &MeterID, field: &'static str, message: String) -> Self {
        Self {
            meter: Some(meter.clone()),
            field,
            message,
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.meter {
            Some(meter) => write!(
                f,
                "Invalid configuration for meter {meter}, field `{}`: {}",
                self.field, self.message
            ),
            None => write!(
                f,
                "Invalid configuration, field `{}`: {}",
                self.field, self.message
            ),
        }
    }
}

impl Error for ConfigurationError {}

/// Input data for the collective pool optimisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Backpack {
    /// Number of days covered by the time series
    pub nr_days: f64,
    /// Length of each step
    pub delta_t: Hours,
    /// Tariff applied to energy self-consumed within the community (€/kWh)
    pub l_grid: Vec<f64>,
    /// Ratio between the maximum storage power and storage capacity (kW/kWh)
    pub storage_ratio: f64,
    /// Whether allocation coefficients must be strictly positive once active
    pub strict_pos_coeffs: bool,
    /// Whether surplus must be shared with consuming members before being sold
    pub total_share_coeffs: bool,
    /// Number of real days represented by each day of the series
    #[serde(default)]
    pub day_weights: Option<Vec<f64>>,
    /// Number of full equivalent storage cycles per day paid for by the storage investment cost
    #[serde(default = "default_nominal_daily_cycles")]
    pub nominal_daily_cycles: f64,
    /// The members of the community
    pub meters: MeterMap,
}

impl Backpack {
    /// Read a backpack from a TOML file
    pub fn from_path(file_path: &Path) -> Result<Self> {
        read_toml(file_path)
    }

    /// Validate the backpack and get the planning horizon it describes.
    ///
    /// No optimisation problem should be built from a backpack which fails to resolve.
    pub fn resolve(&self) -> Result<Horizon, ConfigurationError> {
        let horizon = Horizon::new(self.nr_days, self.delta_t, self.day_weights.as_deref())?;

        if self.l_grid.len() != horizon.len() {
            return Err(ConfigurationError::new(
                "l_grid",
                format!(
                    "expected {} values but found {}",
                    horizon.len(),
                    self.l_grid.len()
                ),
            ));
        }
        if self.l_grid.iter().any(|value| !value.is_finite()) {
            return Err(ConfigurationError::new(
                "l_grid",
                "all values must be finite".into(),
            ));
        }
        if !(self.storage_ratio.is_finite() && self.storage_ratio > 0.0) {
            return Err(ConfigurationError::new(
                "storage_ratio",
                "must be a finite number greater than zero".into(),
            ));
        }
        if !(self.nominal_daily_cycles.is_finite() && self.nominal_daily_cycles > 0.0) {
            return Err(ConfigurationError::new(
                "nominal_daily_cycles",
                "must be a finite number greater than zero".into(),
            ));
        }
        if self.meters.is_empty() {
            return Err(ConfigurationError::new(
                "meters",
                "at least one meter is required".into(),
            ));
        }

        for (id, meter) in &self.meters {
            meter.validate(id, horizon.len())?;
        }

        Ok(horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{backpack, meter};
    use crate::meter::Meter;
    use indexmap::IndexMap;
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    #[rstest]
    fn test_resolve(backpack: Backpack) {
        let horizon = backpack.resolve().unwrap();
        assert_eq!(horizon.len(), 4);
    }

    #[rstest]
    fn test_resolve_bad_l_grid(mut backpack: Backpack) {
        backpack.l_grid.pop();
        let err = backpack.resolve().unwrap_err();
        assert_eq!(err.field, "l_grid");
        assert_eq!(
            err.to_string(),
            "Invalid configuration, field `l_grid`: expected 4 values but found 3"
        );
    }

    #[rstest]
    fn test_resolve_too_many_days(mut backpack: Backpack) {
        backpack.nr_days = 1e13;
        let err = backpack.resolve().unwrap_err();
        assert_eq!(err.field, "l_grid");
        assert!(err.meter.is_none());
    }

    #[rstest]
    fn test_resolve_no_meters(mut backpack: Backpack) {
        backpack.meters = IndexMap::new();
        assert_eq!(backpack.resolve().unwrap_err().field, "meters");
    }

    #[rstest]
    fn test_resolve_bad_storage_ratio(mut backpack: Backpack) {
        backpack.storage_ratio = 0.0;
        assert_eq!(backpack.resolve().unwrap_err().field, "storage_ratio");
    }

    #[rstest]
    fn test_resolve_names_meter(mut backpack: Backpack, mut meter: Meter) {
        meter.l_sell.push(0.1);
        backpack.meters.insert("CPE#9".into(), meter);
        let err = backpack.resolve().unwrap_err();
        assert_eq!(err.meter, Some("CPE#9".into()));
        assert_eq!(err.field, "l_sell");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for meter CPE#9, field `l_sell`: expected 4 values but found 5"
        );
    }

    #[rstest]
    fn test_backpack_from_path(backpack: Backpack) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("backpack.toml");
        fs::write(&file_path, toml::to_string(&backpack).unwrap()).unwrap();

        assert_eq!(Backpack::from_path(&file_path).unwrap(), backpack);
    }

    #[test]
    fn test_backpack_defaults() {
        let backpack: Backpack = toml::from_str(
            r#"
            nr_days = 1
            delta_t = 24
            l_grid = [0.01]
            storage_ratio = 1.0
            strict_pos_coeffs = false
            total_share_coeffs = false

            [meters."CPE#1"]
            e_c = [1.0]
            e_g_factor = [0.0]
            l_buy = [0.1]
            l_sell = [0.05]
            l_cont = 0.0
            l_gic = 0.0
            l_bic = 0.0
            p_meter_max = 10.0
            p_gn_init = 0.0
            e_bn_init = 0.0
            soc_min = 0.0
            soc_max = 1.0
            eff_bc = 1.0
            eff_bd = 1.0
            "#,
        )
        .unwrap();

        assert_eq!(backpack.nominal_daily_cycles, 1.0);
        assert!(backpack.day_weights.is_none());
        assert!(backpack.meters["CPE#1"].p_gn_max.is_none());
        assert_eq!(backpack.resolve().unwrap().len(), 1);
    }
}
