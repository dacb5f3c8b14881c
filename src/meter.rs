//! Meters are the members of the energy community.
//!
//! Each meter carries its own forecasts, tariffs and the installed and admissible capacities of
//! its generation and storage assets.
use crate::backpack::ConfigurationError;
use crate::id::define_id_type;
use crate::units::{Energy, Power};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

define_id_type! {MeterID}

/// A map of meters, keyed by meter ID.
///
/// The order of entries is preserved, so it also fixes the order in which meters appear in the
/// optimisation problem and in output files.
pub type MeterMap = IndexMap<MeterID, Meter>;

/// A member of the community, as described in the backpack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Meter {
    /// Forecasted consumption behind the meter in each step (kWh)
    pub e_c: Vec<f64>,
    /// Generation profile factor for the meter's location (kWh per installed kW in each step)
    pub e_g_factor: Vec<f64>,
    /// Opportunity cost of buying energy from the retailer (€/kWh)
    pub l_buy: Vec<f64>,
    /// Opportunity cost of selling energy to the retailer (€/kWh)
    pub l_sell: Vec<f64>,
    /// Contracted power tariff, adjusted to one day (€/kW).
    ///
    /// Applied to any power beyond `p_meter_max` in each step.
    pub l_cont: f64,
    /// Investment cost for additional generation capacity, adjusted to one day (€/kW)
    pub l_gic: f64,
    /// Investment cost for additional storage capacity, adjusted to one day (€/kWh)
    pub l_bic: f64,
    /// The maximum power the connection can safely handle
    pub p_meter_max: Power,
    /// Installed generation capacity
    pub p_gn_init: Power,
    /// Minimum generation capacity (install mode only)
    pub p_gn_min: Option<Power>,
    /// Maximum generation capacity (install mode only)
    pub p_gn_max: Option<Power>,
    /// Installed storage capacity
    pub e_bn_init: Energy,
    /// Minimum storage capacity (install mode only)
    pub e_bn_min: Option<Energy>,
    /// Maximum storage capacity (install mode only)
    pub e_bn_max: Option<Energy>,
    /// Minimum energy content as a fraction of storage capacity
    pub soc_min: f64,
    /// Maximum energy content as a fraction of storage capacity
    pub soc_max: f64,
    /// Charging efficiency of the storage
    pub eff_bc: f64,
    /// Discharging efficiency of the storage
    pub eff_bd: f64,
}

/// Get the admissible range for a capacity, falling back on the installed value
fn capacity_bounds<T: Copy>(init: T, min: Option<T>, max: Option<T>) -> RangeInclusive<T> {
    match (min, max) {
        (Some(min), Some(max)) => min..=max,
        _ => init..=init,
    }
}

impl Meter {
    /// The admissible range for generation capacity
    pub fn generation_bounds(&self) -> RangeInclusive<Power> {
        capacity_bounds(self.p_gn_init, self.p_gn_min, self.p_gn_max)
    }

    /// The admissible range for storage capacity
    pub fn storage_bounds(&self) -> RangeInclusive<Energy> {
        capacity_bounds(self.e_bn_init, self.e_bn_min, self.e_bn_max)
    }

    /// Whether the meter has, or may install, any storage
    pub fn has_storage(&self) -> bool {
        *self.storage_bounds().end() > Energy(0.0)
    }

    /// Cost of each kWh discharged from storage (€/kWh).
    ///
    /// The daily storage investment cost pays for `nominal_daily_cycles` full equivalent cycles,
    /// so each discharged kWh wears out `1 / nominal_daily_cycles` of a day's worth of capacity.
    pub fn degradation_coefficient(&self, nominal_daily_cycles: f64) -> f64 {
        self.l_bic / nominal_daily_cycles
    }

    /// Check that the meter's data are consistent with a horizon of `steps` steps
    pub fn validate(&self, id: &MeterID, steps: usize) -> Result<(), ConfigurationError> {
        let err = |field: &'static str, message: String| {
            Err(ConfigurationError::for_meter(id, field, message))
        };

        for (field, series) in [
            ("e_c", &self.e_c),
            ("e_g_factor", &self.e_g_factor),
            ("l_buy", &self.l_buy),
            ("l_sell", &self.l_sell),
        ] {
            if series.len() != steps {
                return err(
                    field,
                    format!("expected {steps} values but found {}", series.len()),
                );
            }
            if let Some(step) = series.iter().position(|value| !value.is_finite()) {
                return err(field, format!("value at step {step} is not finite"));
            }
        }

        for (field, series) in [("e_c", &self.e_c), ("e_g_factor", &self.e_g_factor)] {
            if let Some(step) = series.iter().position(|value| *value < 0.0) {
                return err(field, format!("value at step {step} is negative"));
            }
        }

        for (field, value) in [
            ("l_cont", self.l_cont),
            ("l_gic", self.l_gic),
            ("l_bic", self.l_bic),
            ("p_meter_max", self.p_meter_max.value()),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return err(field, "must be a finite, non-negative number".into());
            }
        }

        check_capacity(
            id,
            ("p_gn_init", "p_gn_min", "p_gn_max"),
            self.p_gn_init.value(),
            self.p_gn_min.map(Power::value),
            self.p_gn_max.map(Power::value),
        )?;
        check_capacity(
            id,
            ("e_bn_init", "e_bn_min", "e_bn_max"),
            self.e_bn_init.value(),
            self.e_bn_min.map(Energy::value),
            self.e_bn_max.map(Energy::value),
        )?;

        if !(0.0..=1.0).contains(&self.soc_min) {
            return err("soc_min", "must be between 0 and 1".into());
        }
        if !(0.0..=1.0).contains(&self.soc_max) {
            return err("soc_max", "must be between 0 and 1".into());
        }
        if self.soc_min > self.soc_max {
            return err("soc_min", "cannot be greater than soc_max".into());
        }

        for (field, value) in [("eff_bc", self.eff_bc), ("eff_bd", self.eff_bd)] {
            if !(value > 0.0 && value <= 1.0) {
                return err(field, "must be in the range (0, 1]".into());
            }
        }

        Ok(())
    }
}

/// Check an installed capacity and its (optional) admissible bounds
fn check_capacity(
    id: &MeterID,
    (init_field, min_field, max_field): (&'static str, &'static str, &'static str),
    init: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<(), ConfigurationError> {
    let err = |field, message: &str| Err(ConfigurationError::for_meter(id, field, message.into()));

    if !(init.is_finite() && init >= 0.0) {
        return err(init_field, "must be a finite, non-negative number");
    }

    match (min, max) {
        (None, None) => Ok(()),
        (Some(_), None) => err(max_field, "must be provided together with the minimum"),
        (None, Some(_)) => err(min_field, "must be provided together with the maximum"),
        (Some(min), Some(max)) => {
            if !(min.is_finite() && min >= 0.0) {
                return err(min_field, "must be a finite, non-negative number");
            }
            if !max.is_finite() {
                return err(max_field, "must be a finite number");
            }
            if min > max {
                return err(min_field, "cannot be greater than the maximum");
            }

            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::meter;
    use rstest::rstest;

    #[rstest]
    fn test_validate_ok(meter: Meter) {
        assert!(meter.validate(&"CPE#1".into(), 4).is_ok());
    }

    #[rstest]
    fn test_validate_wrong_length(meter: Meter) {
        let err = meter.validate(&"CPE#1".into(), 5).unwrap_err();
        assert_eq!(err.meter, Some("CPE#1".into()));
        assert_eq!(err.field, "e_c");
    }

    #[rstest]
    #[case::soc_inverted(|m: &mut Meter| { m.soc_min = 0.9; m.soc_max = 0.1; }, "soc_min")]
    #[case::soc_out_of_range(|m: &mut Meter| m.soc_max = 1.5, "soc_max")]
    #[case::zero_efficiency(|m: &mut Meter| m.eff_bc = 0.0, "eff_bc")]
    #[case::efficiency_above_one(|m: &mut Meter| m.eff_bd = 1.1, "eff_bd")]
    #[case::generation_inverted(
        |m: &mut Meter| { m.p_gn_min = Some(Power(5.0)); m.p_gn_max = Some(Power(1.0)); },
        "p_gn_min"
    )]
    #[case::storage_inverted(
        |m: &mut Meter| { m.e_bn_min = Some(Energy(5.0)); m.e_bn_max = Some(Energy(1.0)); },
        "e_bn_min"
    )]
    #[case::storage_half_bounds(|m: &mut Meter| m.e_bn_min = Some(Energy(1.0)), "e_bn_max")]
    #[case::negative_consumption(|m: &mut Meter| m.e_c[2] = -1.0, "e_c")]
    #[case::nan_tariff(|m: &mut Meter| m.l_buy[0] = f64::NAN, "l_buy")]
    #[case::negative_contracted_power_tariff(|m: &mut Meter| m.l_cont = -1.0, "l_cont")]
    fn test_validate_bad_field(
        mut meter: Meter,
        #[case] modify: fn(&mut Meter),
        #[case] field: &str,
    ) {
        modify(&mut meter);
        let err = meter.validate(&"CPE#1".into(), 4).unwrap_err();
        assert_eq!(err.field, field);
    }

    #[rstest]
    fn test_capacity_bounds(mut meter: Meter) {
        // Non-install mode: fixed to the installed values
        assert_eq!(meter.generation_bounds(), Power(2.0)..=Power(2.0));
        assert!(meter.has_storage());

        meter.e_bn_init = Energy(0.0);
        assert!(!meter.has_storage());

        meter.e_bn_min = Some(Energy(0.0));
        meter.e_bn_max = Some(Energy(10.0));
        assert_eq!(meter.storage_bounds(), Energy(0.0)..=Energy(10.0));
        assert!(meter.has_storage());
    }

    #[rstest]
    fn test_degradation_coefficient(meter: Meter) {
        assert_eq!(meter.degradation_coefficient(1.0), meter.l_bic);
        assert_eq!(meter.degradation_coefficient(2.0), meter.l_bic / 2.0);
    }
}
