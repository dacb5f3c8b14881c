//! Objective coefficients for the collective pool problem.
//!
//! All energy-related costs are weighted by the number of real days each step stands for, and
//! investment costs (which are expressed per day) by the number of days the horizon represents.
use crate::backpack::Backpack;
use crate::horizon::Horizon;
use crate::meter::{Meter, MeterID};
use indexmap::IndexMap;

/// Objective coefficients for a single meter
#[derive(Debug, Clone, PartialEq)]
pub struct MeterCostCoefficients {
    /// Cost of each kWh bought from the retailer, per step
    pub retail_purchase: Vec<f64>,
    /// Cost of each kWh sold to the retailer, per step (i.e. minus the revenue)
    pub retail_sale: Vec<f64>,
    /// Cost of each kWh self-consumed from the pool, per step
    pub pool_purchase: Vec<f64>,
    /// Cost of each kWh discharged from storage, per step
    pub degradation: Vec<f64>,
    /// Cost of each kW beyond the meter's maximum power, per step
    pub excess_power: Vec<f64>,
    /// Cost of each kW of generation capacity
    pub generation_capacity: f64,
    /// Cost of each kWh of storage capacity
    pub storage_capacity: f64,
    /// Constant term so that only capacity above the installed values is charged for
    pub installed_capacity_offset: f64,
}

impl MeterCostCoefficients {
    fn new(meter: &Meter, l_grid: &[f64], horizon: &Horizon, nominal_daily_cycles: f64) -> Self {
        let weighted = |values: &[f64], sign: f64| -> Vec<f64> {
            horizon
                .iter_steps()
                .map(|t| sign * horizon.weight(t) * values[t])
                .collect()
        };
        let per_step = |value: f64| -> Vec<f64> {
            horizon
                .iter_steps()
                .map(|t| horizon.weight(t) * value)
                .collect()
        };

        let days = horizon.represented_days();
        let generation_capacity = days * meter.l_gic;
        let storage_capacity = days * meter.l_bic;

        Self {
            retail_purchase: weighted(&meter.l_buy, 1.0),
            retail_sale: weighted(&meter.l_sell, -1.0),
            pool_purchase: weighted(l_grid, 1.0),
            degradation: per_step(meter.degradation_coefficient(nominal_daily_cycles)),
            excess_power: per_step(meter.l_cont),
            generation_capacity,
            storage_capacity,
            installed_capacity_offset: -(generation_capacity * meter.p_gn_init.value()
                + storage_capacity * meter.e_bn_init.value()),
        }
    }
}

/// Objective coefficients for every meter of the community
#[derive(Debug, Clone, PartialEq)]
pub struct CostCoefficients(IndexMap<MeterID, MeterCostCoefficients>);

impl CostCoefficients {
    /// Calculate the cost coefficients for a resolved backpack
    pub fn new(backpack: &Backpack, horizon: &Horizon) -> Self {
        Self(
            backpack
                .meters
                .iter()
                .map(|(id, meter)| {
                    let coeffs = MeterCostCoefficients::new(
                        meter,
                        &backpack.l_grid,
                        horizon,
                        backpack.nominal_daily_cycles,
                    );
                    (id.clone(), coeffs)
                })
                .collect(),
        )
    }

    /// Get the coefficients for the given meter
    pub fn get(&self, meter_id: &MeterID) -> &MeterCostCoefficients {
        &self.0[meter_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::backpack;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_cost_coefficients(mut backpack: Backpack) {
        backpack.nr_days = 2.0;
        backpack.delta_t = crate::units::Hours(12.0);
        backpack.day_weights = Some(vec![3.0, 1.0]);
        backpack.nominal_daily_cycles = 2.0;
        let horizon = backpack.resolve().unwrap();
        let costs = CostCoefficients::new(&backpack, &horizon);

        let (id, meter) = backpack.meters.first().unwrap();
        let coeffs = costs.get(id);
        assert_approx_eq!(f64, coeffs.retail_purchase[0], 3.0 * meter.l_buy[0]);
        assert_approx_eq!(f64, coeffs.retail_purchase[3], meter.l_buy[3]);
        assert_approx_eq!(f64, coeffs.retail_sale[1], -3.0 * meter.l_sell[1]);
        assert_approx_eq!(f64, coeffs.pool_purchase[2], backpack.l_grid[2]);
        assert_approx_eq!(f64, coeffs.degradation[0], 3.0 * meter.l_bic / 2.0);
        assert_approx_eq!(f64, coeffs.generation_capacity, 4.0 * meter.l_gic);
        assert_approx_eq!(
            f64,
            coeffs.installed_capacity_offset,
            -4.0 * (meter.l_gic * meter.p_gn_init.value() + meter.l_bic * meter.e_bn_init.value())
        );
    }
}
