//! Decision variables of the collective pool problem.
use super::costs::{CostCoefficients, MeterCostCoefficients};
use super::problem::{LinearProblem, Variable};
use crate::backpack::Backpack;
use crate::horizon::Horizon;
use crate::meter::{Meter, MeterID};
use indexmap::IndexMap;

const INF: f64 = f64::INFINITY;

/// Storage variables for one meter in one step
#[derive(Debug, Clone, Copy)]
pub struct StorageVariables {
    /// Energy charged
    pub e_bc: Variable,
    /// Energy discharged
    pub e_bd: Variable,
    /// Energy content at the end of the step
    pub e_bat: Variable,
    /// 1 if charging, 0 if discharging
    pub delta_bc: Variable,
}

/// Variables for one meter in one step
#[derive(Debug, Clone, Copy)]
pub struct StepVariables {
    /// Energy bought from the retailer
    pub e_sup_retail: Variable,
    /// Energy sold to the retailer
    pub e_sur_retail: Variable,
    /// Energy bought from (and self-consumed within) the pool
    pub e_pur_pool: Variable,
    /// Energy sold to the pool
    pub e_sale_pool: Variable,
    /// Share of the community's surplus allocated to the meter
    pub e_alc: Variable,
    /// Net load at the meter (positive for imports)
    pub e_cmet: Variable,
    /// Power beyond the meter's maximum
    pub p_extra: Variable,
    /// 1 if importing, 0 if exporting
    pub delta_sup: Variable,
    /// 1 if the meter has an active allocation
    pub delta_alc: Variable,
    /// 1 if self-consumption is limited by the allocation, 0 if by the withdrawal
    pub delta_slc: Variable,
    /// Storage variables, if the meter has storage
    pub storage: Option<StorageVariables>,
}

/// Variables for one meter
#[derive(Debug, Clone)]
pub struct MeterVariables {
    /// Generation capacity
    pub p_gn: Variable,
    /// Storage capacity
    pub e_bn: Variable,
    /// Variables for each step
    pub steps: Vec<StepVariables>,
}

/// A map for easy lookup of variables in the problem.
///
/// We use this data structure for two things:
///
/// 1. In order to define constraints for the optimisation
/// 2. To find the values of each variable when reading the results of the optimisation.
#[derive(Debug, Clone)]
pub struct VariableMap {
    /// Variables for each meter, in the same order as the backpack
    pub meters: IndexMap<MeterID, MeterVariables>,
    /// 1 if the community is in deficit in the step (only if surplus must be shared first)
    pub delta_rec: Option<Vec<Variable>>,
}

impl VariableMap {
    /// Add all the variables of the problem
    pub fn add_to_problem(
        problem: &mut LinearProblem,
        backpack: &Backpack,
        horizon: &Horizon,
        costs: &CostCoefficients,
    ) -> Self {
        let meters = backpack
            .meters
            .iter()
            .map(|(id, meter)| {
                let vars = add_meter_variables(problem, meter, costs.get(id), horizon);
                (id.clone(), vars)
            })
            .collect();

        let delta_rec = backpack.total_share_coeffs.then(|| {
            horizon
                .iter_steps()
                .map(|_| problem.add_binary())
                .collect()
        });

        Self { meters, delta_rec }
    }

    /// Iterate over the variables of every meter in the given step
    pub fn iter_step(&self, t: usize) -> impl Iterator<Item = &StepVariables> {
        self.meters.values().map(move |vars| &vars.steps[t])
    }
}

fn add_meter_variables(
    problem: &mut LinearProblem,
    meter: &Meter,
    costs: &MeterCostCoefficients,
    horizon: &Horizon,
) -> MeterVariables {
    let p_gn_bounds = meter.generation_bounds();
    let p_gn = problem.add_column(
        costs.generation_capacity,
        p_gn_bounds.start().value()..=p_gn_bounds.end().value(),
    );
    let e_bn_bounds = meter.storage_bounds();
    let e_bn = problem.add_column(
        costs.storage_capacity,
        e_bn_bounds.start().value()..=e_bn_bounds.end().value(),
    );
    problem.add_objective_offset(costs.installed_capacity_offset);

    let has_storage = meter.has_storage();
    let steps = horizon
        .iter_steps()
        .map(|t| StepVariables {
            e_sup_retail: problem.add_column(costs.retail_purchase[t], 0.0..=INF),
            e_sur_retail: problem.add_column(costs.retail_sale[t], 0.0..=INF),
            e_pur_pool: problem.add_column(costs.pool_purchase[t], 0.0..=INF),
            e_sale_pool: problem.add_column(0.0, 0.0..=INF),
            e_alc: problem.add_column(0.0, 0.0..=INF),
            e_cmet: problem.add_column(0.0, -INF..=INF),
            p_extra: problem.add_column(costs.excess_power[t], 0.0..=INF),
            delta_sup: problem.add_binary(),
            delta_alc: problem.add_binary(),
            delta_slc: problem.add_binary(),
            storage: has_storage.then(|| StorageVariables {
                e_bc: problem.add_column(0.0, 0.0..=INF),
                e_bd: problem.add_column(costs.degradation[t], 0.0..=INF),
                e_bat: problem.add_column(0.0, 0.0..=INF),
                delta_bc: problem.add_binary(),
            }),
        })
        .collect();

    MeterVariables { p_gn, e_bn, steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::backpack;
    use crate::units::Energy;
    use rstest::rstest;

    #[rstest]
    fn test_add_variables(mut backpack: Backpack) {
        // Second meter without storage
        let (_, first) = backpack.meters.first().unwrap();
        let mut no_storage = first.clone();
        no_storage.e_bn_init = Energy(0.0);
        backpack.meters.insert("CPE#2".into(), no_storage);

        let horizon = backpack.resolve().unwrap();
        let costs = CostCoefficients::new(&backpack, &horizon);
        let mut problem = LinearProblem::default();
        let variables = VariableMap::add_to_problem(&mut problem, &backpack, &horizon, &costs);

        // 2 capacities per meter, 14 per step with storage, 10 per step without
        assert_eq!(problem.num_columns(), 2 * 2 + 4 * 14 + 4 * 10 + 4);
        assert_eq!(variables.meters.len(), 2);
        assert!(variables.meters[0].steps.iter().all(|s| s.storage.is_some()));
        assert!(variables.meters[1].steps.iter().all(|s| s.storage.is_none()));
        assert_eq!(variables.delta_rec.as_ref().map(Vec::len), Some(4));

        // Non-install mode: capacities are fixed
        let p_gn = &problem.columns()[variables.meters[0].p_gn.index()];
        assert_eq!(p_gn.min, p_gn.max);
    }
}
