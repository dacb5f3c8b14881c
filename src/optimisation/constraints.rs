//! Constraints of the collective pool problem.
use super::problem::{LinearProblem, Variable};
use super::variables::{MeterVariables, StepVariables, VariableMap};
use crate::backpack::Backpack;
use crate::horizon::Horizon;
use crate::meter::{Meter, MeterID};
use indexmap::IndexMap;
use itertools::Itertools;

const INF: f64 = f64::INFINITY;

/// Minimum share of the community's surplus for an active allocation
pub const MIN_ALLOCATION_COEFFICIENT: f64 = 1e-3;

/// Corresponding variables for a constraint along with the row offset in the solution
pub struct KeysWithOffset<T> {
    offset: usize,
    keys: Vec<T>,
}

impl<T> KeysWithOffset<T> {
    /// Zip the keys with the corresponding dual values in the solution, accounting for the offset
    pub fn zip_duals<'a>(&'a self, duals: &'a [f64]) -> impl Iterator<Item = (&'a T, f64)> {
        assert!(
            self.offset + self.keys.len() <= duals.len(),
            "Bad constraint keys: dual rows out of range"
        );

        self.keys.iter().zip(duals[self.offset..].iter().copied())
    }
}

/// Indicates the step covered by each market clearing constraint
pub type MarketClearingKeys = KeysWithOffset<usize>;

/// Big-M constants for one meter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterBigM {
    /// Upper bound on the energy the meter can exchange in a step
    pub exchange: f64,
    /// Upper bound on the energy the meter's storage can charge or discharge in a step
    pub storage: f64,
}

impl MeterBigM {
    fn new(meter: &Meter, backpack: &Backpack) -> Self {
        let max_of = |values: &[f64]| values.iter().copied().fold(0.0, f64::max);
        let max_rate = backpack.storage_ratio * backpack.delta_t.value();
        let storage = (*meter.storage_bounds().end() * max_rate).value();
        let generation = max_of(&meter.e_g_factor) * meter.generation_bounds().end().value();

        Self {
            exchange: max_of(&meter.e_c) + generation + storage,
            storage,
        }
    }
}

/// Big-M constants of the problem, grouped by family
#[derive(Debug, Clone, PartialEq)]
pub struct BigM {
    /// Constants for each meter
    pub meters: IndexMap<MeterID, MeterBigM>,
    /// Upper bound on any meter's allocation in a step
    pub allocation: f64,
    /// Upper bound on the community's net exchange in a step
    pub balance: f64,
}

impl BigM {
    /// Derive big-M constants from the bounds in the backpack
    pub fn new(backpack: &Backpack) -> Self {
        let meters: IndexMap<_, _> = backpack
            .meters
            .iter()
            .map(|(id, meter)| (id.clone(), MeterBigM::new(meter, backpack)))
            .collect();
        let total_exchange = meters.values().map(|m| m.exchange).sum();

        Self {
            meters,
            allocation: total_exchange,
            balance: total_exchange,
        }
    }
}

/// Add all the constraints of the problem.
///
/// Note: the ordering of constraints is important, as the dual values of the market clearing
/// constraints must later be retrieved to calculate pool prices.
///
/// # Returns
///
/// Keys for the market clearing constraints.
pub fn add_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    backpack: &Backpack,
    horizon: &Horizon,
    big_m: &BigM,
) -> MarketClearingKeys {
    let market_clearing_keys = add_market_clearing_constraints(problem, variables, horizon);

    for ((id, meter), vars) in backpack.meters.iter().zip_eq(variables.meters.values()) {
        let meter_big_m = &big_m.meters[id];
        add_energy_balance_constraints(problem, vars, meter);
        add_storage_constraints(problem, vars, meter, backpack, meter_big_m);
        add_exchange_constraints(problem, vars, meter, backpack, meter_big_m);
        add_self_consumption_constraints(problem, vars, big_m, meter_big_m);
    }

    add_allocation_constraints(problem, variables, horizon);
    if backpack.strict_pos_coeffs {
        add_strict_allocation_constraints(problem, variables, horizon, big_m);
    }
    if let Some(delta_rec) = &variables.delta_rec {
        add_total_share_constraints(problem, variables, delta_rec, backpack, big_m);
    }

    market_clearing_keys
}

/// Energy sold to the pool must equal energy bought from it, in every step
fn add_market_clearing_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    horizon: &Horizon,
) -> MarketClearingKeys {
    let offset = problem.num_rows();
    let mut keys = Vec::new();
    for t in horizon.iter_steps() {
        let terms = variables
            .iter_step(t)
            .flat_map(|step| [(step.e_sale_pool, 1.0), (step.e_pur_pool, -1.0)]);
        problem.add_row(0.0..=0.0, terms);
        keys.push(t);
    }

    MarketClearingKeys { offset, keys }
}

/// Define the net load and split it between the retailer and the pool
fn add_energy_balance_constraints(
    problem: &mut LinearProblem,
    vars: &MeterVariables,
    meter: &Meter,
) {
    for (t, step) in vars.steps.iter().enumerate() {
        // e_cmet + e_g_factor * p_gn - e_bc + e_bd = e_c
        let mut terms = vec![(step.e_cmet, 1.0), (vars.p_gn, meter.e_g_factor[t])];
        if let Some(storage) = &step.storage {
            terms.extend([(storage.e_bc, -1.0), (storage.e_bd, 1.0)]);
        }
        problem.add_row(meter.e_c[t]..=meter.e_c[t], terms);

        problem.add_row(
            0.0..=0.0,
            [
                (step.e_cmet, 1.0),
                (step.e_sup_retail, -1.0),
                (step.e_pur_pool, -1.0),
                (step.e_sur_retail, 1.0),
                (step.e_sale_pool, 1.0),
            ],
        );
    }
}

fn add_storage_constraints(
    problem: &mut LinearProblem,
    vars: &MeterVariables,
    meter: &Meter,
    backpack: &Backpack,
    big_m: &MeterBigM,
) {
    let max_rate = backpack.storage_ratio * backpack.delta_t.value();
    let mut previous: Option<Variable> = None;
    for storage in vars.steps.iter().filter_map(|step| step.storage) {
        // e_bat[t] - e_bat[t-1] - eff_bc * e_bc + e_bd / eff_bd = 0, starting from the minimum
        let mut terms = vec![
            (storage.e_bat, 1.0),
            (storage.e_bc, -meter.eff_bc),
            (storage.e_bd, 1.0 / meter.eff_bd),
        ];
        match previous {
            Some(e_bat) => terms.push((e_bat, -1.0)),
            None => terms.push((vars.e_bn, -meter.soc_min)),
        }
        problem.add_row(0.0..=0.0, terms);
        previous = Some(storage.e_bat);

        // Content limits
        problem.add_row(
            0.0..=INF,
            [(storage.e_bat, 1.0), (vars.e_bn, -meter.soc_min)],
        );
        problem.add_row(
            -INF..=0.0,
            [(storage.e_bat, 1.0), (vars.e_bn, -meter.soc_max)],
        );

        // Rate limits
        for rate in [storage.e_bc, storage.e_bd] {
            problem.add_row(-INF..=0.0, [(rate, 1.0), (vars.e_bn, -max_rate)]);
        }

        // No simultaneous charge and discharge
        problem.add_row(
            -INF..=0.0,
            [(storage.e_bc, 1.0), (storage.delta_bc, -big_m.storage)],
        );
        problem.add_row(
            -INF..=big_m.storage,
            [(storage.e_bd, 1.0), (storage.delta_bc, big_m.storage)],
        );
    }
}

/// Complementarity of imports and exports, and the meter's power limit
fn add_exchange_constraints(
    problem: &mut LinearProblem,
    vars: &MeterVariables,
    meter: &Meter,
    backpack: &Backpack,
    big_m: &MeterBigM,
) {
    let delta_t = backpack.delta_t.value();
    let e_max = (meter.p_meter_max * backpack.delta_t).value();
    for step in &vars.steps {
        problem.add_row(
            -INF..=0.0,
            [
                (step.e_sup_retail, 1.0),
                (step.e_pur_pool, 1.0),
                (step.delta_sup, -big_m.exchange),
            ],
        );
        problem.add_row(
            -INF..=big_m.exchange,
            [
                (step.e_sur_retail, 1.0),
                (step.e_sale_pool, 1.0),
                (step.delta_sup, big_m.exchange),
            ],
        );

        // Power beyond the limit is allowed but charged for
        problem.add_row(
            -INF..=e_max,
            [
                (step.e_sup_retail, 1.0),
                (step.e_pur_pool, 1.0),
                (step.p_extra, -delta_t),
            ],
        );
        problem.add_row(
            -INF..=e_max,
            [
                (step.e_sur_retail, 1.0),
                (step.e_sale_pool, 1.0),
                (step.p_extra, -delta_t),
            ],
        );
    }
}

/// Energy self-consumed from the pool is the lesser of the allocation and the withdrawal
fn add_self_consumption_constraints(
    problem: &mut LinearProblem,
    vars: &MeterVariables,
    big_m: &BigM,
    meter_big_m: &MeterBigM,
) {
    let m_a = big_m.allocation;
    for step in &vars.steps {
        problem.add_row(-INF..=0.0, [(step.e_pur_pool, 1.0), (step.e_alc, -1.0)]);
        problem.add_row(
            -m_a..=INF,
            [
                (step.e_pur_pool, 1.0),
                (step.e_alc, -1.0),
                (step.delta_slc, -m_a),
            ],
        );
        problem.add_row(
            -INF..=0.0,
            [
                (step.e_sup_retail, 1.0),
                (step.delta_slc, -meter_big_m.exchange),
            ],
        );
        problem.add_row(
            -INF..=0.0,
            [(step.e_alc, 1.0), (step.delta_alc, -m_a)],
        );
    }
}

/// Total exports of a meter in a step
fn exports(step: &StepVariables) -> [Variable; 2] {
    [step.e_sur_retail, step.e_sale_pool]
}

/// The community cannot allocate more than its members export
fn add_allocation_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    horizon: &Horizon,
) {
    for t in horizon.iter_steps() {
        let allocated = variables.iter_step(t).map(|step| (step.e_alc, 1.0));
        let exported = variables
            .iter_step(t)
            .flat_map(exports)
            .map(|var| (var, -1.0));
        problem.add_row(-INF..=0.0, allocated.chain(exported));
    }
}

/// An active allocation is at least a minimum share of the community's exports
fn add_strict_allocation_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    horizon: &Horizon,
    big_m: &BigM,
) {
    let m_a = big_m.allocation;
    for t in horizon.iter_steps() {
        for step in variables.iter_step(t) {
            let mut terms = vec![(step.e_alc, 1.0), (step.delta_alc, -m_a)];
            terms.extend(
                variables
                    .iter_step(t)
                    .flat_map(exports)
                    .map(|var| (var, -MIN_ALLOCATION_COEFFICIENT)),
            );
            problem.add_row(-m_a..=INF, terms);
        }
    }
}

/// Surplus is shared within the community before being sold to retailers.
///
/// In a step where the community is in deficit, no member sells to its retailer; in a step with a
/// surplus, no member buys from its retailer.
fn add_total_share_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    delta_rec: &[Variable],
    backpack: &Backpack,
    big_m: &BigM,
) {
    let m_c = big_m.balance;
    for (t, &delta) in delta_rec.iter().enumerate() {
        let net_load = || variables.iter_step(t).map(|step| (step.e_cmet, 1.0));

        problem.add_row(-INF..=0.0, net_load().chain([(delta, -m_c)]));
        problem.add_row(-m_c..=INF, net_load().chain([(delta, -m_c)]));

        for (id, step) in backpack.meters.keys().zip(variables.iter_step(t)) {
            let m_x = big_m.meters[id].exchange;
            problem.add_row(
                -INF..=m_x,
                [(step.e_sur_retail, 1.0), (delta, m_x)],
            );
            problem.add_row(
                -INF..=0.0,
                [(step.e_sup_retail, 1.0), (delta, -m_x)],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::backpack;
    use crate::optimisation::costs::CostCoefficients;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_big_m(backpack: Backpack) {
        let big_m = BigM::new(&backpack);
        let (id, meter) = backpack.meters.first().unwrap();
        let meter_big_m = big_m.meters[id];

        let storage = backpack.storage_ratio * backpack.delta_t.value() * meter.e_bn_init.value();
        assert_approx_eq!(f64, meter_big_m.storage, storage);
        assert!(meter_big_m.exchange >= meter.e_c.iter().copied().fold(0.0, f64::max) + storage);
        assert_approx_eq!(f64, big_m.allocation, meter_big_m.exchange);
        assert_approx_eq!(f64, big_m.balance, meter_big_m.exchange);
    }

    #[rstest]
    fn test_market_clearing_rows_first(backpack: Backpack) {
        let horizon = backpack.resolve().unwrap();
        let costs = CostCoefficients::new(&backpack, &horizon);
        let mut problem = LinearProblem::default();
        let variables = VariableMap::add_to_problem(&mut problem, &backpack, &horizon, &costs);
        let keys = add_constraints(
            &mut problem,
            &variables,
            &backpack,
            &horizon,
            &BigM::new(&backpack),
        );

        let duals: Vec<f64> = (0..problem.num_rows()).map(|row| row as f64).collect();
        let zipped: Vec<_> = keys.zip_duals(&duals).map(|(t, dual)| (*t, dual)).collect();
        assert_eq!(zipped, [(0, 0.0), (1, 1.0), (2, 2.0), (3, 3.0)]);

        let step = &variables.meters[0].steps[2];
        assert_eq!(
            problem.rows()[2].terms,
            [(step.e_sale_pool, 1.0), (step.e_pur_pool, -1.0)]
        );
    }

    #[test]
    #[should_panic(expected = "Bad constraint keys")]
    fn test_zip_duals_out_of_range() {
        let keys = MarketClearingKeys {
            offset: 2,
            keys: vec![0, 1],
        };
        keys.zip_duals(&[0.0; 3]).for_each(drop);
    }
}
