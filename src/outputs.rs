//! Results of the collective pool optimisation, in domain terms.
use crate::meter::MeterID;
use crate::optimisation::PoolProblem;
use crate::optimisation::costs::MeterCostCoefficients;
use crate::optimisation::problem::Variable;
use crate::optimisation::solver::{MilpStatus, SolverOutcome, SolverSolution};
use crate::optimisation::variables::{MeterVariables, StepVariables};
use indexmap::IndexMap;
use log::warn;
use serde::Serialize;

/// Largest energy balance violation accepted in a solution (kWh)
pub const ENERGY_BALANCE_TOLERANCE: f64 = 1e-6;

/// The outcome of the collective pool optimisation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolOutputs {
    /// The status of the optimisation
    pub milp_status: MilpStatus,
    /// The results, present only if the status is [`MilpStatus::Optimal`]
    pub results: Option<PoolResults>,
}

/// Results of an optimal solution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolResults {
    /// The value of the objective (€)
    pub obj_value: f64,
    /// The pool price in each step (€/kWh)
    pub dual_prices: Vec<f64>,
    /// Energy bought from retailers by the whole community in each step
    pub e_sup_retail: Vec<f64>,
    /// Energy sold to retailers by the whole community in each step
    pub e_sur_retail: Vec<f64>,
    /// Energy bought from the pool by the whole community in each step
    pub e_sup_market: Vec<f64>,
    /// Energy sold to the pool by the whole community in each step
    pub e_sur_market: Vec<f64>,
    /// 1 if the community is in deficit in the step
    pub delta_rec: Vec<u8>,
    /// Results for each meter
    pub meters: IndexMap<MeterID, MeterResults>,
}

/// Results for a single meter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterResults {
    /// Cost of the meter, including settlement of pool trades at the pool price (€)
    pub c_ind2pool: f64,
    /// As `c_ind2pool`, without storage degradation costs
    pub c_ind2pool_without_deg: f64,
    /// As `c_ind2pool`, without excess power costs
    pub c_ind2pool_without_p_extra: f64,
    /// As `c_ind2pool`, without storage degradation or excess power costs
    pub c_ind2pool_without_deg_and_p_extra: f64,
    /// Storage degradation cost (€)
    pub deg_cost2pool: f64,
    /// Excess power cost (€)
    pub p_extra_cost2pool: f64,
    /// Cost of capacity above the installed values (€)
    pub investment_cost: f64,
    /// Generation capacity (kW)
    pub p_gn: f64,
    /// Storage capacity (kWh)
    pub e_bn: f64,
    /// Net load at the meter
    pub e_cmet: Vec<f64>,
    /// Energy bought from the retailer
    pub e_consumed: Vec<f64>,
    /// Energy sold to the retailer
    pub e_sold: Vec<f64>,
    /// Energy bought from the pool
    pub e_pur_pool: Vec<f64>,
    /// Energy sold to the pool
    pub e_sale_pool: Vec<f64>,
    /// Energy self-consumed from the pool
    pub e_slc_pool: Vec<f64>,
    /// Share of the community's surplus allocated to the meter
    pub e_alc: Vec<f64>,
    /// Storage content at the end of each step
    pub e_bat: Vec<f64>,
    /// Energy charged
    pub e_bc: Vec<f64>,
    /// Energy discharged
    pub e_bd: Vec<f64>,
    /// Storage state of charge, as a fraction of capacity
    pub soc_bat: Vec<f64>,
    /// Power beyond the meter's maximum (kW)
    pub p_extra: Vec<f64>,
    /// 1 if importing
    pub delta_sup: Vec<u8>,
    /// 1 if charging
    pub delta_bc: Vec<u8>,
    /// 1 if the meter has an active allocation
    pub delta_alc: Vec<u8>,
    /// 1 if self-consumption is limited by the allocation
    pub delta_slc: Vec<u8>,
}

/// Lookup of variable values in a solution
struct Values<'a>(&'a [f64]);

impl Values<'_> {
    fn get(&self, var: Variable) -> f64 {
        self.0[var.index()]
    }

    fn series<F>(&self, vars: &MeterVariables, f: F) -> Vec<f64>
    where
        F: Fn(&StepVariables) -> Option<Variable>,
    {
        vars.steps
            .iter()
            .map(|step| f(step).map_or(0.0, |var| self.get(var)))
            .collect()
    }

    fn binary_series<F>(&self, vars: &MeterVariables, f: F) -> Vec<u8>
    where
        F: Fn(&StepVariables) -> Option<Variable>,
    {
        self.series(vars, f).into_iter().map(to_binary).collect()
    }
}

/// Round a relaxed binary value
fn to_binary(value: f64) -> u8 {
    u8::from(value > 0.5)
}

/// Sum a per-meter series over the whole community
fn sum_over_meters<F>(meters: &IndexMap<MeterID, MeterResults>, steps: usize, f: F) -> Vec<f64>
where
    F: Fn(&MeterResults) -> &Vec<f64>,
{
    (0..steps)
        .map(|t| meters.values().map(|m| f(m)[t]).sum())
        .collect()
}

/// Weighted dot product of per-step costs and values
fn dot(costs: &[f64], values: &[f64]) -> f64 {
    costs.iter().zip(values).map(|(c, v)| c * v).sum()
}

impl PoolOutputs {
    /// Map the solver's outcome back into domain quantities.
    ///
    /// The solution is checked for energy balance violations first; if any exceed
    /// [`ENERGY_BALANCE_TOLERANCE`], the status becomes [`MilpStatus::NumericalIssue`] and no
    /// results are returned.
    pub fn new(pool_problem: &PoolProblem, outcome: SolverOutcome) -> Self {
        let solution = match outcome {
            SolverOutcome {
                status: MilpStatus::Optimal,
                solution: Some(solution),
            } => solution,
            SolverOutcome {
                status: MilpStatus::Optimal,
                solution: None,
            } => {
                warn!("Solver reported an optimal solution without returning it");
                return Self {
                    milp_status: MilpStatus::Error,
                    results: None,
                };
            }
            SolverOutcome { status, .. } => {
                return Self {
                    milp_status: status,
                    results: None,
                };
            }
        };

        let values = Values(&solution.columns);
        let residual = max_balance_residual(pool_problem, &values);
        if residual > ENERGY_BALANCE_TOLERANCE {
            warn!("Energy balance violated by {residual} kWh");
            return Self {
                milp_status: MilpStatus::NumericalIssue,
                results: None,
            };
        }

        Self {
            milp_status: MilpStatus::Optimal,
            results: Some(PoolResults::new(pool_problem, &solution)),
        }
    }
}

/// Largest violation of the net load and energy balance equations
fn max_balance_residual(pool_problem: &PoolProblem, values: &Values) -> f64 {
    let mut max_residual: f64 = 0.0;
    for (meter, vars) in pool_problem
        .backpack
        .meters
        .values()
        .zip(pool_problem.variables.meters.values())
    {
        let p_gn = values.get(vars.p_gn);
        for (t, step) in vars.steps.iter().enumerate() {
            let e_cmet = values.get(step.e_cmet);
            let (e_bc, e_bd) = step.storage.map_or((0.0, 0.0), |storage| {
                (values.get(storage.e_bc), values.get(storage.e_bd))
            });
            let net_load = meter.e_c[t] - meter.e_g_factor[t] * p_gn + e_bc - e_bd;
            let exchange = values.get(step.e_sup_retail) + values.get(step.e_pur_pool)
                - values.get(step.e_sur_retail)
                - values.get(step.e_sale_pool);

            max_residual = max_residual
                .max((e_cmet - net_load).abs())
                .max((e_cmet - exchange).abs());
        }
    }

    max_residual
}

impl PoolResults {
    fn new(pool_problem: &PoolProblem, solution: &SolverSolution) -> Self {
        let horizon = &pool_problem.horizon;
        let values = Values(&solution.columns);

        // The duals are weighted like the objective, so divide by the step weight to get a price
        let duals: Vec<f64> = pool_problem
            .market_clearing_keys
            .zip_duals(&solution.row_duals)
            .map(|(_, dual)| dual)
            .collect();
        let dual_prices = horizon
            .iter_steps()
            .map(|t| duals[t] / horizon.weight(t))
            .collect();

        let meters: IndexMap<_, _> = pool_problem
            .backpack
            .meters
            .iter()
            .zip(pool_problem.variables.meters.values())
            .map(|((id, _), vars)| {
                let results =
                    MeterResults::new(vars, pool_problem.costs.get(id), &duals, &values);
                (id.clone(), results)
            })
            .collect();

        let steps = horizon.len();
        let e_sup_retail = sum_over_meters(&meters, steps, |m| &m.e_consumed);
        let e_sur_retail = sum_over_meters(&meters, steps, |m| &m.e_sold);
        let e_sup_market = sum_over_meters(&meters, steps, |m| &m.e_pur_pool);
        let e_sur_market = sum_over_meters(&meters, steps, |m| &m.e_sale_pool);

        let delta_rec = match &pool_problem.variables.delta_rec {
            Some(vars) => vars.iter().map(|var| to_binary(values.get(*var))).collect(),
            None => sum_over_meters(&meters, steps, |m| &m.e_cmet)
                .into_iter()
                .map(|net_load| u8::from(net_load > 0.0))
                .collect(),
        };

        Self {
            obj_value: pool_problem.problem.objective_value(&solution.columns),
            dual_prices,
            e_sup_retail,
            e_sur_retail,
            e_sup_market,
            e_sur_market,
            delta_rec,
            meters,
        }
    }
}

impl MeterResults {
    fn new(
        vars: &MeterVariables,
        costs: &MeterCostCoefficients,
        duals: &[f64],
        values: &Values,
    ) -> Self {
        let e_consumed = values.series(vars, |s| Some(s.e_sup_retail));
        let e_sold = values.series(vars, |s| Some(s.e_sur_retail));
        let e_pur_pool = values.series(vars, |s| Some(s.e_pur_pool));
        let e_sale_pool = values.series(vars, |s| Some(s.e_sale_pool));
        let e_bat = values.series(vars, |s| s.storage.map(|b| b.e_bat));
        let e_bd = values.series(vars, |s| s.storage.map(|b| b.e_bd));
        let p_extra = values.series(vars, |s| Some(s.p_extra));
        let p_gn = values.get(vars.p_gn);
        let e_bn = values.get(vars.e_bn);

        let deg_cost2pool = dot(&costs.degradation, &e_bd);
        let p_extra_cost2pool = dot(&costs.excess_power, &p_extra);
        let investment_cost = costs.generation_capacity * p_gn
            + costs.storage_capacity * e_bn
            + costs.installed_capacity_offset;
        let settlement: f64 = duals
            .iter()
            .zip(e_pur_pool.iter().zip(&e_sale_pool))
            .map(|(dual, (pur, sale))| dual * (pur - sale))
            .sum();
        let c_ind2pool = dot(&costs.retail_purchase, &e_consumed)
            + dot(&costs.retail_sale, &e_sold)
            + dot(&costs.pool_purchase, &e_pur_pool)
            + deg_cost2pool
            + p_extra_cost2pool
            + investment_cost
            + settlement;

        let soc_bat = e_bat
            .iter()
            .map(|content| if e_bn > 0.0 { content / e_bn } else { 0.0 })
            .collect();

        Self {
            c_ind2pool,
            c_ind2pool_without_deg: c_ind2pool - deg_cost2pool,
            c_ind2pool_without_p_extra: c_ind2pool - p_extra_cost2pool,
            c_ind2pool_without_deg_and_p_extra: c_ind2pool - deg_cost2pool - p_extra_cost2pool,
            deg_cost2pool,
            p_extra_cost2pool,
            investment_cost,
            p_gn,
            e_bn,
            e_cmet: values.series(vars, |s| Some(s.e_cmet)),
            e_slc_pool: e_pur_pool.clone(),
            e_alc: values.series(vars, |s| Some(s.e_alc)),
            e_bc: values.series(vars, |s| s.storage.map(|b| b.e_bc)),
            delta_sup: values.binary_series(vars, |s| Some(s.delta_sup)),
            delta_bc: values.binary_series(vars, |s| s.storage.map(|b| b.delta_bc)),
            delta_alc: values.binary_series(vars, |s| Some(s.delta_alc)),
            delta_slc: values.binary_series(vars, |s| Some(s.delta_slc)),
            e_consumed,
            e_sold,
            e_pur_pool,
            e_sale_pool,
            e_bat,
            e_bd,
            soc_bat,
            p_extra,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backpack::Backpack;
    use crate::fixture::{backpack, pool_outputs};
    use crate::optimisation::problem::LinearProblem;
    use crate::optimisation::run_collective_pool_milp;
    use crate::optimisation::solver::MilpSolver;
    use rstest::rstest;

    /// A solver which returns a canned outcome
    struct StubSolver(fn(&LinearProblem) -> SolverOutcome);

    impl MilpSolver for StubSolver {
        fn solve(&self, problem: &LinearProblem) -> SolverOutcome {
            (self.0)(problem)
        }
    }

    /// An "optimal" solution with every column at zero, so no consumption is met
    fn all_zero(problem: &LinearProblem) -> SolverOutcome {
        SolverOutcome {
            status: MilpStatus::Optimal,
            solution: Some(SolverSolution {
                columns: vec![0.0; problem.num_columns()],
                row_duals: vec![0.0; problem.num_rows()],
            }),
        }
    }

    fn no_solution(_: &LinearProblem) -> SolverOutcome {
        SolverOutcome {
            status: MilpStatus::Optimal,
            solution: None,
        }
    }

    #[rstest]
    #[case::infeasible(
        StubSolver(|_| SolverOutcome::failed(MilpStatus::Infeasible)),
        MilpStatus::Infeasible
    )]
    #[case::time_limit(
        StubSolver(|_| SolverOutcome::failed(MilpStatus::TimeLimit)),
        MilpStatus::TimeLimit
    )]
    #[case::optimal_without_solution(StubSolver(no_solution), MilpStatus::Error)]
    #[case::energy_balance_violated(StubSolver(all_zero), MilpStatus::NumericalIssue)]
    fn test_outputs_without_results(
        backpack: Backpack,
        #[case] solver: StubSolver,
        #[case] expected: MilpStatus,
    ) {
        let outputs = run_collective_pool_milp(&backpack, &solver).unwrap();
        assert_eq!(outputs.milp_status, expected);
        assert!(outputs.results.is_none());
    }

    #[rstest]
    fn test_max_balance_residual(backpack: Backpack) {
        let pool_problem = PoolProblem::build(&backpack).unwrap();
        let columns = vec![0.0; pool_problem.problem.num_columns()];

        // The largest consumption of the fixture's meter is left unmet
        let residual = max_balance_residual(&pool_problem, &Values(&columns));
        assert_eq!(residual, 4.0);
    }

    #[rstest]
    fn test_outputs_optimal(pool_outputs: PoolOutputs) {
        let results = pool_outputs.results.unwrap();
        assert_eq!(results.dual_prices.len(), 4);
        assert_eq!(results.meters["CPE#1"].e_cmet.len(), 4);
    }
}
