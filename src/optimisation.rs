//! Code for performing the collective pool optimisation.
//!
//! The community's members trade energy with their retailers and with each other through a pool.
//! A single mixed-integer problem decides the schedule of every meter, the allocation of the
//! community's surplus and (optionally) new generation and storage capacity. The pool price in
//! each step is the shadow price of that step's market clearing constraint.
use crate::backpack::{Backpack, ConfigurationError};
use crate::horizon::Horizon;
use crate::outputs::PoolOutputs;
use log::{info, warn};

pub mod constraints;
pub mod costs;
pub mod problem;
pub mod solver;
pub mod variables;
use constraints::{BigM, MarketClearingKeys, add_constraints};
use costs::CostCoefficients;
use problem::LinearProblem;
use solver::{MilpSolver, MilpStatus};
use variables::VariableMap;

/// The collective pool problem for a backpack, ready to be solved
pub struct PoolProblem<'a> {
    /// The input data
    pub backpack: &'a Backpack,
    /// The planning horizon of the backpack
    pub horizon: Horizon,
    /// Objective coefficients
    pub costs: CostCoefficients,
    /// Big-M constants used in the constraints
    pub big_m: BigM,
    /// The problem handed to the solver
    pub problem: LinearProblem,
    /// Variables of the problem
    pub variables: VariableMap,
    /// Keys for the market clearing constraints
    pub market_clearing_keys: MarketClearingKeys,
}

impl<'a> PoolProblem<'a> {
    /// Validate the backpack and build the problem from it
    pub fn build(backpack: &'a Backpack) -> Result<Self, ConfigurationError> {
        let horizon = backpack.resolve()?;
        let costs = CostCoefficients::new(backpack, &horizon);
        let big_m = BigM::new(backpack);

        let mut problem = LinearProblem::default();
        let variables = VariableMap::add_to_problem(&mut problem, backpack, &horizon, &costs);
        let market_clearing_keys =
            add_constraints(&mut problem, &variables, backpack, &horizon, &big_m);

        Ok(Self {
            backpack,
            horizon,
            costs,
            big_m,
            problem,
            variables,
            market_clearing_keys,
        })
    }
}

/// Perform the collective pool optimisation for a community.
///
/// # Arguments
///
/// * `backpack` - The input data
/// * `solver` - The solver to use
///
/// # Returns
///
/// The status of the optimisation, along with the results if an optimal solution was found. An
/// error is only returned if the backpack is invalid.
pub fn run_collective_pool_milp(
    backpack: &Backpack,
    solver: &dyn MilpSolver,
) -> Result<PoolOutputs, ConfigurationError> {
    let pool_problem = PoolProblem::build(backpack)?;
    info!(
        "Solving collective pool problem for {} meters over {} steps ({} variables, {} \
         constraints)",
        backpack.meters.len(),
        pool_problem.horizon.len(),
        pool_problem.problem.num_columns(),
        pool_problem.problem.num_rows()
    );

    let outcome = solver.solve(&pool_problem.problem);
    let outputs = PoolOutputs::new(&pool_problem, outcome);
    match &outputs.results {
        Some(results) if outputs.milp_status == MilpStatus::Optimal => {
            info!("Optimal solution found with objective {}", results.obj_value);
        }
        _ => warn!("No optimal solution found: {}", outputs.milp_status),
    }

    Ok(outputs)
}
