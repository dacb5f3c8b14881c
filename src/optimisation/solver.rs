//! Solving [`LinearProblem`]s with a MILP solver.
use super::problem::LinearProblem;
use highs::{HighsModelStatus, RowProblem, Sense};
use log::{debug, warn};
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};

/// The outcome of an optimisation, as reported to users
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    SerializeLabeledStringEnum,
    DeserializeLabeledStringEnum,
)]
pub enum MilpStatus {
    /// An optimal solution was found
    #[string = "Optimal"]
    Optimal,
    /// The problem has no feasible solution
    #[string = "Infeasible"]
    Infeasible,
    /// The objective is unbounded
    #[string = "Unbounded"]
    Unbounded,
    /// The solver ran out of time
    #[string = "TimeLimit"]
    TimeLimit,
    /// The solver stopped before proving optimality
    #[string = "SubOptimal"]
    SubOptimal,
    /// A solution was returned but it fails the consistency checks
    #[string = "NumericalIssue"]
    NumericalIssue,
    /// The solver failed
    #[string = "Error"]
    Error,
}

/// Values of a solution, indexed like the columns and rows of the problem
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSolution {
    /// Column values
    pub columns: Vec<f64>,
    /// Dual values of the rows
    pub row_duals: Vec<f64>,
}

/// What a solver returns
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    /// The status of the solve
    pub status: MilpStatus,
    /// The solution, present only if the status is [`MilpStatus::Optimal`]
    pub solution: Option<SolverSolution>,
}

impl SolverOutcome {
    /// An outcome without a solution
    pub fn failed(status: MilpStatus) -> Self {
        Self {
            status,
            solution: None,
        }
    }
}

/// A solver for mixed-integer linear problems.
///
/// The problem is always a minimisation. Dual values must refer to the problem's rows, and for
/// problems with integer columns they are the duals of the continuous problem obtained by fixing
/// the integer columns to their optimal values.
pub trait MilpSolver {
    /// Solve the given problem
    fn solve(&self, problem: &LinearProblem) -> SolverOutcome;
}

/// Options for [`HighsSolver`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighsSolver {
    /// Maximum time allowed for each solve, in seconds
    pub time_limit: Option<f64>,
    /// Relative gap at which the branch-and-bound search stops
    pub mip_rel_gap: Option<f64>,
    /// Whether HiGHS should print its own progress output
    pub log_to_console: bool,
}

impl HighsSolver {
    /// Convert the solver-neutral problem into a HiGHS problem
    fn to_highs_problem(problem: &LinearProblem) -> RowProblem {
        let mut highs_problem = RowProblem::default();
        let columns: Vec<_> = problem
            .columns()
            .iter()
            .map(|col| {
                if col.is_integer {
                    highs_problem.add_integer_column(col.cost, col.min..=col.max)
                } else {
                    highs_problem.add_column(col.cost, col.min..=col.max)
                }
            })
            .collect();

        for row in problem.rows() {
            highs_problem.add_row(
                row.min..=row.max,
                row.terms
                    .iter()
                    .map(|(var, coeff)| (columns[var.index()], *coeff)),
            );
        }

        highs_problem
    }

    /// Solve a single problem, without any post-processing
    fn solve_once(&self, problem: &LinearProblem) -> SolverOutcome {
        let mut model = Self::to_highs_problem(problem).optimise(Sense::Minimise);
        model.set_option("output_flag", self.log_to_console);
        model.set_option("log_to_console", self.log_to_console);
        if let Some(time_limit) = self.time_limit {
            model.set_option("time_limit", time_limit);
        }
        if let Some(mip_rel_gap) = self.mip_rel_gap {
            model.set_option("mip_rel_gap", mip_rel_gap);
        }

        let solved = match model.try_solve() {
            Ok(solved) => solved,
            Err(status) => {
                warn!("HiGHS returned an error: {status:?}");
                return SolverOutcome::failed(MilpStatus::Error);
            }
        };

        let status = match solved.status() {
            HighsModelStatus::Optimal => MilpStatus::Optimal,
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
                MilpStatus::Infeasible
            }
            HighsModelStatus::Unbounded => MilpStatus::Unbounded,
            HighsModelStatus::ReachedTimeLimit => MilpStatus::TimeLimit,
            HighsModelStatus::ReachedIterationLimit => MilpStatus::SubOptimal,
            status => {
                warn!("Unexpected HiGHS model status: {status:?}");
                MilpStatus::Error
            }
        };
        if status != MilpStatus::Optimal {
            return SolverOutcome::failed(status);
        }

        let solution = solved.get_solution();
        SolverOutcome {
            status,
            solution: Some(SolverSolution {
                columns: solution.columns().to_vec(),
                row_duals: solution.dual_rows().to_vec(),
            }),
        }
    }
}

impl MilpSolver for HighsSolver {
    fn solve(&self, problem: &LinearProblem) -> SolverOutcome {
        let outcome = self.solve_once(problem);
        if !problem.has_integer_columns() {
            return outcome;
        }
        let Some(mip_solution) = outcome.solution else {
            return outcome;
        };

        // HiGHS does not report duals for MIPs, so solve again with the integers fixed
        debug!("Re-solving with integer columns fixed to obtain dual values");
        let fixed = problem.with_fixed_integers(&mip_solution.columns);
        let lp_outcome = self.solve_once(&fixed);
        if lp_outcome.status == MilpStatus::Optimal {
            lp_outcome
        } else {
            warn!(
                "Fixed-integer problem could not be solved: {}",
                lp_outcome.status
            );
            SolverOutcome::failed(MilpStatus::NumericalIssue)
        }
    }
}
