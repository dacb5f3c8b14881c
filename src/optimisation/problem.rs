//! A solver-neutral description of a mixed-integer linear problem.
//!
//! The problem is always a minimisation of
//!
//! f = c1*x1 + c2*x2 + ... + offset
//!
//! subject to rows of the form `min <= a1*x1 + a2*x2 + ... <= max`.
use std::ops::RangeInclusive;

/// A decision variable in the problem.
///
/// Note that this type does **not** include the value of the variable; it just refers to a
/// particular column of the problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable(usize);

impl Variable {
    /// The index of the column this variable refers to
    pub fn index(self) -> usize {
        self.0
    }
}

/// The definition of a column of the problem
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// The coefficient of the variable in the objective
    pub cost: f64,
    /// The variable's minimum value
    pub min: f64,
    /// The variable's maximum value
    pub max: f64,
    /// Whether the variable may only take integer values
    pub is_integer: bool,
}

/// A row (constraint) of the problem.
///
/// Often, rows will impose only a min or a max value, with the other set to infinity or minus
/// infinity.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDefinition {
    /// The minimum value for the row activity
    pub min: f64,
    /// The maximum value for the row activity
    pub max: f64,
    /// The non-zero coefficients of the row
    pub terms: Vec<(Variable, f64)>,
}

/// A minimisation problem which can be handed to any [`MilpSolver`](super::solver::MilpSolver)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearProblem {
    columns: Vec<ColumnDefinition>,
    rows: Vec<RowDefinition>,
    objective_offset: f64,
}

impl LinearProblem {
    /// Add a continuous column to the problem
    pub fn add_column(&mut self, cost: f64, bounds: RangeInclusive<f64>) -> Variable {
        self.push_column(cost, bounds, false)
    }

    /// Add an integer column to the problem
    pub fn add_integer_column(&mut self, cost: f64, bounds: RangeInclusive<f64>) -> Variable {
        self.push_column(cost, bounds, true)
    }

    /// Add a binary column with no cost to the problem
    pub fn add_binary(&mut self) -> Variable {
        self.add_integer_column(0.0, 0.0..=1.0)
    }

    fn push_column(
        &mut self,
        cost: f64,
        bounds: RangeInclusive<f64>,
        is_integer: bool,
    ) -> Variable {
        let (min, max) = bounds.into_inner();
        self.columns.push(ColumnDefinition {
            cost,
            min,
            max,
            is_integer,
        });
        Variable(self.columns.len() - 1)
    }

    /// Add a row to the problem.
    ///
    /// Returns the index of the new row.
    pub fn add_row<I>(&mut self, bounds: RangeInclusive<f64>, terms: I) -> usize
    where
        I: IntoIterator<Item = (Variable, f64)>,
    {
        let (min, max) = bounds.into_inner();
        self.rows.push(RowDefinition {
            min,
            max,
            terms: terms.into_iter().collect(),
        });
        self.rows.len() - 1
    }

    /// Add a constant term to the objective
    pub fn add_objective_offset(&mut self, offset: f64) {
        self.objective_offset += offset;
    }

    /// The columns of the problem, in the order they were added
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// The rows of the problem, in the order they were added
    pub fn rows(&self) -> &[RowDefinition] {
        &self.rows
    }

    /// Number of columns
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether any column is integer
    pub fn has_integer_columns(&self) -> bool {
        self.columns.iter().any(|col| col.is_integer)
    }

    /// Evaluate the objective (including the constant term) for the given column values
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective_offset
            + self
                .columns
                .iter()
                .zip(values)
                .map(|(col, value)| col.cost * value)
                .sum::<f64>()
    }

    /// Get a continuous copy of this problem with every integer column fixed.
    ///
    /// The integer columns are fixed to the given values, rounded to the nearest integer. This is
    /// used to obtain dual values for a mixed-integer solution.
    pub fn with_fixed_integers(&self, values: &[f64]) -> Self {
        assert_eq!(values.len(), self.columns.len(), "Wrong number of column values");

        let columns = self
            .columns
            .iter()
            .zip(values)
            .map(|(col, value)| {
                if col.is_integer {
                    let fixed = value.round();
                    ColumnDefinition {
                        cost: col.cost,
                        min: fixed,
                        max: fixed,
                        is_integer: false,
                    }
                } else {
                    col.clone()
                }
            })
            .collect();

        Self {
            columns,
            rows: self.rows.clone(),
            objective_offset: self.objective_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_build_problem() {
        let mut problem = LinearProblem::default();
        let x = problem.add_column(1.0, 0.0..=f64::INFINITY);
        let y = problem.add_binary();
        let row = problem.add_row(f64::NEG_INFINITY..=4.0, [(x, 1.0), (y, -2.0)]);
        problem.add_objective_offset(3.0);

        assert_eq!(problem.num_columns(), 2);
        assert_eq!(problem.num_rows(), 1);
        assert_eq!(row, 0);
        assert!(problem.has_integer_columns());
        assert_eq!(problem.rows()[0].terms, [(x, 1.0), (y, -2.0)]);
        assert_approx_eq!(f64, problem.objective_value(&[5.0, 1.0]), 8.0);
    }

    #[test]
    fn test_with_fixed_integers() {
        let mut problem = LinearProblem::default();
        problem.add_column(1.0, 0.0..=10.0);
        problem.add_binary();

        let fixed = problem.with_fixed_integers(&[2.5, 0.999_999]);
        assert!(!fixed.has_integer_columns());
        assert_eq!(fixed.columns()[0], problem.columns()[0]);
        assert_eq!(fixed.columns()[1].min, 1.0);
        assert_eq!(fixed.columns()[1].max, 1.0);
    }
}
