//! The planning horizon: a fixed sequence of equally long steps.
//!
//! When the time series come from representative days, each day carries a weight equal to the
//! number of real days it stands for and every step of that day inherits the weight.
use crate::backpack::ConfigurationError;
use crate::units::Hours;
use std::ops::Range;

/// Number of hours in a day
const HOURS_PER_DAY: f64 = 24.0;

/// Tolerance when checking that a number of steps is integral
const INTEGRALITY_TOLERANCE: f64 = 1e-9;

/// Round `value` to the nearest integer if it is (within tolerance) a positive integer
fn as_positive_integer(value: f64) -> Option<usize> {
    let rounded = value.round();
    ((value - rounded).abs() <= INTEGRALITY_TOLERANCE && rounded >= 1.0).then_some(rounded as usize)
}

/// Number of steps of length `delta_t` in a day, if `delta_t` divides a day exactly
pub fn steps_per_day(delta_t: Hours) -> Option<usize> {
    as_positive_integer(HOURS_PER_DAY / delta_t.value())
}

/// The discretised planning horizon.
///
/// Step weights are looked up from the day weights. Nothing is stored per step.
#[derive(Debug, Clone, PartialEq)]
pub struct Horizon {
    steps: usize,
    steps_per_day: usize,
    day_weights: Option<Vec<f64>>,
    represented_days: f64,
}

impl Horizon {
    /// Create a new [`Horizon`].
    ///
    /// # Arguments
    ///
    /// * `nr_days` - Number of days covered by the time series
    /// * `delta_t` - Length of each step
    /// * `day_weights` - Optional number of real days represented by each day of the series
    pub fn new(
        nr_days: f64,
        delta_t: Hours,
        day_weights: Option<&[f64]>,
    ) -> Result<Self, ConfigurationError> {
        if !(delta_t.is_finite() && delta_t > Hours(0.0)) {
            return Err(ConfigurationError::new(
                "delta_t",
                "must be a finite number greater than zero".into(),
            ));
        }
        if !(nr_days.is_finite() && nr_days > 0.0) {
            return Err(ConfigurationError::new(
                "nr_days",
                "must be a finite number greater than zero".into(),
            ));
        }

        let steps = as_positive_integer(nr_days * HOURS_PER_DAY / delta_t.value()).ok_or_else(
            || {
                ConfigurationError::new(
                    "delta_t",
                    format!("{nr_days} days cannot be divided into steps of {delta_t}"),
                )
            },
        )?;

        let Some(day_weights) = day_weights else {
            return Ok(Self {
                steps,
                steps_per_day: steps,
                day_weights: None,
                represented_days: nr_days,
            });
        };

        let days = as_positive_integer(nr_days).ok_or_else(|| {
            ConfigurationError::new(
                "nr_days",
                "must be a whole number of days when day weights are provided".into(),
            )
        })?;
        let steps_per_day = steps_per_day(delta_t).ok_or_else(|| {
            ConfigurationError::new(
                "delta_t",
                "must divide a day exactly when day weights are provided".into(),
            )
        })?;
        if day_weights.len() != days {
            return Err(ConfigurationError::new(
                "day_weights",
                format!(
                    "expected {days} values but found {}",
                    day_weights.len()
                ),
            ));
        }
        if day_weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return Err(ConfigurationError::new(
                "day_weights",
                "all weights must be finite numbers greater than zero".into(),
            ));
        }
        let steps = days.checked_mul(steps_per_day).ok_or_else(|| {
            ConfigurationError::new("delta_t", "too many steps in the horizon".into())
        })?;

        Ok(Self {
            steps,
            steps_per_day,
            represented_days: day_weights.iter().sum(),
            day_weights: Some(day_weights.to_vec()),
        })
    }

    /// Number of steps in the horizon
    pub fn len(&self) -> usize {
        self.steps
    }

    /// Whether the horizon has no steps (never true for a validated horizon)
    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }

    /// The weight of the given step in the objective
    pub fn weight(&self, step: usize) -> f64 {
        match &self.day_weights {
            Some(weights) => weights[step / self.steps_per_day],
            None => 1.0,
        }
    }

    /// Number of real days the horizon stands for
    pub fn represented_days(&self) -> f64 {
        self.represented_days
    }

    /// Iterate over step indexes
    pub fn iter_steps(&self) -> Range<usize> {
        0..self.len()
    }
}
