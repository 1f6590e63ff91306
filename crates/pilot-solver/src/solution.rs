use std::{fmt, time::Duration};

/// Outcome of one solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Success,
    /// Iteration limit reached before the tolerances were met.
    MaxIterations,
    /// Wall-clock budget exhausted.
    Timeout,
    Cancelled,
    /// Non-finite values or an evaluation failure.
    NumericalError,
}

impl SolveStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Success)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolveStatus::Success => "success",
            SolveStatus::MaxIterations => "maximum iterations reached",
            SolveStatus::Timeout => "time limit reached",
            SolveStatus::Cancelled => "cancelled",
            SolveStatus::NumericalError => "numerical error",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct Solution {
    pub status: SolveStatus,
    /// Objective value at `x`.
    pub objective: f64,
    /// Decision vector at the last iterate.
    pub x: Vec<f64>,
    /// Largest distance of a constraint value from its bounds at `x`.
    pub constraint_violation: f64,
    pub outer_iterations: usize,
    pub inner_iterations: usize,
    pub solve_time: Duration,
}
