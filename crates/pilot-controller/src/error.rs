use pilot_core::{Command, InputError};
use pilot_solver::SolveStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// The inputs were rejected before anything was solved.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),
    /// The optimizer did not return a usable solution. `fallback` is the command to
    /// apply this cycle instead.
    #[error("MPC solve did not converge: {status}")]
    NotConverged {
        status: SolveStatus,
        fallback: Command,
    },
}

impl SolveError {
    /// Command to apply despite the failure, if there is one.
    pub fn fallback(&self) -> Option<&Command> {
        match self {
            SolveError::InvalidInput(_) => None,
            SolveError::NotConverged { fallback, .. } => Some(fallback),
        }
    }

    pub fn status(&self) -> Option<SolveStatus> {
        match self {
            SolveError::InvalidInput(_) => None,
            SolveError::NotConverged { status, .. } => Some(*status),
        }
    }
}
