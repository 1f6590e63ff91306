//! Boundary between the MPC formulation and the nonlinear optimizer.
//!
//! The formulation implements [`CostAndConstraintsEvaluator`]; [`SolverAdapter`] turns
//! it into derivatives and hands it to an [`Optimizer`] backend.

mod adapter;
mod alm;
mod backend;
mod cancel;
mod derivatives;
mod evaluator;
mod panoc;
mod problem;
mod solution;

pub use adapter::SolverAdapter;
pub use alm::AlmBackend;
pub use backend::Optimizer;
pub use cancel::CancelToken;
pub use derivatives::{Derivatives, Jacobian};
pub use evaluator::CostAndConstraintsEvaluator;
pub use problem::{NlpProblem, ProblemError, INFINITE_BOUND};
pub use solution::{SolveStatus, Solution};

pub use pilot_core::{Real, SolverOptions};
