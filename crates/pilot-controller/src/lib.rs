//! Receding-horizon tracking controller for a kinematic bicycle.
//!
//! [`MpcController`] assembles the optimal-control problem from a [`VariableLayout`],
//! a [`VehicleModel`], a [`CostFunctional`] and a [`ConstraintBuilder`], solves it
//! through [`pilot_solver::SolverAdapter`] and returns the first actuation.

mod constraints;
mod controller;
mod cost;
mod error;
mod formulation;
mod layout;
mod model;
mod worker;

pub use constraints::ConstraintBuilder;
pub use controller::MpcController;
pub use cost::CostFunctional;
pub use error::SolveError;
pub use formulation::{CondensedProblem, TrackingProblem};
pub use layout::{Var, VariableLayout};
pub use model::VehicleModel;
pub use worker::{MpcOutcome, MpcWorker, WorkerError};

pub use pilot_solver::{SolveStatus, Solution};
