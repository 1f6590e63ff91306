mod command;
mod real;
mod reference;
mod settings;
mod solver_options;
mod state;

pub use command::*;
pub use real::*;
pub use reference::*;
pub use settings::*;
pub use solver_options::*;
pub use state::*;

pub type Vector2 = nalgebra::Vector2<f64>;

use thiserror::Error;

/// Rejected controller input. Nothing is solved when one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("expected 3 (quadratic) or 4 (cubic) reference coefficients, got {0}")]
    CoefficientCount(usize),
    #[error("expected 6 state components (x, y, psi, v, cte, epsi), got {0}")]
    StateLength(usize),
    #[error("{0} contains non-finite values")]
    NonFinite(&'static str),
}
