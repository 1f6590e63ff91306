use std::{fmt::Write, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("malformed solver directive `{0}`")]
    Malformed(String),
    #[error("unknown {kind} option `{name}`")]
    UnknownOption { kind: String, name: String },
    #[error("invalid value `{value}` for solver option `{name}`")]
    InvalidValue { name: String, value: String },
    #[error("solver option `{name}` {reason}")]
    OutOfRange {
        name: &'static str,
        reason: &'static str,
    },
}

/// Options handed to the optimizer backend.
///
/// Besides JSON, the options can be written as a flat list of directives, one per line:
///
/// ```text
/// Integer print_level  0
/// Sparse  true         forward
/// Sparse  true         reverse
/// Numeric max_cpu_time 0.5
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// 0 is quiet, 1 logs every solve, 2 and above also logs derivative evaluations.
    pub print_level: u8,
    /// Compress Jacobian columns that share no row into one forward pass.
    pub sparse_forward: bool,
    /// Keep derivatives as sparse triplets and only differentiate the cost along the
    /// variables it depends on.
    pub sparse_reverse: bool,
    /// Wall-clock budget for one solve, in seconds.
    pub max_cpu_time: f64,
    /// Tolerance on the inner fixed-point residual.
    pub tol: f64,
    /// Tolerance on the constraint violation.
    pub constr_viol_tol: f64,
    /// Maximum number of outer (multiplier update) iterations.
    pub max_iter: usize,
    /// Maximum number of inner iterations per outer iteration.
    pub max_inner_iter: usize,
    /// Memory of the quasi-Newton directions.
    pub lbfgs_memory: usize,
    /// Penalty parameter of the first outer iteration.
    pub initial_penalty: f64,
    /// Factor the penalty grows by when the infeasibility does not decrease enough.
    pub penalty_update_factor: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            print_level: 0,
            sparse_forward: true,
            sparse_reverse: true,
            max_cpu_time: 0.5,
            tol: 1e-4,
            constr_viol_tol: 1e-4,
            max_iter: 50,
            max_inner_iter: 1000,
            lbfgs_memory: 10,
            initial_penalty: 1e3,
            penalty_update_factor: 5.0,
        }
    }
}

impl SolverOptions {
    /// Default options overridden by the given directives.
    pub fn from_directives(directives: &str) -> Result<Self, OptionsError> {
        let mut options = Self::default();
        for line in directives.lines() {
            options.apply_directive(line)?;
        }
        options.validate()?;
        Ok(options)
    }

    /// Apply a single directive. Blank lines and `#` comments are ignored.
    pub fn apply_directive(&mut self, line: &str) -> Result<(), OptionsError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let &[kind, first, second] = tokens.as_slice() else {
            return Err(OptionsError::Malformed(line.to_string()));
        };

        match kind {
            "Integer" => {
                let value: usize = parse_value(first, second)?;
                match first {
                    "print_level" => {
                        self.print_level = u8::try_from(value).map_err(|_| {
                            OptionsError::InvalidValue {
                                name: first.to_string(),
                                value: second.to_string(),
                            }
                        })?
                    }
                    "max_iter" => self.max_iter = value,
                    "max_inner_iter" => self.max_inner_iter = value,
                    "lbfgs_memory" => self.lbfgs_memory = value,
                    _ => return Err(unknown(kind, first)),
                }
            }
            "Numeric" => {
                let value: f64 = parse_value(first, second)?;
                match first {
                    "max_cpu_time" => self.max_cpu_time = value,
                    "tol" => self.tol = value,
                    "constr_viol_tol" => self.constr_viol_tol = value,
                    "initial_penalty" => self.initial_penalty = value,
                    "penalty_update_factor" => self.penalty_update_factor = value,
                    _ => return Err(unknown(kind, first)),
                }
            }
            "Sparse" => {
                let enabled: bool = parse_value("Sparse", first)?;
                match second {
                    "forward" => self.sparse_forward = enabled,
                    "reverse" => self.sparse_reverse = enabled,
                    _ => return Err(unknown(kind, second)),
                }
            }
            _ => return Err(unknown(kind, first)),
        }
        Ok(())
    }

    /// Render the options in directive form.
    pub fn to_directives(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Integer print_level {}", self.print_level);
        let _ = writeln!(out, "Sparse {} forward", self.sparse_forward);
        let _ = writeln!(out, "Sparse {} reverse", self.sparse_reverse);
        let _ = writeln!(out, "Numeric max_cpu_time {}", self.max_cpu_time);
        let _ = writeln!(out, "Numeric tol {:e}", self.tol);
        let _ = writeln!(out, "Numeric constr_viol_tol {:e}", self.constr_viol_tol);
        let _ = writeln!(out, "Integer max_iter {}", self.max_iter);
        let _ = writeln!(out, "Integer max_inner_iter {}", self.max_inner_iter);
        let _ = writeln!(out, "Integer lbfgs_memory {}", self.lbfgs_memory);
        let _ = writeln!(out, "Numeric initial_penalty {:e}", self.initial_penalty);
        let _ = writeln!(
            out,
            "Numeric penalty_update_factor {}",
            self.penalty_update_factor
        );
        out
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        let positive = [
            ("max_cpu_time", self.max_cpu_time),
            ("tol", self.tol),
            ("constr_viol_tol", self.constr_viol_tol),
            ("initial_penalty", self.initial_penalty),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(OptionsError::OutOfRange {
                    name,
                    reason: "must be positive and finite",
                });
            }
        }
        if !(self.penalty_update_factor.is_finite() && self.penalty_update_factor > 1.0) {
            return Err(OptionsError::OutOfRange {
                name: "penalty_update_factor",
                reason: "must be greater than 1",
            });
        }
        let counts = [
            ("max_iter", self.max_iter),
            ("max_inner_iter", self.max_inner_iter),
            ("lbfgs_memory", self.lbfgs_memory),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(OptionsError::OutOfRange {
                    name,
                    reason: "must be at least 1",
                });
            }
        }
        Ok(())
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_cpu_time)
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, OptionsError> {
    value.parse().map_err(|_| OptionsError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn unknown(kind: &str, name: &str) -> OptionsError {
    OptionsError::UnknownOption {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}
