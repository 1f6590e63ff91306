use thiserror::Error;

use crate::CostAndConstraintsEvaluator;

/// Bound magnitude treated as unbounded.
pub const INFINITE_BOUND: f64 = 1.0e19;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProblemError {
    #[error("{what} has length {got}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("{what} bounds are inverted at index {index}")]
    InvertedBounds { what: &'static str, index: usize },
    #[error("{0} contains NaN")]
    NotANumber(&'static str),
}

/// A nonlinear program ready to be solved:
///
/// ```text
/// minimize    cost(x)
/// subject to  x_lower <= x <= x_upper
///             g_lower <= constraints(x) <= g_upper
/// ```
///
/// Equality constraints use `g_lower == g_upper`.
#[derive(Debug)]
pub struct NlpProblem<'e, E> {
    evaluator: &'e E,
    x0: Vec<f64>,
    x_lower: Vec<f64>,
    x_upper: Vec<f64>,
    g_lower: Vec<f64>,
    g_upper: Vec<f64>,
}

impl<'e, E: CostAndConstraintsEvaluator> NlpProblem<'e, E> {
    pub fn new(
        evaluator: &'e E,
        x0: Vec<f64>,
        x_lower: Vec<f64>,
        x_upper: Vec<f64>,
        g_lower: Vec<f64>,
        g_upper: Vec<f64>,
    ) -> Result<Self, ProblemError> {
        let n = evaluator.num_variables();
        let m = evaluator.num_constraints();
        check_len("initial guess", &x0, n)?;
        check_len("variable lower bound", &x_lower, n)?;
        check_len("variable upper bound", &x_upper, n)?;
        check_len("constraint lower bound", &g_lower, m)?;
        check_len("constraint upper bound", &g_upper, m)?;
        check_ordered("variable", &x_lower, &x_upper)?;
        check_ordered("constraint", &g_lower, &g_upper)?;
        if x0.iter().any(|v| v.is_nan()) {
            return Err(ProblemError::NotANumber("initial guess"));
        }

        Ok(Self {
            evaluator,
            x0,
            x_lower,
            x_upper,
            g_lower,
            g_upper,
        })
    }

    pub fn evaluator(&self) -> &'e E {
        self.evaluator
    }

    pub fn num_variables(&self) -> usize {
        self.x0.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.g_lower.len()
    }

    pub fn x0(&self) -> &[f64] {
        &self.x0
    }

    pub fn x_lower(&self) -> &[f64] {
        &self.x_lower
    }

    pub fn x_upper(&self) -> &[f64] {
        &self.x_upper
    }

    pub fn g_lower(&self) -> &[f64] {
        &self.g_lower
    }

    pub fn g_upper(&self) -> &[f64] {
        &self.g_upper
    }

    /// The initial guess projected onto the variable bounds.
    pub fn clamped_x0(&self) -> Vec<f64> {
        self.x0
            .iter()
            .zip(self.x_lower.iter().zip(&self.x_upper))
            .map(|(x, (lo, hi))| x.clamp(*lo, *hi))
            .collect()
    }

    /// Largest distance of a constraint value at `x` from its bounds.
    pub fn constraint_violation(&self, x: &[f64]) -> f64 {
        let mut g = vec![0.0; self.num_constraints()];
        self.evaluator.constraints(x, &mut g);
        g.iter()
            .zip(self.g_lower.iter().zip(&self.g_upper))
            .map(|(g, (lo, hi))| (lo - g).max(g - hi).max(0.0))
            .fold(0.0, f64::max)
    }
}

fn check_len(what: &'static str, values: &[f64], expected: usize) -> Result<(), ProblemError> {
    if values.len() == expected {
        Ok(())
    } else {
        Err(ProblemError::DimensionMismatch {
            what,
            expected,
            got: values.len(),
        })
    }
}

fn check_ordered(what: &'static str, lower: &[f64], upper: &[f64]) -> Result<(), ProblemError> {
    match lower
        .iter()
        .zip(upper)
        .position(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi)
    {
        Some(index) => Err(ProblemError::InvertedBounds { what, index }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::Real;

    /// `min x0² + x1²  s.t.  x0 + x1 = 1`
    #[derive(Debug)]
    struct Line;

    impl CostAndConstraintsEvaluator for Line {
        fn num_variables(&self) -> usize {
            2
        }

        fn num_constraints(&self) -> usize {
            1
        }

        fn cost<T: Real>(&self, vars: &[T]) -> T {
            vars[0] * vars[0] + vars[1] * vars[1]
        }

        fn constraints<T: Real>(&self, vars: &[T], out: &mut [T]) {
            out[0] = vars[0] + vars[1];
        }
    }

    #[test]
    fn test_dimension_checks() {
        let err = NlpProblem::new(
            &Line,
            vec![0.0; 3],
            vec![-1.0; 2],
            vec![1.0; 2],
            vec![1.0],
            vec![1.0],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProblemError::DimensionMismatch {
                what: "initial guess",
                expected: 2,
                got: 3
            }
        );
    }

    #[test]
    fn test_inverted_bounds() {
        let err = NlpProblem::new(
            &Line,
            vec![0.0; 2],
            vec![-1.0, 2.0],
            vec![1.0, 1.0],
            vec![1.0],
            vec![1.0],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProblemError::InvertedBounds {
                what: "variable",
                index: 1
            }
        );
    }

    #[test]
    fn test_clamp_and_violation() {
        let problem = NlpProblem::new(
            &Line,
            vec![3.0, -3.0],
            vec![-1.0; 2],
            vec![1.0; 2],
            vec![1.0],
            vec![1.0],
        )
        .unwrap();
        assert_eq!(problem.clamped_x0(), vec![1.0, -1.0]);
        assert_eq!(problem.constraint_violation(&[1.0, -1.0]), 1.0);
        assert_eq!(problem.constraint_violation(&[0.25, 0.75]), 0.0);
    }
}
