use std::time::Instant;

use optimization_engine::{
    constraints::Rectangle,
    core::ExitStatus,
    panoc::{PANOCCache, PANOCOptimizer},
    Optimizer as _, Problem, SolverError,
};
use pilot_core::SolverOptions;

use crate::{
    CancelToken, CostAndConstraintsEvaluator, Derivatives, NlpProblem, SolveStatus, Solution,
};

/// PANOC on `min cost(x)  s.t.  x_lower <= x <= x_upper`. The problem must not have
/// general constraints.
pub(crate) fn solve_box_constrained<E: CostAndConstraintsEvaluator>(
    problem: &NlpProblem<'_, E>,
    options: &SolverOptions,
    cancel: &CancelToken,
) -> Solution {
    debug_assert_eq!(problem.num_constraints(), 0);
    let start = Instant::now();
    let evaluator = problem.evaluator();
    let derivatives = Derivatives::new(evaluator, options);

    let cost = |u: &[f64], c: &mut f64| -> Result<(), SolverError> {
        if cancel.is_cancelled() {
            return Err(SolverError::Cost);
        }
        *c = evaluator.cost(u);
        if c.is_finite() {
            Ok(())
        } else {
            Err(SolverError::NotFiniteComputation)
        }
    };
    let cost_grad = |u: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
        if cancel.is_cancelled() {
            return Err(SolverError::Cost);
        }
        derivatives.gradient(u, grad);
        Ok(())
    };

    let bounds = Rectangle::new(Some(problem.x_lower()), Some(problem.x_upper()));
    let panoc_problem = Problem::new(&bounds, cost_grad, cost);
    let mut panoc_cache =
        PANOCCache::new(problem.num_variables(), options.tol, options.lbfgs_memory);
    let mut panoc = PANOCOptimizer::new(panoc_problem, &mut panoc_cache)
        .with_max_iter(options.max_inner_iter)
        .with_max_duration(options.max_duration());

    let mut u = problem.clamped_x0();
    let (mut status, iterations) = match panoc.solve(&mut u) {
        Ok(result) => {
            let status = match result.exit_status() {
                ExitStatus::Converged => SolveStatus::Success,
                ExitStatus::NotConvergedIterations => SolveStatus::MaxIterations,
                ExitStatus::NotConvergedOutOfTime => SolveStatus::Timeout,
            };
            (status, result.iterations())
        }
        Err(_) if cancel.is_cancelled() => (SolveStatus::Cancelled, 0),
        Err(err) => {
            tracing::warn!("PANOC solver failed: {:?}", err);
            (SolveStatus::NumericalError, 0)
        }
    };

    let objective = evaluator.cost(&u);
    if status.is_success() && (!objective.is_finite() || u.iter().any(|v| !v.is_finite())) {
        status = SolveStatus::NumericalError;
    }

    Solution {
        status,
        objective,
        x: u,
        constraint_violation: 0.0,
        outer_iterations: 1,
        inner_iterations: iterations,
        solve_time: start.elapsed(),
    }
}
