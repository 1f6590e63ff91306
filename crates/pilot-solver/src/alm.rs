use std::time::Instant;

use optimization_engine::{
    alm::{AlmCache, AlmFactory, AlmOptimizer, AlmProblem, NO_JACOBIAN_MAPPING, NO_MAPPING},
    constraints::{BallInf, Rectangle},
    core::ExitStatus,
    panoc::PANOCCache,
    SolverError,
};
use pilot_core::SolverOptions;

use crate::{
    panoc::solve_box_constrained, CancelToken, CostAndConstraintsEvaluator, Derivatives,
    NlpProblem, Optimizer, SolveStatus, Solution,
};

/// Radius of the box the Lagrange multipliers are projected onto.
const MULTIPLIER_BOUND: f64 = 1e12;
/// Inner tolerance of the first outer iteration.
const INITIAL_INNER_TOLERANCE: f64 = 1e-1;

/// Augmented Lagrangian method with PANOC inner solves, from `optimization_engine`.
///
/// Variable bounds become the PANOC box, constraints become `F1(x) ∈ [g_lower, g_upper]`.
/// Problems without constraints skip the outer loop and go to PANOC directly.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlmBackend;

impl Optimizer for AlmBackend {
    fn optimize<E: CostAndConstraintsEvaluator>(
        &self,
        problem: &NlpProblem<'_, E>,
        options: &SolverOptions,
        cancel: &CancelToken,
    ) -> Solution {
        if problem.num_constraints() == 0 {
            return solve_box_constrained(problem, options, cancel);
        }

        let start = Instant::now();
        let n = problem.num_variables();
        let n1 = problem.num_constraints();
        let evaluator = problem.evaluator();
        let derivatives = Derivatives::new(evaluator, options);

        let f = |u: &[f64], cost: &mut f64| -> Result<(), SolverError> {
            check_cancelled(cancel)?;
            *cost = evaluator.cost(u);
            if cost.is_finite() {
                Ok(())
            } else {
                Err(SolverError::NotFiniteComputation)
            }
        };
        let df = |u: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
            check_cancelled(cancel)?;
            derivatives.gradient(u, grad);
            Ok(())
        };
        let f1 = |u: &[f64], out: &mut [f64]| -> Result<(), SolverError> {
            evaluator.constraints(u, out);
            Ok(())
        };
        let f1_jacobian_product = |u: &[f64], d: &[f64], out: &mut [f64]| -> Result<(), SolverError> {
            check_cancelled(cancel)?;
            derivatives.jacobian_transpose_product(u, d, out);
            Ok(())
        };

        let bounds = Rectangle::new(Some(problem.x_lower()), Some(problem.x_upper()));
        let set_c = Rectangle::new(Some(problem.g_lower()), Some(problem.g_upper()));
        let set_y = BallInf::new(None, MULTIPLIER_BOUND);

        let factory = AlmFactory::new(
            f,
            df,
            Some(f1),
            Some(f1_jacobian_product),
            NO_MAPPING,
            NO_JACOBIAN_MAPPING,
            Some(set_c),
            0,
        );
        let alm_problem = AlmProblem::new(
            bounds,
            Some(Rectangle::new(Some(problem.g_lower()), Some(problem.g_upper()))),
            Some(set_y),
            |u: &[f64], xi: &[f64], cost: &mut f64| -> Result<(), SolverError> {
                factory.psi(u, xi, cost)
            },
            |u: &[f64], xi: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
                factory.d_psi(u, xi, grad)
            },
            Some(f1),
            NO_MAPPING,
            n1,
            0,
        );

        let panoc_cache = PANOCCache::new(n, options.tol, options.lbfgs_memory);
        let mut alm_cache = AlmCache::new(panoc_cache, n1, 0);
        let mut optimizer = AlmOptimizer::new(&mut alm_cache, alm_problem)
            .with_delta_tolerance(options.constr_viol_tol)
            .with_epsilon_tolerance(options.tol)
            .with_initial_inner_tolerance(options.tol.max(INITIAL_INNER_TOLERANCE))
            .with_max_outer_iterations(options.max_iter)
            .with_max_inner_iterations(options.max_inner_iter)
            .with_initial_penalty(options.initial_penalty)
            .with_penalty_update_factor(options.penalty_update_factor)
            .with_max_duration(options.max_duration());

        let mut u = problem.clamped_x0();
        let (mut status, outer_iterations, inner_iterations) = match optimizer.solve(&mut u) {
            Ok(result) => {
                let status = match result.exit_status() {
                    ExitStatus::Converged => SolveStatus::Success,
                    ExitStatus::NotConvergedIterations => SolveStatus::MaxIterations,
                    ExitStatus::NotConvergedOutOfTime => SolveStatus::Timeout,
                };
                (
                    status,
                    result.num_outer_iterations(),
                    result.num_inner_iterations(),
                )
            }
            Err(_) if cancel.is_cancelled() => (SolveStatus::Cancelled, 0, 0),
            Err(err) => {
                tracing::warn!("ALM solver failed: {:?}", err);
                (SolveStatus::NumericalError, 0, 0)
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
            outer_iterations,
            inner_iterations,
            solve_time: start.elapsed(),
        }
    }
}

fn check_cancelled(cancel: &CancelToken) -> Result<(), SolverError> {
    if cancel.is_cancelled() {
        Err(SolverError::Cost)
    } else {
        Ok(())
    }
}
