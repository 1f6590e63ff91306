use pilot_core::SolverOptions;

use crate::{
    AlmBackend, CancelToken, CostAndConstraintsEvaluator, NlpProblem, Optimizer, SolveStatus,
    Solution,
};

/// Runs solves on a backend with a fixed set of options.
///
/// This is the only place where the blocking optimizer call happens. Exceeding the
/// wall-clock budget is reported as [`SolveStatus::Timeout`] even if the backend itself
/// did not notice.
#[derive(Debug, Clone)]
pub struct SolverAdapter<B = AlmBackend> {
    backend: B,
    options: SolverOptions,
}

impl SolverAdapter<AlmBackend> {
    pub fn with_options(options: SolverOptions) -> Self {
        Self::new(AlmBackend, options)
    }
}

impl<B: Optimizer> SolverAdapter<B> {
    pub fn new(backend: B, options: SolverOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn solve<E: CostAndConstraintsEvaluator>(
        &self,
        problem: &NlpProblem<'_, E>,
        cancel: &CancelToken,
    ) -> Solution {
        let mut solution = self.backend.optimize(problem, &self.options, cancel);

        if solution.status.is_success() && solution.solve_time > self.options.max_duration() {
            solution.status = SolveStatus::Timeout;
        }
        if solution.x.len() != problem.num_variables() {
            tracing::error!(
                "Solver returned {} variables, expected {}",
                solution.x.len(),
                problem.num_variables()
            );
            solution.status = SolveStatus::NumericalError;
            solution.x = problem.x0().to_vec();
        }
        solution.constraint_violation = problem.constraint_violation(&solution.x);

        if self.options.print_level >= 1 {
            tracing::info!(
                status = %solution.status,
                objective = solution.objective,
                violation = solution.constraint_violation,
                outer = solution.outer_iterations,
                inner = solution.inner_iterations,
                "Solved in {:.1} ms",
                solution.solve_time.as_secs_f64() * 1e3
            );
        } else {
            tracing::debug!(
                status = %solution.status,
                objective = solution.objective,
                "Solved in {:.1} ms",
                solution.solve_time.as_secs_f64() * 1e3
            );
        }

        solution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pilot_core::{constant, Real};
    use std::time::Duration;

    /// `min (x0 - 2)² + (x1 - 1)²  s.t.  x0 + x1 = 1,  -1 <= x0 <= 1`
    struct Quadratic;

    impl CostAndConstraintsEvaluator for Quadratic {
        fn num_variables(&self) -> usize {
            2
        }

        fn num_constraints(&self) -> usize {
            1
        }

        fn cost<T: Real>(&self, vars: &[T]) -> T {
            let a = vars[0] - constant::<T>(2.0);
            let b = vars[1] - constant::<T>(1.0);
            a * a + b * b
        }

        fn constraints<T: Real>(&self, vars: &[T], out: &mut [T]) {
            out[0] = vars[0] + vars[1];
        }
    }

    /// `min x²  s.t.  sin(x) = 0.5`
    struct Trig;

    impl CostAndConstraintsEvaluator for Trig {
        fn num_variables(&self) -> usize {
            1
        }

        fn num_constraints(&self) -> usize {
            1
        }

        fn cost<T: Real>(&self, vars: &[T]) -> T {
            vars[0] * vars[0]
        }

        fn constraints<T: Real>(&self, vars: &[T], out: &mut [T]) {
            out[0] = vars[0].sin();
        }
    }

    /// `min (x0 - 2)² + (x1 + 0.5)²  s.t.  -1 <= x <= 1`
    struct Bowl;

    impl CostAndConstraintsEvaluator for Bowl {
        fn num_variables(&self) -> usize {
            2
        }

        fn num_constraints(&self) -> usize {
            0
        }

        fn cost<T: Real>(&self, vars: &[T]) -> T {
            let a = vars[0] - constant::<T>(2.0);
            let b = vars[1] + constant::<T>(0.5);
            a * a + b * b
        }

        fn constraints<T: Real>(&self, _vars: &[T], _out: &mut [T]) {}
    }

    fn bowl() -> NlpProblem<'static, Bowl> {
        NlpProblem::new(
            &Bowl,
            vec![0.0, 0.0],
            vec![-1.0, -1.0],
            vec![1.0, 1.0],
            Vec::new(),
            Vec::new(),
        )
        .unwrap()
    }

    fn options() -> SolverOptions {
        SolverOptions {
            max_cpu_time: 10.0,
            tol: 1e-6,
            constr_viol_tol: 1e-6,
            ..Default::default()
        }
    }

    #[test]
    fn test_equality_constrained_quadratic() {
        let problem = NlpProblem::new(
            &Quadratic,
            vec![0.0, 0.0],
            vec![-1.0, -1e19],
            vec![1.0, 1e19],
            vec![1.0],
            vec![1.0],
        )
        .unwrap();
        let adapter = SolverAdapter::with_options(options());
        let solution = adapter.solve(&problem, &CancelToken::new());

        assert_eq!(solution.status, SolveStatus::Success);
        // The optimum (1, 0) sits on the edge of the box.
        assert_relative_eq!(solution.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(solution.x[1], 0.0, epsilon = 1e-3);
        assert!(solution.constraint_violation < 1e-4);
    }

    #[test]
    fn test_nonlinear_constraint() {
        let problem = NlpProblem::new(
            &Trig,
            vec![0.1],
            vec![-1.0],
            vec![1.0],
            vec![0.5],
            vec![0.5],
        )
        .unwrap();
        let adapter = SolverAdapter::with_options(options());
        let solution = adapter.solve(&problem, &CancelToken::new());

        assert_eq!(solution.status, SolveStatus::Success);
        assert_relative_eq!(solution.x[0], 0.5f64.asin(), epsilon = 1e-3);
    }

    #[test]
    fn test_cancelled_before_start() {
        let problem = NlpProblem::new(
            &Quadratic,
            vec![0.0, 0.0],
            vec![-1.0, -1e19],
            vec![1.0, 1e19],
            vec![1.0],
            vec![1.0],
        )
        .unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let solution = SolverAdapter::with_options(options()).solve(&problem, &cancel);
        assert_eq!(solution.status, SolveStatus::Cancelled);
        assert_eq!(solution.x.len(), 2);
    }

    #[test]
    fn test_box_constrained() {
        let solution = SolverAdapter::with_options(options()).solve(&bowl(), &CancelToken::new());

        assert_eq!(solution.status, SolveStatus::Success);
        assert_relative_eq!(solution.x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(solution.x[1], -0.5, epsilon = 1e-4);
        assert_relative_eq!(solution.objective, 1.0, epsilon = 1e-6);
        assert_eq!(solution.outer_iterations, 1);
        assert_eq!(solution.constraint_violation, 0.0);
    }

    #[test]
    fn test_box_constrained_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let solution = SolverAdapter::with_options(options()).solve(&bowl(), &cancel);
        assert_eq!(solution.status, SolveStatus::Cancelled);
        assert_eq!(solution.x, vec![0.0, 0.0]);
    }

    struct SlowBackend;

    impl Optimizer for SlowBackend {
        fn optimize<E: CostAndConstraintsEvaluator>(
            &self,
            problem: &NlpProblem<'_, E>,
            _options: &SolverOptions,
            _cancel: &CancelToken,
        ) -> Solution {
            Solution {
                status: SolveStatus::Success,
                objective: 0.0,
                x: problem.x0().to_vec(),
                constraint_violation: 0.0,
                outer_iterations: 1,
                inner_iterations: 1,
                solve_time: Duration::from_secs(2),
            }
        }
    }

    #[test]
    fn test_over_budget_is_timeout() {
        let problem = NlpProblem::new(
            &Quadratic,
            vec![0.5, 0.5],
            vec![-1.0, -1e19],
            vec![1.0, 1e19],
            vec![1.0],
            vec![1.0],
        )
        .unwrap();
        let adapter = SolverAdapter::new(SlowBackend, SolverOptions::default());
        let solution = adapter.solve(&problem, &CancelToken::new());
        assert_eq!(solution.status, SolveStatus::Timeout);
        assert_eq!(solution.constraint_violation, 0.0);
    }
}
