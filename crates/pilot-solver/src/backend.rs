use pilot_core::SolverOptions;

use crate::{CancelToken, CostAndConstraintsEvaluator, NlpProblem, Solution};

/// A constrained nonlinear optimizer.
///
/// Backends perform the blocking solve. They must honor `options.max_cpu_time`,
/// reporting [`SolveStatus::Timeout`](crate::SolveStatus::Timeout) when it runs out, and
/// poll `cancel` between evaluations.
pub trait Optimizer {
    fn optimize<E: CostAndConstraintsEvaluator>(
        &self,
        problem: &NlpProblem<'_, E>,
        options: &SolverOptions,
        cancel: &CancelToken,
    ) -> Solution;
}
