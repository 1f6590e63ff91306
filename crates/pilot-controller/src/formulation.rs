use pilot_core::{constant, MpcSettings, Real, ReferencePolynomial, VehicleState};
use pilot_solver::{CostAndConstraintsEvaluator, NlpProblem, ProblemError, INFINITE_BOUND};

use crate::{ConstraintBuilder, CostFunctional, Var, VariableLayout, VehicleModel};

/// One cycle's optimal-control problem: objective, dynamics constraints and bounds for
/// a measured state and a reference path.
///
/// The full decision vector holds states and actuations. Since the states are fully
/// determined by the measurement and the actuations, the problem can also be solved in
/// the actuations alone through [`TrackingProblem::condensed`], and mapped back with
/// [`TrackingProblem::expand`].
#[derive(Clone, Debug)]
pub struct TrackingProblem {
    layout: VariableLayout,
    model: VehicleModel,
    reference: ReferencePolynomial,
    state: VehicleState,
    cost: CostFunctional,
    constraints: ConstraintBuilder,
    max_steering: f64,
    max_acceleration: f64,
}

impl TrackingProblem {
    pub fn new(settings: &MpcSettings, state: VehicleState, reference: ReferencePolynomial) -> Self {
        let layout = VariableLayout::new(settings.horizon);
        let model = VehicleModel::from_settings(settings);
        Self {
            layout,
            model,
            reference,
            state,
            cost: CostFunctional::from_settings(settings),
            constraints: ConstraintBuilder::new(layout, model, reference),
            max_steering: settings.max_steering(),
            max_acceleration: settings.max_acceleration,
        }
    }

    pub fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Number of actuation variables, `2 * (N - 1)`.
    pub fn num_actuations(&self) -> usize {
        self.layout.num_variables() - self.layout.start(Var::Delta)
    }

    /// Variable box. Initial-state slots are fixed to the measurement.
    pub fn variable_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let n = self.layout.num_variables();
        let mut lower = vec![-INFINITE_BOUND; n];
        let mut upper = vec![INFINITE_BOUND; n];

        for i in self.layout.range(Var::Delta) {
            lower[i] = -self.max_steering;
            upper[i] = self.max_steering;
        }
        for i in self.layout.range(Var::A) {
            lower[i] = -self.max_acceleration;
            upper[i] = self.max_acceleration;
        }
        for (kind, value) in Var::STATES.into_iter().zip(self.state.to_array()) {
            let i = self.layout.index(kind, 0);
            lower[i] = value;
            upper[i] = value;
        }
        (lower, upper)
    }

    /// Equality bounds: pins equal the measured state, residuals equal zero.
    pub fn constraint_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let mut bounds = vec![0.0; self.layout.num_constraints()];
        for (kind, value) in Var::STATES.into_iter().zip(self.state.to_array()) {
            bounds[self.layout.constraint_index(kind, 0)] = value;
        }
        (bounds.clone(), bounds)
    }

    /// Full decision vector for the actuations `[delta(N-1), a(N-1)]`, with the states
    /// rolled out from the measurement. Satisfies every constraint by construction.
    pub fn expand<T: Real>(&self, actuations: &[T]) -> Vec<T> {
        let layout = &self.layout;
        let steps = layout.horizon() - 1;
        let mut vars = vec![constant::<T>(0.0); layout.num_variables()];

        let pairs: Vec<(T, T)> = (0..steps)
            .map(|t| (actuations[t], actuations[steps + t]))
            .collect();
        let initial = self.state.map(constant::<T>);
        let states = self.model.rollout(&initial, &pairs, &self.reference);
        for (t, state) in states.iter().enumerate() {
            for (kind, value) in Var::STATES.into_iter().zip(state.to_array()) {
                vars[layout.index(kind, t)] = value;
            }
        }
        vars[layout.start(Var::Delta)..].copy_from_slice(actuations);
        vars
    }

    /// The full nonlinear program, starting from the rollout of `actuations`.
    pub fn to_nlp(&self, actuations: &[f64]) -> Result<NlpProblem<'_, Self>, ProblemError> {
        let (x_lower, x_upper) = self.variable_bounds();
        let (g_lower, g_upper) = self.constraint_bounds();
        NlpProblem::new(
            self,
            self.expand(actuations),
            x_lower,
            x_upper,
            g_lower,
            g_upper,
        )
    }

    pub fn condensed(&self) -> CondensedProblem<'_> {
        CondensedProblem { problem: self }
    }
}

impl CostAndConstraintsEvaluator for TrackingProblem {
    fn num_variables(&self) -> usize {
        self.layout.num_variables()
    }

    fn num_constraints(&self) -> usize {
        self.layout.num_constraints()
    }

    fn cost<T: Real>(&self, vars: &[T]) -> T {
        self.cost.evaluate(vars)
    }

    fn constraints<T: Real>(&self, vars: &[T], out: &mut [T]) {
        self.constraints.evaluate(vars, out)
    }

    fn cost_dependencies(&self) -> Vec<usize> {
        self.cost.dependencies()
    }

    fn jacobian_sparsity(&self) -> Vec<(usize, usize)> {
        self.constraints.sparsity()
    }
}

/// [`TrackingProblem`] with the states eliminated: the variables are the actuations
/// only, bounded by the actuator limits, and there are no constraints left.
#[derive(Clone, Copy, Debug)]
pub struct CondensedProblem<'p> {
    problem: &'p TrackingProblem,
}

impl<'p> CondensedProblem<'p> {
    pub fn bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let start = self.problem.layout.start(Var::Delta);
        let (mut lower, mut upper) = self.problem.variable_bounds();
        (lower.split_off(start), upper.split_off(start))
    }

    pub fn to_nlp(&self, actuations: Vec<f64>) -> Result<NlpProblem<'_, Self>, ProblemError> {
        let (lower, upper) = self.bounds();
        NlpProblem::new(self, actuations, lower, upper, Vec::new(), Vec::new())
    }
}

impl CostAndConstraintsEvaluator for CondensedProblem<'_> {
    fn num_variables(&self) -> usize {
        self.problem.num_actuations()
    }

    fn num_constraints(&self) -> usize {
        0
    }

    fn cost<T: Real>(&self, actuations: &[T]) -> T {
        self.problem.cost.evaluate(&self.problem.expand(actuations))
    }

    fn constraints<T: Real>(&self, _actuations: &[T], _out: &mut [T]) {}

    fn jacobian_sparsity(&self) -> Vec<(usize, usize)> {
        Vec::new()
    }
}
