use pilot_core::{Real, ReferencePolynomial, VehicleState};

use crate::{Var, VariableLayout, VehicleModel};

/// Variables at step `t` that the model's update of each state reads, in
/// [`Var::STATES`] order. Besides these, every residual row depends on the state
/// itself at `t + 1`.
const STEP_DEPENDENCIES: [&[Var]; 6] = [
    &[Var::X, Var::Psi, Var::V],
    &[Var::Y, Var::Psi, Var::V],
    &[Var::Psi, Var::V, Var::Delta],
    &[Var::V, Var::A],
    &[Var::X, Var::Y, Var::V, Var::Epsi],
    &[Var::X, Var::Psi, Var::V, Var::Delta],
];

/// Constraint vector of the tracking problem: pins of the initial state followed by
/// the dynamics residuals `state[t+1] - model(state[t], actuation[t])`.
#[derive(Clone, Debug)]
pub struct ConstraintBuilder {
    layout: VariableLayout,
    model: VehicleModel,
    reference: ReferencePolynomial,
}

impl ConstraintBuilder {
    pub fn new(layout: VariableLayout, model: VehicleModel, reference: ReferencePolynomial) -> Self {
        Self {
            layout,
            model,
            reference,
        }
    }

    /// Writes `layout.num_constraints()` values into `out`.
    pub fn evaluate<T: Real>(&self, vars: &[T], out: &mut [T]) {
        let layout = &self.layout;
        let state_at =
            |t: usize| VehicleState::from_array(Var::STATES.map(|var| vars[layout.index(var, t)]));

        for kind in Var::STATES {
            out[layout.constraint_index(kind, 0)] = vars[layout.index(kind, 0)];
        }

        let mut current = state_at(0);
        for t in 0..layout.horizon() - 1 {
            let next = state_at(t + 1);
            let delta = vars[layout.index(Var::Delta, t)];
            let a = vars[layout.index(Var::A, t)];
            let predicted = self.model.step(&current, delta, a, &self.reference);

            let residuals = next.to_array().into_iter().zip(predicted.to_array());
            for (kind, (actual, predicted)) in Var::STATES.into_iter().zip(residuals) {
                out[layout.constraint_index(kind, t + 1)] = actual - predicted;
            }
            current = next;
        }
    }

    /// Structurally non-zero `(row, column)` entries of the constraint Jacobian.
    pub fn sparsity(&self) -> Vec<(usize, usize)> {
        let layout = &self.layout;
        let mut entries = Vec::new();
        for kind in Var::STATES {
            entries.push((layout.constraint_index(kind, 0), layout.index(kind, 0)));
        }
        for t in 0..layout.horizon() - 1 {
            for (kind, deps) in Var::STATES.into_iter().zip(STEP_DEPENDENCIES) {
                let row = layout.constraint_index(kind, t + 1);
                entries.push((row, layout.index(kind, t + 1)));
                entries.extend(deps.iter().map(|&dep| (row, layout.index(dep, t))));
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_dual::Dual64;

    fn builder(n: usize, reference: ReferencePolynomial) -> ConstraintBuilder {
        ConstraintBuilder::new(
            VariableLayout::new(n),
            VehicleModel::new(2.67, 0.1),
            reference,
        )
    }

    fn pack(layout: &VariableLayout, states: &[VehicleState], actuations: &[(f64, f64)]) -> Vec<f64> {
        let mut vars = vec![0.0; layout.num_variables()];
        for (t, state) in states.iter().enumerate() {
            for (kind, value) in Var::STATES.into_iter().zip(state.to_array()) {
                vars[layout.index(kind, t)] = value;
            }
        }
        for (t, &(delta, a)) in actuations.iter().enumerate() {
            vars[layout.index(Var::Delta, t)] = delta;
            vars[layout.index(Var::A, t)] = a;
        }
        vars
    }

    #[test]
    fn test_residuals_vanish_on_rollout() {
        let reference = ReferencePolynomial::Cubic([0.5, 0.1, -0.01, 0.001]);
        let constraints = builder(8, reference);
        let layout = constraints.layout;
        let initial = VehicleState::new(0.0, 0.2, 0.05, 12.0, 0.3, -0.04);
        let actuations: Vec<(f64, f64)> = (0..7)
            .map(|t| (0.02 * t as f64 - 0.05, 0.5 - 0.1 * t as f64))
            .collect();
        let states = constraints.model.rollout(&initial, &actuations, &reference);
        let vars = pack(&layout, &states, &actuations);

        let mut out = vec![f64::NAN; layout.num_constraints()];
        constraints.evaluate(&vars, &mut out);

        for (kind, value) in Var::STATES.into_iter().zip(initial.to_array()) {
            assert_eq!(out[layout.constraint_index(kind, 0)], value);
        }
        for kind in Var::STATES {
            for row in 1..layout.horizon() {
                assert_relative_eq!(out[layout.constraint_index(kind, row)], 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_residual_of_perturbed_state() {
        let constraints = builder(3, ReferencePolynomial::straight());
        let layout = constraints.layout;
        let initial = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.0, 0.0);
        let actuations = [(0.0, 0.0); 2];
        let states = constraints
            .model
            .rollout(&initial, &actuations, &ReferencePolynomial::straight());
        let mut vars = pack(&layout, &states, &actuations);
        vars[layout.index(Var::Y, 2)] += 0.25;

        let mut out = vec![0.0; layout.num_constraints()];
        constraints.evaluate(&vars, &mut out);
        assert_relative_eq!(out[layout.constraint_index(Var::Y, 2)], 0.25, epsilon = 1e-12);
        assert_relative_eq!(out[layout.constraint_index(Var::Y, 1)], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sparsity_covers_jacobian() {
        let constraints = builder(4, ReferencePolynomial::Quadratic([0.1, 0.2, 0.03]));
        let layout = constraints.layout;
        let pattern = constraints.sparsity();
        let vars: Vec<f64> = (0..layout.num_variables())
            .map(|i| 0.1 + 0.05 * i as f64)
            .collect();

        for col in 0..layout.num_variables() {
            let dual: Vec<Dual64> = vars
                .iter()
                .enumerate()
                .map(|(i, &v)| Dual64::new(v, if i == col { 1.0 } else { 0.0 }))
                .collect();
            let mut out = vec![Dual64::new(0.0, 0.0); layout.num_constraints()];
            constraints.evaluate(&dual, &mut out);
            for (row, value) in out.iter().enumerate() {
                if value.eps != 0.0 {
                    assert!(pattern.contains(&(row, col)), "missing ({row}, {col})");
                }
            }
        }
    }
}
