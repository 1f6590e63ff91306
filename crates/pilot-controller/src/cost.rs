use pilot_core::{constant, CostWeights, MpcSettings, Real};

use crate::{Var, VariableLayout};

/// Quadratic tracking objective over the horizon.
///
/// ```text
///   Σ_t<N    w_cte*cte² + w_epsi*epsi² + w_v*(v - v_ref)²
/// + Σ_t<N-1  w_delta*delta² + w_a*a²
/// + Σ_t<N-2  w_ddelta*(delta[t+1] - delta[t])² + w_da*(a[t+1] - a[t])²
/// ```
#[derive(Clone, Debug)]
pub struct CostFunctional {
    layout: VariableLayout,
    weights: CostWeights,
    ref_v: f64,
}

impl CostFunctional {
    pub fn new(layout: VariableLayout, weights: CostWeights, ref_v: f64) -> Self {
        Self {
            layout,
            weights,
            ref_v,
        }
    }

    pub fn from_settings(settings: &MpcSettings) -> Self {
        Self::new(
            VariableLayout::new(settings.horizon),
            settings.weights.clone(),
            settings.ref_v,
        )
    }

    pub fn evaluate<T: Real>(&self, vars: &[T]) -> T {
        let layout = &self.layout;
        let w = &self.weights;
        let n = layout.horizon();
        let at = |var: Var, t: usize| vars[layout.index(var, t)];
        let weighted = |weight: f64, value: T| value * value * constant::<T>(weight);

        let mut cost: T = constant(0.0);
        for t in 0..n {
            cost = cost
                + weighted(w.cte, at(Var::Cte, t))
                + weighted(w.epsi, at(Var::Epsi, t))
                + weighted(w.speed, at(Var::V, t) - constant::<T>(self.ref_v));
        }
        for t in 0..n - 1 {
            cost = cost
                + weighted(w.steering, at(Var::Delta, t))
                + weighted(w.acceleration, at(Var::A, t));
        }
        for t in 0..n.saturating_sub(2) {
            cost = cost
                + weighted(w.steering_rate, at(Var::Delta, t + 1) - at(Var::Delta, t))
                + weighted(w.acceleration_rate, at(Var::A, t + 1) - at(Var::A, t));
        }
        cost
    }

    /// Decision variables the objective depends on. `x`, `y` and `psi` only enter
    /// through the constraints.
    pub fn dependencies(&self) -> Vec<usize> {
        [Var::V, Var::Cte, Var::Epsi, Var::Delta, Var::A]
            .into_iter()
            .flat_map(|var| self.layout.range(var))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_dual::Dual64;

    fn functional(n: usize) -> CostFunctional {
        CostFunctional::new(VariableLayout::new(n), CostWeights::default(), 100.0)
    }

    fn ideal(layout: &VariableLayout) -> Vec<f64> {
        let mut vars = vec![0.0; layout.num_variables()];
        for i in layout.range(Var::V) {
            vars[i] = 100.0;
        }
        vars
    }

    #[test]
    fn test_zero_on_ideal_trajectory() {
        let cost = functional(10);
        let vars = ideal(&cost.layout);
        assert_eq!(cost.evaluate(&vars), 0.0);
    }

    #[test]
    fn test_single_terms() {
        let cost = functional(4);
        let layout = cost.layout;
        let w = CostWeights::default();

        let mut vars = ideal(&layout);
        vars[layout.index(Var::Cte, 2)] = 0.5;
        assert_relative_eq!(cost.evaluate(&vars), w.cte * 0.25, epsilon = 1e-9);

        // One steering spike at t = 1 contributes once to the magnitude term and to
        // both neighbouring rate terms.
        let mut vars = ideal(&layout);
        vars[layout.index(Var::Delta, 1)] = 0.1;
        let expected = w.steering * 0.01 + 2.0 * w.steering_rate * 0.01;
        assert_relative_eq!(cost.evaluate(&vars), expected, epsilon = 1e-9);

        let mut vars = ideal(&layout);
        vars[layout.index(Var::V, 0)] = 90.0;
        assert_relative_eq!(cost.evaluate(&vars), w.speed * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_rate_terms_for_smallest_horizon() {
        let cost = functional(2);
        let layout = cost.layout;
        let mut vars = ideal(&layout);
        vars[layout.index(Var::A, 0)] = 1.0;
        assert_relative_eq!(
            cost.evaluate(&vars),
            CostWeights::default().acceleration,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_dependencies_cover_nonzero_gradient() {
        let cost = functional(5);
        let layout = cost.layout;
        let deps = cost.dependencies();
        let vars: Vec<f64> = (0..layout.num_variables())
            .map(|i| 0.01 * i as f64)
            .collect();

        for j in 0..layout.num_variables() {
            let dual: Vec<Dual64> = vars
                .iter()
                .enumerate()
                .map(|(i, &v)| Dual64::new(v, if i == j { 1.0 } else { 0.0 }))
                .collect();
            let derivative = cost.evaluate(&dual).eps;
            if !deps.contains(&j) {
                assert_eq!(derivative, 0.0, "column {j}");
            }
        }
        assert!(!deps.contains(&layout.index(Var::X, 1)));
        assert!(deps.contains(&layout.index(Var::A, 3)));
    }
}
