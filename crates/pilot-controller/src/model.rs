use pilot_core::{constant, MpcSettings, Real, ReferencePolynomial, VehicleState};

/// Discrete kinematic bicycle model with an explicit Euler step.
///
/// Steering enters the heading update with a negative sign: a positive `delta` turns
/// the vehicle towards negative heading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleModel {
    /// Distance from the front axle to the center of gravity \[m]
    pub lf: f64,
    /// Step length \[s]
    pub dt: f64,
}

impl VehicleModel {
    pub fn new(lf: f64, dt: f64) -> Self {
        Self { lf, dt }
    }

    pub fn from_settings(settings: &MpcSettings) -> Self {
        Self::new(settings.lf, settings.dt)
    }

    /// Advance `state` by one step of length `dt`.
    pub fn step<T: Real>(
        &self,
        state: &VehicleState<T>,
        delta: T,
        a: T,
        reference: &ReferencePolynomial,
    ) -> VehicleState<T> {
        self.step_by(state, delta, a, reference, self.dt)
    }

    /// Advance `state` by a step of length `h`.
    pub fn step_by<T: Real>(
        &self,
        state: &VehicleState<T>,
        delta: T,
        a: T,
        reference: &ReferencePolynomial,
        h: f64,
    ) -> VehicleState<T> {
        let h: T = constant(h);
        let lf: T = constant(self.lf);
        let VehicleState {
            x,
            y,
            psi,
            v,
            epsi,
            ..
        } = *state;
        let yaw_change = v * delta / lf * h;

        VehicleState {
            x: x + v * psi.cos() * h,
            y: y + v * psi.sin() * h,
            psi: psi - yaw_change,
            v: v + a * h,
            cte: (reference.value(x) - y) + v * epsi.sin() * h,
            epsi: psi - reference.heading(x) - yaw_change,
        }
    }

    /// States `0..=actuations.len()` starting from `initial`, with `(delta, a)` applied
    /// at each step.
    pub fn rollout<T: Real>(
        &self,
        initial: &VehicleState<T>,
        actuations: &[(T, T)],
        reference: &ReferencePolynomial,
    ) -> Vec<VehicleState<T>> {
        let mut states = Vec::with_capacity(actuations.len() + 1);
        states.push(*initial);
        let mut state = *initial;
        for &(delta, a) in actuations {
            state = self.step(&state, delta, a, reference);
            states.push(state);
        }
        states
    }

    /// Integrate `duration` seconds with a held command, in sub-steps no longer than
    /// `dt`. Used to compensate actuation latency.
    pub fn predict_forward(
        &self,
        state: &VehicleState,
        delta: f64,
        a: f64,
        reference: &ReferencePolynomial,
        duration: f64,
    ) -> VehicleState {
        if duration <= 0.0 {
            return *state;
        }
        let steps = (duration / self.dt).ceil().max(1.0) as usize;
        let h = duration / steps as f64;
        (0..steps).fold(*state, |s, _| self.step_by(&s, delta, a, reference, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn model() -> VehicleModel {
        VehicleModel::new(2.67, 0.1)
    }

    #[test]
    fn test_straight_line_step() {
        let state = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.0, 0.0);
        let next = model().step(&state, 0.0, 1.0, &ReferencePolynomial::straight());
        assert_relative_eq!(next.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(next.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(next.psi, 0.0, epsilon = 1e-12);
        assert_relative_eq!(next.v, 10.1, epsilon = 1e-12);
        assert_relative_eq!(next.cte, 0.0, epsilon = 1e-12);
        assert_relative_eq!(next.epsi, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_positive_steering_turns_to_negative_heading() {
        let state = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.0, 0.0);
        let next = model().step(&state, 0.1, 0.0, &ReferencePolynomial::straight());
        assert_relative_eq!(next.psi, -10.0 * 0.1 / 2.67 * 0.1, epsilon = 1e-12);
        assert_relative_eq!(next.epsi, next.psi, epsilon = 1e-12);
    }

    #[test]
    fn test_error_terms() {
        let reference = ReferencePolynomial::Quadratic([1.0, 0.5, 0.0]);
        let state = VehicleState::new(2.0, 0.5, 0.2, 5.0, 0.0, 0.3);
        let next = model().step(&state, 0.0, 0.0, &reference);
        // f(2) = 2, psides = atan(0.5)
        assert_relative_eq!(next.cte, 1.5 + 5.0 * 0.3f64.sin() * 0.1, epsilon = 1e-12);
        assert_relative_eq!(next.epsi, 0.2 - 0.5f64.atan(), epsilon = 1e-12);
    }

    #[test]
    fn test_rollout_length() {
        let state = VehicleState::new(0.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        let states = model().rollout(&state, &[(0.0, 1.0); 4], &ReferencePolynomial::straight());
        assert_eq!(states.len(), 5);
        assert_eq!(states[0], state);
        assert_relative_eq!(states[4].v, 1.4, epsilon = 1e-12);
    }

    #[test]
    fn test_predict_forward_substeps() {
        let reference = ReferencePolynomial::straight();
        let state = VehicleState::new(0.0, 0.0, 0.0, 10.0, 0.0, 0.0);
        let m = model();

        assert_eq!(m.predict_forward(&state, 0.1, 1.0, &reference, 0.0), state);

        // 0.25 s is split into three steps of 1/12 s.
        let predicted = m.predict_forward(&state, 0.0, 2.0, &reference, 0.25);
        assert_relative_eq!(predicted.v, 10.5, epsilon = 1e-12);
        let h = 0.25 / 3.0;
        let expected_x = (0..3).map(|i| (10.0 + 2.0 * h * i as f64) * h).sum::<f64>();
        assert_relative_eq!(predicted.x, expected_x, epsilon = 1e-12);
    }
}
