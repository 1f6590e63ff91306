use std::ops::Range;

/// One group of the decision vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Var {
    X,
    Y,
    Psi,
    V,
    Cte,
    Epsi,
    /// Steering angle
    Delta,
    /// Acceleration
    A,
}

impl Var {
    /// State groups in decision-vector order.
    pub const STATES: [Var; 6] = [Var::X, Var::Y, Var::Psi, Var::V, Var::Cte, Var::Epsi];
    pub const ACTUATIONS: [Var; 2] = [Var::Delta, Var::A];
    pub const ALL: [Var; 8] = [
        Var::X,
        Var::Y,
        Var::Psi,
        Var::V,
        Var::Cte,
        Var::Epsi,
        Var::Delta,
        Var::A,
    ];

    pub fn is_state(&self) -> bool {
        !matches!(self, Var::Delta | Var::A)
    }

    fn position(&self) -> usize {
        *self as usize
    }
}

/// Index arithmetic of the decision vector for a horizon of `N` steps.
///
/// ```text
/// [x(N) y(N) psi(N) v(N) cte(N) epsi(N) delta(N-1) a(N-1)]
/// ```
///
/// Constraints follow the state blocks: entry `k*N` pins state `k` to the measurement,
/// entry `k*N + 1 + i` is the dynamics residual of state `k` for step `i -> i+1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableLayout {
    horizon: usize,
}

impl VariableLayout {
    /// `horizon` must be at least 2, which settings validation guarantees.
    pub fn new(horizon: usize) -> Self {
        debug_assert!(horizon >= 2, "horizon must be at least 2");
        Self { horizon }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn start(&self, var: Var) -> usize {
        let n = self.horizon;
        match var {
            Var::Delta => 6 * n,
            Var::A => 6 * n + (n - 1),
            state => state.position() * n,
        }
    }

    pub fn len(&self, var: Var) -> usize {
        if var.is_state() {
            self.horizon
        } else {
            self.horizon - 1
        }
    }

    pub fn range(&self, var: Var) -> Range<usize> {
        let start = self.start(var);
        start..start + self.len(var)
    }

    /// Position of `var` at `step` in the decision vector.
    pub fn index(&self, var: Var, step: usize) -> usize {
        debug_assert!(step < self.len(var));
        self.start(var) + step
    }

    pub fn num_variables(&self) -> usize {
        6 * self.horizon + 2 * (self.horizon - 1)
    }

    pub fn num_constraints(&self) -> usize {
        6 * self.horizon
    }

    /// Constraint row `row` of state `kind`: 0 is the pin, `i + 1` the residual of
    /// step `i`.
    pub fn constraint_index(&self, kind: Var, row: usize) -> usize {
        debug_assert!(kind.is_state(), "{kind:?} has no constraints");
        debug_assert!(row < self.horizon);
        kind.position() * self.horizon + row
    }
}
