use pilot_core::Real;

/// Objective and constraint functions of a nonlinear program.
///
/// Both functions are written once over [`Real`] and evaluated with plain `f64` for
/// values and with dual numbers for derivatives. Implementations must be pure: the
/// solver calls them many times per solve, in any order.
pub trait CostAndConstraintsEvaluator {
    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;

    fn cost<T: Real>(&self, vars: &[T]) -> T;

    /// Writes `num_constraints()` values into `out`.
    fn constraints<T: Real>(&self, vars: &[T], out: &mut [T]);

    /// Indices of the variables the cost depends on.
    fn cost_dependencies(&self) -> Vec<usize> {
        (0..self.num_variables()).collect()
    }

    /// Structurally non-zero entries of the constraint Jacobian as `(row, column)`.
    fn jacobian_sparsity(&self) -> Vec<(usize, usize)> {
        let n = self.num_variables();
        (0..self.num_constraints())
            .flat_map(|row| (0..n).map(move |col| (row, col)))
            .collect()
    }
}
