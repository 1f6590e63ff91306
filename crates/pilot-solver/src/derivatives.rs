use nalgebra::{DMatrix, DVector};
use num_dual::Dual64;
use pilot_core::SolverOptions;

use crate::CostAndConstraintsEvaluator;

/// Constraint Jacobian at one point.
#[derive(Clone, Debug)]
pub enum Jacobian {
    Dense(DMatrix<f64>),
    /// `(row, column, value)` triplets.
    Sparse {
        rows: usize,
        cols: usize,
        entries: Vec<(usize, usize, f64)>,
    },
}

impl Jacobian {
    pub fn to_dense(&self) -> DMatrix<f64> {
        match self {
            Jacobian::Dense(matrix) => matrix.clone(),
            Jacobian::Sparse {
                rows,
                cols,
                entries,
            } => {
                let mut matrix = DMatrix::zeros(*rows, *cols);
                for &(r, c, value) in entries {
                    matrix[(r, c)] += value;
                }
                matrix
            }
        }
    }

    /// `out = Jᵀ d`
    pub fn transpose_mul(&self, d: &[f64], out: &mut [f64]) {
        match self {
            Jacobian::Dense(matrix) => {
                let product = matrix.tr_mul(&DVector::from_column_slice(d));
                out.copy_from_slice(product.as_slice());
            }
            Jacobian::Sparse { entries, .. } => {
                out.iter_mut().for_each(|v| *v = 0.0);
                for &(r, c, value) in entries {
                    out[c] += value * d[r];
                }
            }
        }
    }
}

/// Forward-mode derivatives of an evaluator, using dual numbers.
///
/// With `sparse_forward`, Jacobian columns that never share a row are seeded together
/// so one dual evaluation recovers all of them. With `sparse_reverse`, the Jacobian is
/// kept as triplets and the gradient only seeds the variables the cost depends on.
pub struct Derivatives<'e, E> {
    evaluator: &'e E,
    num_variables: usize,
    num_constraints: usize,
    /// Variables seeded for the gradient, one pass each.
    gradient_columns: Vec<usize>,
    /// Column groups seeded together for the Jacobian, one pass per group.
    groups: Vec<Vec<usize>>,
    /// Rows read back for each column. `None` reads every row.
    column_rows: Option<Vec<Vec<usize>>>,
    sparse_storage: bool,
}

impl<'e, E: CostAndConstraintsEvaluator> Derivatives<'e, E> {
    pub fn new(evaluator: &'e E, options: &SolverOptions) -> Self {
        let n = evaluator.num_variables();
        let m = evaluator.num_constraints();

        let gradient_columns = if options.sparse_reverse {
            let mut columns = evaluator.cost_dependencies();
            columns.sort_unstable();
            columns.dedup();
            columns
        } else {
            (0..n).collect()
        };

        let (groups, column_rows) = if options.sparse_forward {
            let mut column_rows = vec![Vec::new(); n];
            for (row, col) in evaluator.jacobian_sparsity() {
                column_rows[col].push(row);
            }
            for rows in column_rows.iter_mut() {
                rows.sort_unstable();
                rows.dedup();
            }
            (color_columns(&column_rows, m), Some(column_rows))
        } else {
            ((0..n).map(|col| vec![col]).collect(), None)
        };

        if options.print_level >= 2 {
            tracing::info!(
                "Derivatives: {} gradient passes, {} Jacobian passes for {} variables",
                gradient_columns.len(),
                groups.len(),
                n
            );
        }

        Self {
            evaluator,
            num_variables: n,
            num_constraints: m,
            gradient_columns,
            groups,
            column_rows,
            sparse_storage: options.sparse_reverse,
        }
    }

    /// Number of dual evaluations of the constraints per Jacobian.
    pub fn num_jacobian_passes(&self) -> usize {
        self.groups.len()
    }

    /// Number of dual evaluations of the cost per gradient.
    pub fn num_gradient_passes(&self) -> usize {
        self.gradient_columns.len()
    }

    pub fn gradient(&self, x: &[f64], grad: &mut [f64]) {
        grad.iter_mut().for_each(|g| *g = 0.0);
        let mut vars = lift(x);
        for &col in &self.gradient_columns {
            vars[col].eps = 1.0;
            grad[col] = self.evaluator.cost(&vars).eps;
            vars[col].eps = 0.0;
        }
    }

    pub fn jacobian(&self, x: &[f64]) -> Jacobian {
        let mut vars = lift(x);
        let mut out = vec![Dual64::new(0.0, 0.0); self.num_constraints];
        let mut entries = Vec::new();

        for group in &self.groups {
            for &col in group {
                vars[col].eps = 1.0;
            }
            self.evaluator.constraints(&vars, &mut out);
            for &col in group {
                vars[col].eps = 0.0;
                match &self.column_rows {
                    Some(column_rows) => {
                        for &row in &column_rows[col] {
                            entries.push((row, col, out[row].eps));
                        }
                    }
                    None => {
                        for (row, value) in out.iter().enumerate() {
                            if value.eps != 0.0 {
                                entries.push((row, col, value.eps));
                            }
                        }
                    }
                }
            }
        }

        let jacobian = Jacobian::Sparse {
            rows: self.num_constraints,
            cols: self.num_variables,
            entries,
        };
        if self.sparse_storage {
            jacobian
        } else {
            Jacobian::Dense(jacobian.to_dense())
        }
    }

    /// `out = J(x)ᵀ d`
    pub fn jacobian_transpose_product(&self, x: &[f64], d: &[f64], out: &mut [f64]) {
        self.jacobian(x).transpose_mul(d, out);
    }
}

fn lift(x: &[f64]) -> Vec<Dual64> {
    x.iter().map(|&v| Dual64::new(v, 0.0)).collect()
}

/// Greedy coloring: two columns get the same color only if they share no row.
/// Columns without entries are left out.
fn color_columns(column_rows: &[Vec<usize>], num_rows: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    // Rows already touched by each group
    let mut group_rows: Vec<Vec<bool>> = Vec::new();

    for (col, rows) in column_rows.iter().enumerate() {
        if rows.is_empty() {
            continue;
        }
        let free = group_rows
            .iter()
            .position(|taken| rows.iter().all(|&r| !taken[r]));
        let idx = match free {
            Some(idx) => idx,
            None => {
                groups.push(Vec::new());
                group_rows.push(vec![false; num_rows]);
                groups.len() - 1
            }
        };
        groups[idx].push(col);
        for &r in rows {
            group_rows[idx][r] = true;
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_dual::DualNum;
    use pilot_core::{constant, Real};

    /// Chain `out[i] = x[i+1] - x[i] * sin(x[i])`, cost `Σ x[i]² cos(x[i])`.
    struct Chain {
        n: usize,
    }

    impl CostAndConstraintsEvaluator for Chain {
        fn num_variables(&self) -> usize {
            self.n
        }

        fn num_constraints(&self) -> usize {
            self.n - 1
        }

        fn cost<T: Real>(&self, vars: &[T]) -> T {
            vars.iter()
                .skip(1)
                .fold(constant::<T>(0.0), |acc, &x| acc + x * x * x.cos())
        }

        fn constraints<T: Real>(&self, vars: &[T], out: &mut [T]) {
            for i in 0..self.n - 1 {
                out[i] = vars[i + 1] - vars[i] * vars[i].sin();
            }
        }

        fn cost_dependencies(&self) -> Vec<usize> {
            (1..self.n).collect()
        }

        fn jacobian_sparsity(&self) -> Vec<(usize, usize)> {
            (0..self.n - 1).flat_map(|i| [(i, i), (i, i + 1)]).collect()
        }
    }

    fn options(sparse: bool) -> SolverOptions {
        SolverOptions {
            sparse_forward: sparse,
            sparse_reverse: sparse,
            ..Default::default()
        }
    }

    #[test]
    fn test_coloring_compresses_banded_jacobian() {
        let chain = Chain { n: 8 };
        let sparse = Derivatives::new(&chain, &options(true));
        let dense = Derivatives::new(&chain, &options(false));
        assert_eq!(sparse.num_jacobian_passes(), 2);
        assert_eq!(dense.num_jacobian_passes(), 8);
        assert_eq!(sparse.num_gradient_passes(), 7);
        assert_eq!(dense.num_gradient_passes(), 8);
    }

    #[test]
    fn test_sparse_and_dense_agree() {
        let chain = Chain { n: 6 };
        let x = [0.3, -1.2, 0.7, 2.0, -0.4, 1.1];

        let sparse = Derivatives::new(&chain, &options(true));
        let dense = Derivatives::new(&chain, &options(false));

        let js = sparse.jacobian(&x).to_dense();
        let jd = dense.jacobian(&x).to_dense();
        assert_relative_eq!(js, jd, epsilon = 1e-12);

        let mut gs = vec![0.0; 6];
        let mut gd = vec![0.0; 6];
        sparse.gradient(&x, &mut gs);
        dense.gradient(&x, &mut gd);
        for (a, b) in gs.iter().zip(&gd) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_matches_finite_differences() {
        let chain = Chain { n: 5 };
        let x = vec![0.5, -0.3, 1.4, 0.2, -2.0];
        let derivatives = Derivatives::new(&chain, &options(true));
        let jacobian = derivatives.jacobian(&x).to_dense();
        let mut grad = vec![0.0; 5];
        derivatives.gradient(&x, &mut grad);

        let h = 1e-6;
        for col in 0..5 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[col] += h;
            xm[col] -= h;

            let fd = (chain.cost(&xp) - chain.cost(&xm)) / (2.0 * h);
            assert_relative_eq!(grad[col], fd, epsilon = 1e-6);

            let mut gp = vec![0.0; 4];
            let mut gm = vec![0.0; 4];
            chain.constraints(&xp, &mut gp);
            chain.constraints(&xm, &mut gm);
            for row in 0..4 {
                let fd = (gp[row] - gm[row]) / (2.0 * h);
                assert_relative_eq!(jacobian[(row, col)], fd, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_transpose_product() {
        let chain = Chain { n: 4 };
        let x = [1.0, 2.0, 3.0, 4.0];
        let d = [0.5, -1.0, 2.0];

        for sparse in [true, false] {
            let derivatives = Derivatives::new(&chain, &options(sparse));
            let mut out = vec![0.0; 4];
            derivatives.jacobian_transpose_product(&x, &d, &mut out);

            let expected = derivatives.jacobian(&x).to_dense().transpose()
                * DVector::from_column_slice(&d);
            for (a, b) in out.iter().zip(expected.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_dual_sin_derivative() {
        let x = Dual64::new(0.4, 1.0);
        assert_relative_eq!(x.sin().eps, 0.4f64.cos(), epsilon = 1e-14);
    }
}
