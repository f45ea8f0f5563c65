#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
mod minres;
mod operator;

pub use minres::{IterationStats, MinresCfg, MinresOutcome, minres, minres_cb};
pub use operator::LinearOperator;

use core::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy)]
pub struct SolverError;

impl Display for SolverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("linear solver error")
    }
}

impl std::error::Error for SolverError {}

pub type SolverResult<T> = Result<T, error_stack::Report<SolverError>>;

#[cfg(test)]
mod tests {
    use super::*;
    use faer::Mat;
    use faer::sparse::{Pair, SparseColMatRef, SymbolicSparseColMat};

    fn dense(rows: &[&[f64]]) -> Mat<f64> {
        let n = rows.len();
        let mut a = Mat::<f64>::zeros(n, n);
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                a[(i, j)] = v;
            }
        }
        a
    }

    fn residual_norm<Op: LinearOperator<f64>>(a: &Op, x: &[f64], b: &[f64]) -> f64 {
        let mut ax = vec![0.0; b.len()];
        a.apply(x, &mut ax);
        ax.iter()
            .zip(b)
            .map(|(l, r)| (l - r).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    #[test]
    fn solves_spd_two_by_two() {
        let a = dense(&[&[4.0, 1.0], &[1.0, 3.0]]);
        let b = [1.0, 2.0];
        let mut x = [0.0; 2];
        let outcome = minres(&a, &b, &mut x, MinresCfg::default()).expect("solver");
        assert!(outcome.converged);
        assert!(outcome.iterations <= 2);
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn solves_symmetric_indefinite() {
        // Eigenvalues of this matrix have mixed signs, so CG would not apply.
        let a = dense(&[&[2.0, 1.0, 0.0], &[1.0, -3.0, 1.0], &[0.0, 1.0, 1.0]]);
        let b = [1.0, 0.0, 2.0];
        let mut x = [0.0; 3];
        let outcome = minres(&a, &b, &mut x, MinresCfg::default()).expect("solver");
        assert!(outcome.converged, "outcome: {outcome:?}");
        assert!(residual_norm(&a, &x, &b) < 1e-10);
    }

    #[test]
    fn solves_sparse_laplacian() {
        // 1D Laplacian, tridiagonal, stored with both triangles.
        let n = 20;
        let mut pairs = Vec::new();
        for i in 0..n {
            pairs.push(Pair { row: i, col: i });
            if i + 1 < n {
                pairs.push(Pair { row: i, col: i + 1 });
                pairs.push(Pair { row: i + 1, col: i });
            }
        }
        let (sym, _) = SymbolicSparseColMat::try_new_from_indices(n, n, &pairs).unwrap();
        let mut vals = vec![0.0; sym.compute_nnz()];
        for col in 0..n {
            let row_idx = sym.row_idx();
            for idx in sym.col_range(col) {
                vals[idx] = if row_idx[idx] == col { 2.0 } else { -1.0 };
            }
        }
        let a = SparseColMatRef::new(sym.as_ref(), &vals);
        let b = vec![1.0; n];
        let mut x = vec![0.0; n];
        let outcome = minres(&a, &b, &mut x, MinresCfg::default()).expect("solver");
        assert!(outcome.converged);
        assert!(outcome.iterations <= n);
        assert!(residual_norm(&a, &x, &b) < 1e-9);
    }

    #[test]
    fn zero_rhs_returns_immediately() {
        let a = dense(&[&[1.0, 0.0], &[0.0, 1.0]]);
        let b = [0.0, 0.0];
        let mut x = [0.0; 2];
        let outcome = minres(&a, &b, &mut x, MinresCfg::default()).expect("solver");
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(x, [0.0, 0.0]);
    }

    #[test]
    fn iteration_cap_is_not_an_error() {
        let a = dense(&[
            &[4.0, 1.0, 0.0, 0.0],
            &[1.0, 3.0, 1.0, 0.0],
            &[0.0, 1.0, 2.0, 1.0],
            &[0.0, 0.0, 1.0, 1.0],
        ]);
        let b = [1.0, 2.0, 3.0, 4.0];
        let mut x = [0.0; 4];
        let cfg = MinresCfg::default().with_max_iter(1);
        let outcome = minres(&a, &b, &mut x, cfg).expect("solver");
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
        // One step of MINRES still reduces the residual.
        assert!(outcome.residual < outcome.initial_residual);
    }

    #[test]
    fn residual_estimates_are_monotone() {
        let a = dense(&[
            &[4.0, 1.0, 0.0, 0.0],
            &[1.0, -3.0, 1.0, 0.0],
            &[0.0, 1.0, 2.0, 1.0],
            &[0.0, 0.0, 1.0, -1.0],
        ]);
        let b = [1.0, 2.0, 3.0, 4.0];
        let mut x = [0.0; 4];
        let mut history = Vec::new();
        minres_cb(&a, &b, &mut x, MinresCfg::default(), |stats| {
            history.push(stats.residual);
        })
        .expect("solver");
        assert!(!history.is_empty());
        for pair in history.windows(2) {
            assert!(pair[1] <= pair[0] * (1.0 + 1e-12));
        }
    }

    /// One of two identical partitions: the other rank holds the same block
    /// and the same right-hand side, so every global inner product is twice
    /// the local one.
    struct MirroredHalf(Mat<f64>);

    impl LinearOperator<f64> for MirroredHalf {
        fn size(&self) -> usize {
            LinearOperator::size(&self.0)
        }

        fn apply(&self, x: &[f64], out: &mut [f64]) {
            LinearOperator::apply(&self.0, x, out);
        }

        fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
            2.0 * LinearOperator::dot(&self.0, a, b)
        }
    }

    #[test]
    fn inner_products_go_through_the_operator() {
        let a = dense(&[&[4.0, 1.0, 0.0], &[1.0, -3.0, 1.0], &[0.0, 1.0, 2.0]]);
        let b = [1.0, 2.0, 3.0];
        let cfg = MinresCfg::default().with_max_iter(2);

        let mut local_x = [0.0; 3];
        let local = minres(&a, &b, &mut local_x, cfg).expect("solver");
        let mut half_x = [0.0; 3];
        let half = minres(&MirroredHalf(a), &b, &mut half_x, cfg).expect("solver");

        // Same iterates, but norms are over both halves.
        let sqrt2 = 2f64.sqrt();
        assert!((half.initial_residual - sqrt2 * local.initial_residual).abs() < 1e-12);
        assert!((half.residual - sqrt2 * local.residual).abs() < 1e-12);
        for (h, l) in half_x.iter().zip(&local_x) {
            assert!((h - l).abs() < 1e-12);
        }
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let a = dense(&[&[1.0, 0.0], &[0.0, 1.0]]);
        let b = [1.0, 2.0, 3.0];
        let mut x = [0.0; 3];
        let result = minres(&a, &b, &mut x, MinresCfg::default());
        assert!(result.is_err());
    }
}
