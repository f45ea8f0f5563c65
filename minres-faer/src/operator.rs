use faer::Mat;
use faer::sparse::SparseColMatRef;
use num_traits::Float;

/// A square linear operator, applied through its action only.
pub trait LinearOperator<T> {
    /// Number of rows (and columns).
    fn size(&self) -> usize;
    /// Computes `out = A x`, overwriting `out`.
    fn apply(&self, x: &[T], out: &mut [T]);
    /// Inner product of two vectors in the operator's space.
    ///
    /// Operators on one partition of a distributed vector override this to
    /// sum over every partition, so all ranks take the same Krylov steps.
    fn dot(&self, a: &[T], b: &[T]) -> T
    where
        T: Float,
    {
        a.iter()
            .zip(b.iter())
            .fold(T::zero(), |acc, (&l, &r)| acc + l * r)
    }
}

impl<T, Op: LinearOperator<T> + ?Sized> LinearOperator<T> for &Op {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn apply(&self, x: &[T], out: &mut [T]) {
        (**self).apply(x, out);
    }

    fn dot(&self, a: &[T], b: &[T]) -> T
    where
        T: Float,
    {
        (**self).dot(a, b)
    }
}

impl<T: Float> LinearOperator<T> for SparseColMatRef<'_, usize, T> {
    fn size(&self) -> usize {
        debug_assert_eq!(self.nrows(), self.ncols(), "operator must be square");
        self.ncols()
    }

    fn apply(&self, x: &[T], out: &mut [T]) {
        out.iter_mut().for_each(|o| *o = T::zero());
        let row_idx = self.symbolic().row_idx();
        let vals = self.val();
        for (col, &xc) in x.iter().enumerate() {
            for idx in self.col_range(col) {
                let row = row_idx[idx];
                out[row] = out[row] + vals[idx] * xc;
            }
        }
    }
}

impl<T: Float> LinearOperator<T> for Mat<T> {
    fn size(&self) -> usize {
        debug_assert_eq!(self.nrows(), self.ncols(), "operator must be square");
        self.nrows()
    }

    fn apply(&self, x: &[T], out: &mut [T]) {
        for (row, o) in out.iter_mut().enumerate() {
            let mut acc = T::zero();
            for (col, &xc) in x.iter().enumerate() {
                acc = acc + self[(row, col)] * xc;
            }
            *o = acc;
        }
    }
}
