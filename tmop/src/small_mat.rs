/// Dense square matrix of size 2 or 3, stored inline.
/// Used for Jacobians and metric derivatives at a single quadrature point.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SmallMat {
    dim: usize,
    m: [[f64; 3]; 3],
}

impl SmallMat {
    #[inline(always)]
    pub fn zeros(dim: usize) -> Self {
        debug_assert!((1..=3).contains(&dim), "unsupported dimension {dim}");
        Self {
            dim,
            m: [[0.0; 3]; 3],
        }
    }

    #[inline(always)]
    pub fn identity(dim: usize) -> Self {
        let mut out = Self::zeros(dim);
        for i in 0..dim {
            out.m[i][i] = 1.0;
        }
        out
    }

    /// Build from row-major rows. The number of rows sets the dimension.
    pub fn from_rows(rows: &[&[f64]]) -> Self {
        let mut out = Self::zeros(rows.len());
        for (i, row) in rows.iter().enumerate() {
            debug_assert_eq!(row.len(), rows.len(), "matrix must be square");
            for (j, &v) in row.iter().enumerate() {
                out.m[i][j] = v;
            }
        }
        out
    }

    /// Matrix whose only nonzero is a 1 at `(i, j)`.
    #[inline(always)]
    pub fn unit(dim: usize, i: usize, j: usize) -> Self {
        let mut out = Self::zeros(dim);
        out.m[i][j] = 1.0;
        out
    }

    #[inline(always)]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline(always)]
    pub fn det(&self) -> f64 {
        let m = &self.m;
        match self.dim {
            1 => m[0][0],
            2 => m[0][0] * m[1][1] - m[0][1] * m[1][0],
            _ => {
                m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
                    - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
                    + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
            }
        }
    }

    /// Adjugate, i.e. `det(A) * A^-1` for invertible `A`.
    pub fn adjugate(&self) -> Self {
        let m = &self.m;
        let mut out = Self::zeros(self.dim);
        match self.dim {
            1 => out.m[0][0] = 1.0,
            2 => {
                out.m[0][0] = m[1][1];
                out.m[0][1] = -m[0][1];
                out.m[1][0] = -m[1][0];
                out.m[1][1] = m[0][0];
            }
            _ => {
                out.m[0][0] = m[1][1] * m[2][2] - m[1][2] * m[2][1];
                out.m[0][1] = m[0][2] * m[2][1] - m[0][1] * m[2][2];
                out.m[0][2] = m[0][1] * m[1][2] - m[0][2] * m[1][1];
                out.m[1][0] = m[1][2] * m[2][0] - m[1][0] * m[2][2];
                out.m[1][1] = m[0][0] * m[2][2] - m[0][2] * m[2][0];
                out.m[1][2] = m[0][2] * m[1][0] - m[0][0] * m[1][2];
                out.m[2][0] = m[1][0] * m[2][1] - m[1][1] * m[2][0];
                out.m[2][1] = m[0][1] * m[2][0] - m[0][0] * m[2][1];
                out.m[2][2] = m[0][0] * m[1][1] - m[0][1] * m[1][0];
            }
        }
        out
    }

    /// `None` if the matrix is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.det();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(self.adjugate().scale(1.0 / det))
    }

    #[inline(always)]
    pub fn transpose(&self) -> Self {
        let mut out = Self::zeros(self.dim);
        for i in 0..self.dim {
            for j in 0..self.dim {
                out.m[j][i] = self.m[i][j];
            }
        }
        out
    }

    #[inline(always)]
    pub fn scale(&self, s: f64) -> Self {
        let mut out = *self;
        for i in 0..self.dim {
            for j in 0..self.dim {
                out.m[i][j] *= s;
            }
        }
        out
    }

    /// Frobenius inner product `A : B`.
    #[inline(always)]
    pub fn dot(&self, rhs: &Self) -> f64 {
        let mut acc = 0.0;
        for i in 0..self.dim {
            for j in 0..self.dim {
                acc += self.m[i][j] * rhs.m[i][j];
            }
        }
        acc
    }

    /// Squared Frobenius norm.
    #[inline(always)]
    pub fn norm_squared(&self) -> f64 {
        self.dot(self)
    }

    #[inline(always)]
    pub fn trace(&self) -> f64 {
        (0..self.dim).map(|i| self.m[i][i]).sum()
    }

    /// `self += s * rhs`
    #[inline(always)]
    pub fn add_scaled(&mut self, s: f64, rhs: &Self) {
        for i in 0..self.dim {
            for j in 0..self.dim {
                self.m[i][j] += s * rhs.m[i][j];
            }
        }
    }

    /// Largest absolute entry.
    pub fn max_abs(&self) -> f64 {
        let mut out: f64 = 0.0;
        for i in 0..self.dim {
            for j in 0..self.dim {
                out = out.max(self.m[i][j].abs());
            }
        }
        out
    }
}

impl std::ops::Index<(usize, usize)> for SmallMat {
    type Output = f64;

    #[inline(always)]
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        &self.m[i][j]
    }
}

impl std::ops::IndexMut<(usize, usize)> for SmallMat {
    #[inline(always)]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        &mut self.m[i][j]
    }
}

impl std::ops::Mul<Self> for SmallMat {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        debug_assert_eq!(self.dim, rhs.dim);
        let mut out = Self::zeros(self.dim);
        for i in 0..self.dim {
            for j in 0..self.dim {
                let mut acc = 0.0;
                for k in 0..self.dim {
                    acc += self.m[i][k] * rhs.m[k][j];
                }
                out.m[i][j] = acc;
            }
        }
        out
    }
}

impl std::ops::Add<Self> for SmallMat {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        let mut out = self;
        out.add_scaled(1.0, &rhs);
        out
    }
}

impl std::ops::Sub<Self> for SmallMat {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self::Output {
        let mut out = self;
        out.add_scaled(-1.0, &rhs);
        out
    }
}

/// Fourth-order tensor acting on `d×d` matrices, stored as a `d²×d²` matrix
/// with row/column index `i * d + j` for entry `(i, j)`.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SmallTensor {
    dim: usize,
    h: [[f64; 9]; 9],
}

impl SmallTensor {
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            h: [[0.0; 9]; 9],
        }
    }

    #[inline(always)]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Entry `∂²/∂A_ij ∂A_kl`.
    #[inline(always)]
    pub fn get(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        self.h[i * self.dim + j][k * self.dim + l]
    }

    /// Fill column `(k, l)` from the matrix `col`.
    #[inline(always)]
    pub fn set_column(&mut self, k: usize, l: usize, col: &SmallMat) {
        let c = k * self.dim + l;
        for i in 0..self.dim {
            for j in 0..self.dim {
                self.h[i * self.dim + j][c] = col[(i, j)];
            }
        }
    }

    /// Apply to a perturbation `e`, giving `H : e`.
    pub fn apply(&self, e: &SmallMat) -> SmallMat {
        let d = self.dim;
        let mut out = SmallMat::zeros(d);
        for i in 0..d {
            for j in 0..d {
                let mut acc = 0.0;
                for k in 0..d {
                    for l in 0..d {
                        acc += self.h[i * d + j][k * d + l] * e[(k, l)];
                    }
                }
                out[(i, j)] = acc;
            }
        }
        out
    }

    /// Largest asymmetry `|H_ab - H_ba|`.
    pub fn asymmetry(&self) -> f64 {
        let n = self.dim * self.dim;
        let mut out: f64 = 0.0;
        for a in 0..n {
            for b in 0..n {
                out = out.max((self.h[a][b] - self.h[b][a]).abs());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_times_self_is_identity() {
        let a = SmallMat::from_rows(&[&[2.0, 1.0, 0.5], &[0.0, 3.0, 1.0], &[1.0, 0.0, 4.0]]);
        let inv = a.inverse().unwrap();
        let prod = a * inv;
        assert!((prod - SmallMat::identity(3)).max_abs() < 1e-14);
    }

    #[test]
    fn adjugate_2d() {
        let a = SmallMat::from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let adj = a.adjugate();
        assert_eq!(adj, SmallMat::from_rows(&[&[4.0, -2.0], &[-3.0, 1.0]]));
        assert_eq!(a.det(), -2.0);
    }

    #[test]
    fn singular_has_no_inverse() {
        let a = SmallMat::from_rows(&[&[1.0, 2.0], &[2.0, 4.0]]);
        assert!(a.inverse().is_none());
    }

    #[test]
    fn frobenius() {
        let a = SmallMat::from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]);
        assert_eq!(a.norm_squared(), 30.0);
        assert_eq!(a.trace(), 5.0);
        assert_eq!(a.transpose()[(0, 1)], 3.0);
    }
}
