use crate::InvalidJacobian;
use crate::small_mat::{SmallMat, SmallTensor};

/// Pointwise quality metrics `μ(T)` on the weighted Jacobian `T = J·J*⁻¹`.
/// Every metric is non-negative and zero exactly when `T` is a scaled rotation.
/// Ids follow MFEM's numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum QualityMetric {
    /// Metric 2: `|T|² / (2 det T) - 1`, for 2D meshes.
    Shape2d,
    /// Metric 302: `|T|² |T⁻¹|² / 9 - 1`, for 3D meshes.
    Shape3d,
}

impl QualityMetric {
    /// The shape metric for meshes of this dimension.
    pub fn shape_for_dim(dim: usize) -> Option<Self> {
        match dim {
            2 => Some(Self::Shape2d),
            3 => Some(Self::Shape3d),
            _ => None,
        }
    }

    /// Look up a metric by its MFEM id.
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            2 => Some(Self::Shape2d),
            302 => Some(Self::Shape3d),
            _ => None,
        }
    }

    /// MFEM id of this metric.
    pub fn id(self) -> u32 {
        match self {
            Self::Shape2d => 2,
            Self::Shape3d => 302,
        }
    }

    /// Dimension of the matrices this metric accepts.
    pub fn dim(self) -> usize {
        match self {
            Self::Shape2d => 2,
            Self::Shape3d => 3,
        }
    }

    fn check(self, t: &SmallMat) -> Result<f64, InvalidJacobian> {
        debug_assert_eq!(t.dim(), self.dim(), "metric {} got wrong size", self.id());
        let det = t.det();
        if det > 0.0 && det.is_finite() {
            Ok(det)
        } else {
            Err(InvalidJacobian { det })
        }
    }

    /// `μ(T)`.
    pub fn evaluate(self, t: &SmallMat) -> Result<f64, InvalidJacobian> {
        let tau = self.check(t)?;
        let mu = match self {
            Self::Shape2d => 0.5 * t.norm_squared() / tau - 1.0,
            Self::Shape3d => {
                let s = t.adjugate().scale(1.0 / tau);
                t.norm_squared() * s.norm_squared() / 9.0 - 1.0
            }
        };
        // Roundoff can push an ideal element just below zero.
        Ok(mu.max(0.0))
    }

    /// First Piola-Kirchhoff-like derivative `∂μ/∂T`.
    pub fn gradient(self, t: &SmallMat) -> Result<SmallMat, InvalidJacobian> {
        let tau = self.check(t)?;
        let a = t.norm_squared();
        let inv_t = t.adjugate().scale(1.0 / tau).transpose();
        Ok(match self {
            Self::Shape2d => {
                // P = T/τ - a/(2τ) T⁻ᵀ
                let mut p = t.scale(1.0 / tau);
                p.add_scaled(-0.5 * a / tau, &inv_t);
                p
            }
            Self::Shape3d => {
                // P = (2 b T - 2 a S Sᵀ S) / 9, with S = T⁻ᵀ and b = |S|²
                let s = inv_t;
                let b = s.norm_squared();
                let g = s * s.transpose() * s;
                let mut p = t.scale(2.0 * b / 9.0);
                p.add_scaled(-2.0 * a / 9.0, &g);
                p
            }
        })
    }

    /// Second derivative `∂²μ/∂T²`, built column by column from the
    /// directional derivative of the gradient along each unit matrix.
    pub fn hessian(self, t: &SmallMat) -> Result<SmallTensor, InvalidJacobian> {
        let tau = self.check(t)?;
        let d = self.dim();
        let a = t.norm_squared();
        let s = t.adjugate().scale(1.0 / tau).transpose();
        let mut h = SmallTensor::zeros(d);
        for k in 0..d {
            for l in 0..d {
                let e = SmallMat::unit(d, k, l);
                let dp = match self {
                    Self::Shape2d => shape_2d_gradient_derivative(t, &s, tau, a, &e),
                    Self::Shape3d => shape_3d_gradient_derivative(t, &s, a, &e),
                };
                h.set_column(k, l, &dp);
            }
        }
        Ok(h)
    }
}

/// Directional derivative of `P = T/τ - a/(2τ) S` along `E`, with `S = T⁻ᵀ`.
fn shape_2d_gradient_derivative(
    t: &SmallMat,
    s: &SmallMat,
    tau: f64,
    a: f64,
    e: &SmallMat,
) -> SmallMat {
    let dtau = tau * s.dot(e);
    let da = 2.0 * t.dot(e);
    let ds = (*s * e.transpose() * *s).scale(-1.0);

    let mut dp = e.scale(1.0 / tau);
    dp.add_scaled(-dtau / (tau * tau), t);
    dp.add_scaled(-(da / (2.0 * tau) - a * dtau / (2.0 * tau * tau)), s);
    dp.add_scaled(-a / (2.0 * tau), &ds);
    dp
}

/// Directional derivative of `P = (2 b T - 2 a G) / 9` along `E`,
/// with `S = T⁻ᵀ`, `b = |S|²` and `G = S Sᵀ S`.
fn shape_3d_gradient_derivative(t: &SmallMat, s: &SmallMat, a: f64, e: &SmallMat) -> SmallMat {
    let st = s.transpose();
    let b = s.norm_squared();
    let g = *s * st * *s;
    let ds = (*s * e.transpose() * *s).scale(-1.0);
    let dg = ds * st * *s + *s * ds.transpose() * *s + *s * st * ds;
    let db = -2.0 * g.dot(e);
    let da = 2.0 * t.dot(e);

    let mut dp = e.scale(2.0 * b);
    dp.add_scaled(2.0 * db, t);
    dp.add_scaled(-2.0 * da, &g);
    dp.add_scaled(-2.0 * a, &dg);
    dp.scale(1.0 / 9.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotation_2d(theta: f64) -> SmallMat {
        let (s, c) = theta.sin_cos();
        SmallMat::from_rows(&[&[c, -s], &[s, c]])
    }

    fn skewed_2d() -> SmallMat {
        SmallMat::from_rows(&[&[1.3, 0.4], &[-0.2, 0.9]])
    }

    fn skewed_3d() -> SmallMat {
        SmallMat::from_rows(&[&[1.2, 0.1, -0.3], &[0.2, 0.8, 0.1], &[0.05, -0.2, 1.1]])
    }

    fn fd_gradient(metric: QualityMetric, t: &SmallMat) -> SmallMat {
        let h = 1e-6;
        let d = t.dim();
        let mut out = SmallMat::zeros(d);
        for i in 0..d {
            for j in 0..d {
                let mut plus = *t;
                plus[(i, j)] += h;
                let mut minus = *t;
                minus[(i, j)] -= h;
                out[(i, j)] = (metric.evaluate(&plus).unwrap() - metric.evaluate(&minus).unwrap())
                    / (2.0 * h);
            }
        }
        out
    }

    #[test]
    fn ideal_shapes_have_zero_metric() {
        let m = QualityMetric::Shape2d;
        assert!(m.evaluate(&SmallMat::identity(2)).unwrap() < 1e-15);
        assert!(m.evaluate(&rotation_2d(0.7).scale(3.0)).unwrap() < 1e-14);
        let m = QualityMetric::Shape3d;
        assert!(m.evaluate(&SmallMat::identity(3).scale(0.25)).unwrap() < 1e-14);
    }

    #[test]
    fn distorted_shapes_have_positive_metric() {
        let stretched = SmallMat::from_rows(&[&[2.0, 0.0], &[0.0, 1.0]]);
        let mu = QualityMetric::Shape2d.evaluate(&stretched).unwrap();
        // (4 + 1) / 4 - 1
        assert!((mu - 0.25).abs() < 1e-15);
        assert!(QualityMetric::Shape3d.evaluate(&skewed_3d()).unwrap() > 0.0);
    }

    #[test]
    fn inverted_jacobian_is_reported() {
        let flipped = SmallMat::from_rows(&[&[1.0, 0.0], &[0.0, -1.0]]);
        let err = QualityMetric::Shape2d.evaluate(&flipped).unwrap_err();
        assert!(err.det < 0.0);
        let flat = SmallMat::zeros(3);
        assert!(QualityMetric::Shape3d.gradient(&flat).is_err());
        assert!(QualityMetric::Shape3d.hessian(&flat).is_err());
    }

    #[test]
    fn gradient_matches_finite_differences() {
        for (metric, t) in [
            (QualityMetric::Shape2d, skewed_2d()),
            (QualityMetric::Shape3d, skewed_3d()),
        ] {
            let exact = metric.gradient(&t).unwrap();
            let approx = fd_gradient(metric, &t);
            assert!(
                (exact - approx).max_abs() < 1e-7,
                "metric {}: {exact:?} vs {approx:?}",
                metric.id()
            );
        }
    }

    #[test]
    fn gradient_vanishes_at_ideal_shape() {
        let p = QualityMetric::Shape2d
            .gradient(&rotation_2d(0.3).scale(2.0))
            .unwrap();
        assert!(p.max_abs() < 1e-14);
        let p = QualityMetric::Shape3d
            .gradient(&SmallMat::identity(3))
            .unwrap();
        assert!(p.max_abs() < 1e-14);
    }

    #[test]
    fn hessian_matches_gradient_differences() {
        let h = 1e-6;
        for (metric, t) in [
            (QualityMetric::Shape2d, skewed_2d()),
            (QualityMetric::Shape3d, skewed_3d()),
        ] {
            let d = t.dim();
            let hess = metric.hessian(&t).unwrap();
            for k in 0..d {
                for l in 0..d {
                    let mut plus = t;
                    plus[(k, l)] += h;
                    let mut minus = t;
                    minus[(k, l)] -= h;
                    let column = (metric.gradient(&plus).unwrap()
                        - metric.gradient(&minus).unwrap())
                    .scale(0.5 / h);
                    for i in 0..d {
                        for j in 0..d {
                            let diff = (hess.get(i, j, k, l) - column[(i, j)]).abs();
                            assert!(diff < 1e-6, "metric {} entry {i}{j}{k}{l}", metric.id());
                        }
                    }
                }
            }
            assert!(hess.asymmetry() < 1e-12);
        }
    }

    #[test]
    fn ids_round_trip() {
        for metric in [QualityMetric::Shape2d, QualityMetric::Shape3d] {
            assert_eq!(QualityMetric::from_id(metric.id()), Some(metric));
            assert_eq!(QualityMetric::shape_for_dim(metric.dim()), Some(metric));
        }
        assert_eq!(QualityMetric::from_id(7), None);
    }
}
