use crate::mesh::Geometry;

/// Quadrature points and weights on a reference element.
#[derive(Clone, Debug, PartialEq)]
pub struct IntegrationRule {
    points: Vec<[f64; 3]>,
    weights: Vec<f64>,
}

impl IntegrationRule {
    /// A rule exact for polynomials of total degree `order` on `geometry`.
    /// Squares and cubes use tensor Gauss-Legendre rules. Triangles and
    /// tetrahedra use Gauss-Legendre rules collapsed onto the simplex.
    pub fn new(geometry: Geometry, order: usize) -> Self {
        match geometry {
            Geometry::Segment => {
                let (x, w) = gauss_legendre(points_for(order));
                Self {
                    points: x.iter().map(|&x| [x, 0.0, 0.0]).collect(),
                    weights: w,
                }
            }
            Geometry::Square => {
                let (x, w) = gauss_legendre(points_for(order));
                let mut rule = Self::empty();
                for (&y, &wy) in x.iter().zip(&w) {
                    for (&x, &wx) in x.iter().zip(&w) {
                        rule.push([x, y, 0.0], wx * wy);
                    }
                }
                rule
            }
            Geometry::Cube => {
                let (x, w) = gauss_legendre(points_for(order));
                let mut rule = Self::empty();
                for (&z, &wz) in x.iter().zip(&w) {
                    for (&y, &wy) in x.iter().zip(&w) {
                        for (&x, &wx) in x.iter().zip(&w) {
                            rule.push([x, y, z], wx * wy * wz);
                        }
                    }
                }
                rule
            }
            Geometry::Triangle => {
                // The collapse adds a factor (1 - v), one degree more in v.
                let (x, w) = gauss_legendre(points_for(order + 1));
                let mut rule = Self::empty();
                for (&v, &wv) in x.iter().zip(&w) {
                    for (&u, &wu) in x.iter().zip(&w) {
                        rule.push([u * (1.0 - v), v, 0.0], wu * wv * (1.0 - v));
                    }
                }
                rule
            }
            Geometry::Tetrahedron => {
                let (x, w) = gauss_legendre(points_for(order + 2));
                let mut rule = Self::empty();
                for (&t, &wt) in x.iter().zip(&w) {
                    for (&v, &wv) in x.iter().zip(&w) {
                        for (&u, &wu) in x.iter().zip(&w) {
                            let jac = (1.0 - v) * (1.0 - t) * (1.0 - t);
                            rule.push(
                                [u * (1.0 - v) * (1.0 - t), v * (1.0 - t), t],
                                wu * wv * wt * jac,
                            );
                        }
                    }
                }
                rule
            }
        }
    }

    fn empty() -> Self {
        Self {
            points: Vec::new(),
            weights: Vec::new(),
        }
    }

    fn push(&mut self, point: [f64; 3], weight: f64) {
        self.points.push(point);
        self.weights.push(weight);
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if the rule has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Reference coordinates, padded to 3D.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Weights, summing to the reference element's measure.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Gauss-Legendre points exact for 1D polynomials of this degree.
fn points_for(order: usize) -> usize {
    (order + 2) / 2
}

/// `n`-point Gauss-Legendre rule on `[0, 1]`, points ascending.
pub(crate) fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let n = n.max(1);
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..n {
        // Newton iteration on P_n from the Chebyshev-like first guess.
        let mut x = (std::f64::consts::PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, p_prev) = legendre(n, x);
            let dx = p / legendre_derivative(n, x, p, p_prev);
            x -= dx;
            if dx.abs() < 4.0 * f64::EPSILON {
                break;
            }
        }
        let (p, p_prev) = legendre(n, x);
        let dp = legendre_derivative(n, x, p, p_prev);
        points.push(0.5 * (1.0 - x));
        weights.push(1.0 / ((1.0 - x * x) * dp * dp));
    }
    (points, weights)
}

fn legendre_derivative(n: usize, x: f64, p: f64, p_prev: f64) -> f64 {
    n as f64 * (x * p - p_prev) / (x * x - 1.0)
}

/// `(P_n(x), P_{n-1}(x))` by the three-term recurrence.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p = x;
    for k in 2..=n {
        let k = k as f64;
        let next = ((2.0 * k - 1.0) * x * p - (k - 1.0) * p_prev) / k;
        p_prev = p;
        p = next;
    }
    (p, p_prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrate(rule: &IntegrationRule, f: impl Fn([f64; 3]) -> f64) -> f64 {
        rule.points()
            .iter()
            .zip(rule.weights())
            .map(|(&p, &w)| w * f(p))
            .sum()
    }

    #[test]
    fn gauss_legendre_small_rules() {
        let (x, w) = gauss_legendre(1);
        assert!((x[0] - 0.5).abs() < 1e-15);
        assert!((w[0] - 1.0).abs() < 1e-15);
        let (x, w) = gauss_legendre(2);
        let r = 0.5 / 3f64.sqrt();
        assert!((x[0] - (0.5 - r)).abs() < 1e-15);
        assert!((x[1] - (0.5 + r)).abs() < 1e-15);
        assert!((w[0] - 0.5).abs() < 1e-15);
    }

    #[test]
    fn weights_sum_to_measure() {
        for geometry in [
            Geometry::Segment,
            Geometry::Triangle,
            Geometry::Square,
            Geometry::Tetrahedron,
            Geometry::Cube,
        ] {
            for order in 0..8 {
                let rule = IntegrationRule::new(geometry, order);
                let total: f64 = rule.weights().iter().sum();
                assert!(
                    (total - geometry.reference_measure()).abs() < 1e-14,
                    "{geometry:?} order {order}"
                );
            }
        }
    }

    #[test]
    fn exact_for_requested_degree() {
        // ∫ x^a y^b over the unit triangle is a! b! / (a + b + 2)!
        let rule = IntegrationRule::new(Geometry::Triangle, 5);
        let got = integrate(&rule, |p| p[0].powi(2) * p[1].powi(3));
        let want = 2.0 * 6.0 / 5040.0;
        assert!((got - want).abs() < 1e-15);

        // ∫ x y z^3 over the unit tetrahedron is 1! 1! 3! / 8!
        let rule = IntegrationRule::new(Geometry::Tetrahedron, 5);
        let got = integrate(&rule, |p| p[0] * p[1] * p[2].powi(3));
        let want = 6.0 / 40320.0;
        assert!((got - want).abs() < 1e-15);

        let rule = IntegrationRule::new(Geometry::Cube, 5);
        let got = integrate(&rule, |p| p[0].powi(5) * p[1].powi(4) * p[2]);
        let want = 1.0 / 6.0 / 5.0 / 2.0;
        assert!((got - want).abs() < 1e-15);
    }

    #[test]
    fn points_are_inside() {
        let rule = IntegrationRule::new(Geometry::Tetrahedron, 4);
        for p in rule.points() {
            assert!(p.iter().all(|&c| c > 0.0));
            assert!(p[0] + p[1] + p[2] < 1.0);
        }
    }
}
