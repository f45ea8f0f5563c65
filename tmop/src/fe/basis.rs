use crate::MeshError;
use crate::mesh::Geometry;

/// Which polynomial basis spans the element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum BasisKind {
    /// Nodal basis on equispaced points.
    #[default]
    Lagrange,
    /// Bernstein polynomials. The element lies in the convex hull of its
    /// control points, and all basis functions are non-negative.
    Bernstein,
}

/// Shape functions of one order and basis on one reference geometry.
///
/// Local nodes sit on the equispaced lattice with spacing `1/p`. For squares
/// and cubes a node is indexed by its lattice coordinates `(i, j, k)`, with `i`
/// varying fastest. For triangles and tetrahedra it is indexed by the
/// barycentric numerators of vertices `1..=d`; vertex 0 gets the remainder.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceElement {
    geometry: Geometry,
    order: usize,
    kind: BasisKind,
    lattice: Vec<[usize; 3]>,
}

impl ReferenceElement {
    /// Build the element. `order` must be at least 1.
    pub fn new(geometry: Geometry, order: usize, kind: BasisKind) -> Result<Self, MeshError> {
        if order == 0 {
            return Err(MeshError::InvalidOrder(order));
        }
        let p = order;
        let d = geometry.dim();
        let mut lattice = Vec::new();
        let upper = |dim: usize| if d > dim { p } else { 0 };
        for k in 0..=upper(2) {
            for j in 0..=upper(1) {
                for i in 0..=p {
                    if !geometry.is_simplex() || i + j + k <= p {
                        lattice.push([i, j, k]);
                    }
                }
            }
        }
        Ok(Self {
            geometry,
            order,
            kind,
            lattice,
        })
    }

    /// Reference geometry.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Polynomial order.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Which basis.
    pub fn kind(&self) -> BasisKind {
        self.kind
    }

    /// Topological dimension.
    pub fn dim(&self) -> usize {
        self.geometry.dim()
    }

    /// Number of local nodes.
    pub fn num_dofs(&self) -> usize {
        self.lattice.len()
    }

    /// Lattice index of each local node.
    pub fn lattice(&self) -> &[[usize; 3]] {
        &self.lattice
    }

    /// Reference coordinates of local node `a`.
    pub fn node(&self, a: usize) -> [f64; 3] {
        let p = self.order as f64;
        self.lattice[a].map(|i| i as f64 / p)
    }

    /// Integer weights of the reference vertices that place local node `a`,
    /// i.e. its barycentric or multilinear coordinates times `p` or `p^d`.
    /// Zero weights are dropped.
    pub fn vertex_weights(&self, a: usize) -> Vec<(usize, u64)> {
        let p = self.order;
        let l = self.lattice[a];
        let d = self.dim();
        let mut out = Vec::with_capacity(self.geometry.num_vertices());
        if self.geometry.is_simplex() {
            let alpha = barycentric_indices(l, d, p);
            for (vertex, &w) in alpha[..=d].iter().enumerate() {
                if w > 0 {
                    out.push((vertex, w as u64));
                }
            }
        } else {
            for (vertex, corner) in self.geometry.reference_vertices().iter().enumerate() {
                let mut w = 1u64;
                for m in 0..d {
                    let f = if corner[m] > 0.5 { l[m] } else { p - l[m] };
                    w *= f as u64;
                }
                if w > 0 {
                    out.push((vertex, w));
                }
            }
        }
        out
    }

    /// Values of every shape function at `xi`.
    pub fn shape(&self, xi: &[f64; 3], out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.num_dofs());
        let d = self.dim();
        let p = self.order;
        if self.geometry.is_simplex() {
            let lambda = barycentric(xi, d);
            for (a, &l) in self.lattice.iter().enumerate() {
                let alpha = barycentric_indices(l, d, p);
                let mut v = self.simplex_scale();
                for m in 0..=d {
                    v *= self.simplex_factor(alpha[m], lambda[m]).0;
                }
                out[a] = v;
            }
        } else {
            for (a, l) in self.lattice.iter().enumerate() {
                let mut v = 1.0;
                for m in 0..d {
                    v *= self.factor_1d(l[m], xi[m]).0;
                }
                out[a] = v;
            }
        }
    }

    /// Reference gradients of every shape function at `xi`.
    pub fn dshape(&self, xi: &[f64; 3], out: &mut [[f64; 3]]) {
        debug_assert_eq!(out.len(), self.num_dofs());
        let d = self.dim();
        let p = self.order;
        if self.geometry.is_simplex() {
            let lambda = barycentric(xi, d);
            for (a, &l) in self.lattice.iter().enumerate() {
                let alpha = barycentric_indices(l, d, p);
                let scale = self.simplex_scale();
                let mut values = [0.0; 4];
                let mut derivs = [0.0; 4];
                for m in 0..=d {
                    (values[m], derivs[m]) = self.simplex_factor(alpha[m], lambda[m]);
                }
                // d/dλ_m of the product, then the chain rule through
                // λ_0 = 1 - Σx and λ_m = x_{m-1}.
                let mut dlambda = [0.0; 4];
                for m in 0..=d {
                    let mut g = derivs[m];
                    for n in 0..=d {
                        if n != m {
                            g *= values[n];
                        }
                    }
                    dlambda[m] = scale * g;
                }
                out[a] = [0.0; 3];
                for k in 0..d {
                    out[a][k] = dlambda[k + 1] - dlambda[0];
                }
            }
        } else {
            for (a, l) in self.lattice.iter().enumerate() {
                let mut values = [1.0; 3];
                let mut derivs = [0.0; 3];
                for m in 0..d {
                    (values[m], derivs[m]) = self.factor_1d(l[m], xi[m]);
                }
                out[a] = [0.0; 3];
                for k in 0..d {
                    let mut g = derivs[k];
                    for m in 0..d {
                        if m != k {
                            g *= values[m];
                        }
                    }
                    out[a][k] = g;
                }
            }
        }
    }

    /// `(value, derivative)` of the 1D factor for lattice index `i` at `x`.
    fn factor_1d(&self, i: usize, x: f64) -> (f64, f64) {
        let p = self.order;
        match self.kind {
            BasisKind::Lagrange => {
                // Π_{j≠i} (p x - j) / (i - j)
                let pf = p as f64;
                let mut value = 1.0;
                let mut deriv = 0.0;
                for j in (0..=p).filter(|&j| j != i) {
                    let denom = i as f64 - j as f64;
                    let f = (pf * x - j as f64) / denom;
                    deriv = deriv * f + value * pf / denom;
                    value *= f;
                }
                (value, deriv)
            }
            BasisKind::Bernstein => {
                let c = binomial(p, i);
                let value = c * x.powi(i as i32) * (1.0 - x).powi((p - i) as i32);
                let mut deriv = 0.0;
                if i > 0 {
                    deriv += c * i as f64 * x.powi(i as i32 - 1) * (1.0 - x).powi((p - i) as i32);
                }
                if i < p {
                    deriv -=
                        c * (p - i) as f64 * x.powi(i as i32) * (1.0 - x).powi((p - i) as i32 - 1);
                }
                (value, deriv)
            }
        }
    }

    /// Constant in front of the product of barycentric factors.
    fn simplex_scale(&self) -> f64 {
        match self.kind {
            BasisKind::Lagrange => 1.0,
            // p! / Π α_m!, with each α_m! folded into its factor.
            BasisKind::Bernstein => factorial(self.order),
        }
    }

    /// `(value, derivative)` of one barycentric factor.
    fn simplex_factor(&self, a: usize, lambda: f64) -> (f64, f64) {
        let p = self.order as f64;
        match self.kind {
            BasisKind::Lagrange => {
                // Π_{s<a} (p λ - s) / (s + 1)
                let mut value = 1.0;
                let mut deriv = 0.0;
                for s in 0..a {
                    let s = s as f64;
                    let f = (p * lambda - s) / (s + 1.0);
                    deriv = deriv * f + value * p / (s + 1.0);
                    value *= f;
                }
                (value, deriv)
            }
            BasisKind::Bernstein => {
                // λ^a / a!
                let fa = factorial(a);
                let value = lambda.powi(a as i32) / fa;
                let deriv = if a == 0 {
                    0.0
                } else {
                    lambda.powi(a as i32 - 1) / factorial(a - 1)
                };
                (value, deriv)
            }
        }
    }
}

fn barycentric(xi: &[f64; 3], d: usize) -> [f64; 4] {
    let mut lambda = [0.0; 4];
    lambda[0] = 1.0 - xi[..d].iter().sum::<f64>();
    lambda[1..=d].copy_from_slice(&xi[..d]);
    lambda
}

fn barycentric_indices(l: [usize; 3], d: usize, p: usize) -> [usize; 4] {
    let mut alpha = [0; 4];
    let sum: usize = l[..d].iter().sum();
    alpha[0] = p - sum;
    alpha[1..=d].copy_from_slice(&l[..d]);
    alpha
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

fn binomial(n: usize, k: usize) -> f64 {
    factorial(n) / (factorial(k) * factorial(n - k))
}
