//! Finite-element machinery for the mesh coordinate field.

mod basis;
mod quadrature;
mod space;

pub use basis::{BasisKind, ReferenceElement};
pub use quadrature::IntegrationRule;
pub use space::FiniteElementSpace;

/// Reference shape-function gradients and weights at every point of an
/// integration rule, computed once and shared by all elements.
#[derive(Clone, Debug)]
pub struct Tabulation {
    num_dofs: usize,
    weights: Vec<f64>,
    /// `dshape[q * num_dofs + a]` is `∇N_a` at point `q`.
    dshape: Vec<[f64; 3]>,
}

impl Tabulation {
    /// Tabulate `element` on `rule`.
    pub fn new(element: &ReferenceElement, rule: &IntegrationRule) -> Self {
        let nd = element.num_dofs();
        let mut dshape = vec![[0.0; 3]; rule.len() * nd];
        for (q, xi) in rule.points().iter().enumerate() {
            element.dshape(xi, &mut dshape[q * nd..(q + 1) * nd]);
        }
        Self {
            num_dofs: nd,
            weights: rule.weights().to_vec(),
            dshape,
        }
    }

    /// Number of quadrature points.
    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    /// Number of shape functions.
    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    /// Quadrature weight of point `q`.
    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    /// Reference gradients at point `q`, one per shape function.
    pub fn dshape(&self, q: usize) -> &[[f64; 3]] {
        &self.dshape[q * self.num_dofs..(q + 1) * self.num_dofs]
    }
}
