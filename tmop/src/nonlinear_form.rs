use faer::Mat;
use faer::sparse::{Pair, SparseColMatRef, SymbolicSparseColMat};
use rayon::prelude::*;

use crate::collective::{Communicator, DistributedOperator};
use crate::fe::FiniteElementSpace;
use crate::integrator::TmopIntegrator;
use crate::{InvalidJacobian, Inverted, SolveError};

/// Elements handed to one rayon task. Results are scattered chunk by chunk in
/// element order, so sums don't depend on the thread count.
const ELEMENTS_PER_CHUNK: usize = 256;

/// The global objective, its gradient and its Hessian over a whole mesh.
///
/// Wraps a [`TmopIntegrator`] and scatters element contributions through the
/// space's DOF map. Every result passes through the communicator's inversion
/// check before it is returned.
pub struct NonlinearForm<'s, C> {
    space: &'s FiniteElementSpace,
    integrator: TmopIntegrator,
    comm: C,
    /// Which entries of the Hessian are non-zero. Built once.
    sym: SymbolicSparseColMat<usize>,
    /// Hessian values, column-major, matching `sym`.
    vals: Vec<f64>,
}

impl<'s, C: Communicator> NonlinearForm<'s, C> {
    /// Set up the form and allocate the Hessian pattern.
    pub fn new(
        space: &'s FiniteElementSpace,
        integrator: TmopIntegrator,
        comm: C,
    ) -> Result<Self, SolveError> {
        let n_nodes = space.num_nodes();
        let d = space.dim();
        let n = space.num_dofs();

        // Two DOFs couple if their nodes share an element.
        let mut nonzero_cells: Vec<Pair<usize, usize>> = Vec::new();
        for e in 0..space.num_elements() {
            let nodes = space.element_nodes(e);
            for &a in nodes {
                for &b in nodes {
                    for ca in 0..d {
                        for cb in 0..d {
                            nonzero_cells.push(Pair {
                                row: ca * n_nodes + a,
                                col: cb * n_nodes + b,
                            });
                        }
                    }
                }
            }
        }

        // Create symbolic structure; this will automatically deduplicate and sort.
        let (sym, _) = SymbolicSparseColMat::try_new_from_indices(n, n, &nonzero_cells)?;
        Ok(Self {
            space,
            integrator,
            comm,
            vals: vec![0.0; sym.compute_nnz()],
            sym,
        })
    }

    /// The coordinate space.
    pub fn space(&self) -> &'s FiniteElementSpace {
        self.space
    }

    /// The element integrator.
    pub fn integrator(&self) -> &TmopIntegrator {
        &self.integrator
    }

    /// The element integrator, e.g. to change the fitting weight.
    pub fn integrator_mut(&mut self) -> &mut TmopIntegrator {
        &mut self.integrator
    }

    /// The communicator reductions go through.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Run `f` on every element, a chunk at a time in parallel, and return the
    /// results in element order. Stops at the first inverted element.
    fn map_elements<T, F>(&self, x: &[f64], f: F) -> Result<Vec<T>, (usize, InvalidJacobian)>
    where
        T: Send,
        F: Fn(usize, &[usize], &[f64]) -> Result<T, InvalidJacobian> + Sync,
    {
        let ne = self.space.num_elements();
        let d = self.space.dim();
        let starts: Vec<usize> = (0..ne).step_by(ELEMENTS_PER_CHUNK).collect();
        let chunks: Vec<Result<Vec<T>, (usize, InvalidJacobian)>> = starts
            .par_iter()
            .map(|&start| {
                let end = (start + ELEMENTS_PER_CHUNK).min(ne);
                let mut x_e = Vec::new();
                let mut out = Vec::with_capacity(end - start);
                for e in start..end {
                    let nodes = self.space.element_nodes(e);
                    x_e.resize(d * nodes.len(), 0.0);
                    self.space.gather(e, x, &mut x_e);
                    out.push(f(e, nodes, &x_e).map_err(|err| (e, err))?);
                }
                Ok(out)
            })
            .collect();
        let mut all = Vec::with_capacity(ne);
        for chunk in chunks {
            all.extend(chunk?);
        }
        Ok(all)
    }

    /// Turn the local assembly outcome into one every rank agrees on.
    fn agree<T>(&self, local: Result<T, (usize, InvalidJacobian)>) -> Result<T, Inverted> {
        let inverted_anywhere = self.comm.all_reduce_or(local.is_err());
        match local {
            Err((element, source)) => Err(Inverted::Local { element, source }),
            Ok(_) if inverted_anywhere => Err(Inverted::Remote),
            Ok(value) => Ok(value),
        }
    }

    /// Global objective `F(x)`.
    pub fn energy(&self, x: &[f64]) -> Result<f64, Inverted> {
        let local = self.map_elements(x, |e, nodes, x_e| {
            self.integrator.element_energy(e, nodes, x_e)
        });
        let energies = self.agree(local)?;
        Ok(self.comm.all_reduce_sum(energies.iter().sum()))
    }

    /// Global metric energy, without the fitting penalty.
    pub fn metric_energy(&self, x: &[f64]) -> Result<f64, Inverted> {
        let local = self.map_elements(x, |e, _, x_e| self.integrator.element_metric_energy(e, x_e));
        let energies = self.agree(local)?;
        Ok(self.comm.all_reduce_sum(energies.iter().sum()))
    }

    /// Global residual `r = ∂F/∂x`, written to `r`.
    pub fn mult(&self, x: &[f64], r: &mut [f64]) -> Result<(), Inverted> {
        let local = self.map_elements(x, |e, nodes, x_e| {
            let mut r_e = vec![0.0; x_e.len()];
            self.integrator
                .assemble_element_vector(e, nodes, x_e, &mut r_e)?;
            Ok(r_e)
        });
        let element_vectors = self.agree(local)?;
        r.fill(0.0);
        let mut vdofs = Vec::new();
        for (e, r_e) in element_vectors.iter().enumerate() {
            self.space.element_vdofs(e, &mut vdofs);
            for (&g, v) in vdofs.iter().zip(r_e) {
                r[g] += v;
            }
        }
        Ok(())
    }

    /// Global Hessian `∂²F/∂x²` as a sparse symmetric matrix.
    pub fn gradient(&mut self, x: &[f64]) -> Result<SparseColMatRef<'_, usize, f64>, Inverted> {
        self.assemble_gradient(x)?;
        Ok(SparseColMatRef::new(self.sym.as_ref(), &self.vals))
    }

    /// The Hessian as a linear operator whose inner products are reduced
    /// over every partition, ready for MINRES.
    pub fn gradient_operator(
        &mut self,
        x: &[f64],
    ) -> Result<DistributedOperator<'_, SparseColMatRef<'_, usize, f64>, C>, Inverted> {
        self.assemble_gradient(x)?;
        let local = SparseColMatRef::new(self.sym.as_ref(), &self.vals);
        Ok(DistributedOperator::new(local, &self.comm))
    }

    fn assemble_gradient(&mut self, x: &[f64]) -> Result<(), Inverted> {
        let local = self.map_elements(x, |e, nodes, x_e| {
            let mut h_e = Mat::zeros(x_e.len(), x_e.len());
            self.integrator
                .assemble_element_grad(e, nodes, x_e, &mut h_e)?;
            Ok(h_e)
        });
        let element_matrices = self.agree(local)?;

        self.vals.fill(0.0);
        let row_indices = self.sym.row_idx();
        let mut vdofs = Vec::new();
        for (e, h_e) in element_matrices.iter().enumerate() {
            self.space.element_vdofs(e, &mut vdofs);
            for (j, &col) in vdofs.iter().enumerate() {
                let col_range = self.sym.col_range(col);
                let rows_in_col = &row_indices[col_range.clone()];
                for (i, &row) in vdofs.iter().enumerate() {
                    // Rows are sorted within each column, and the pattern holds
                    // every element coupling.
                    if let Ok(offset) = rows_in_col.binary_search(&row) {
                        self.vals[col_range.start + offset] += h_e[(i, j)];
                    }
                }
            }
        }
        Ok(())
    }

    /// Global `Σ ω det J*` over every quadrature point of every element.
    pub fn target_volume(&self) -> f64 {
        let local: f64 = (0..self.space.num_elements())
            .map(|e| self.integrator.target_volume(e))
            .sum();
        self.comm.all_reduce_sum(local)
    }

    /// Global largest distance from a marked node to its target.
    pub fn fit_error(&self, x: &[f64]) -> f64 {
        let local = self
            .integrator
            .fitting()
            .max_error(self.space.num_nodes(), x);
        self.comm.all_reduce_max(local)
    }

    /// True if any partition marks a DOF for fitting.
    pub fn fitting_active(&self) -> bool {
        self.comm.all_reduce_or(!self.integrator.fitting().is_empty())
    }
}
