use crate::collective::Communicator;
use crate::nonlinear_form::NonlinearForm;

/// Mesh quality sampled at every quadrature point of every element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityReport {
    /// Smallest `det J`. Non-positive means the mesh is inverted somewhere.
    pub min_det_j: f64,
    /// Largest metric value, infinite if any point is inverted.
    pub max_metric: f64,
    /// Unweighted mean metric value over the valid points.
    pub mean_metric: f64,
}

impl QualityReport {
    /// True if every quadrature point has a positive Jacobian determinant.
    pub fn is_valid(&self) -> bool {
        self.min_det_j > 0.0
    }
}

impl std::fmt::Display for QualityReport {
    #[mutants::skip]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "min det(J) = {:.6e}, max metric = {:.6e}, mean metric = {:.6e}",
            self.min_det_j, self.max_metric, self.mean_metric
        )
    }
}

/// Sample the quality of the mesh with node coordinates `x`.
pub fn quality<C: Communicator>(form: &NonlinearForm<'_, C>, x: &[f64]) -> QualityReport {
    let space = form.space();
    let integrator = form.integrator();
    let metric = integrator.metric();
    let d = space.dim();

    let mut min_det = f64::INFINITY;
    let mut max_mu: f64 = 0.0;
    let mut sum_mu = 0.0;
    let mut count = 0usize;
    let mut x_e = Vec::new();
    for e in 0..space.num_elements() {
        x_e.resize(d * space.element_nodes(e).len(), 0.0);
        space.gather(e, x, &mut x_e);
        for q in 0..integrator.num_points() {
            let j = integrator.jacobian(q, &x_e);
            min_det = libm::fmin(min_det, j.det());
            match metric.evaluate(&integrator.weighted_jacobian_at(e, q, &x_e)) {
                Ok(mu) => {
                    max_mu = libm::fmax(max_mu, mu);
                    sum_mu += mu;
                    count += 1;
                }
                Err(_) => max_mu = f64::INFINITY,
            }
        }
    }

    let comm = form.comm();
    let min_det_j = -comm.all_reduce_max(-min_det);
    let max_metric = comm.all_reduce_max(max_mu);
    let sum = comm.all_reduce_sum(sum_mu);
    let count = comm.all_reduce_sum(count as f64);
    QualityReport {
        min_det_j,
        max_metric,
        mean_metric: if count > 0.0 { sum / count } else { 0.0 },
    }
}
