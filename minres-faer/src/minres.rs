use error_stack::Report;
use num_traits::Float;

use super::{LinearOperator, SolverError, SolverResult};

#[derive(Clone, Copy, Debug)]
pub struct MinresCfg<T> {
    /// Stop once the residual estimate drops below `rel_tol * ||b - A x0||`.
    pub rel_tol: T,
    /// Stop once the residual estimate drops below this absolute value.
    pub abs_tol: T,
    pub max_iter: usize,
}

impl<T: Float> Default for MinresCfg<T> {
    fn default() -> Self {
        Self {
            rel_tol: T::from(1e-12).unwrap_or_else(T::epsilon),
            abs_tol: T::zero(),
            max_iter: 100,
        }
    }
}

impl<T: Float> MinresCfg<T> {
    pub fn with_rel_tol(mut self, rel_tol: T) -> Self {
        self.rel_tol = rel_tol;
        self
    }
    pub fn with_abs_tol(mut self, abs_tol: T) -> Self {
        self.abs_tol = abs_tol;
        self
    }
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

#[derive(Clone, Debug)]
pub struct IterationStats<T> {
    pub iter: usize,
    /// Estimate of `||b - A x||` after this iteration.
    pub residual: T,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinresOutcome<T> {
    pub iterations: usize,
    pub initial_residual: T,
    pub residual: T,
    /// False if `max_iter` was reached first. The iterate is still usable.
    pub converged: bool,
}

pub fn minres<T, Op>(
    op: &Op,
    rhs: &[T],
    x: &mut [T],
    cfg: MinresCfg<T>,
) -> SolverResult<MinresOutcome<T>>
where
    T: Float,
    Op: LinearOperator<T>,
{
    minres_cb(op, rhs, x, cfg, |_| {})
}

/// MINRES (Paige & Saunders), unpreconditioned.
/// `x` holds the initial guess on entry and the approximate solution on exit.
/// Every inner product goes through [`LinearOperator::dot`].
pub fn minres_cb<T, Op, Cb>(
    op: &Op,
    rhs: &[T],
    x: &mut [T],
    cfg: MinresCfg<T>,
    mut on_iter: Cb,
) -> SolverResult<MinresOutcome<T>>
where
    T: Float,
    Op: LinearOperator<T>,
    Cb: FnMut(&IterationStats<T>),
{
    let n = op.size();
    if rhs.len() != n || x.len() != n {
        return Err(Report::new(SolverError).attach_printable(format!(
            "operator has size {n} but rhs has {} entries and x has {}",
            rhs.len(),
            x.len()
        )));
    }

    // r1 = b - A x0
    let mut r1 = vec![T::zero(); n];
    op.apply(x, &mut r1);
    for (ri, &bi) in r1.iter_mut().zip(rhs.iter()) {
        *ri = bi - *ri;
    }
    let beta1 = op.dot(&r1, &r1).sqrt();
    if !beta1.is_finite() {
        return Err(Report::new(SolverError).attach_printable("initial residual is not finite"));
    }
    let target = (cfg.rel_tol * beta1).max(cfg.abs_tol);
    if beta1 <= target || beta1 == T::zero() {
        return Ok(MinresOutcome {
            iterations: 0,
            initial_residual: beta1,
            residual: beta1,
            converged: true,
        });
    }

    let mut y = r1.clone();
    let mut r2 = r1.clone();
    let mut v = vec![T::zero(); n];
    let mut w = vec![T::zero(); n];
    let mut w1 = vec![T::zero(); n];
    let mut w2 = vec![T::zero(); n];

    let mut oldb = T::zero();
    let mut beta = beta1;
    let mut dbar = T::zero();
    let mut epsln = T::zero();
    let mut phibar = beta1;
    let mut cs = -T::one();
    let mut sn = T::zero();

    for iter in 1..=cfg.max_iter {
        // Lanczos step.
        let s = T::one() / beta;
        for (vi, &yi) in v.iter_mut().zip(y.iter()) {
            *vi = s * yi;
        }
        op.apply(&v, &mut y);
        if iter >= 2 {
            let c = beta / oldb;
            for (yi, &ri) in y.iter_mut().zip(r1.iter()) {
                *yi = *yi - c * ri;
            }
        }
        let alfa = op.dot(&v, &y);
        let c = alfa / beta;
        for (yi, &ri) in y.iter_mut().zip(r2.iter()) {
            *yi = *yi - c * ri;
        }
        std::mem::swap(&mut r1, &mut r2);
        r2.copy_from_slice(&y);
        oldb = beta;
        beta = op.dot(&r2, &y).sqrt();
        if !alfa.is_finite() || !beta.is_finite() {
            return Err(Report::new(SolverError)
                .attach_printable(format!("Lanczos breakdown at iteration {iter}")));
        }

        // Apply the previous rotation, then build the next one.
        let oldeps = epsln;
        let delta = cs * dbar + sn * alfa;
        let gbar = sn * dbar - cs * alfa;
        epsln = sn * beta;
        dbar = -cs * beta;
        let gamma = gbar.hypot(beta).max(T::epsilon());
        cs = gbar / gamma;
        sn = beta / gamma;
        let phi = cs * phibar;
        phibar = sn * phibar;

        // Update the search direction and the solution.
        let denom = T::one() / gamma;
        std::mem::swap(&mut w1, &mut w2);
        std::mem::swap(&mut w2, &mut w);
        for i in 0..n {
            w[i] = (v[i] - oldeps * w1[i] - delta * w2[i]) * denom;
            x[i] = x[i] + phi * w[i];
        }

        on_iter(&IterationStats {
            iter,
            residual: phibar,
        });

        if phibar <= target || beta == T::zero() {
            return Ok(MinresOutcome {
                iterations: iter,
                initial_residual: beta1,
                residual: phibar,
                converged: true,
            });
        }
    }

    Ok(MinresOutcome {
        iterations: cfg.max_iter,
        initial_residual: beta1,
        residual: phibar,
        converged: false,
    })
}
