use minres_faer::minres;

use crate::collective::{Communicator, dot, norm};
use crate::nonlinear_form::NonlinearForm;
use crate::warnings::{Warning, WarningContent};
use crate::{Config, IterationStats, SolveError, Termination};

/// A predicted energy decrease this small, relative to the energy and the
/// mesh volume, is roundoff.
const ENERGY_NOISE_FACTOR: f64 = 8.0 * f64::EPSILON;

/// Stop doubling the weight while the fit error still drops by at least 1%.
const STALL_RATIO: f64 = 0.99;

/// What the solve has achieved so far. Kept up to date so that a failed solve
/// can still report it.
#[derive(Debug, Default)]
pub(crate) struct Progress {
    pub iterations: usize,
    pub energy: f64,
    pub fit_error: f64,
    pub linear_failures: usize,
    pub warnings: Vec<Warning>,
}

/// Minimize the TMOP objective from `x`, in place.
///
/// Each iteration first checks the fit tolerance, then the residual, then
/// takes a MINRES Newton step with a backtracking line search that rejects
/// inverted meshes. `x` always holds a valid iterate.
pub(crate) fn solve<C, F>(
    form: &mut NonlinearForm<'_, C>,
    x: &mut [f64],
    config: &Config,
    progress: &mut Progress,
    mut observer: F,
) -> Result<Termination, SolveError>
where
    C: Communicator,
    F: FnMut(&IterationStats),
{
    let n = x.len();
    let mut r = vec![0.0; n];
    let mut rhs = vec![0.0; n];
    let mut delta = vec![0.0; n];
    let mut trial = vec![0.0; n];

    let fit_active = form.fitting_active();
    let fit_tol = config.fit_termination.filter(|_| fit_active);
    let volume = form.target_volume();

    let mut energy = form.energy(x)?;
    let mut fit_error = form.fit_error(x);
    progress.energy = energy;
    progress.fit_error = fit_error;
    let mut r0_norm = None;
    let mut ceiling_warned = false;

    for k in 0..=config.max_iterations {
        progress.iterations = k;
        let fit_ok = fit_tol.is_none_or(|tol| fit_error <= tol);
        if fit_tol.is_some() && fit_ok {
            if k == 0 {
                progress.warnings.push(Warning {
                    about_iteration: None,
                    content: WarningContent::TargetsAlreadySatisfied { fit_error },
                });
            }
            tracing::info!(iterations = k, fit_error, "TMOP converged by fit tolerance");
            return Ok(Termination::ConvergedByFit);
        }

        form.mult(x, &mut r)?;
        let r_norm = norm(form.comm(), &r);
        let r0 = *r0_norm.get_or_insert(r_norm);
        if r_norm <= libm::fmax(config.rel_tol * r0, config.abs_tol) && fit_ok {
            tracing::info!(iterations = k, r_norm, "TMOP converged by residual");
            return Ok(Termination::ConvergedByResidual);
        }
        if k == config.max_iterations {
            break;
        }

        // Newton direction: H δ = -r.
        for (b, ri) in rhs.iter_mut().zip(&r) {
            *b = -ri;
        }
        delta.fill(0.0);
        let linear = {
            let h = form.gradient_operator(x)?;
            minres(&h, &rhs, &mut delta, config.linear_solver)
                .map_err(|report| SolveError::LinearSolver(format!("{report:?}")))?
        };
        if !linear.converged {
            progress.linear_failures += 1;
        }

        let mut decrease = -dot(form.comm(), &r, &delta);
        let noise = ENERGY_NOISE_FACTOR * (energy.abs() + volume);
        if fit_ok && decrease.abs() <= noise {
            tracing::info!(
                iterations = k,
                r_norm,
                decrease,
                "TMOP converged: no descent left above roundoff"
            );
            return Ok(Termination::ConvergedByResidual);
        }
        if decrease <= 0.0 {
            // An indefinite Hessian can point uphill. Fall back to steepest descent.
            tracing::debug!(iteration = k, decrease, "Newton direction is not a descent direction");
            delta.copy_from_slice(&rhs);
            decrease = r_norm * r_norm;
        }

        // Backtracking line search on F at the current weight.
        let mut scale = 1.0;
        let mut accepted = None;
        for _ in 0..=config.max_halvings {
            for ((t, xi), di) in trial.iter_mut().zip(x.iter()).zip(&delta) {
                *t = xi + scale * di;
            }
            match form.energy(&trial) {
                Ok(e) if e < energy => {
                    accepted = Some(e);
                    break;
                }
                Ok(_) | Err(_) => scale *= 0.5,
            }
        }
        let Some(new_energy) = accepted else {
            tracing::warn!(
                iteration = k,
                halvings = config.max_halvings,
                "TMOP line search found no valid mesh with lower energy"
            );
            return Err(SolveError::LineSearchFailed {
                iteration: k,
                halvings: config.max_halvings,
            });
        };
        x.copy_from_slice(&trial);
        energy = new_energy;

        let new_fit_error = form.fit_error(x);
        let mut weight = form.integrator().fitting().weight();
        if config.adaptive_weight && fit_active && new_fit_error > STALL_RATIO * fit_error {
            let raised = libm::fmin(2.0 * weight, config.weight_ceiling);
            if raised > weight {
                weight = raised;
                form.integrator_mut().set_fit_weight(weight);
                energy = form.energy(x)?;
            }
            if raised >= config.weight_ceiling && !ceiling_warned {
                ceiling_warned = true;
                tracing::warn!(iteration = k, weight, "TMOP fitting weight reached its ceiling");
                progress.warnings.push(Warning {
                    about_iteration: Some(k),
                    content: WarningContent::WeightCeilingReached { weight },
                });
            }
        }
        fit_error = new_fit_error;
        progress.energy = energy;
        progress.fit_error = fit_error;
        progress.iterations = k + 1;

        tracing::debug!(
            iteration = k,
            r_norm,
            energy,
            predicted_decrease = decrease,
            step_scale = scale,
            fit_weight = weight,
            fit_error,
            linear_iterations = linear.iterations,
            "TMOP Newton step"
        );
        observer(&IterationStats {
            iteration: k,
            energy,
            residual_norm: r_norm,
            step_scale: scale,
            fit_weight: weight,
            fit_error,
            linear_iterations: linear.iterations,
            linear_converged: linear.converged,
        });
    }

    tracing::warn!(
        iterations = config.max_iterations,
        fit_error,
        "TMOP did not converge"
    );
    Err(SolveError::DidNotConverge(config.max_iterations))
}
