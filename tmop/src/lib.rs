//! Target-Matrix Optimization Paradigm (TMOP) mesh node fitting.
//!
//! Moves the nodes of a high-order mesh so that its elements keep a good
//! shape, while the nodes marked for fitting are pulled toward target
//! positions. The objective is
//!
//! ```text
//! F(X; w) = Σₑ Σ_q ω(q) μ(T) det J*(q) + (w/2) Σ_{i∈M} (Xᵢ − X*ᵢ)²
//! ```
//!
//! minimized by a Newton method with MINRES inner solves and a line search
//! that never accepts an inverted mesh. The fitting weight `w` is doubled
//! whenever the fit error stalls.
//!
//! ```no_run
//! use tmop::{BasisKind, Config, FiniteElementSpace, Mesh, SurfaceFitting};
//!
//! let mesh: Mesh = std::fs::read_to_string("square01.mesh")?.parse()?;
//! let space = FiniteElementSpace::new(&mesh, 2, BasisKind::Lagrange)?;
//! let mut x = space.initial_coordinates().to_vec();
//! let fitting = SurfaceFitting::from_boundary(&space, &x, 100.0, |attribute, p| {
//!     if attribute == 2 { [p[0], p[1] + 0.05, p[2]] } else { p }
//! });
//! let outcome = tmop::optimize(&space, &mut x, fitting, Config::default())?;
//! println!("{} after {} iterations", outcome.termination(), outcome.iterations());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use crate::analysis::{QualityReport, quality};
pub use crate::collective::{Communicator, DistributedOperator, SingleRank};
pub use crate::error::{InvalidJacobian, Inverted, MeshError, SolveError};
pub use crate::fe::{BasisKind, FiniteElementSpace, IntegrationRule, ReferenceElement, Tabulation};
pub use crate::fitting::SurfaceFitting;
pub use crate::integrator::TmopIntegrator;
pub use crate::mesh::{Element, Geometry, Mesh};
pub use crate::metric::QualityMetric;
pub use crate::nonlinear_form::NonlinearForm;
pub use crate::parallel::init_global_parallelism;
pub use crate::small_mat::{SmallMat, SmallTensor};
pub use crate::solve_outcome::{FailureOutcome, SolveOutcome, Termination};
pub use crate::solver::{Config, IterationStats};
pub use crate::target::TargetConstructor;
pub use crate::warnings::{Warning, WarningContent};

/// Mesh quality sampling.
mod analysis;
/// Reductions across partitions.
mod collective;
mod error;
/// Shape functions, quadrature and the coordinate space.
pub mod fe;
/// Which nodes are fitted, and to where.
mod fitting;
/// Element energy, residual and Hessian.
mod integrator;
/// Meshes: parsing, refinement, output.
pub mod mesh;
/// Quality metrics.
mod metric;
/// Global assembly.
mod nonlinear_form;
mod parallel;
/// Small dense matrices for per-point Jacobian algebra.
mod small_mat;
mod solve_outcome;
/// Newton solver configuration and loop.
mod solver;
/// Target Jacobians.
mod target;
mod warnings;

/// Optimize the node coordinates `coordinates` of `space` in place.
///
/// When the Newton direction does not decrease the objective, which an
/// indefinite Hessian allows, that iteration searches along the negative
/// gradient instead. A line search failure therefore means that not even a
/// short steepest-descent step gives a valid mesh with lower energy.
///
/// Every marked DOF needs a positive, finite fitting weight; otherwise the
/// solve fails with [`SolveError::InvalidFitWeight`] before moving anything.
///
/// On failure the coordinates hold the last valid iterate.
pub fn optimize(
    space: &FiniteElementSpace,
    coordinates: &mut [f64],
    fitting: SurfaceFitting,
    config: Config,
) -> Result<SolveOutcome, FailureOutcome> {
    optimize_with_observer(space, coordinates, fitting, config, |_| {})
}

/// Like [`optimize`], calling `observer` after every accepted Newton step.
pub fn optimize_with_observer<F>(
    space: &FiniteElementSpace,
    coordinates: &mut [f64],
    fitting: SurfaceFitting,
    config: Config,
    observer: F,
) -> Result<SolveOutcome, FailureOutcome>
where
    F: FnMut(&IterationStats),
{
    optimize_with_comm(space, coordinates, fitting, config, SingleRank, observer)
}

/// Like [`optimize_with_observer`], for one partition of a distributed mesh.
/// Every rank must call this together, with the same configuration.
pub fn optimize_with_comm<C, F>(
    space: &FiniteElementSpace,
    coordinates: &mut [f64],
    fitting: SurfaceFitting,
    config: Config,
    comm: C,
    observer: F,
) -> Result<SolveOutcome, FailureOutcome>
where
    C: Communicator,
    F: FnMut(&IterationStats),
{
    let fitting_requested = fitting.weight() > 0.0;
    let mut warnings = warnings::lint(space, config.quad_order, &fitting, fitting_requested);
    let fail = |error, warnings| FailureOutcome {
        error,
        warnings,
        iterations: 0,
        fit_error: 0.0,
    };

    let threads = init_global_parallelism(config.threads);
    let mut form = match build_form(space, coordinates, fitting, &config, comm) {
        Ok(form) => form,
        Err(e) => return Err(fail(e, warnings)),
    };
    let initial_quality = quality(&form, coordinates);
    tracing::debug!(%initial_quality, threads, "TMOP initial mesh");

    let mut progress = solver::newton::Progress::default();
    let result = solver::newton::solve(&mut form, coordinates, &config, &mut progress, observer);
    warnings.append(&mut progress.warnings);
    if progress.linear_failures > 0 {
        tracing::warn!(
            count = progress.linear_failures,
            "MINRES did not converge in some Newton iterations"
        );
        warnings.push(Warning {
            about_iteration: None,
            content: WarningContent::LinearSolverNotConverged {
                count: progress.linear_failures,
            },
        });
    }

    match result {
        Ok(termination) => Ok(SolveOutcome {
            termination,
            iterations: progress.iterations,
            warnings,
            final_energy: progress.energy,
            fit_error: progress.fit_error,
            fit_weight: form.integrator().fitting().weight(),
            initial_quality,
            final_quality: quality(&form, coordinates),
            threads,
        }),
        Err(error) => Err(FailureOutcome {
            error,
            warnings,
            iterations: progress.iterations,
            fit_error: progress.fit_error,
        }),
    }
}

fn build_form<'s, C: Communicator>(
    space: &'s FiniteElementSpace,
    coordinates: &[f64],
    fitting: SurfaceFitting,
    config: &Config,
    comm: C,
) -> Result<NonlinearForm<'s, C>, SolveError> {
    let expected = space.num_dofs();
    for (what, found) in [
        ("coordinates", coordinates.len()),
        ("fitting", fitting.num_dofs()),
    ] {
        if found != expected {
            return Err(SolveError::WrongLength {
                what,
                expected,
                found,
            });
        }
    }
    let weight = fitting.weight();
    if comm.all_reduce_or(!fitting.is_empty()) && !(weight.is_finite() && weight > 0.0) {
        return Err(SolveError::InvalidFitWeight(weight));
    }
    let dim = space.dim();
    let metric = match config.metric.or_else(|| QualityMetric::shape_for_dim(dim)) {
        Some(m) if m.dim() == dim => m,
        Some(m) => {
            return Err(SolveError::MetricDimension {
                metric_id: m.id(),
                metric_dim: m.dim(),
                mesh_dim: dim,
            });
        }
        None => return Err(MeshError::UnsupportedDimension(dim).into()),
    };
    let rule = IntegrationRule::new(space.reference().geometry(), config.quad_order);
    let integrator = TmopIntegrator::new(
        metric,
        config.target,
        Tabulation::new(space.reference(), &rule),
        dim,
        fitting,
        &space.elements_per_node(),
    );
    NonlinearForm::new(space, integrator, comm)
}
