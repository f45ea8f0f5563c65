use crate::fe::FiniteElementSpace;
use crate::fitting::SurfaceFitting;

/// Something about the problem or the solve that is probably not what the
/// caller wanted, but doesn't stop the solver.
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Warning {
    /// Newton iteration the warning is about, if any.
    pub about_iteration: Option<usize>,
    /// What went wrong.
    pub content: WarningContent,
}

/// The kinds of [`Warning`].
#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq))]
#[non_exhaustive]
pub enum WarningContent {
    /// Fitting was requested but no DOF is marked.
    EmptyFitMarker,
    /// The quadrature rule can't integrate the metric of a curved element well.
    LowQuadratureOrder {
        /// Requested quadrature order.
        quad_order: usize,
        /// Polynomial order of the mesh.
        mesh_order: usize,
    },
    /// Every marked node already sits within the fit tolerance of its target.
    TargetsAlreadySatisfied {
        /// Fit error of the initial mesh.
        fit_error: f64,
    },
    /// MINRES hit its iteration limit, and the Newton step came from an
    /// unconverged linear solve.
    LinearSolverNotConverged {
        /// In how many Newton iterations this happened.
        count: usize,
    },
    /// The adaptive fitting weight stopped growing at its ceiling.
    WeightCeilingReached {
        /// The ceiling.
        weight: f64,
    },
}

/// Check the inputs of a solve for likely mistakes.
pub fn lint(
    space: &FiniteElementSpace,
    quad_order: usize,
    fitting: &SurfaceFitting,
    fitting_requested: bool,
) -> Vec<Warning> {
    let mut warnings = Vec::default();
    if fitting_requested && fitting.is_empty() {
        warnings.push(Warning {
            about_iteration: None,
            content: WarningContent::EmptyFitMarker,
        });
    }
    let mesh_order = space.reference().order();
    if quad_order < 2 * mesh_order {
        warnings.push(Warning {
            about_iteration: None,
            content: WarningContent::LowQuadratureOrder {
                quad_order,
                mesh_order,
            },
        });
    }
    warnings
}

impl std::fmt::Display for WarningContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningContent::EmptyFitMarker => write!(
                f,
                "Surface fitting was requested, but no node is marked for fitting. Only the mesh shape will be optimized."
            ),
            WarningContent::LowQuadratureOrder {
                quad_order,
                mesh_order,
            } => write!(
                f,
                "Quadrature order {quad_order} is below twice the mesh order {mesh_order}, so inverted quadrature points may be missed. Use at least {}.",
                2 * mesh_order
            ),
            WarningContent::TargetsAlreadySatisfied { fit_error } => write!(
                f,
                "Every marked node is already within {fit_error:e} of its target, so the mesh was not moved."
            ),
            WarningContent::LinearSolverNotConverged { count } => write!(
                f,
                "The linear solver did not converge in {count} Newton iterations; those steps used an approximate direction."
            ),
            WarningContent::WeightCeilingReached { weight } => write!(
                f,
                "The fitting weight reached its ceiling of {weight:e}. The targets may be infeasible for this mesh."
            ),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.about_iteration {
            Some(iteration) => write!(f, "iteration {iteration}: {}", self.content),
            None => self.content.fmt(f),
        }
    }
}
