use minres_faer::MinresCfg;

use crate::{QualityMetric, TargetConstructor};

pub(crate) mod newton;

/// Settings for a TMOP solve.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct Config {
    /// Quality metric. `None` picks the shape metric for the mesh dimension.
    pub metric: Option<QualityMetric>,
    /// How target Jacobians are built.
    pub target: TargetConstructor,
    /// Order of the quadrature rule used for the metric integral.
    pub quad_order: usize,
    /// Newton iterations before giving up.
    pub max_iterations: usize,
    /// Stop once `‖r‖ ≤ rel_tol·‖r₀‖` (and the fit is good enough).
    pub rel_tol: f64,
    /// Stop once `‖r‖ ≤ abs_tol` (and the fit is good enough).
    pub abs_tol: f64,
    /// Stop as soon as every marked node is this close to its target.
    /// `None` disables the fit-based stop.
    pub fit_termination: Option<f64>,
    /// Double the fitting weight whenever the fit error stalls.
    pub adaptive_weight: bool,
    /// The adaptive fitting weight never grows past this.
    pub weight_ceiling: f64,
    /// Line-search step halvings before declaring failure.
    pub max_halvings: usize,
    /// Inner MINRES settings.
    pub linear_solver: MinresCfg<f64>,
    /// Assembly threads, 0 for one per core.
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metric: None,
            target: TargetConstructor::IdealShapeUnitSize,
            quad_order: 5,
            max_iterations: 200,
            rel_tol: 1e-10,
            abs_tol: 0.0,
            fit_termination: Some(1e-2),
            adaptive_weight: true,
            weight_ceiling: 1e10,
            max_halvings: 12,
            linear_solver: MinresCfg::default()
                .with_rel_tol(1e-12)
                .with_abs_tol(0.0)
                .with_max_iter(100),
            threads: 0,
        }
    }
}

impl Config {
    /// Use this quality metric instead of the dimension's default.
    pub fn with_metric(mut self, metric: QualityMetric) -> Self {
        self.metric = Some(metric);
        self
    }

    /// Quadrature order of the metric integral.
    pub fn with_quad_order(mut self, quad_order: usize) -> Self {
        self.quad_order = quad_order;
        self
    }

    /// Newton iteration limit.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Relative residual tolerance.
    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }

    /// Absolute residual tolerance.
    pub fn with_abs_tol(mut self, abs_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self
    }

    /// Fit tolerance that ends the solve, or `None` to only stop on the residual.
    pub fn with_fit_termination(mut self, tolerance: Option<f64>) -> Self {
        self.fit_termination = tolerance;
        self
    }

    /// Turn the adaptive fitting weight on or off.
    pub fn with_adaptive_weight(mut self, adaptive: bool) -> Self {
        self.adaptive_weight = adaptive;
        self
    }

    /// Cap for the adaptive fitting weight.
    pub fn with_weight_ceiling(mut self, ceiling: f64) -> Self {
        self.weight_ceiling = ceiling;
        self
    }

    /// Line-search halving limit.
    pub fn with_max_halvings(mut self, max_halvings: usize) -> Self {
        self.max_halvings = max_halvings;
        self
    }

    /// Inner linear solver settings.
    pub fn with_linear_solver(mut self, linear_solver: MinresCfg<f64>) -> Self {
        self.linear_solver = linear_solver;
        self
    }

    /// Assembly threads, 0 for one per core. Only the first solve in a
    /// process sizes the thread pool.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

/// Progress after one accepted Newton step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationStats {
    /// Index of the step, starting at 0.
    pub iteration: usize,
    /// Objective after the step, at `fit_weight`.
    pub energy: f64,
    /// Residual norm before the step.
    pub residual_norm: f64,
    /// Line-search scale `α` that was accepted.
    pub step_scale: f64,
    /// Fitting weight for the next step.
    pub fit_weight: f64,
    /// Fit error after the step.
    pub fit_error: f64,
    /// MINRES iterations spent on the step.
    pub linear_iterations: usize,
    /// Whether MINRES reached its tolerance.
    pub linear_converged: bool,
}
