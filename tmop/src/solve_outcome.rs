use crate::{QualityReport, SolveError, Warning};

/// Why a successful solve stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every marked node is within the fit tolerance of its target.
    ConvergedByFit,
    /// The residual fell below tolerance, or no descent was left to make.
    ConvergedByResidual,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::ConvergedByFit => write!(f, "converged by fit tolerance"),
            Termination::ConvergedByResidual => write!(f, "converged by residual tolerance"),
        }
    }
}

/// Data from a successful solve. The coordinates were updated in place.
#[derive(Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct SolveOutcome {
    /// Why the solver stopped.
    pub(crate) termination: Termination,
    /// How many Newton steps were accepted?
    pub(crate) iterations: usize,
    /// Anything suspicious about the problem or the solve.
    pub(crate) warnings: Vec<Warning>,
    /// Objective at the final coordinates.
    pub(crate) final_energy: f64,
    /// Largest distance from a marked node to its target, at the end.
    pub(crate) fit_error: f64,
    /// Fitting weight in effect at the end.
    pub(crate) fit_weight: f64,
    /// Quality of the initial mesh.
    pub(crate) initial_quality: QualityReport,
    /// Quality of the final mesh.
    pub(crate) final_quality: QualityReport,
    /// Threads element assembly ran on.
    pub(crate) threads: usize,
}

impl SolveOutcome {
    /// Why the solver stopped.
    pub fn termination(&self) -> Termination {
        self.termination
    }

    /// How many Newton steps were accepted?
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Anything suspicious about the problem or the solve.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Objective at the final coordinates.
    pub fn final_energy(&self) -> f64 {
        self.final_energy
    }

    /// Largest distance from a marked node to its target, at the end.
    pub fn fit_error(&self) -> f64 {
        self.fit_error
    }

    /// Fitting weight in effect at the end.
    pub fn fit_weight(&self) -> f64 {
        self.fit_weight
    }

    /// Quality of the initial mesh.
    pub fn initial_quality(&self) -> QualityReport {
        self.initial_quality
    }

    /// Quality of the final mesh.
    pub fn final_quality(&self) -> QualityReport {
        self.final_quality
    }

    /// Threads element assembly ran on.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

/// Returned when the solver could not finish.
/// The coordinates hold the last valid iterate.
#[derive(Debug)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub struct FailureOutcome {
    /// The error that stopped the solve.
    pub error: SolveError,
    /// Other warnings which might have contributed.
    pub warnings: Vec<Warning>,
    /// How many Newton steps were accepted before stopping.
    pub iterations: usize,
    /// Fit error of the last valid iterate.
    pub fit_error: f64,
}

impl FailureOutcome {
    /// The error that stopped the solve.
    pub fn error(&self) -> &SolveError {
        &self.error
    }

    /// Other warnings which might have contributed.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// How many Newton steps were accepted before stopping.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Fit error of the last valid iterate.
    pub fn fit_error(&self) -> f64 {
        self.fit_error
    }
}

impl std::fmt::Display for FailureOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (after {} iterations, fit error {:e})",
            self.error, self.iterations, self.fit_error
        )
    }
}

impl std::error::Error for FailureOutcome {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_display_mentions_error() {
        let failure = FailureOutcome {
            error: SolveError::DidNotConverge(7),
            warnings: Vec::new(),
            iterations: 7,
            fit_error: 0.5,
        };
        let msg = failure.to_string();
        assert!(msg.contains("Could not converge in 7 iterations"));
        assert!(msg.contains("after 7 iterations"));
        assert_eq!(failure.iterations(), 7);
        assert!(failure.warnings().is_empty());
    }
}
