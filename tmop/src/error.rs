/// A Jacobian with non-positive determinant was found at a quadrature point.
/// Quality metrics have a pole at `det = 0`, so this is reported instead of a value.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
#[error("Jacobian determinant {det} is not positive")]
pub struct InvalidJacobian {
    /// The offending determinant.
    pub det: f64,
}

/// Some element of the mesh is inverted at some quadrature point.
/// Raised by element assembly and reduced across all partitions, so every
/// rank sees it, but only the owning rank knows where.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum Inverted {
    /// An element on this partition.
    #[error("element {element} is inverted: {source}")]
    Local {
        /// Lowest-numbered inverted element on this partition.
        element: usize,
        /// What the metric reported there.
        source: InvalidJacobian,
    },
    /// An element on another partition.
    #[error("an element on another partition is inverted")]
    Remote,
}

/// Errors from reading, refining or discretizing a mesh.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum MeshError {
    /// The mesh file could not be parsed.
    #[error("Could not parse mesh: {message}")]
    Parse {
        /// What the parser reported.
        message: String,
    },
    /// Only 2D and 3D meshes are supported.
    #[error("Unsupported mesh dimension {0}, only 2 and 3 are supported")]
    UnsupportedDimension(usize),
    /// The file names a geometry type this crate doesn't know.
    #[error("Unsupported geometry code {0}")]
    UnsupportedGeometry(usize),
    /// An element's geometry doesn't match the mesh dimension.
    #[error("Element {element} has dimension {found} but the mesh has dimension {expected}")]
    WrongElementDimension {
        /// Index of the element.
        element: usize,
        /// Dimension of the mesh.
        expected: usize,
        /// Dimension of the element's geometry.
        found: usize,
    },
    /// All elements of a mesh must share one geometry.
    #[error("Mixed element geometries are not supported")]
    MixedGeometry,
    /// The mesh has no elements.
    #[error("Mesh has no elements")]
    Empty,
    /// An element references a vertex that doesn't exist.
    #[error("Element {element} references vertex {vertex} but the mesh has {num_vertices} vertices")]
    VertexOutOfRange {
        /// Index of the element.
        element: usize,
        /// The missing vertex.
        vertex: usize,
        /// How many vertices the mesh has.
        num_vertices: usize,
    },
    /// Polynomial order must be at least 1.
    #[error("Polynomial order must be at least 1, got {0}")]
    InvalidOrder(usize),
}

/// Errors that stop a TMOP solve.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[cfg_attr(not(feature = "unstable-exhaustive"), non_exhaustive)]
pub enum SolveError {
    /// The starting mesh already has an inverted element.
    #[error("Initial mesh is inverted: {0}")]
    InvertedInitialMesh(#[from] Inverted),
    /// The mesh or space can't be optimized.
    #[error("{0}")]
    Mesh(#[from] MeshError),
    /// Coordinate, target or marker vectors don't match the space.
    #[error("Expected {expected} coordinate values for {what}, got {found}")]
    WrongLength {
        /// Which input was wrong.
        what: &'static str,
        /// Number of scalar DOFs in the space.
        expected: usize,
        /// Length given.
        found: usize,
    },
    /// The quality metric doesn't match the mesh dimension.
    #[error("Metric {metric_id} is for {metric_dim}D meshes but the mesh is {mesh_dim}D")]
    MetricDimension {
        /// MFEM numbering of the metric.
        metric_id: u32,
        /// Dimension the metric is defined on.
        metric_dim: usize,
        /// Dimension of the mesh.
        mesh_dim: usize,
    },
    /// Some DOF is marked for fitting, but the penalty weight can't pull it
    /// toward its target.
    #[error("Fitting weight must be positive and finite when nodes are marked, got {0}")]
    InvalidFitWeight(f64),
    /// Could not build the sparse Hessian pattern.
    #[error("Could not create matrix: {0}")]
    FaerMatrix(String),
    /// The inner linear solver broke down.
    #[error("Linear solver failed: {0}")]
    LinearSolver(String),
    /// No step along the Newton direction gave a valid mesh with lower energy.
    #[error("Line search failed in iteration {iteration} after {halvings} step halvings")]
    LineSearchFailed {
        /// Which Newton iteration failed.
        iteration: usize,
        /// How many times the step was halved.
        halvings: usize,
    },
    /// Solver did not reach either termination criterion in the allowed number of iterations.
    #[error("Could not converge in {0} iterations")]
    DidNotConverge(usize),
}

impl From<faer::sparse::CreationError> for SolveError {
    fn from(error: faer::sparse::CreationError) -> Self {
        Self::FaerMatrix(format!("{error:?}"))
    }
}
