use crate::fe::FiniteElementSpace;

/// Which coordinate DOFs are pulled toward which target positions, and how hard.
///
/// `marker` and `target` are indexed like the coordinate field: by nodes,
/// DOF `c * N + n` for component `c` of node `n`. Only marked entries of
/// `target` are ever read.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceFitting {
    marker: Vec<bool>,
    target: Vec<f64>,
    weight: f64,
}

impl SurfaceFitting {
    /// Fit the marked DOFs to `target` with initial penalty weight `weight`.
    pub fn new(marker: Vec<bool>, target: Vec<f64>, weight: f64) -> Self {
        debug_assert_eq!(marker.len(), target.len());
        Self {
            marker,
            target,
            weight,
        }
    }

    /// Nothing is marked: pure shape optimization.
    pub fn none(num_dofs: usize) -> Self {
        Self::new(vec![false; num_dofs], vec![0.0; num_dofs], 0.0)
    }

    /// Mark every node on every boundary element. Each node's target comes
    /// from `target_fn(attribute, position)`, given the boundary element's
    /// attribute and the node's current position. Nodes on several boundary
    /// elements take the target from the last one.
    pub fn from_boundary<F>(
        space: &FiniteElementSpace,
        coordinates: &[f64],
        weight: f64,
        mut target_fn: F,
    ) -> Self
    where
        F: FnMut(u32, [f64; 3]) -> [f64; 3],
    {
        let n = space.num_nodes();
        let d = space.dim();
        let mut marker = vec![false; space.num_dofs()];
        let mut target = coordinates.to_vec();
        for b in 0..space.num_boundary_elements() {
            let attribute = space.boundary_attribute(b);
            for &node in space.boundary_nodes(b) {
                let position = space.node_position(coordinates, node);
                let goal = target_fn(attribute, position);
                for c in 0..d {
                    marker[c * n + node] = true;
                    target[c * n + node] = goal[c];
                }
            }
        }
        Self::new(marker, target, weight)
    }

    /// Which DOFs are fitted.
    pub fn marker(&self) -> &[bool] {
        &self.marker
    }

    /// Target values; only marked entries are meaningful.
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Current penalty weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub(crate) fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// Number of scalar DOFs.
    pub fn num_dofs(&self) -> usize {
        self.marker.len()
    }

    /// True if no DOF is marked on this partition.
    pub fn is_empty(&self) -> bool {
        !self.marker.iter().any(|&m| m)
    }

    /// Number of marked scalar DOFs.
    pub fn num_marked(&self) -> usize {
        self.marker.iter().filter(|&&m| m).count()
    }

    /// Largest distance `‖X_i - X*_i‖` from a marked node to its target, over
    /// this partition's nodes. Zero when nothing is marked.
    pub fn max_error(&self, num_nodes: usize, x: &[f64]) -> f64 {
        let dim = if num_nodes == 0 {
            0
        } else {
            self.marker.len() / num_nodes
        };
        (0..num_nodes)
            .map(|node| {
                let mut sq = 0.0;
                for c in 0..dim {
                    let i = c * num_nodes + node;
                    if self.marker[i] {
                        sq += (x[i] - self.target[i]).powi(2);
                    }
                }
                libm::sqrt(sq)
            })
            .fold(0.0, libm::fmax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fe::BasisKind;
    use crate::mesh::Mesh;

    const SQUARE: &str = "MFEM mesh v1.0
dimension
2
elements
1
1 3 0 1 2 3
boundary
4
2 1 0 1
1 1 1 2
2 1 2 3
1 1 3 0
vertices
4
2
0 0
1 0
1 1
0 1
";

    #[test]
    fn from_boundary_marks_every_boundary_node() {
        let mesh: Mesh = SQUARE.parse().unwrap();
        let space = FiniteElementSpace::new(&mesh, 2, BasisKind::Lagrange).unwrap();
        let x = space.initial_coordinates().to_vec();
        let fit = SurfaceFitting::from_boundary(&space, &x, 100.0, |attr, p| {
            if attr == 2 { [p[0], p[1] + 0.1, 0.0] } else { p }
        });
        // 8 of the 9 nodes are on the boundary, 2 components each.
        assert_eq!(fit.num_marked(), 16);
        assert_eq!(fit.weight(), 100.0);
        // Nodes last visited by an attribute-2 side are 0.1 away from target.
        let err = fit.max_error(space.num_nodes(), &x);
        assert!((err - 0.1).abs() < 1e-15);
    }

    #[test]
    fn empty_marker_has_zero_error() {
        let fit = SurfaceFitting::none(8);
        assert!(fit.is_empty());
        assert_eq!(fit.max_error(4, &[1.0; 8]), 0.0);
    }

    #[test]
    fn error_is_euclidean_per_node() {
        // Two nodes in 2D, only node 1 marked.
        let marker = vec![false, true, false, true];
        let target = vec![0.0, 3.0, 0.0, 4.0];
        let fit = SurfaceFitting::new(marker, target, 1.0);
        assert_eq!(fit.max_error(2, &[9.0, 0.0, 9.0, 0.0]), 5.0);
    }
}
