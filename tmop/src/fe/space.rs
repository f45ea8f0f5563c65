use indexmap::IndexSet;

use super::basis::{BasisKind, ReferenceElement};
use crate::MeshError;
use crate::mesh::Mesh;

/// A global node is identified by the mesh vertices it is interpolated from,
/// with integer weights. Neighbouring elements produce the same key for a node
/// on their shared edge or face.
type NodeKey = Vec<(usize, u64)>;

/// Continuous, vector-valued finite-element space holding mesh coordinates.
///
/// Scalar DOFs are ordered by nodes: DOF `c * N + n` is component `c` of node
/// `n`, where `N` is [`FiniteElementSpace::num_nodes`].
#[derive(Clone, Debug)]
pub struct FiniteElementSpace {
    dim: usize,
    reference: ReferenceElement,
    num_nodes: usize,
    element_nodes: Vec<Vec<usize>>,
    element_attributes: Vec<u32>,
    boundary_nodes: Vec<Vec<usize>>,
    boundary_attributes: Vec<u32>,
    /// Positions of every node on the input (linear) mesh, by nodes.
    initial_coordinates: Vec<f64>,
    /// Node sitting on each mesh vertex, `None` for vertices no element uses.
    vertex_nodes: Vec<Option<usize>>,
}

impl FiniteElementSpace {
    /// Build the space of order `order` over `mesh`.
    pub fn new(mesh: &Mesh, order: usize, kind: BasisKind) -> Result<Self, MeshError> {
        let dim = mesh.dim();
        let reference = ReferenceElement::new(mesh.geometry(), order, kind)?;
        let nd = reference.num_dofs();

        let mut keys: IndexSet<NodeKey> = IndexSet::new();
        let mut positions: Vec<[f64; 3]> = Vec::new();
        let mut element_nodes = Vec::with_capacity(mesh.elements().len());
        let mut local_keys: Vec<Vec<NodeKey>> = Vec::with_capacity(mesh.elements().len());
        for el in mesh.elements() {
            let mut nodes = Vec::with_capacity(nd);
            let mut el_keys = Vec::with_capacity(nd);
            for a in 0..nd {
                let mut key: NodeKey = reference
                    .vertex_weights(a)
                    .into_iter()
                    .map(|(v, w)| (el.vertices[v], w))
                    .collect();
                key.sort_unstable();
                let (index, inserted) = keys.insert_full(key.clone());
                if inserted {
                    positions.push(weighted_position(mesh.vertices(), &key));
                }
                nodes.push(index);
                el_keys.push(key);
            }
            element_nodes.push(nodes);
            local_keys.push(el_keys);
        }
        let num_nodes = keys.len();
        let mut vertex_nodes = vec![None; mesh.vertices().len()];
        for (n, key) in keys.iter().enumerate() {
            if let [(v, _)] = key.as_slice() {
                vertex_nodes[*v] = Some(n);
            }
        }

        // Elements touching each vertex, to find the element behind each boundary face.
        let mut vertex_elements = vec![Vec::new(); mesh.vertices().len()];
        for (e, el) in mesh.elements().iter().enumerate() {
            for &v in &el.vertices {
                vertex_elements[v].push(e);
            }
        }
        let mut boundary_nodes = Vec::with_capacity(mesh.boundary().len());
        for (b, be) in mesh.boundary().iter().enumerate() {
            let owner = be
                .vertices
                .first()
                .and_then(|&v0| {
                    vertex_elements[v0].iter().copied().find(|&e| {
                        be.vertices
                            .iter()
                            .all(|v| mesh.elements()[e].vertices.contains(v))
                    })
                })
                .ok_or_else(|| MeshError::Parse {
                    message: format!("boundary element {b} is not a face of any element"),
                })?;
            let nodes = local_keys[owner]
                .iter()
                .zip(&element_nodes[owner])
                .filter(|(key, _)| key.iter().all(|(v, _)| be.vertices.contains(v)))
                .map(|(_, &n)| n)
                .collect();
            boundary_nodes.push(nodes);
        }

        let mut initial_coordinates = vec![0.0; dim * num_nodes];
        for (n, p) in positions.iter().enumerate() {
            for c in 0..dim {
                initial_coordinates[c * num_nodes + n] = p[c];
            }
        }

        Ok(Self {
            dim,
            reference,
            num_nodes,
            element_nodes,
            element_attributes: mesh.elements().iter().map(|el| el.attribute).collect(),
            boundary_nodes,
            boundary_attributes: mesh.boundary().iter().map(|el| el.attribute).collect(),
            initial_coordinates,
            vertex_nodes,
        })
    }

    /// Spatial dimension, which is also the number of components.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Shape functions shared by every element.
    pub fn reference(&self) -> &ReferenceElement {
        &self.reference
    }

    /// Number of distinct nodes.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of scalar DOFs: `dim * num_nodes`.
    pub fn num_dofs(&self) -> usize {
        self.dim * self.num_nodes
    }

    /// Number of elements.
    pub fn num_elements(&self) -> usize {
        self.element_nodes.len()
    }

    /// Global node of each local node of element `e`.
    pub fn element_nodes(&self, e: usize) -> &[usize] {
        &self.element_nodes[e]
    }

    /// Attribute of element `e`.
    pub fn element_attribute(&self, e: usize) -> u32 {
        self.element_attributes[e]
    }

    /// Scalar DOFs of element `e`, component-major: all x DOFs, then all y DOFs, ...
    pub fn element_vdofs(&self, e: usize, out: &mut Vec<usize>) {
        out.clear();
        let nodes = &self.element_nodes[e];
        for c in 0..self.dim {
            out.extend(nodes.iter().map(|&n| c * self.num_nodes + n));
        }
    }

    /// Number of boundary elements.
    pub fn num_boundary_elements(&self) -> usize {
        self.boundary_nodes.len()
    }

    /// Global nodes lying on boundary element `b`.
    pub fn boundary_nodes(&self, b: usize) -> &[usize] {
        &self.boundary_nodes[b]
    }

    /// Attribute of boundary element `b`.
    pub fn boundary_attribute(&self, b: usize) -> u32 {
        self.boundary_attributes[b]
    }

    /// Node coordinates of the input mesh, by nodes. This is the starting
    /// point of a solve.
    pub fn initial_coordinates(&self) -> &[f64] {
        &self.initial_coordinates
    }

    /// Node that sits on each vertex of the input mesh, if any element uses it.
    pub fn vertex_nodes(&self) -> &[Option<usize>] {
        &self.vertex_nodes
    }

    /// `mesh` with its vertices moved to where the coordinate field `x` puts
    /// them. Higher-order nodes are dropped, so this is the linear mesh
    /// through the optimized vertices.
    pub fn moved_mesh(&self, mesh: &Mesh, x: &[f64]) -> Result<Mesh, MeshError> {
        let vertices = mesh
            .vertices()
            .iter()
            .zip(&self.vertex_nodes)
            .map(|(&v, node)| node.map_or(v, |n| self.node_position(x, n)))
            .collect();
        Mesh::new(
            mesh.dim(),
            vertices,
            mesh.elements().to_vec(),
            mesh.boundary().to_vec(),
        )
    }

    /// Position of `node` in the coordinate field `x`, padded to 3D.
    pub fn node_position(&self, x: &[f64], node: usize) -> [f64; 3] {
        let mut p = [0.0; 3];
        for (c, pc) in p.iter_mut().enumerate().take(self.dim) {
            *pc = x[c * self.num_nodes + node];
        }
        p
    }

    /// Gather element `e`'s coordinates from `x` into `out`, component-major.
    pub fn gather(&self, e: usize, x: &[f64], out: &mut [f64]) {
        let nodes = &self.element_nodes[e];
        let nd = nodes.len();
        for c in 0..self.dim {
            for (a, &n) in nodes.iter().enumerate() {
                out[c * nd + a] = x[c * self.num_nodes + n];
            }
        }
    }

    /// How many elements contain each node.
    pub fn elements_per_node(&self) -> Vec<usize> {
        let mut count = vec![0; self.num_nodes];
        for nodes in &self.element_nodes {
            for &n in nodes {
                count[n] += 1;
            }
        }
        count
    }
}

fn weighted_position(vertices: &[[f64; 3]], key: &[(usize, u64)]) -> [f64; 3] {
    let total: u64 = key.iter().map(|&(_, w)| w).sum();
    let mut p = [0.0; 3];
    for &(v, w) in key {
        let s = w as f64 / total as f64;
        for (pc, vc) in p.iter_mut().zip(vertices[v]) {
            *pc += s * vc;
        }
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Element, Geometry};

    fn two_by_one_quads() -> Mesh {
        Mesh::new(
            2,
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [2.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [1.0, 1.0, 0.0],
                [2.0, 1.0, 0.0],
            ],
            vec![
                Element {
                    attribute: 1,
                    geometry: Geometry::Square,
                    vertices: vec![0, 1, 4, 3],
                },
                Element {
                    attribute: 1,
                    geometry: Geometry::Square,
                    vertices: vec![1, 2, 5, 4],
                },
            ],
            vec![
                Element {
                    attribute: 2,
                    geometry: Geometry::Segment,
                    vertices: vec![0, 1],
                },
                Element {
                    attribute: 1,
                    geometry: Geometry::Segment,
                    vertices: vec![5, 2],
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn shared_edge_nodes_are_shared() {
        let space = FiniteElementSpace::new(&two_by_one_quads(), 2, BasisKind::Lagrange).unwrap();
        // 5 x 3 lattice points.
        assert_eq!(space.num_nodes(), 15);
        assert_eq!(space.num_dofs(), 30);
        let shared: Vec<usize> = space
            .element_nodes(0)
            .iter()
            .filter(|n| space.element_nodes(1).contains(n))
            .copied()
            .collect();
        assert_eq!(shared.len(), 3);
        let counts = space.elements_per_node();
        for n in shared {
            assert_eq!(counts[n], 2);
        }
    }

    #[test]
    fn initial_coordinates_interpolate_mesh() {
        let space = FiniteElementSpace::new(&two_by_one_quads(), 2, BasisKind::Lagrange).unwrap();
        let x = space.initial_coordinates();
        // Local node 4 is the centre of element 1.
        let centre = space.element_nodes(1)[4];
        assert_eq!(space.node_position(x, centre), [1.5, 0.5, 0.0]);
        let mut local = vec![0.0; 18];
        space.gather(1, x, &mut local);
        assert_eq!(local[4], 1.5);
        assert_eq!(local[9 + 4], 0.5);
    }

    #[test]
    fn boundary_nodes_follow_faces() {
        let space = FiniteElementSpace::new(&two_by_one_quads(), 3, BasisKind::Lagrange).unwrap();
        let x = space.initial_coordinates();
        assert_eq!(space.num_boundary_elements(), 2);
        assert_eq!(space.boundary_attribute(0), 2);
        let bottom = space.boundary_nodes(0);
        assert_eq!(bottom.len(), 4);
        for &n in bottom {
            let p = space.node_position(x, n);
            assert!(p[1].abs() < 1e-15 && p[0] <= 1.0);
        }
        let right = space.boundary_nodes(1);
        assert_eq!(right.len(), 4);
        for &n in right {
            assert!((space.node_position(x, n)[0] - 2.0).abs() < 1e-15);
        }
    }

    #[test]
    fn moved_mesh_follows_vertex_nodes() {
        let mesh = two_by_one_quads();
        let space = FiniteElementSpace::new(&mesh, 2, BasisKind::Lagrange).unwrap();
        assert!(space.vertex_nodes().iter().all(Option::is_some));
        let mut x = space.initial_coordinates().to_vec();
        let n4 = space.vertex_nodes()[4].unwrap();
        x[space.num_nodes() + n4] = 1.25;
        let moved = space.moved_mesh(&mesh, &x).unwrap();
        assert_eq!(moved.vertices()[4], [1.0, 1.25, 0.0]);
        assert_eq!(moved.vertices()[2], mesh.vertices()[2]);
        assert_eq!(moved.elements(), mesh.elements());
    }

    #[test]
    fn vdofs_are_component_major() {
        let space = FiniteElementSpace::new(&two_by_one_quads(), 1, BasisKind::Lagrange).unwrap();
        let mut vdofs = Vec::new();
        space.element_vdofs(0, &mut vdofs);
        let nodes = space.element_nodes(0).to_vec();
        assert_eq!(vdofs[..4], nodes[..]);
        assert_eq!(vdofs[4], nodes[0] + space.num_nodes());
    }

    #[test]
    fn tetrahedral_space_counts() {
        let mesh = Mesh::new(
            3,
            Geometry::Tetrahedron.reference_vertices().to_vec(),
            vec![Element {
                attribute: 1,
                geometry: Geometry::Tetrahedron,
                vertices: vec![0, 1, 2, 3],
            }],
            vec![Element {
                attribute: 3,
                geometry: Geometry::Triangle,
                vertices: vec![0, 2, 1],
            }],
        )
        .unwrap()
        .uniform_refinement();
        let space = FiniteElementSpace::new(&mesh, 2, BasisKind::Lagrange).unwrap();
        // The P2 space on a once-refined tet is the P4 lattice of the original.
        assert_eq!(space.num_nodes(), 35);
        // Each refined boundary triangle carries 6 P2 nodes.
        for b in 0..space.num_boundary_elements() {
            assert_eq!(space.boundary_nodes(b).len(), 6);
            assert_eq!(space.boundary_attribute(b), 3);
        }
    }
}
