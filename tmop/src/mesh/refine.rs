use indexmap::IndexSet;

use super::{Element, Geometry, Mesh};

/// New vertices of a refined mesh, keyed by the sorted set of parent vertices
/// they were averaged from. Original vertices have a single parent.
struct VertexPool {
    keys: IndexSet<Vec<usize>>,
    positions: Vec<[f64; 3]>,
}

impl VertexPool {
    fn new(vertices: &[[f64; 3]]) -> Self {
        let mut keys = IndexSet::with_capacity(vertices.len() * 4);
        for i in 0..vertices.len() {
            keys.insert(vec![i]);
        }
        Self {
            keys,
            positions: vertices.to_vec(),
        }
    }

    /// Index of the vertex at the average of `parents`, creating it if needed.
    fn average(&mut self, parents: &[usize]) -> usize {
        let mut key = parents.to_vec();
        key.sort_unstable();
        key.dedup();
        if let Some(index) = self.keys.get_index_of(&key) {
            return index;
        }
        let mut p = [0.0; 3];
        for &v in &key {
            for (pc, vc) in p.iter_mut().zip(self.positions[v]) {
                *pc += vc;
            }
        }
        let n = key.len() as f64;
        self.positions.push(p.map(|c| c / n));
        self.keys.insert_full(key).0
    }
}

/// Children of a tensor-product cell: points on a `{0,1,2}^d` lattice, where
/// each lattice point averages the corners whose coordinates are compatible with it.
fn refine_tensor(geometry: Geometry, vertices: &[usize], pool: &mut VertexPool) -> Vec<Vec<usize>> {
    let d = geometry.dim();
    let corners = geometry.reference_vertices();
    let bits: Vec<[usize; 3]> = corners
        .iter()
        .map(|c| [c[0] as usize, c[1] as usize, c[2] as usize])
        .collect();

    let mut lattice_point = |l: [usize; 3]| -> usize {
        let parents: Vec<usize> = bits
            .iter()
            .zip(vertices)
            .filter(|(b, _)| (0..d).all(|m| l[m] == 1 || l[m] == 2 * b[m]))
            .map(|(_, &v)| v)
            .collect();
        pool.average(&parents)
    };

    let cells = 1usize << d;
    let mut children = Vec::with_capacity(cells);
    // Children are visited in the order of the reference corners, so the
    // child nearest corner `c` is the `c`-th one.
    for cell in &bits {
        let child = bits
            .iter()
            .map(|corner| {
                let mut l = [0; 3];
                for m in 0..d {
                    l[m] = cell[m] + corner[m];
                }
                lattice_point(l)
            })
            .collect();
        children.push(child);
    }
    children
}

fn refine_triangle(v: &[usize], pool: &mut VertexPool) -> Vec<Vec<usize>> {
    let m01 = pool.average(&[v[0], v[1]]);
    let m12 = pool.average(&[v[1], v[2]]);
    let m02 = pool.average(&[v[0], v[2]]);
    vec![
        vec![v[0], m01, m02],
        vec![m01, v[1], m12],
        vec![m02, m12, v[2]],
        vec![m12, m02, m01],
    ]
}

fn signed_volume(p: &[[f64; 3]], t: &[usize]) -> f64 {
    let a = p[t[0]];
    let e = |i: usize| [p[t[i]][0] - a[0], p[t[i]][1] - a[1], p[t[i]][2] - a[2]];
    let (u, v, w) = (e(1), e(2), e(3));
    u[0] * (v[1] * w[2] - v[2] * w[1]) - u[1] * (v[0] * w[2] - v[2] * w[0])
        + u[2] * (v[0] * w[1] - v[1] * w[0])
}

fn refine_tetrahedron(v: &[usize], pool: &mut VertexPool) -> Vec<Vec<usize>> {
    let m01 = pool.average(&[v[0], v[1]]);
    let m02 = pool.average(&[v[0], v[2]]);
    let m03 = pool.average(&[v[0], v[3]]);
    let m12 = pool.average(&[v[1], v[2]]);
    let m13 = pool.average(&[v[1], v[3]]);
    let m23 = pool.average(&[v[2], v[3]]);
    let mut children = vec![
        vec![v[0], m01, m02, m03],
        vec![m01, v[1], m12, m13],
        vec![m02, m12, v[2], m23],
        vec![m03, m13, m23, v[3]],
    ];
    // The inner octahedron is split around its m02-m13 diagonal.
    for (a, b) in [(m01, m12), (m12, m23), (m23, m03), (m03, m01)] {
        let mut child = vec![m02, m13, a, b];
        if signed_volume(&pool.positions, &child) < 0.0 {
            child.swap(2, 3);
        }
        children.push(child);
    }
    children
}

fn refine_element(el: &Element, pool: &mut VertexPool) -> Vec<Element> {
    let children = match el.geometry {
        Geometry::Segment | Geometry::Square | Geometry::Cube => {
            refine_tensor(el.geometry, &el.vertices, pool)
        }
        Geometry::Triangle => refine_triangle(&el.vertices, pool),
        Geometry::Tetrahedron => refine_tetrahedron(&el.vertices, pool),
    };
    children
        .into_iter()
        .map(|vertices| Element {
            attribute: el.attribute,
            geometry: el.geometry,
            vertices,
        })
        .collect()
}

impl Mesh {
    /// Split every element and boundary element into `2^dim` children.
    /// Vertices on shared edges and faces are created once and shared.
    pub fn uniform_refinement(&self) -> Mesh {
        let mut pool = VertexPool::new(&self.vertices);
        let elements: Vec<Element> = self
            .elements
            .iter()
            .flat_map(|el| refine_element(el, &mut pool))
            .collect();
        let boundary: Vec<Element> = self
            .boundary
            .iter()
            .flat_map(|el| refine_element(el, &mut pool))
            .collect();
        Mesh {
            dim: self.dim,
            vertices: pool.positions,
            elements,
            boundary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Mesh {
        Mesh::new(
            2,
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![Element {
                attribute: 1,
                geometry: Geometry::Square,
                vertices: vec![0, 1, 2, 3],
            }],
            vec![
                Element {
                    attribute: 2,
                    geometry: Geometry::Segment,
                    vertices: vec![0, 1],
                },
                Element {
                    attribute: 1,
                    geometry: Geometry::Segment,
                    vertices: vec![1, 2],
                },
            ],
        )
        .unwrap()
    }

    fn signed_area(mesh: &Mesh, el: &Element) -> f64 {
        let p = |i: usize| mesh.vertices()[el.vertices[i]];
        let (a, b, c) = (p(0), p(1), p(2));
        (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
    }

    #[test]
    fn square_refines_into_four() {
        let fine = unit_square().uniform_refinement();
        assert_eq!(fine.elements().len(), 4);
        assert_eq!(fine.vertices().len(), 9);
        assert_eq!(fine.boundary().len(), 4);
        assert_eq!(fine.boundary()[0].attribute, 2);
        assert_eq!(fine.boundary()[3].attribute, 1);
        for el in fine.elements() {
            assert!(signed_area(&fine, el) > 0.0);
        }
        // Boundary children share the edge midpoint with the elements.
        let mid = fine.boundary()[0].vertices[1];
        assert_eq!(fine.vertices()[mid], [0.5, 0.0, 0.0]);
        assert!(fine.elements()[0].vertices.contains(&mid));
    }

    #[test]
    fn twice_refined_square_shares_vertices() {
        let fine = unit_square().uniform_refinement().uniform_refinement();
        assert_eq!(fine.elements().len(), 16);
        assert_eq!(fine.vertices().len(), 25);
    }

    #[test]
    fn triangles_keep_orientation() {
        let mesh: Mesh = super::super::tests::TWO_TRIANGLES.parse().unwrap();
        let fine = mesh.uniform_refinement();
        assert_eq!(fine.elements().len(), 8);
        assert_eq!(fine.vertices().len(), 9);
        assert_eq!(fine.boundary().len(), 8);
        for el in fine.elements() {
            assert!(signed_area(&fine, el) > 0.0);
        }
    }

    #[test]
    fn tetrahedron_refines_into_eight_positive_children() {
        let mesh = Mesh::new(
            3,
            Geometry::Tetrahedron.reference_vertices().to_vec(),
            vec![Element {
                attribute: 1,
                geometry: Geometry::Tetrahedron,
                vertices: vec![0, 1, 2, 3],
            }],
            vec![],
        )
        .unwrap();
        let fine = mesh.uniform_refinement();
        assert_eq!(fine.elements().len(), 8);
        assert_eq!(fine.vertices().len(), 10);
        let total: f64 = fine
            .elements()
            .iter()
            .map(|el| {
                let vol = signed_volume(fine.vertices(), &el.vertices);
                assert!(vol > 0.0);
                vol / 6.0
            })
            .sum();
        assert!((total - 1.0 / 6.0).abs() < 1e-14);
    }

    #[test]
    fn cube_refines_into_eight() {
        let mesh = Mesh::new(
            3,
            Geometry::Cube.reference_vertices().to_vec(),
            vec![Element {
                attribute: 1,
                geometry: Geometry::Cube,
                vertices: (0..8).collect(),
            }],
            vec![Element {
                attribute: 2,
                geometry: Geometry::Square,
                vertices: vec![0, 1, 5, 4],
            }],
        )
        .unwrap();
        let fine = mesh.uniform_refinement();
        assert_eq!(fine.elements().len(), 8);
        assert_eq!(fine.vertices().len(), 27);
        assert_eq!(fine.boundary().len(), 4);
        // The child at corner 6 spans [0.5, 1]^3.
        let child = &fine.elements()[6];
        assert_eq!(fine.vertices()[child.vertices[0]], [0.5, 0.5, 0.5]);
        assert_eq!(fine.vertices()[child.vertices[6]], [1.0, 1.0, 1.0]);
    }
}
