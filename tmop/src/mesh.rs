use std::str::FromStr;

use winnow::Parser;

use crate::MeshError;

mod parser;
mod refine;

/// Reference geometries, numbered the way MFEM mesh files number them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum Geometry {
    /// Unit interval.
    Segment,
    /// Right triangle with vertices (0,0), (1,0), (0,1).
    Triangle,
    /// Unit square.
    Square,
    /// Right tetrahedron with vertices at the origin and the unit vectors.
    Tetrahedron,
    /// Unit cube.
    Cube,
}

const SEGMENT_VERTICES: [[f64; 3]; 2] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
const TRIANGLE_VERTICES: [[f64; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
const SQUARE_VERTICES: [[f64; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
];
const TETRAHEDRON_VERTICES: [[f64; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
];
const CUBE_VERTICES: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [1.0, 0.0, 0.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 0.0, 1.0],
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
];

impl Geometry {
    /// Parse MFEM's geometry code.
    pub fn from_mfem_code(code: usize) -> Option<Self> {
        match code {
            1 => Some(Self::Segment),
            2 => Some(Self::Triangle),
            3 => Some(Self::Square),
            4 => Some(Self::Tetrahedron),
            5 => Some(Self::Cube),
            _ => None,
        }
    }

    /// MFEM's geometry code.
    pub fn mfem_code(self) -> usize {
        match self {
            Self::Segment => 1,
            Self::Triangle => 2,
            Self::Square => 3,
            Self::Tetrahedron => 4,
            Self::Cube => 5,
        }
    }

    /// Topological dimension.
    pub fn dim(self) -> usize {
        match self {
            Self::Segment => 1,
            Self::Triangle | Self::Square => 2,
            Self::Tetrahedron | Self::Cube => 3,
        }
    }

    /// Number of vertices.
    pub fn num_vertices(self) -> usize {
        self.reference_vertices().len()
    }

    /// Is this a triangle or tetrahedron?
    pub fn is_simplex(self) -> bool {
        matches!(self, Self::Triangle | Self::Tetrahedron)
    }

    /// Vertex coordinates of the reference element, padded to 3D.
    pub fn reference_vertices(self) -> &'static [[f64; 3]] {
        match self {
            Self::Segment => &SEGMENT_VERTICES,
            Self::Triangle => &TRIANGLE_VERTICES,
            Self::Square => &SQUARE_VERTICES,
            Self::Tetrahedron => &TETRAHEDRON_VERTICES,
            Self::Cube => &CUBE_VERTICES,
        }
    }

    /// Measure (length, area, volume) of the reference element.
    pub fn reference_measure(self) -> f64 {
        match self {
            Self::Segment | Self::Square | Self::Cube => 1.0,
            Self::Triangle => 0.5,
            Self::Tetrahedron => 1.0 / 6.0,
        }
    }
}

/// An element or boundary element of a [`Mesh`].
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    /// User-supplied tag, e.g. which part of the boundary this is.
    pub attribute: u32,
    /// Shape of the element.
    pub geometry: Geometry,
    /// Indices into the mesh's vertex list, in reference-vertex order.
    pub vertices: Vec<usize>,
}

/// A conforming, single-geometry, linear mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    dim: usize,
    vertices: Vec<[f64; 3]>,
    elements: Vec<Element>,
    boundary: Vec<Element>,
}

impl Mesh {
    /// Build a mesh, checking it is well-formed.
    pub fn new(
        dim: usize,
        vertices: Vec<[f64; 3]>,
        elements: Vec<Element>,
        boundary: Vec<Element>,
    ) -> Result<Self, MeshError> {
        if !(2..=3).contains(&dim) {
            return Err(MeshError::UnsupportedDimension(dim));
        }
        let Some(first) = elements.first() else {
            return Err(MeshError::Empty);
        };
        let geometry = first.geometry;
        for (i, el) in elements.iter().enumerate() {
            if el.geometry.dim() != dim {
                return Err(MeshError::WrongElementDimension {
                    element: i,
                    expected: dim,
                    found: el.geometry.dim(),
                });
            }
            if el.geometry != geometry {
                return Err(MeshError::MixedGeometry);
            }
        }
        for (i, el) in boundary.iter().enumerate() {
            if el.geometry.dim() + 1 != dim {
                return Err(MeshError::WrongElementDimension {
                    element: i,
                    expected: dim - 1,
                    found: el.geometry.dim(),
                });
            }
        }
        for (i, el) in elements.iter().chain(boundary.iter()).enumerate() {
            if el.vertices.len() != el.geometry.num_vertices() {
                return Err(MeshError::Parse {
                    message: format!(
                        "element {i} has {} vertices but its geometry needs {}",
                        el.vertices.len(),
                        el.geometry.num_vertices()
                    ),
                });
            }
            if let Some(&vertex) = el.vertices.iter().find(|&&v| v >= vertices.len()) {
                return Err(MeshError::VertexOutOfRange {
                    element: i,
                    vertex,
                    num_vertices: vertices.len(),
                });
            }
        }
        Ok(Self {
            dim,
            vertices,
            elements,
            boundary,
        })
    }

    /// Spatial and topological dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Vertex coordinates, padded to 3D.
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    /// All elements.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// All boundary elements.
    pub fn boundary(&self) -> &[Element] {
        &self.boundary
    }

    /// The geometry every element shares.
    pub fn geometry(&self) -> Geometry {
        // `new` rejects empty and mixed meshes.
        self.elements[0].geometry
    }

    /// Write in MFEM mesh v1.0 format.
    pub fn write_mfem<W: std::io::Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "MFEM mesh v1.0")?;
        writeln!(w)?;
        writeln!(w, "dimension")?;
        writeln!(w, "{}", self.dim)?;
        writeln!(w)?;
        for (name, list) in [("elements", &self.elements), ("boundary", &self.boundary)] {
            writeln!(w, "{name}")?;
            writeln!(w, "{}", list.len())?;
            for el in list {
                write!(w, "{} {}", el.attribute, el.geometry.mfem_code())?;
                for v in &el.vertices {
                    write!(w, " {v}")?;
                }
                writeln!(w)?;
            }
            writeln!(w)?;
        }
        writeln!(w, "vertices")?;
        writeln!(w, "{}", self.vertices.len())?;
        writeln!(w, "{}", self.dim)?;
        for v in &self.vertices {
            let coords: Vec<String> = v[..self.dim].iter().map(|c| c.to_string()).collect();
            writeln!(w, "{}", coords.join(" "))?;
        }
        Ok(())
    }
}

impl FromStr for Mesh {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Comments run from '#' to the end of the line.
        let stripped: Vec<&str> = s
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default())
            .collect();
        let stripped = stripped.join("\n");
        let raw = parser::parse_mesh
            .parse(stripped.as_str())
            .map_err(|e| MeshError::Parse {
                message: e.to_string(),
            })?;
        raw.into_mesh()
    }
}
