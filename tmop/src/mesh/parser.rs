use winnow::{
    Result as WResult,
    ascii::{digit1, float, multispace0, space1},
    combinator::{eof, preceded, repeat, separated},
    prelude::*,
};

use super::{Element, Geometry, Mesh};
use crate::MeshError;

/// Sections of an MFEM v1.0 mesh file, before any validation.
#[derive(Debug, PartialEq)]
pub(super) struct RawMesh {
    dim: usize,
    /// Each line is `attribute geometry v0 v1 ...`.
    elements: Vec<Vec<usize>>,
    boundary: Vec<Vec<usize>>,
    space_dim: usize,
    vertices: Vec<Vec<f64>>,
}

/// Parses a mesh whose comments were already stripped.
pub(super) fn parse_mesh(i: &mut &str) -> WResult<RawMesh> {
    keyword("MFEM mesh v1.0").parse_next(i)?;
    keyword("dimension").parse_next(i)?;
    let dim = count(i)?;
    keyword("elements").parse_next(i)?;
    let n = count(i)?;
    let elements = repeat(n, int_line).parse_next(i)?;
    keyword("boundary").parse_next(i)?;
    let n = count(i)?;
    let boundary = repeat(n, int_line).parse_next(i)?;
    keyword("vertices").parse_next(i)?;
    let n = count(i)?;
    let space_dim = count(i)?;
    let vertices = repeat(n, float_line).parse_next(i)?;
    multispace0.parse_next(i)?;
    eof.parse_next(i)?;
    Ok(RawMesh {
        dim,
        elements,
        boundary,
        space_dim,
        vertices,
    })
}

fn keyword<'i>(name: &'static str) -> impl Parser<&'i str, (), winnow::error::ContextError> {
    preceded(multispace0, name).void()
}

fn count(i: &mut &str) -> WResult<usize> {
    preceded(multispace0, digit1.parse_to()).parse_next(i)
}

fn int_line(i: &mut &str) -> WResult<Vec<usize>> {
    preceded(
        multispace0,
        separated(1.., digit1.parse_to::<usize>(), space1),
    )
    .parse_next(i)
}

fn float_line(i: &mut &str) -> WResult<Vec<f64>> {
    preceded(multispace0, separated(1.., float::<_, f64, _>, space1)).parse_next(i)
}

fn element(line: &[usize]) -> Result<Element, MeshError> {
    let [attribute, code, vertices @ ..] = line else {
        return Err(MeshError::Parse {
            message: format!("element line {line:?} needs an attribute and a geometry"),
        });
    };
    let geometry = Geometry::from_mfem_code(*code).ok_or(MeshError::UnsupportedGeometry(*code))?;
    let attribute = u32::try_from(*attribute).map_err(|_| MeshError::Parse {
        message: format!("attribute {attribute} is too large"),
    })?;
    Ok(Element {
        attribute,
        geometry,
        vertices: vertices.to_vec(),
    })
}

impl RawMesh {
    pub(super) fn into_mesh(self) -> Result<Mesh, MeshError> {
        if !(2..=3).contains(&self.dim) {
            return Err(MeshError::UnsupportedDimension(self.dim));
        }
        if self.space_dim != self.dim {
            return Err(MeshError::Parse {
                message: format!(
                    "vertices have {} coordinates but the mesh is {}D",
                    self.space_dim, self.dim
                ),
            });
        }
        let elements = self
            .elements
            .iter()
            .map(|line| element(line))
            .collect::<Result<Vec<_>, _>>()?;
        let boundary = self
            .boundary
            .iter()
            .map(|line| element(line))
            .collect::<Result<Vec<_>, _>>()?;
        let mut vertices = Vec::with_capacity(self.vertices.len());
        for (i, line) in self.vertices.iter().enumerate() {
            if line.len() != self.space_dim {
                return Err(MeshError::Parse {
                    message: format!(
                        "vertex {i} has {} coordinates, expected {}",
                        line.len(),
                        self.space_dim
                    ),
                });
            }
            let mut v = [0.0; 3];
            v[..line.len()].copy_from_slice(line);
            vertices.push(v);
        }
        Mesh::new(self.dim, vertices, elements, boundary)
    }
}
