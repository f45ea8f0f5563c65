use crate::small_mat::SmallMat;

/// How the target Jacobian `J*` is chosen at each quadrature point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "fuzz", derive(arbitrary::Arbitrary))]
pub enum TargetConstructor {
    /// `J* = I`: every element should look like its reference element,
    /// at unit size. The shape metrics are scale-invariant, so size is ignored.
    #[default]
    IdealShapeUnitSize,
}

impl TargetConstructor {
    /// Target Jacobian for quadrature point `qp` of element `element`.
    /// The ideal targets don't depend on either.
    pub fn jacobian(self, dim: usize, _element: usize, _qp: usize) -> SmallMat {
        match self {
            Self::IdealShapeUnitSize => SmallMat::identity(dim),
        }
    }
}
