use minres_faer::LinearOperator;

/// Global reductions across the partitions of a distributed mesh.
///
/// Every scalar the solver branches on goes through one of these, and every
/// rank must issue the same reductions in the same order.
pub trait Communicator: Sync {
    /// This partition's index.
    fn rank(&self) -> usize;
    /// Number of partitions.
    fn size(&self) -> usize;
    /// Sum of `local` over all ranks.
    fn all_reduce_sum(&self, local: f64) -> f64;
    /// Maximum of `local` over all ranks.
    fn all_reduce_max(&self, local: f64) -> f64;
    /// True if `local` is true on any rank.
    fn all_reduce_or(&self, local: bool) -> bool;
}

/// The whole mesh lives in this process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SingleRank;

impl Communicator for SingleRank {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, local: f64) -> f64 {
        local
    }

    fn all_reduce_max(&self, local: f64) -> f64 {
        local
    }

    fn all_reduce_or(&self, local: bool) -> bool {
        local
    }
}

/// Global dot product of two partition-local vectors.
pub fn dot<C: Communicator + ?Sized>(comm: &C, a: &[f64], b: &[f64]) -> f64 {
    let local = a.iter().zip(b).map(|(x, y)| x * y).sum();
    comm.all_reduce_sum(local)
}

/// Global Euclidean norm of a partition-local vector.
pub fn norm<C: Communicator + ?Sized>(comm: &C, a: &[f64]) -> f64 {
    libm::sqrt(dot(comm, a, a))
}

/// One partition's block of a distributed operator. Applying it stays on
/// this partition, inner products are summed over all of them.
pub struct DistributedOperator<'c, Op, C: ?Sized> {
    local: Op,
    comm: &'c C,
}

impl<'c, Op, C: Communicator + ?Sized> DistributedOperator<'c, Op, C> {
    /// Wrap this partition's block `local`.
    pub fn new(local: Op, comm: &'c C) -> Self {
        Self { local, comm }
    }
}

impl<Op, C> LinearOperator<f64> for DistributedOperator<'_, Op, C>
where
    Op: LinearOperator<f64>,
    C: Communicator + ?Sized,
{
    fn size(&self) -> usize {
        self.local.size()
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        self.local.apply(x, out);
    }

    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        dot(self.comm, a, b)
    }
}
