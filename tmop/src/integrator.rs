use faer::Mat;

use crate::fe::Tabulation;
use crate::fitting::SurfaceFitting;
use crate::small_mat::SmallMat;
use crate::{InvalidJacobian, QualityMetric, TargetConstructor};

/// Element-level TMOP energy, residual and Hessian.
///
/// Local coordinates `x_e` are component-major: `x_e[c * nd + a]` is
/// component `c` of local node `a`. The surface-fitting penalty of a node
/// shared by `k` elements is split evenly between them, so summing element
/// contributions gives the global objective exactly.
#[derive(Clone, Debug)]
pub struct TmopIntegrator {
    metric: QualityMetric,
    target: TargetConstructor,
    tabulation: Tabulation,
    dim: usize,
    num_nodes: usize,
    fitting: SurfaceFitting,
    /// `1 / (elements containing node)`, by global node.
    node_share: Vec<f64>,
    /// Target data by quadrature point, the same in every element.
    points: Vec<PointData>,
}

/// Shape-function gradients pushed through `J*⁻¹` at one quadrature point,
/// with that point's weight `ω · det J*`.
#[derive(Clone, Debug)]
struct PointData {
    weight: f64,
    dsh: Vec<[f64; 3]>,
}

impl PointData {
    fn new(tabulation: &Tabulation, q: usize, w: SmallMat) -> Self {
        let d = w.dim();
        // `inverse` only fails for singular targets, which the ideal targets never are.
        let w_inv = w.inverse().unwrap_or_else(|| SmallMat::identity(d));
        let dsh = tabulation
            .dshape(q)
            .iter()
            .map(|dn| {
                let mut out = [0.0; 3];
                for (k, o) in out.iter_mut().enumerate().take(d) {
                    for m in 0..d {
                        *o += dn[m] * w_inv[(m, k)];
                    }
                }
                out
            })
            .collect();
        Self {
            weight: tabulation.weight(q) * w.det(),
            dsh,
        }
    }
}

impl TmopIntegrator {
    /// Integrator over elements tabulated by `tabulation`. `elements_per_node`
    /// comes from [`crate::FiniteElementSpace::elements_per_node`].
    pub fn new(
        metric: QualityMetric,
        target: TargetConstructor,
        tabulation: Tabulation,
        dim: usize,
        fitting: SurfaceFitting,
        elements_per_node: &[usize],
    ) -> Self {
        let node_share = elements_per_node
            .iter()
            .map(|&k| if k == 0 { 0.0 } else { 1.0 / k as f64 })
            .collect();
        let points = match target {
            TargetConstructor::IdealShapeUnitSize => (0..tabulation.num_points())
                .map(|q| PointData::new(&tabulation, q, target.jacobian(dim, 0, q)))
                .collect(),
        };
        Self {
            metric,
            target,
            tabulation,
            dim,
            num_nodes: elements_per_node.len(),
            fitting,
            node_share,
            points,
        }
    }

    /// Quality metric being minimized.
    pub fn metric(&self) -> QualityMetric {
        self.metric
    }

    /// How target Jacobians are chosen.
    pub fn target(&self) -> TargetConstructor {
        self.target
    }

    /// Fitting marker, targets and current weight.
    pub fn fitting(&self) -> &SurfaceFitting {
        &self.fitting
    }

    /// Change the fitting penalty weight. Takes effect on the next evaluation.
    pub fn set_fit_weight(&mut self, weight: f64) {
        self.fitting.set_weight(weight);
    }

    /// Quadrature points per element.
    pub fn num_points(&self) -> usize {
        self.tabulation.num_points()
    }

    fn point_data(&self, _element: usize, q: usize) -> &PointData {
        &self.points[q]
    }

    /// `T = J·J*⁻¹` at point `q`, given the pushed-forward gradients.
    fn weighted_jacobian(&self, dsh: &[[f64; 3]], x_e: &[f64]) -> SmallMat {
        let d = self.dim;
        let nd = dsh.len();
        let mut t = SmallMat::zeros(d);
        for i in 0..d {
            let xi = &x_e[i * nd..(i + 1) * nd];
            for k in 0..d {
                t[(i, k)] = xi.iter().zip(dsh).map(|(x, g)| x * g[k]).sum();
            }
        }
        t
    }

    /// `T = J·J*⁻¹` of element `e` at quadrature point `q`.
    pub(crate) fn weighted_jacobian_at(&self, e: usize, q: usize, x_e: &[f64]) -> SmallMat {
        let pd = self.point_data(e, q);
        self.weighted_jacobian(&pd.dsh, x_e)
    }

    /// Physical Jacobian `J` of element `e` at quadrature point `q`.
    pub(crate) fn jacobian(&self, q: usize, x_e: &[f64]) -> SmallMat {
        let d = self.dim;
        let dn = self.tabulation.dshape(q);
        let nd = dn.len();
        let mut j = SmallMat::zeros(d);
        for i in 0..d {
            for k in 0..d {
                j[(i, k)] = (0..nd).map(|a| x_e[i * nd + a] * dn[a][k]).sum();
            }
        }
        j
    }

    /// `Σ_q ω(q) det J*(q)` over element `e`.
    pub fn target_volume(&self, e: usize) -> f64 {
        (0..self.num_points())
            .map(|q| self.point_data(e, q).weight)
            .sum()
    }

    /// The metric part of element `e`'s energy, without the fitting penalty.
    pub fn element_metric_energy(&self, e: usize, x_e: &[f64]) -> Result<f64, InvalidJacobian> {
        let mut energy = 0.0;
        for q in 0..self.num_points() {
            let pd = self.point_data(e, q);
            let t = self.weighted_jacobian(&pd.dsh, x_e);
            energy += pd.weight * self.metric.evaluate(&t)?;
        }
        Ok(energy)
    }

    /// Element `e`'s share of the objective `F`.
    pub fn element_energy(
        &self,
        e: usize,
        nodes: &[usize],
        x_e: &[f64],
    ) -> Result<f64, InvalidJacobian> {
        let mut energy = self.element_metric_energy(e, x_e)?;
        let w = self.fitting.weight();
        self.for_each_marked(nodes, |local, global, share| {
            let diff = x_e[local] - self.fitting.target()[global];
            energy += 0.5 * w * share * diff * diff;
        });
        Ok(energy)
    }

    /// Gradient of element `e`'s energy with respect to `x_e`, written to `r_e`.
    pub fn assemble_element_vector(
        &self,
        e: usize,
        nodes: &[usize],
        x_e: &[f64],
        r_e: &mut [f64],
    ) -> Result<(), InvalidJacobian> {
        let d = self.dim;
        let nd = nodes.len();
        r_e.fill(0.0);
        for q in 0..self.num_points() {
            let pd = self.point_data(e, q);
            let t = self.weighted_jacobian(&pd.dsh, x_e);
            let p = self.metric.gradient(&t)?;
            for i in 0..d {
                for (a, g) in pd.dsh.iter().enumerate() {
                    let mut acc = 0.0;
                    for k in 0..d {
                        acc += p[(i, k)] * g[k];
                    }
                    r_e[i * nd + a] += pd.weight * acc;
                }
            }
        }
        let w = self.fitting.weight();
        self.for_each_marked(nodes, |local, global, share| {
            r_e[local] += w * share * (x_e[local] - self.fitting.target()[global]);
        });
        Ok(())
    }

    /// Hessian of element `e`'s energy with respect to `x_e`, written to `h_e`.
    pub fn assemble_element_grad(
        &self,
        e: usize,
        nodes: &[usize],
        x_e: &[f64],
        h_e: &mut Mat<f64>,
    ) -> Result<(), InvalidJacobian> {
        let d = self.dim;
        let nd = nodes.len();
        let n = d * nd;
        *h_e = Mat::zeros(n, n);
        // a_mat[(i * nd + a) * d + l] = Σ_k H(i,k,j,l) dsh[a][k], for fixed j.
        let mut a_mat = vec![0.0; n * d];
        for q in 0..self.num_points() {
            let pd = self.point_data(e, q);
            let t = self.weighted_jacobian(&pd.dsh, x_e);
            let h = self.metric.hessian(&t)?;
            for j in 0..d {
                for i in 0..d {
                    for (a, ga) in pd.dsh.iter().enumerate() {
                        for l in 0..d {
                            let mut acc = 0.0;
                            for k in 0..d {
                                acc += h.get(i, k, j, l) * ga[k];
                            }
                            a_mat[(i * nd + a) * d + l] = acc;
                        }
                    }
                }
                for row in 0..n {
                    let arow = &a_mat[row * d..(row + 1) * d];
                    for (b, gb) in pd.dsh.iter().enumerate() {
                        let mut acc = 0.0;
                        for l in 0..d {
                            acc += arow[l] * gb[l];
                        }
                        h_e[(row, j * nd + b)] += pd.weight * acc;
                    }
                }
            }
        }
        let w = self.fitting.weight();
        self.for_each_marked(nodes, |local, _, share| {
            h_e[(local, local)] += w * share;
        });
        Ok(())
    }

    /// Calls `f(local_dof, global_dof, share)` for every marked DOF of an element.
    fn for_each_marked<F: FnMut(usize, usize, f64)>(&self, nodes: &[usize], mut f: F) {
        let nd = nodes.len();
        let marker = self.fitting.marker();
        for c in 0..self.dim {
            for (a, &node) in nodes.iter().enumerate() {
                let global = c * self.num_nodes + node;
                if marker[global] {
                    f(c * nd + a, global, self.node_share[node]);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fe::{BasisKind, FiniteElementSpace, IntegrationRule};
    use crate::mesh::Mesh;

    const TRIANGLE: &str = "MFEM mesh v1.0
dimension
2
elements
1
1 2 0 1 2
boundary
1
1 1 0 1
vertices
3
2
0 0
1 0
0 1
";

    struct Fixture {
        space: FiniteElementSpace,
        integrator: TmopIntegrator,
        x: Vec<f64>,
    }

    fn fixture(weight: f64) -> Fixture {
        let mesh: Mesh = TRIANGLE.parse().unwrap();
        let space = FiniteElementSpace::new(&mesh, 2, BasisKind::Lagrange).unwrap();
        let rule = IntegrationRule::new(mesh.geometry(), 4);
        let tab = Tabulation::new(space.reference(), &rule);
        let mut x = space.initial_coordinates().to_vec();
        // Perturb every node a little so the element is not ideal.
        for (i, v) in x.iter_mut().enumerate() {
            *v += 0.03 * ((i * 7 % 5) as f64 - 2.0) / 2.0;
        }
        let fitting = SurfaceFitting::from_boundary(&space, space.initial_coordinates(), weight, |_, p| {
            [p[0], p[1] + 0.05, 0.0]
        });
        let integrator = TmopIntegrator::new(
            QualityMetric::Shape2d,
            TargetConstructor::IdealShapeUnitSize,
            tab,
            2,
            fitting,
            &space.elements_per_node(),
        );
        Fixture {
            space,
            integrator,
            x,
        }
    }

    fn local(f: &Fixture) -> (Vec<usize>, Vec<f64>) {
        let nodes = f.space.element_nodes(0).to_vec();
        let mut x_e = vec![0.0; 2 * nodes.len()];
        f.space.gather(0, &f.x, &mut x_e);
        (nodes, x_e)
    }

    #[test]
    fn ideal_target_point_data_is_tabulated_once() {
        let f = fixture(1.0);
        let rule = IntegrationRule::new(crate::Geometry::Triangle, 4);
        let tab = Tabulation::new(f.space.reference(), &rule);
        assert_eq!(f.integrator.points.len(), tab.num_points());
        // `J* = I` leaves the reference gradients and weights as they are.
        for (q, pd) in f.integrator.points.iter().enumerate() {
            assert_eq!(pd.weight, tab.weight(q));
            for (g, dn) in pd.dsh.iter().zip(tab.dshape(q)) {
                assert_eq!(&g[..2], &dn[..2]);
            }
        }
        let area: f64 = (0..tab.num_points()).map(|q| tab.weight(q)).sum();
        assert_eq!(f.integrator.target_volume(0), area);
    }

    #[test]
    fn vector_matches_energy_differences() {
        let f = fixture(10.0);
        let (nodes, x_e) = local(&f);
        let mut r = vec![0.0; x_e.len()];
        f.integrator
            .assemble_element_vector(0, &nodes, &x_e, &mut r)
            .unwrap();
        let h = 1e-6;
        for i in 0..x_e.len() {
            let mut xp = x_e.clone();
            let mut xm = x_e.clone();
            xp[i] += h;
            xm[i] -= h;
            let ep = f.integrator.element_energy(0, &nodes, &xp).unwrap();
            let em = f.integrator.element_energy(0, &nodes, &xm).unwrap();
            let fd = (ep - em) / (2.0 * h);
            assert!((fd - r[i]).abs() < 1e-6, "dof {i}: {fd} vs {}", r[i]);
        }
    }

    #[test]
    fn grad_matches_vector_differences() {
        let f = fixture(10.0);
        let (nodes, x_e) = local(&f);
        let n = x_e.len();
        let mut h_e = Mat::zeros(n, n);
        f.integrator
            .assemble_element_grad(0, &nodes, &x_e, &mut h_e)
            .unwrap();
        let h = 1e-6;
        let mut rp = vec![0.0; n];
        let mut rm = vec![0.0; n];
        for j in 0..n {
            let mut xp = x_e.clone();
            let mut xm = x_e.clone();
            xp[j] += h;
            xm[j] -= h;
            f.integrator
                .assemble_element_vector(0, &nodes, &xp, &mut rp)
                .unwrap();
            f.integrator
                .assemble_element_vector(0, &nodes, &xm, &mut rm)
                .unwrap();
            for i in 0..n {
                let fd = (rp[i] - rm[i]) / (2.0 * h);
                assert!((fd - h_e[(i, j)]).abs() < 1e-5, "({i}, {j}): {fd} vs {}", h_e[(i, j)]);
                assert!((h_e[(i, j)] - h_e[(j, i)]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn fit_weight_scales_penalty() {
        let mut f = fixture(0.0);
        let (nodes, x_e) = local(&f);
        let metric_only = f.integrator.element_metric_energy(0, &x_e).unwrap();
        assert_eq!(f.integrator.element_energy(0, &nodes, &x_e).unwrap(), metric_only);
        f.integrator.set_fit_weight(4.0);
        let e4 = f.integrator.element_energy(0, &nodes, &x_e).unwrap() - metric_only;
        f.integrator.set_fit_weight(8.0);
        let e8 = f.integrator.element_energy(0, &nodes, &x_e).unwrap() - metric_only;
        assert!(e4 > 0.0);
        assert!((e8 - 2.0 * e4).abs() < 1e-12);
    }

    #[test]
    fn inverted_element_is_reported() {
        let f = fixture(1.0);
        let (nodes, mut x_e) = local(&f);
        // Mirror the x coordinates.
        let nd = nodes.len();
        for v in &mut x_e[..nd] {
            *v = -*v;
        }
        let err = f.integrator.element_energy(0, &nodes, &x_e).unwrap_err();
        assert!(err.det < 0.0);
        let mut r = vec![0.0; x_e.len()];
        assert!(
            f.integrator
                .assemble_element_vector(0, &nodes, &x_e, &mut r)
                .is_err()
        );
    }

    #[test]
    fn ideal_element_has_zero_metric_energy() {
        let f = fixture(0.0);
        // The unperturbed triangle is the reference element itself, so J = I.
        let mut x0 = vec![0.0; 12];
        f.space.gather(0, f.space.initial_coordinates(), &mut x0);
        let energy = f.integrator.element_metric_energy(0, &x0).unwrap();
        assert!(energy.abs() < 1e-14);
        assert!((f.integrator.target_volume(0) - 0.5).abs() < 1e-14);
        let j = f.integrator.jacobian(0, &x0);
        assert!((j - SmallMat::identity(2)).max_abs() < 1e-14);
    }
}
