use plotters::{coord::types::RangedCoordf64, prelude::*};
use std::path::Path;

use crate::{Cli, Run};

const EDGE_COLOR: RGBColor = RGBColor(0x2e, 0x47, 0x56);
const BOUNDARY_COLOR: RGBColor = RGBColor(0xbc, 0x50, 0x90);
const TARGET_COLOR: RGBColor = RGBColor(0xff, 0x63, 0x61);

/// Points sampled along each curved element edge.
const EDGE_SAMPLES: usize = 16;

type Chart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Draw the optimized high-order mesh, its curved edges and the fit targets.
/// No text is rendered, so no fonts are needed.
pub fn save_png(cli: &Cli, run: &Run, output_path: &Path) -> anyhow::Result<()> {
    if run.space.dim() != 2 {
        anyhow::bail!(
            "can only plot 2D meshes, {} is {}D",
            cli.chart_name(),
            run.space.dim()
        );
    }
    let edges = element_edges(run);
    let targets = fit_targets(run);
    let bounds = Bounds::new(edges.iter().flatten().chain(&targets));

    let width = 800;
    let height = 800;
    let dpi_scale = 2;
    let root = BitMapBackend::new(output_path, (width * dpi_scale, height * dpi_scale))
        .into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .build_cartesian_2d(bounds.min_x..bounds.max_x, bounds.min_y..bounds.max_y)?;

    for edge in edges {
        draw_edge(&mut chart, edge)?;
    }
    draw_boundary(&mut chart, run)?;
    chart.draw_series(
        targets
            .into_iter()
            .map(|p| Circle::new(p, 4, TARGET_COLOR.filled())),
    )?;

    root.present()?;
    println!("Plot saved to {}", output_path.display());
    Ok(())
}

/// Every element edge, as a polyline through the curved element.
fn element_edges(run: &Run) -> Vec<Vec<(f64, f64)>> {
    let space = &run.space;
    let reference = space.reference();
    let corners = reference.geometry().reference_vertices();
    let nd = reference.num_dofs();
    let mut x_e = vec![0.0; 2 * nd];
    let mut phi = vec![0.0; nd];
    let mut edges = Vec::with_capacity(space.num_elements() * corners.len());
    for e in 0..space.num_elements() {
        space.gather(e, &run.coordinates, &mut x_e);
        for (i, a) in corners.iter().enumerate() {
            let b = corners[(i + 1) % corners.len()];
            let edge = (0..=EDGE_SAMPLES)
                .map(|s| {
                    let t = s as f64 / EDGE_SAMPLES as f64;
                    let xi = [a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1]), 0.0];
                    reference.shape(&xi, &mut phi);
                    let px = phi.iter().zip(&x_e[..nd]).map(|(p, x)| p * x).sum::<f64>();
                    let py = phi.iter().zip(&x_e[nd..]).map(|(p, x)| p * x).sum::<f64>();
                    (px, py)
                })
                .collect();
            edges.push(edge);
        }
    }
    edges
}

/// Target position of every fitted node.
fn fit_targets(run: &Run) -> Vec<(f64, f64)> {
    let n = run.space.num_nodes();
    let marker = run.fitting.marker();
    let target = run.fitting.target();
    (0..n)
        .filter(|&node| marker[node] || marker[n + node])
        .map(|node| (target[node], target[n + node]))
        .collect()
}

/// Span of the chart area
struct Bounds {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl Bounds {
    fn new<'a>(points: impl Iterator<Item = &'a (f64, f64)>) -> Self {
        let (xs, ys): (Vec<_>, Vec<_>) = points.copied().unzip();
        let min_x = xs.iter().copied().reduce(f64::min).unwrap_or(0.0);
        let max_x = xs.iter().copied().reduce(f64::max).unwrap_or(1.0);
        let min_y = ys.iter().copied().reduce(f64::min).unwrap_or(0.0);
        let max_y = ys.iter().copied().reduce(f64::max).unwrap_or(1.0);
        let padding = 0.05 * f64::max(max_x - min_x, max_y - min_y);
        Self {
            min_x: min_x - padding,
            max_x: max_x + padding,
            min_y: min_y - padding,
            max_y: max_y + padding,
        }
    }
}

fn draw_edge<DB: DrawingBackend>(chart: &mut Chart<'_, DB>, edge: Vec<(f64, f64)>) -> anyhow::Result<()>
where
    <DB as plotters::prelude::DrawingBackend>::ErrorType: 'static,
{
    chart.draw_series(std::iter::once(PathElement::new(
        edge,
        EDGE_COLOR.stroke_width(2),
    )))?;
    Ok(())
}

/// Nodes on the boundary, so the fitted sides stand out.
fn draw_boundary<DB: DrawingBackend>(chart: &mut Chart<'_, DB>, run: &Run) -> anyhow::Result<()>
where
    <DB as plotters::prelude::DrawingBackend>::ErrorType: 'static,
{
    let space = &run.space;
    let nodes = (0..space.num_boundary_elements())
        .flat_map(|b| space.boundary_nodes(b).iter().copied())
        .map(|n| {
            let p = space.node_position(&run.coordinates, n);
            (p[0], p[1])
        });
    chart.draw_series(nodes.map(|p| Circle::new(p, 3, BOUNDARY_COLOR.filled())))?;
    Ok(())
}
