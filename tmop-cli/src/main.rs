use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use tmop::{
    BasisKind, Config, FailureOutcome, FiniteElementSpace, Mesh, SolveOutcome, SurfaceFitting,
    Warning,
};

mod visualize;

/// Fitting weight the solve starts from.
const INITIAL_FIT_WEIGHT: f64 = 100.0;

#[derive(Parser, Debug)]
#[command(name = "tmop-fit-position", version, about, long_about = None)]
struct Cli {
    /// Mesh file. Looked up in the bundled meshes if it is not found.
    #[arg(short = 'm', long = "mesh", default_value = "square01.mesh")]
    mesh: PathBuf,

    /// Uniform refinements of the input mesh (`-rs`).
    #[arg(long = "refine-serial", default_value_t = 2)]
    refine_serial: usize,

    /// Polynomial order of the mesh nodes. 0 or less picks a quadratic
    /// Bernstein basis.
    #[arg(
        short = 'o',
        long = "order",
        default_value_t = 2,
        allow_negative_numbers = true
    )]
    order: i64,

    /// Quadrature order of the metric integral (`-qo`).
    #[arg(
        long = "quad-order",
        default_value_t = 5,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    quad_order: usize,

    /// Stop once every fitted node is this close to its target.
    #[arg(long = "fit-tol", default_value_t = 1e-2)]
    fit_tol: f64,

    /// Newton iteration limit.
    #[arg(long = "max-iterations", default_value_t = 200)]
    max_iterations: usize,

    /// Write the optimized mesh, through its vertices, to this file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Save a picture of the optimized mesh (2D meshes only).
    #[arg(long)]
    png: Option<PathBuf>,

    /// Log more. Repeat for even more. `RUST_LOG` takes precedence.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn chart_name(&self) -> String {
        self.mesh.display().to_string()
    }

    fn basis(&self) -> (usize, BasisKind) {
        match usize::try_from(self.order) {
            Ok(p) if p > 0 => (p, BasisKind::Lagrange),
            _ => (2, BasisKind::Bernstein),
        }
    }
}

/// Accept the two-letter single-dash flags MFEM drivers use.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some("-rs") => "--refine-serial".into(),
            Some("-qo") => "--quad-order".into(),
            _ => arg,
        })
        .collect()
}

fn main() {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    init_tracing(cli.verbose);
    let run = match main_inner(&cli) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    if let Err(e) = handle_output(&run, &cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Everything a finished solve leaves behind, successful or not.
struct Run {
    mesh: Mesh,
    space: FiniteElementSpace,
    coordinates: Vec<f64>,
    fitting: SurfaceFitting,
    result: Result<SolveOutcome, FailureOutcome>,
    elapsed: Duration,
}

fn main_inner(cli: &Cli) -> anyhow::Result<Run> {
    let path = resolve_mesh(&cli.mesh);
    let txt = std::fs::read_to_string(&path)
        .with_context(|| format!("could not read mesh {}", path.display()))?;
    let mut mesh: Mesh = txt
        .parse()
        .with_context(|| format!("could not parse mesh {}", path.display()))?;
    for _ in 0..cli.refine_serial {
        mesh = mesh.uniform_refinement();
    }

    let (order, kind) = cli.basis();
    let space = FiniteElementSpace::new(&mesh, order, kind)?;
    let mut coordinates = space.initial_coordinates().to_vec();
    let fitting = SurfaceFitting::from_boundary(
        &space,
        &coordinates,
        INITIAL_FIT_WEIGHT,
        sinusoidal_target,
    );
    let config = Config::default()
        .with_quad_order(cli.quad_order)
        .with_fit_termination(Some(cli.fit_tol))
        .with_max_iterations(cli.max_iterations);

    let now = std::time::Instant::now();
    let result = tmop::optimize_with_observer(
        &space,
        &mut coordinates,
        fitting.clone(),
        config,
        |stats| {
            tracing::info!(
                iteration = stats.iteration,
                energy = stats.energy,
                fit_error = stats.fit_error,
                fit_weight = stats.fit_weight,
                "step"
            );
        },
    );
    let elapsed = now.elapsed();
    Ok(Run {
        mesh,
        space,
        coordinates,
        fitting,
        result,
        elapsed,
    })
}

/// The mesh at `path`, or the bundled mesh of that name.
fn resolve_mesh(path: &Path) -> PathBuf {
    if path.exists() {
        return path.to_owned();
    }
    let bundled = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../meshes")
        .join(path);
    if bundled.exists() { bundled } else { path.to_owned() }
}

/// Targets for boundary attribute 2: a sine wave on `y = 0` (modulated by
/// `z` in 3D) and a phase-shifted one on `y = 1`. Other nodes stay put.
fn sinusoidal_target(attribute: u32, p: [f64; 3]) -> [f64; 3] {
    use std::f64::consts::PI;
    let [x, y, z] = p;
    if attribute != 2 {
        return p;
    }
    let y_target = if y < 0.5 {
        0.1 * libm::sin(4.0 * PI * x) * libm::cos(PI * z)
    } else if x < 0.5 {
        1.0 + 0.1 * libm::sin(2.0 * PI * x)
    } else {
        1.0 + 0.1 * libm::sin(2.0 * PI * (x + 0.5))
    };
    [x, y_target, z]
}

fn handle_output(run: &Run, cli: &Cli) -> anyhow::Result<()> {
    print_problem_size(run, cli);
    match &run.result {
        Ok(outcome) => print_output(outcome, run.elapsed),
        Err(failure) => print_failure_output(failure),
    }
    if let Some(path) = &cli.output {
        let moved = run.space.moved_mesh(&run.mesh, &run.coordinates)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("could not create {}", path.display()))?;
        moved.write_mfem(std::io::BufWriter::new(file))?;
        println!("Mesh saved to {}", path.display());
    }
    if let Some(path) = &cli.png {
        visualize::save_png(cli, run, path)?;
    }
    Ok(())
}

fn print_problem_size(run: &Run, cli: &Cli) {
    let (order, kind) = cli.basis();
    println!(
        "Mesh: {} elements, {} nodes, order {order} ({kind:?}), {} fitted DOFs",
        run.space.num_elements(),
        run.space.num_nodes(),
        run.fitting.num_marked(),
    );
}

/// Prints the output nicely to stdout.
fn print_output(outcome: &SolveOutcome, elapsed: Duration) {
    use colored::Colorize;
    print_warnings(outcome.warnings());
    println!("Iterations needed: {}", outcome.iterations());
    println!("Terminated: {}", outcome.termination());
    println!(
        "Fit error: {:.3e} (weight {:.3e})",
        outcome.fit_error(),
        outcome.fit_weight()
    );
    println!("Initial quality: {}", outcome.initial_quality());
    let final_quality = outcome.final_quality().to_string();
    if outcome.final_quality().is_valid() {
        println!("Final quality:   {final_quality}");
    } else {
        println!("Final quality:   {}", final_quality.red());
    }
    println!(
        "Solved in {}ms on {} threads",
        elapsed.as_millis(),
        outcome.threads()
    );
}

fn print_warnings(warnings: &[Warning]) {
    use colored::Colorize;
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("\t{}", warning.to_string().yellow());
        }
    }
}

fn print_failure_output(failure: &FailureOutcome) {
    use colored::Colorize;
    print_warnings(failure.warnings());
    eprintln!("{}: {}", "Could not fit mesh".red(), failure.error());
    eprintln!(
        "Kept the last valid mesh, after {} iterations with fit error {:.3e}.",
        failure.iterations(),
        failure.fit_error()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(mesh: &str, refine_serial: usize, order: i64) -> Cli {
        Cli {
            mesh: mesh.into(),
            refine_serial,
            order,
            quad_order: 5,
            fit_tol: 1e-2,
            max_iterations: 200,
            output: None,
            png: None,
            verbose: 0,
        }
    }

    #[test]
    fn fits_bundled_meshes() {
        for (mesh, order) in [("square01.mesh", 2), ("square01-tri.mesh", 2), ("square01.mesh", 0)]
        {
            let run = main_inner(&cli(mesh, 1, order)).unwrap();
            let outcome = run.result.as_ref().unwrap();
            assert!(outcome.fit_error() <= 1e-2);
            assert!(outcome.final_quality().is_valid());
        }
    }

    #[test]
    fn writes_mesh_and_png() {
        let dir = std::env::temp_dir();
        let mut cli = cli("square01.mesh", 1, 2);
        let mesh_path = dir.join("tmop-cli-test.mesh");
        let png_path = dir.join("tmop-cli-test.png");
        cli.output = Some(mesh_path.clone());
        cli.png = Some(png_path.clone());
        let run = main_inner(&cli).unwrap();
        handle_output(&run, &cli).unwrap();

        let written: Mesh = std::fs::read_to_string(&mesh_path).unwrap().parse().unwrap();
        assert_eq!(written.elements(), run.mesh.elements());
        // The bottom-left corner is fitted to where it started.
        let corner = written.vertices()[0];
        assert!(corner[0].abs() <= 1e-2 && corner[1].abs() <= 1e-2);
        assert!(std::fs::metadata(&png_path).unwrap().len() > 0);
    }

    #[test]
    fn missing_mesh_is_an_error() {
        let err = main_inner(&cli("no-such.mesh", 0, 2)).err().unwrap();
        assert!(err.to_string().contains("no-such.mesh"));
    }

    #[test]
    fn mfem_style_flags() {
        let args = ["tmop-fit-position", "-m", "cube.mesh", "-rs", "0", "-o", "-1", "-qo", "6"]
            .map(OsString::from);
        let cli = Cli::try_parse_from(normalize_args(args)).unwrap();
        assert_eq!(cli.mesh, PathBuf::from("cube.mesh"));
        assert_eq!(cli.refine_serial, 0);
        assert_eq!(cli.quad_order, 6);
        assert_eq!(cli.basis(), (2, BasisKind::Bernstein));
        assert!(Cli::try_parse_from(["tmop-fit-position", "--bogus"]).is_err());
    }

    #[test]
    fn zero_quadrature_order_is_a_usage_error() {
        let args = ["tmop-fit-position", "-qo", "0"].map(OsString::from);
        let err = Cli::try_parse_from(normalize_args(args)).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        // Printed to stderr, so `main` exits with 1.
        assert!(err.use_stderr());
    }
}
