use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{fmt, EnvFilter};

use crystal_relax::core::domain::Structure;
use crystal_relax::engine::operators::Perturbation;
use crystal_relax::engine::{Device, Model};
use crystal_relax::graph::CrystalGraphConverter;
use crystal_relax::relax::{RelaxOptions, StructOptimizer};
use crystal_relax::solvers::OptimizerKind;

// --- CLI Definitions ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Relax crystal structures with a graph-based interatomic potential", long_about = None)]
struct Args {
    /// Structure JSON files to relax
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Compute device (cpu, cuda, cuda:<N>, mps, auto)
    #[arg(long)]
    device: Option<String>,

    /// JSON file with relaxation options; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Cell filter (FrechetCellFilter, ExpCellFilter, UnitCellFilter)
    #[arg(long)]
    filter: Option<String>,

    /// Optimizer (FIRE, BFGS)
    #[arg(long, default_value = "FIRE")]
    optimizer: String,

    /// Graph construction algorithm (legacy, fast)
    #[arg(long, default_value = "fast")]
    algorithm: String,

    /// Atom graph cutoff (Angstroms)
    #[arg(long, default_value_t = 6.0)]
    atom_cutoff: f64,

    /// Bond graph cutoff (Angstroms)
    #[arg(long, default_value_t = 3.0)]
    bond_cutoff: f64,

    /// Force convergence threshold (eV/A)
    #[arg(long)]
    fmax: Option<f64>,

    /// Maximum optimizer steps
    #[arg(long)]
    steps: Option<usize>,

    /// Keep the cell fixed and relax positions only
    #[arg(long)]
    fixed_cell: bool,

    /// External pressure (GPa)
    #[arg(long)]
    pressure: Option<f64>,

    /// Treat a relaxation that runs out of steps as a failure
    #[arg(long)]
    strict: bool,

    /// Print a progress line per optimizer step
    #[arg(long)]
    progress: bool,

    /// Directory for relaxed structures and trajectories
    #[arg(short, long, default_value = "relaxed")]
    output_dir: PathBuf,

    /// Also write the full trajectory of every structure
    #[arg(long)]
    trajectory: bool,

    /// Also write a per-step CSV summary of every structure
    #[arg(long)]
    summary: bool,

    /// Rattle atoms by up to this many Angstroms before relaxing
    #[arg(long)]
    perturb: Option<f64>,

    /// Seed for --perturb
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of worker threads for parallel relaxations
    #[arg(short, long)]
    threads: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// --- Initialization Helpers ---

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

fn build_options(args: &Args) -> Result<RelaxOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read options file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid options file {}", path.display()))?
        }
        None => RelaxOptions::default(),
    };

    if let Some(filter) = &args.filter {
        options.ase_filter = filter.parse()?;
    }
    if let Some(fmax) = args.fmax {
        options.fmax = fmax;
    }
    if let Some(steps) = args.steps {
        options.steps = steps;
    }
    if let Some(pressure) = args.pressure {
        options.scalar_pressure = pressure;
    }
    options.relax_cell &= !args.fixed_cell;
    options.strict |= args.strict;
    options.verbose |= args.progress;
    // Paths are derived per structure below.
    options.save_path = None;

    options.validate()?;
    Ok(options)
}

fn output_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "structure".to_string())
}

fn load_structures(args: &Args) -> Result<Vec<Structure>> {
    let perturbation = args.perturb.map(|amp| Perturbation::new().rattle(amp).min_distance(0.5));

    args.inputs
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let structure = Structure::load_json(path)
                .with_context(|| format!("Failed to load structure {}", path.display()))?;
            match &perturbation {
                Some(p) => {
                    let mut rng = ChaCha8Rng::seed_from_u64(args.seed.wrapping_add(i as u64));
                    p.apply(&structure, &mut rng)
                        .with_context(|| format!("Failed to perturb {}", path.display()))
                }
                None => Ok(structure),
            }
        })
        .collect()
}

// --- Main ---

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the worker pool")?;
    }

    let options = build_options(&args)?;
    let optimizer: OptimizerKind = args.optimizer.parse()?;
    let device = Device::resolve(args.device.as_deref())?;
    let converter = CrystalGraphConverter::new(args.atom_cutoff, args.bond_cutoff, &args.algorithm)?;

    let model = Model::load(device).with_graph_converter(converter);
    let relaxer = StructOptimizer::new(model).with_optimizer(optimizer);
    info!(
        "Relaxing {} structure(s) with {} on {}",
        args.inputs.len(),
        optimizer,
        relaxer.calculator().device()
    );

    let structures = load_structures(&args)?;
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let results = relaxer.relax_many(&structures, &options);

    let mut failures = 0;
    for (path, result) in args.inputs.iter().zip(results) {
        let result = match result {
            Ok(r) => r,
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failures += 1;
                continue;
            }
        };

        let stem = output_stem(path);
        let relaxed_path = args.output_dir.join(format!("{}_relaxed.json", stem));
        result
            .final_structure
            .save_json(&relaxed_path)
            .with_context(|| format!("Failed to write {}", relaxed_path.display()))?;
        if args.trajectory {
            result.trajectory.save(args.output_dir.join(format!("{}_traj.json", stem)))?;
        }
        if args.summary {
            result
                .trajectory
                .write_summary_csv(args.output_dir.join(format!("{}_summary.csv", stem)))?;
        }

        let energy = result.trajectory.energies().last().unwrap_or(f64::NAN);
        println!(
            "{}: {} E = {:.6} eV, V = {:.3} A^3, {} frames -> {}",
            path.display(),
            result.final_structure.formula(),
            energy,
            result.final_structure.volume(),
            result.trajectory.len(),
            relaxed_path.display()
        );
    }

    if failures > 0 {
        bail!("{} of {} relaxations failed", failures, args.inputs.len());
    }
    Ok(())
}
