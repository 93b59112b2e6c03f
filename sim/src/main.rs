//! MCL SIM: replays a recorded drive through the Monte Carlo localization filter.
//!
//! A run needs four CSV inputs: the landmark map (`id,x,y`), the control inputs applied between
//! timesteps (`velocity,yaw_rate`), the ground-truth poses (`x,y,theta`), and the vehicle-frame
//! landmark observations (`timestep,x,y`). The per-timestep estimates, errors, and best-particle
//! associations are written to an output CSV and a pass/fail summary is logged at the end.
//!
//! Filter parameters come from an optional configuration file (TOML/JSON/YAML); individual
//! command-line flags override the file.

mod common;

use clap::{Args, Parser, Subcommand};
use common::{ensure_parent_dir, init_logger, validate_input_file};
use log::{error, info, warn};
use mcl::config::FilterConfig;
use mcl::map::Map;
use mcl::particle::ParticleAveragingStrategy;
use mcl::sim::{
    ControlRecord, GroundTruthRecord, LocalizationResult, LocalizationSummary, ObservationRecord,
    group_observations, run_localization,
};
use std::error::Error;
use std::path::PathBuf;

const LONG_ABOUT: &str = "MCL SIM: replays a recorded drive through the Monte Carlo localization filter.

Inputs are CSV files with a header row:
  map           id,x,y
  controls      velocity,yaw_rate      (one row per transition between timesteps)
  ground truth  x,y,theta              (one row per timestep)
  observations  timestep,x,y           (vehicle frame, any number per timestep)

Filter parameters are read from --config (TOML/JSON/YAML) when given; flags override the file.
Use the `config` subcommand to write a template with the default values.";

/// Command line arguments
#[derive(Parser)]
#[command(author, version, about = "Replays recorded drives through the Monte Carlo localization filter.", long_about = LONG_ABOUT)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

/// Top-level commands
#[derive(Subcommand, Clone)]
enum Command {
    #[command(name = "run", about = "Localize against a map using recorded controls and observations")]
    Run(RunArgs),
    #[command(name = "config", about = "Generate a template configuration file")]
    Config(ConfigArgs),
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Landmark map CSV
    #[arg(long, value_parser)]
    map: PathBuf,
    /// Control input CSV
    #[arg(long, value_parser)]
    controls: PathBuf,
    /// Ground-truth pose CSV
    #[arg(long, value_parser)]
    ground_truth: PathBuf,
    /// Landmark observation CSV
    #[arg(long, value_parser)]
    observations: PathBuf,
    /// Output CSV for per-timestep results
    #[arg(short, long, value_parser)]
    output: PathBuf,
    /// Filter configuration file (TOML/JSON/YAML)
    #[arg(short, long, value_parser)]
    config: Option<PathBuf>,
    /// Random number generator seed
    #[arg(long)]
    seed: Option<u64>,
    /// Number of particles
    #[arg(long)]
    num_particles: Option<usize>,
    /// Sensor range (m)
    #[arg(long)]
    sensor_range: Option<f64>,
    /// Strategy used to collapse the particle population into a pose estimate
    #[arg(long, value_enum)]
    averaging: Option<ParticleAveragingStrategy>,
}

#[derive(Args, Clone, Debug)]
struct ConfigArgs {
    /// Output path; the format follows the extension (.toml, .json, .yaml, .yml)
    #[arg(short, long, value_parser, default_value = "mcl.toml")]
    output: PathBuf,
}

/// Resolve the filter configuration: file (or defaults) first, then flag overrides.
fn resolve_config(args: &RunArgs) -> Result<FilterConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading filter configuration from {}", path.display());
            FilterConfig::from_file(path)?
        }
        None => FilterConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(num_particles) = args.num_particles {
        config.num_particles = num_particles;
    }
    if let Some(sensor_range) = args.sensor_range {
        config.sensor_range = sensor_range;
    }
    if let Some(averaging) = args.averaging {
        config.averaging_strategy = averaging;
    }
    Ok(config)
}

fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    validate_input_file(&args.map, "Map")?;
    validate_input_file(&args.controls, "Controls")?;
    validate_input_file(&args.ground_truth, "Ground truth")?;
    validate_input_file(&args.observations, "Observations")?;
    let config = resolve_config(args)?;
    info!(
        "Running with {} particles, sensor range {} m, seed {}",
        config.num_particles, config.sensor_range, config.seed
    );

    let map = Map::from_csv(&args.map)?;
    let controls = ControlRecord::from_csv(&args.controls)?;
    let ground_truth = GroundTruthRecord::from_csv(&args.ground_truth)?;
    let records = ObservationRecord::from_csv(&args.observations)?;
    info!(
        "Loaded {} landmarks, {} controls, {} ground-truth poses, {} observations",
        map.len(),
        controls.len(),
        ground_truth.len(),
        records.len()
    );
    if map.is_empty() {
        warn!("Map {} contains no landmarks", args.map.display());
    }

    let observations = group_observations(&records, ground_truth.len());
    let results = run_localization(&config, &map, &controls, &ground_truth, &observations)?;

    ensure_parent_dir(&args.output)?;
    LocalizationResult::to_csv(&results, &args.output)?;
    info!("Results written to {}", args.output.display());

    let summary = LocalizationSummary::from_results(&results, &config);
    info!(
        "Mean error over {} timesteps: x {:.4} m, y {:.4} m, yaw {:.4} rad",
        summary.timesteps, summary.mean_error.x, summary.mean_error.y, summary.mean_error.yaw
    );
    info!(
        "Max error: x {:.4} m, y {:.4} m, yaw {:.4} rad",
        summary.max_error.x, summary.max_error.y, summary.max_error.yaw
    );
    if summary.passed {
        info!("Localization within limits");
    } else {
        warn!(
            "Localization exceeded limits (translation {} m, yaw {} rad)",
            config.max_translation_error, config.max_yaw_error
        );
    }
    Ok(())
}

fn write_config_template(args: &ConfigArgs) -> Result<(), Box<dyn Error>> {
    ensure_parent_dir(&args.output)?;
    FilterConfig::default().to_file(&args.output)?;
    info!("Template configuration written to {}", args.output.display());
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    let outcome = match &cli.command {
        Command::Run(args) => run(args),
        Command::Config(args) => write_config_template(args),
    };
    if let Err(e) = &outcome {
        error!("{}", e);
    }
    outcome
}
