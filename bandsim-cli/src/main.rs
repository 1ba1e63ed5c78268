//! Bandsim CLI — contest simulation and per-section grading analysis.
//!
//! Commands:
//! - `run`: simulate a TOML contest file and save the probability report
//! - `analyse`: grading-points analysis of one section from a results CSV
//! - `validate`: check a contest file without simulating it

use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bandsim_core::{RuleEngine, SamplerKind};
use bandsim_runner::export::{render_position_table, save_report};
use bandsim_runner::{
    grading_table_from_history, read_history_file, run, ContestConfig, ProbabilityReport,
    SimulationParams,
};

#[derive(Parser)]
#[command(
    name = "bandsim",
    about = "Bandsim — Monte Carlo promotion and relegation odds for brass band grading tables"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a contest file and save the report.
    Run {
        /// Path to a TOML contest file.
        #[arg(long)]
        config: PathBuf,

        /// Trial cap (overrides the file).
        #[arg(long)]
        trials: Option<u64>,

        /// Master seed (overrides the file).
        #[arg(long)]
        seed: Option<u64>,

        /// Worker threads (overrides the file).
        #[arg(long)]
        workers: Option<usize>,

        /// Stop once every standard error is below this.
        #[arg(long)]
        threshold: Option<f64>,

        /// Output directory for report artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Per-place promote/stay/relegate odds for one section's results CSV.
    Analyse {
        /// CSV rows: name, result two years ago, result last year.
        #[arg(long)]
        csv: PathBuf,

        /// Bands promoted from the section.
        #[arg(long)]
        promote: usize,

        /// Bands relegated from the section.
        #[arg(long)]
        relegate: usize,

        /// Band that does not play this year (repeatable).
        #[arg(long = "absent")]
        absent: Vec<String>,

        /// Trials per band in the section.
        #[arg(long, default_value_t = 1000)]
        samples_per_band: u64,

        /// Master seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Check a contest file for structural errors.
    Validate {
        /// Path to a TOML contest file.
        #[arg(long)]
        config: PathBuf,
    },
}

static INIT: Once = Once::new();

/// Reads `BANDSIM_LOG` for filter directives, falling back to `bandsim=info`.
/// Logs go to stderr so reports on stdout stay clean.
fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_env("BANDSIM_LOG").unwrap_or_else(|_| EnvFilter::new("bandsim=info"));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            trials,
            seed,
            workers,
            threshold,
            output_dir,
        } => run_contest_cmd(&config, trials, seed, workers, threshold, &output_dir),
        Commands::Analyse {
            csv,
            promote,
            relegate,
            absent,
            samples_per_band,
            seed,
        } => run_analyse_cmd(&csv, promote, relegate, &absent, samples_per_band, seed),
        Commands::Validate { config } => run_validate_cmd(&config),
    }
}

fn run_contest_cmd(
    config_path: &Path,
    trials: Option<u64>,
    seed: Option<u64>,
    workers: Option<usize>,
    threshold: Option<f64>,
    output_dir: &Path,
) -> Result<()> {
    let config = ContestConfig::from_file(config_path)?;

    let mut params = config.simulation.clone();
    if let Some(trials) = trials {
        params.trials = trials;
    }
    if seed.is_some() {
        params.seed = seed;
    }
    if let Some(workers) = workers {
        params.workers = workers;
    }
    if let Some(threshold) = threshold {
        let mut criterion = params.convergence.unwrap_or_default();
        criterion.threshold = threshold;
        params.convergence = Some(criterion);
    }

    let report = run(&config.contest, &params)?;
    print_summary(&report);

    let run_dir = save_report(&report, output_dir)?;
    println!("Report saved to: {}", run_dir.display());
    Ok(())
}

fn run_analyse_cmd(
    csv_path: &Path,
    promote: usize,
    relegate: usize,
    absent: &[String],
    samples_per_band: u64,
    seed: Option<u64>,
) -> Result<()> {
    if samples_per_band == 0 {
        bail!("--samples-per-band must be at least 1");
    }
    let records = read_history_file(csv_path)?;
    let name = csv_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("section");
    let table = grading_table_from_history(name, &records, promote, relegate, absent)?;

    let params = SimulationParams {
        trials: samples_per_band
            .checked_mul(records.len() as u64)
            .context("trial count overflows")?,
        seed,
        sampler: SamplerKind::Uniform,
        ..SimulationParams::default()
    };
    info!(bands = records.len(), trials = params.trials, "analysing section");

    let report = run(&table, &params)?;
    print!("{}", render_position_table(&report));
    println!();
    println!("Seed: {}", report.seed);
    Ok(())
}

fn run_validate_cmd(config_path: &Path) -> Result<()> {
    let config = ContestConfig::from_file(config_path)?;
    config.simulation.validate()?;
    let engine = RuleEngine::new(&config.contest)?;

    println!("Contest:     {}", config.contest.name);
    println!("Sections:    {}", config.contest.sections.len());
    println!("Bands:       {}", engine.band_count());
    println!("Rule steps:  {}", engine.pipeline().len());
    for step in engine.pipeline() {
        println!("  {} -> {}", step.section, step.rule);
    }
    println!("Fingerprint: {}", config.contest.fingerprint());
    println!("OK");
    Ok(())
}

fn print_summary(report: &ProbabilityReport) {
    println!();
    println!("=== {} ===", report.table);
    println!("Trials:         {}", report.trials);
    println!("Seed:           {}", report.seed);
    println!("Max Std Error:  {:.4}", report.max_std_error);
    if let Some(converged) = report.converged {
        println!("Converged:      {}", if converged { "yes" } else { "no" });
    }

    for section in report.sections() {
        println!();
        println!("--- {section} ---");
        print!("{:<28}", "Band");
        for label in &report.labels {
            print!("{:>12}", label.to_string());
        }
        println!();
        for band in report.bands.iter().filter(|b| b.section == section) {
            let name = if band.absent {
                format!("{} (absent)", band.name)
            } else {
                band.name.clone()
            };
            print!("{name:<28}");
            for label in &report.labels {
                print!("{:>11.1}%", band.probability(label) * 100.0);
            }
            println!();
        }
    }

    for warning in &report.warnings {
        println!("WARNING: {}", warning_text(warning));
    }
    println!();
}

fn warning_text(warning: &bandsim_runner::ReportWarning) -> String {
    match warning {
        bandsim_runner::ReportWarning::NonConvergence {
            threshold,
            max_std_error,
            trials,
        } => format!("not converged after {trials} trials (max se {max_std_error:.4} >= {threshold})"),
        bandsim_runner::ReportWarning::Cancelled { trials } => {
            format!("cancelled after {trials} trials")
        }
    }
}
