//! MemSim CLI — simulate multi-variant model serving under a memory budget.

use clap::{Parser, Subcommand};
use memsim_core::config::SimConfig;
use memsim_core::engine::Scheduler;
use memsim_core::report;
use memsim_core::workload::{self, Arrival, GeneratorSpec};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "memsim",
    about = "Simulate serving multi-variant models under a memory budget",
    version
)]
struct Cli {
    /// Enable debug logging (one line per dispatched event).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation.
    Run {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Path to workload file (overrides workload.path).
        #[arg(short, long)]
        workload: Option<PathBuf>,
        /// Workload format (csv, compact_jsonl); overrides workload.format.
        #[arg(short, long)]
        format: Option<String>,
        /// Write the summary as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the per-observation report as CSV.
        #[arg(short, long)]
        report: Option<PathBuf>,
        /// Write the event trace log.
        #[arg(short, long)]
        trace_log: Option<PathBuf>,
        /// Write per-application memory usage step series as CSV.
        #[arg(short, long)]
        usage: Option<PathBuf>,
    },
    /// Generate a synthetic workload for the configured applications.
    GenWorkload {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Mean requests per time unit, per application.
        #[arg(long)]
        rate: Option<f64>,
        /// Time span of the workload.
        #[arg(long)]
        duration: Option<f64>,
        /// Random seed (defaults to simulation.seed).
        #[arg(long)]
        seed: Option<u64>,
        /// Output format (csv, compact_jsonl).
        #[arg(short, long, default_value = "csv")]
        format: String,
        /// Output file path.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List the configured applications.
    ListApps {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            workload: workload_path,
            format,
            output,
            report: report_path,
            trace_log,
            usage,
        } => {
            let sim_config = load_config(&config);
            let arrivals = load_arrivals(&sim_config, workload_path.as_deref(), format.as_deref());

            let mut scheduler = Scheduler::new(&sim_config);
            let summary = scheduler
                .load_workload(&arrivals)
                .and_then(|_| scheduler.run())
                .unwrap_or_else(|e| fail("Simulation aborted", e));
            println!("{}", report::format_table(&summary));

            if let Some(path) = output {
                report::write_summary_json(&summary, &path)
                    .unwrap_or_else(|e| fail("Error writing output", e));
                println!("Summary written to {}", path.display());
            }
            if let Some(path) = report_path {
                let rows = report::build_report(&scheduler);
                report::write_report_csv(&rows, &path)
                    .unwrap_or_else(|e| fail("Error writing report", e));
                println!("Report written to {}", path.display());
            }
            if let Some(path) = usage {
                let points = report::usage_report(&scheduler);
                report::write_usage_csv(&points, &path)
                    .unwrap_or_else(|e| fail("Error writing usage series", e));
                println!("Usage series written to {}", path.display());
            }
            if let Some(path) = trace_log {
                report::write_trace_log(scheduler.trace(), &path)
                    .unwrap_or_else(|e| fail("Error writing trace log", e));
                println!("Trace log written to {}", path.display());
            }
        }
        Commands::GenWorkload {
            config,
            rate,
            duration,
            seed,
            format,
            output,
        } => {
            let sim_config = load_config(&config);
            let mut spec = GeneratorSpec::from_config(&sim_config);
            if let Some(rate) = rate {
                spec.rate = rate;
            }
            if let Some(duration) = duration {
                spec.duration = duration;
            }
            let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or(sim_config.simulation.seed));
            let arrivals = workload::generate(&spec, &mut rng)
                .unwrap_or_else(|e| fail("Error generating workload", e));

            let written = match format.as_str() {
                "csv" => workload::write_csv(&arrivals, &output),
                "compact_jsonl" | "jsonl" => workload::write_compact_jsonl(&arrivals, &output),
                other => Err(workload::WorkloadError::UnsupportedFormat(other.to_string())),
            };
            written.unwrap_or_else(|e| fail("Error writing workload", e));
            println!(
                "Generated {} arrivals to {}",
                arrivals.len(),
                output.display()
            );
        }
        Commands::ListApps { config } => {
            let sim_config = load_config(&config);
            println!("Configured applications:");
            for app in &sim_config.applications {
                println!("  - {} {:?}", app.name, app.model_sizes);
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> SimConfig {
    SimConfig::from_file(path).unwrap_or_else(|e| fail("Error loading config", e))
}

fn load_arrivals(
    config: &SimConfig,
    workload_path: Option<&Path>,
    format: Option<&str>,
) -> Vec<Arrival> {
    let path = workload_path
        .map(PathBuf::from)
        .or_else(|| config.workload.path.as_ref().map(PathBuf::from));
    let format = format.unwrap_or(config.workload.format.as_str());

    match path {
        Some(p) => workload::load_workload(&p, format)
            .unwrap_or_else(|e| fail("Error loading workload", e)),
        None => {
            eprintln!("No workload file specified. Use --workload or set workload.path in config.");
            std::process::exit(1);
        }
    }
}

fn fail<T>(context: &str, err: impl std::fmt::Display) -> T {
    eprintln!("{}: {}", context, err);
    std::process::exit(1);
}
