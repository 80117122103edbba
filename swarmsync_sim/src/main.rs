//! Swarmsync DST Simulator CLI
//!
//! Run orchestration sessions against simulated swarms, deterministically.

use clap::Parser;
use std::path::{Path, PathBuf};
use swarmsync_core::SessionConfig;
use swarmsync_sim::scenarios::ScenarioId;
use swarmsync_sim::{ScenarioResult, ScenarioRunner, SimError, SimExport};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Swarmsync Deterministic Simulation Testing CLI
#[derive(Parser, Debug)]
#[command(name = "swarmsync-sim")]
#[command(about = "Run deterministic simulation sessions for Swarmsync", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of simulated agents
    #[arg(short, long, default_value = "8")]
    agents: usize,

    /// Scenario to run (flock, metronome, consensus, fractured, blackout, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Session duration in virtual seconds
    #[arg(short, long, default_value = "30")]
    duration: f64,

    /// Agent polling interval in virtual seconds
    #[arg(short, long, default_value = "1")]
    interval: f64,

    /// Session configuration (JSON; missing fields take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export full session records to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

fn load_config(path: &Path) -> Result<SessionConfig, SimError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|source| SimError::Config {
        path: path.to_path_buf(),
        source,
    })
}

fn main() {
    let args = Args::parse();

    // Initialize logging (RUST_LOG wins over --verbose)
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    if !args.json {
        info!("Swarmsync DST Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse::<ScenarioId>().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios: flock, metronome, consensus, fractured, blackout, all");
            std::process::exit(1);
        })]
    };

    let config = match &args.config {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => SessionConfig::default(),
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    // Run simulations
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);

        let runner = ScenarioRunner::new(seed, args.agents)
            .with_duration(args.duration)
            .with_interval(args.interval)
            .with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    if let Some(path) = &args.export {
        let mut export = SimExport::new();
        for result in &all_results {
            export.add_result(result);
        }
        match export.write_to_file(path) {
            Ok(()) => info!("Exported {} runs to {}", export.runs.len(), path.display()),
            Err(e) => error!("Failed to write export: {}", e),
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                let metrics = r.metrics();
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "iterations": metrics.iterations,
                    "time_secs": r.final_time_secs,
                    "behaviors": metrics.behavior_types,
                    "tests": metrics.num_tests,
                    "test_success_rate": metrics.test_success_rate,
                    "collaborator_failures": metrics.collaborator_failures,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            // List failed seeds
            for result in &all_results {
                if !result.passed {
                    error!(
                        "  - {} seed={}: {}",
                        result.scenario.name(),
                        result.seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
