//! Planck command-line tool
//!
//! Runs the engine operations against JSON inputs and prints JSON results.
//!
//! # Usage
//! ```bash
//! # Recommend for a workload, seeding history from a JSON array of records
//! planck_cli recommend --workload '{"qubits":6,"depth":20,"algorithm":"vqe"}' --history runs.json
//!
//! # Backend selection with a per-call policy
//! planck_cli select-backend --qubits 25 --depth 40 --policy capacity_first
//!
//! # Reward for a completed execution
//! planck_cli score --actual-fidelity 91 --runtime-ms 420 --target-latency-ms 500 --predicted-fidelity 88
//!
//! # Print default configuration
//! planck_cli --generate-config yaml
//!
//! # With verbose logging
//! RUST_LOG=planck_engine=debug planck_cli recommend --workload @workload.json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use planck_engine::config::{self, LogFormat, PlanckConfig};
use planck_engine::history::{ExecutionRecord, InMemoryHistoryStore};
use planck_engine::policy::PolicyInput;
use planck_engine::reward::reward_breakdown;
use planck_engine::workload::{ErrorMitigation, WorkloadDescriptor};
use planck_engine::{metrics, PlanckEngine};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "planck_cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Workload recommendation and backend selection for the Planck execution API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (YAML or TOML)
    #[arg(short, long, env = "PLANCK_CONFIG")]
    config: Option<String>,

    /// Override the default backend policy
    #[arg(long)]
    default_policy: Option<String>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long)]
    print_metrics: bool,

    /// Generate example config file (yaml or toml) and exit
    #[arg(long, value_name = "FORMAT")]
    generate_config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Recommend shots, backend and error mitigation for a workload")]
    Recommend {
        #[arg(long, help = "Workload descriptor as JSON, or @path to a JSON file")]
        workload: String,

        #[arg(long, help = "JSON file holding an array of past execution records")]
        history: Option<String>,
    },

    #[command(about = "Select an execution backend")]
    SelectBackend {
        #[arg(long, default_value_t = 0)]
        qubits: u32,

        #[arg(long, default_value_t = 0)]
        depth: u32,

        #[arg(long, default_value_t = 0)]
        gate_count: u32,

        #[arg(long, help = "Target latency in milliseconds")]
        target_latency_ms: Option<f64>,

        #[arg(long, default_value = "none", help = "none, low, medium or high")]
        error_mitigation: ErrorMitigation,

        #[arg(long, help = "\"auto\" or a backend name")]
        backend_hint: Option<String>,

        #[arg(long, help = "latency_first, cost_first or capacity_first")]
        policy: Option<String>,
    },

    #[command(about = "Score a completed execution")]
    Score {
        #[arg(long)]
        actual_fidelity: f64,

        #[arg(long)]
        runtime_ms: f64,

        #[arg(long, default_value_t = 0.0, help = "Zero disables the latency penalty")]
        target_latency_ms: f64,

        #[arg(long)]
        predicted_fidelity: f64,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreReport {
    reward: f64,
    fidelity_reward: f64,
    latency_penalty: f64,
    accuracy_bonus: f64,
    efficiency_bonus: f64,
}

fn read_json_arg(raw: &str) -> Result<String> {
    match raw.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))
        }
        None => Ok(raw.to_string()),
    }
}

fn load_history(path: Option<&str>) -> Result<InMemoryHistoryStore> {
    let Some(path) = path else {
        return Ok(InMemoryHistoryStore::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path))?;
    let records: Vec<ExecutionRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse history file {}", path))?;
    info!(path, records = records.len(), "Loaded execution history");
    Ok(InMemoryHistoryStore::with_records(records))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --generate-config early exit
    if let Some(format) = cli.generate_config.as_deref() {
        match format.to_lowercase().as_str() {
            "yaml" | "yml" => {
                println!("{}", config::generate_example_yaml());
                return Ok(());
            }
            "toml" => {
                println!("{}", config::generate_example_toml());
                return Ok(());
            }
            _ => anyhow::bail!("Invalid format '{}'. Use 'yaml' or 'toml'.", format),
        }
    }

    let Some(command) = cli.command else {
        anyhow::bail!("No command given. Run with --help for usage.");
    };

    // Priority: CLI args > env vars > config file > defaults
    let mut config = PlanckConfig::load(cli.config.as_deref())?;
    if let Some(policy) = cli.default_policy {
        config.policy.default_policy = policy;
    }
    config.validate()?;

    // Logs go to stderr (or a file) so stdout stays machine-readable
    let (non_blocking, _guard) = if let Some(log_file) = &config.logging.file {
        match std::fs::File::create(log_file) {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(e) => {
                eprintln!(
                    "Warning: Failed to create log file {:?}: {}. Falling back to stderr.",
                    log_file, e
                );
                tracing_appender::non_blocking(std::io::stderr())
            }
        }
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    let log_level = config.logging.level.as_str();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("planck_engine={},planck_cli={}", log_level, log_level).into()
    });

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .json()
                        .with_target(true),
                )
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_target(true),
                )
                .init();
        }
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_HASH"),
        default_policy = %config.policy.default_policy,
        "planck_cli starting"
    );

    match command {
        Commands::Recommend { workload, history } => {
            let raw = read_json_arg(&workload)?;
            let workload: WorkloadDescriptor =
                serde_json::from_str(&raw).context("Failed to parse workload descriptor")?;
            let store = load_history(history.as_deref())?;
            let engine = PlanckEngine::new(Arc::new(store), &config);

            let result = engine.recommend(&workload).await;
            print_json(&result)?;
        }
        Commands::SelectBackend {
            qubits,
            depth,
            gate_count,
            target_latency_ms,
            error_mitigation,
            backend_hint,
            policy,
        } => {
            let engine = PlanckEngine::in_memory(&config);
            let decision = engine.select_backend(&PolicyInput {
                qubits,
                depth,
                gate_count,
                target_latency_ms,
                error_mitigation,
                backend_hint,
                policy,
            });
            print_json(&decision)?;
        }
        Commands::Score {
            actual_fidelity,
            runtime_ms,
            target_latency_ms,
            predicted_fidelity,
        } => {
            let breakdown =
                reward_breakdown(actual_fidelity, runtime_ms, target_latency_ms, predicted_fidelity);
            print_json(&ScoreReport {
                reward: breakdown.total(),
                fidelity_reward: breakdown.fidelity_reward,
                latency_penalty: breakdown.latency_penalty,
                accuracy_bonus: breakdown.accuracy_bonus,
                efficiency_bonus: breakdown.efficiency_bonus,
            })?;
        }
    }

    if cli.print_metrics {
        eprintln!("{}", metrics::render());
    }

    Ok(())
}
