//! releval CLI - Search Relevance Evaluation Workbench
//!
//! This binary provides the command-line interface for running relevance
//! experiments against fixture workspaces and for one-shot metric
//! computation.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod fixtures;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use releval_core::config::Config;
use releval_core::ExperimentSpec;
use releval_engine::{ExperimentRunner, HttpSearchBackend, SearchBackend};
use releval_storage::create_document_store;
use tracing::info;

use fixtures::FixtureWorkspace;

#[derive(Parser)]
#[command(name = "releval")]
#[command(about = "Search relevance evaluation workbench")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment spec against a fixture workspace
    Run {
        /// Experiment spec JSON file
        #[arg(long, value_name = "FILE")]
        spec: PathBuf,

        /// Fixture workspace JSON file (query sets, judgments,
        /// configurations, backend responses)
        #[arg(long, value_name = "FILE")]
        fixtures: PathBuf,

        /// Seconds to wait for the experiment to reach a terminal state
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Compute ranking metrics for one result list
    Evaluate {
        /// Comma-separated ranked document ids
        #[arg(long, value_name = "IDS")]
        documents: String,

        /// JSON file mapping document id to relevance grade
        #[arg(long, value_name = "FILE")]
        judgments: PathBuf,

        /// Metric depth k
        #[arg(long, short)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            spec,
            fixtures,
            timeout_secs,
        } => run_experiment(&config, &spec, &fixtures, timeout_secs).await,
        Commands::Evaluate {
            documents,
            judgments,
            k,
        } => evaluate_once(&config, &documents, &judgments, k),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("releval={level},{}={level}", env!("CARGO_PKG_NAME")))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::from_file(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

async fn run_experiment(
    config: &Config,
    spec_path: &Path,
    fixtures_path: &Path,
    timeout_secs: u64,
) -> Result<()> {
    let spec = read_spec(spec_path)?;
    let workspace = FixtureWorkspace::from_file(fixtures_path)?;

    let store = create_document_store(&config.storage)?;
    workspace.seed(&store).await?;

    // The configured backend wins over fixture responses so the same
    // workspace file can drive runs against a live search endpoint
    let backend: Arc<dyn SearchBackend> = match config.backend.provider.as_str() {
        "http" => {
            info!("Using HTTP search backend at {}", config.backend.endpoint);
            Arc::new(
                HttpSearchBackend::new(
                    &config.backend.endpoint,
                    Duration::from_secs(config.backend.timeout_secs),
                )
                .map_err(releval_core::Error::from)?,
            )
        }
        _ => Arc::new(workspace.backend()),
    };

    let runner = ExperimentRunner::new(store, backend, config.evaluation.metric_depth);
    let accepted = runner
        .submit(spec)
        .await
        .map_err(releval_core::Error::from)?;
    info!("Experiment [{}] accepted, polling for completion", accepted.id);

    let experiment = poll_until_terminal(&runner, &accepted.id, timeout_secs).await?;
    let sub_experiments = runner
        .writer()
        .list_sub_experiments(&experiment.id)
        .await
        .map_err(releval_core::Error::from)?;

    let report = serde_json::json!({
        "experiment": experiment,
        "subExperiments": sub_experiments,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn poll_until_terminal(
    runner: &ExperimentRunner,
    experiment_id: &str,
    timeout_secs: u64,
) -> Result<releval_core::Experiment> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        let experiment = runner
            .writer()
            .get_experiment(experiment_id)
            .await
            .map_err(releval_core::Error::from)?;
        if experiment.status.is_terminal() {
            return Ok(experiment);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(anyhow!(
                "experiment [{experiment_id}] still {} after {timeout_secs}s",
                experiment.status
            ));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn read_spec(path: &Path) -> Result<ExperimentSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read spec file {}", path.display()))?;
    let spec: ExperimentSpec = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse spec file {}", path.display()))?;
    Ok(spec)
}

fn evaluate_once(
    config: &Config,
    documents: &str,
    judgments_path: &Path,
    k: Option<usize>,
) -> Result<()> {
    let ranked: Vec<String> = documents
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if ranked.is_empty() {
        return Err(anyhow!("no document ids given"));
    }

    let content = std::fs::read_to_string(judgments_path)
        .with_context(|| format!("failed to read {}", judgments_path.display()))?;
    let judgments: HashMap<String, f64> =
        serde_json::from_str(&content).context("judgments file must map document id to grade")?;

    let k = k.unwrap_or(config.evaluation.metric_depth);
    let metrics = releval_metrics::evaluate(&ranked, &judgments, k);
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}
