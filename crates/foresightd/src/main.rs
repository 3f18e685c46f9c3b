//! foresightd — runs predictive autoscaling passes from the command line.
//!
//! Assembles the Foresight subsystems:
//! - Evaluation store (redb)
//! - Scoring runner (child process)
//! - Prediction model registry
//! - Predictive autoscaler
//!
//! # Usage
//!
//! ```text
//! foresightd evaluate --config foresight.toml --data-dir /var/lib/foresight \
//!     --observe default/api=4,3 --observe default/worker=2
//! foresightd history --data-dir /var/lib/foresight --target default/api --model reactive
//! foresightd init --target default/api > foresight.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use foresight_algorithm::ProcessRunner;
use foresight_autoscale::{Observation, PredictiveAutoscaler, ScaleDecision};
use foresight_core::ForesightConfig;
use foresight_model::{ModelRegistry, ReactivePredictor, reactive};
use foresight_state::EvaluationStore;

#[derive(Parser)]
#[command(name = "foresightd", about = "Foresight predictive autoscaler", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record observations and print a scaling decision per target.
    Evaluate {
        /// Path to foresight.toml.
        #[arg(short, long, default_value = "foresight.toml")]
        config: PathBuf,

        /// Data directory for the evaluation store.
        #[arg(long, default_value = "/var/lib/foresight")]
        data_dir: PathBuf,

        /// Observation as `<target>=<evaluated>[,<current>]`. Repeatable.
        #[arg(long = "observe", value_parser = parse_observation, required = true)]
        observations: Vec<(String, Observation)>,

        /// Interpreter used to run scoring scripts.
        #[arg(long, default_value = "python")]
        interpreter: PathBuf,

        /// Location of the reactive scoring script.
        #[arg(long, default_value = reactive::ALGORITHM_PATH)]
        reactive_algorithm: String,
    },
    /// Print the stored evaluations of a target's model as JSON.
    History {
        /// Data directory for the evaluation store.
        #[arg(long, default_value = "/var/lib/foresight")]
        data_dir: PathBuf,

        #[arg(long)]
        target: String,

        #[arg(long)]
        model: String,
    },
    /// Print a starter foresight.toml.
    Init {
        #[arg(long, default_value = "default/app")]
        target: String,
    },
}

/// Parse `<target>=<evaluated>[,<current>]`. The target is everything
/// before the last `=`.
fn parse_observation(s: &str) -> Result<(String, Observation), String> {
    let (target, replicas) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected <target>=<replicas>, got {s:?}"))?;
    if target.is_empty() {
        return Err(format!("missing target in {s:?}"));
    }
    let parse = |v: &str| {
        v.trim()
            .parse::<i32>()
            .map_err(|e| format!("invalid replica count {v:?}: {e}"))
    };
    let observation = match replicas.split_once(',') {
        Some((evaluated, current)) => Observation::new(parse(evaluated)?).with_current(parse(current)?),
        None => Observation::new(parse(replicas)?),
    };
    Ok((target.to_string(), observation))
}

fn open_store(data_dir: &Path) -> anyhow::Result<EvaluationStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    let db_path = data_dir.join("foresight.redb");
    let store = EvaluationStore::open(&db_path)?;
    info!(path = ?db_path, "evaluation store opened");
    Ok(store)
}

/// Open the store of `data_dir` for reading; never creates anything.
fn open_existing_store(data_dir: &Path) -> anyhow::Result<EvaluationStore> {
    let db_path = data_dir.join("foresight.redb");
    EvaluationStore::open_existing(&db_path)
        .with_context(|| format!("no evaluation store in {}", data_dir.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,foresight=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Evaluate {
            config,
            data_dir,
            observations,
            interpreter,
            reactive_algorithm,
        } => {
            run_evaluate(
                &config,
                &data_dir,
                observations,
                interpreter,
                reactive_algorithm,
            )
            .await
        }
        Command::History {
            data_dir,
            target,
            model,
        } => {
            let store = open_existing_store(&data_dir)?;
            let evaluations = store.list_evaluations(&target, &model)?;
            println!("{}", serde_json::to_string_pretty(&evaluations)?);
            Ok(())
        }
        Command::Init { target } => {
            print!("{}", ForesightConfig::scaffold(&target).to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_evaluate(
    config_path: &Path,
    data_dir: &Path,
    observations: Vec<(String, Observation)>,
    interpreter: PathBuf,
    reactive_algorithm: String,
) -> anyhow::Result<()> {
    let config = ForesightConfig::from_file(config_path)?;
    info!(path = ?config_path, targets = config.targets.len(), "config loaded");

    let mut work = Vec::with_capacity(observations.len());
    for (name, observation) in observations {
        let Some(target) = config.target(&name) else {
            bail!("target {name} is not configured in {}", config_path.display());
        };
        work.push((target.clone(), observation));
    }

    let store = open_store(data_dir)?;

    let runner = Arc::new(ProcessRunner::with_interpreter(interpreter));
    let mut registry = ModelRegistry::new();
    registry.register(Arc::new(
        ReactivePredictor::new(runner).with_algorithm_path(reactive_algorithm),
    ));
    info!(models = ?registry.model_types(), "prediction models registered");

    let scaler = Arc::new(
        PredictiveAutoscaler::new(store, registry).with_decision_type(config.decision_type),
    );

    let requested = work.len();
    let decisions = scaler.evaluate_all(work).await;
    for (target, decision) in &decisions {
        match decision {
            ScaleDecision::ScaleTo(replicas) => println!("{target}\tscale_to\t{replicas}"),
            ScaleDecision::NoChange => println!("{target}\tno_change"),
        }
    }

    if decisions.len() < requested {
        bail!("{} of {requested} targets failed", requested - decisions.len());
    }
    Ok(())
}
