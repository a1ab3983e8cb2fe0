//! Driver CLI for agent run lifecycles
//!
//! - `replay`: drive a state machine from a TOML script and print the results
//! - `steps`: print the UI checklist for a state
//! - `inspect`: load a saved snapshot and print its state, stats, and steps
//!
//! # Usage
//!
//! ```bash
//! run-lifecycle replay run.toml --snapshot-out run.json
//! run-lifecycle steps error --failed-step tests
//! LIFECYCLE_RESTORE_POLICY=strict run-lifecycle inspect run.json
//! ```

mod script;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lifecycle::{
    derive_steps, load_snapshot, save_snapshot, AgentStateMachine, LifecycleConfig, RestorePolicy,
    RunLifecycleState, StepId,
};
use serde_json::json;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file (overrides LIFECYCLE_* environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive a fresh machine through a TOML script
    Replay {
        script: PathBuf,

        /// Write the final snapshot here
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },

    /// Print the derived UI steps for a lifecycle state
    Steps {
        state: RunLifecycleState,

        /// Step that failed (only used for the `error` state)
        #[arg(long)]
        failed_step: Option<StepId>,
    },

    /// Load a snapshot and print its state, stats, and steps
    Inspect {
        snapshot: PathBuf,

        /// Reject snapshots whose history breaks the transition graph
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<LifecycleConfig> {
    match path {
        Some(path) => LifecycleConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(LifecycleConfig::from_env()),
    }
}

/// Everything `inspect` prints, taken from the restored (possibly trimmed) machine.
fn inspect_summary(machine: &AgentStateMachine) -> serde_json::Value {
    json!({
        "status": machine.status_line(),
        "currentState": machine.current_state(),
        "currentPhase": machine.current_phase(),
        "active": machine.is_active(),
        "possibleTransitions": machine.possible_transitions(),
        "stats": machine.stats(),
        "steps": machine.steps(),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;

    match args.command {
        Command::Replay {
            script,
            snapshot_out,
        } => {
            let parsed = script::ReplayScript::from_file(&script)?;
            info!(steps = parsed.steps.len(), script = %script.display(), "Replaying script");

            let report = script::replay(&parsed, config);
            for result in &report.results {
                println!("{}", serde_json::to_string(result)?);
            }
            println!("{}", report.snapshot.to_json_pretty()?);

            if let Some(path) = snapshot_out {
                save_snapshot(&path, &report.snapshot)
                    .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
                info!(path = %path.display(), "Snapshot written");
            }
            if report.rejected() > 0 {
                info!(rejected = report.rejected(), "Some transitions were rejected");
            }
        }

        Command::Steps { state, failed_step } => {
            let steps = derive_steps(state, failed_step);
            println!("{}", serde_json::to_string_pretty(&steps)?);
        }

        Command::Inspect { snapshot, strict } => {
            if strict {
                config.restore_policy = RestorePolicy::Strict;
            }
            let loaded = load_snapshot(&snapshot)
                .with_context(|| format!("Failed to read snapshot {}", snapshot.display()))?;
            let machine = AgentStateMachine::from_snapshot_with_config(loaded, config)
                .context("Snapshot failed restore checks")?;

            println!("{}", serde_json::to_string_pretty(&inspect_summary(&machine))?);
        }
    }

    Ok(())
}
