//! Replay scripts: a TOML list of transitions and context updates.
//!
//! ```toml
//! run_id = "demo-1"
//! start_millis = 1700000000000
//!
//! [[step]]
//! action = "transition"
//! to = "planning"
//! reason = "user request"
//!
//! [[step]]
//! action = "update"
//! current_file = "src/main.rs"
//! line = 42
//! progress = 0.3
//! after_ms = 1500
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use lifecycle::{
    AgentStateMachine, Clock, ContextUpdate, LifecycleConfig, ManualClock, MachineSnapshot,
    RunLifecycleState, SystemClock, TransitionResult,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    /// Stamped into the context on every transition.
    #[serde(default)]
    pub run_id: Option<String>,
    /// Clock start; defaults to the current wall-clock time.
    #[serde(default)]
    pub start_millis: Option<i64>,
    #[serde(default, rename = "step")]
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptStep {
    Transition {
        to: RunLifecycleState,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        after_ms: i64,
    },
    Update {
        #[serde(default)]
        current_file: Option<String>,
        #[serde(default)]
        line: Option<u32>,
        #[serde(default)]
        progress: Option<f64>,
        #[serde(default)]
        metadata: Option<HashMap<String, serde_json::Value>>,
        #[serde(default)]
        after_ms: i64,
    },
    Reset {
        #[serde(default)]
        after_ms: i64,
    },
}

impl ScriptStep {
    fn after_ms(&self) -> i64 {
        match self {
            Self::Transition { after_ms, .. }
            | Self::Update { after_ms, .. }
            | Self::Reset { after_ms } => *after_ms,
        }
    }
}

impl ReplayScript {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("Failed to parse replay script")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script {}", path.display()))?;
        Self::from_toml_str(&source)
    }
}

#[derive(Debug)]
pub struct ReplayReport {
    pub results: Vec<TransitionResult>,
    pub snapshot: MachineSnapshot,
}

impl ReplayReport {
    pub fn rejected(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Drive a fresh machine through `script`.
pub fn replay(script: &ReplayScript, config: LifecycleConfig) -> ReplayReport {
    let clock = ManualClock::new(script.start_millis.unwrap_or_else(|| SystemClock.now_millis()));
    let mut machine = AgentStateMachine::with_config(config).with_clock(clock.clone());
    machine.on_event(|event| debug!(kind = event.kind().as_str(), "Lifecycle event"));

    let mut results = Vec::new();
    for step in &script.steps {
        clock.advance(step.after_ms());
        match step {
            ScriptStep::Transition { to, reason, .. } => {
                let result =
                    machine.transition(*to, reason.as_deref(), script.run_id.as_deref());
                if !result.success {
                    warn!(to = %to, "Script step rejected");
                }
                results.push(result);
            }
            ScriptStep::Update {
                current_file,
                line,
                progress,
                metadata,
                ..
            } => {
                let mut update = ContextUpdate::new();
                if let Some(file) = current_file {
                    update = update.current_file(file.clone());
                }
                if let Some(line) = line {
                    update = update.line(*line);
                }
                if let Some(progress) = progress {
                    update = update.progress(*progress);
                }
                if let Some(metadata) = metadata {
                    update = update.metadata(metadata.clone());
                }
                machine.update_context(update);
            }
            ScriptStep::Reset { .. } => machine.reset(),
        }
    }

    info!(status = %machine.status_line(), "Replay finished");

    ReplayReport {
        results,
        snapshot: machine.to_snapshot(),
    }
}
