//! Snapshot serialization and restore.
//!
//! The snapshot is the only persisted shape:
//!
//! ```json
//! {"currentState": "testing", "currentPhase": "test",
//!  "context": {...}, "history": [{"from": .., "to": .., "timestamp": ..}]}
//! ```
//!
//! Unknown state names are always rejected by deserialization. Whether the
//! history is checked against the transition graph depends on
//! [`RestorePolicy`].

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{LifecycleConfig, RestorePolicy};
use crate::error::{LifecycleError, LifecycleResult};
use crate::machine::engine::failed_step_from;
use crate::machine::{
    AgentContext, AgentStateMachine, EpochMillis, MachineStats, RunLifecycleState, RunPhase,
    TransitionRecord,
};
use crate::steps::{derive_steps, Step};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineSnapshot {
    pub current_state: RunLifecycleState,
    /// Informational; always recomputed from `current_state` on restore.
    #[serde(default)]
    pub current_phase: Option<RunPhase>,
    #[serde(default)]
    pub context: AgentContext,
    #[serde(default)]
    pub history: Vec<TransitionRecord>,
}

impl MachineSnapshot {
    pub fn to_json(&self) -> LifecycleResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> LifecycleResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> LifecycleResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The UI checklist this snapshot describes.
    pub fn steps(&self) -> [Step; 4] {
        derive_steps(
            self.current_state,
            failed_step_from(self.current_state, self.history.last()),
        )
    }

    pub fn stats(&self, now: EpochMillis) -> MachineStats {
        MachineStats::from_history(&self.history, now)
    }

    /// Consistency problems that strict restore rejects. Empty when clean.
    pub fn integrity_errors(&self, history_limit: usize) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(phase) = self.current_phase {
            if phase != self.current_state.phase() {
                errors.push(format!(
                    "currentPhase {} does not match state {}",
                    phase, self.current_state
                ));
            }
        }

        if self.history.len() > history_limit {
            errors.push(format!(
                "history has {} entries, limit is {}",
                self.history.len(),
                history_limit
            ));
        }

        for (i, record) in self.history.iter().enumerate() {
            if !record.from.can_transition_to(record.to) {
                errors.push(format!(
                    "history[{}]: illegal transition {} → {}",
                    i, record.from, record.to
                ));
            }
            if i > 0 {
                let prev = &self.history[i - 1];
                if record.from != prev.to {
                    errors.push(format!(
                        "history[{}]: starts at {} but previous entry ended at {}",
                        i, record.from, prev.to
                    ));
                }
                match (record.duration, record.timestamp.checked_sub(prev.timestamp)) {
                    (_, None) => errors.push(format!(
                        "history[{}]: timestamp {} is out of range of previous {}",
                        i, record.timestamp, prev.timestamp
                    )),
                    (Some(duration), Some(elapsed)) if duration != elapsed => {
                        errors.push(format!(
                            "history[{}]: duration {} does not match timestamps",
                            i, duration
                        ))
                    }
                    _ => {}
                }
            }
        }

        if let Some(last) = self.history.last() {
            if last.to != self.current_state {
                errors.push(format!(
                    "last transition target {} doesn't match current state {}",
                    last.to, self.current_state
                ));
            }
        }

        if self.context.error.is_some() && self.current_state != RunLifecycleState::Error {
            errors.push(format!(
                "context.error set while in state {}",
                self.current_state
            ));
        }

        errors
    }
}

impl AgentStateMachine {
    pub fn to_snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            current_state: self.current,
            current_phase: Some(self.current_phase()),
            context: self.context.clone(),
            history: self.history(),
        }
    }

    pub fn to_json(&self) -> LifecycleResult<String> {
        self.to_snapshot().to_json()
    }

    /// Restore with the default configuration.
    pub fn from_snapshot(snapshot: MachineSnapshot) -> LifecycleResult<Self> {
        Self::from_snapshot_with_config(snapshot, LifecycleConfig::default())
    }

    pub fn from_snapshot_with_config(
        snapshot: MachineSnapshot,
        config: LifecycleConfig,
    ) -> LifecycleResult<Self> {
        let config = config.normalized();
        if config.restore_policy == RestorePolicy::Strict {
            let errors = snapshot.integrity_errors(config.history_limit);
            if !errors.is_empty() {
                return Err(LifecycleError::IntegrityCheckFailed { errors });
            }
        }

        let MachineSnapshot {
            current_state,
            context,
            history,
            ..
        } = snapshot;

        let mut history = VecDeque::from(history);
        if history.len() > config.history_limit {
            warn!(
                entries = history.len(),
                limit = config.history_limit,
                "Restored history exceeds limit, dropping oldest entries"
            );
            while history.len() > config.history_limit {
                history.pop_front();
            }
        }

        let mut machine = Self::with_config(config);
        machine.current = current_state;
        machine.context = AgentContext {
            current_phase: current_state.phase(),
            ..context
        };
        machine.history = history;

        debug!(state = %current_state, entries = machine.history.len(), "State machine restored");
        Ok(machine)
    }

    pub fn from_json(json: &str) -> LifecycleResult<Self> {
        Self::from_snapshot(MachineSnapshot::from_json(json)?)
    }

    pub fn from_json_with_config(json: &str, config: LifecycleConfig) -> LifecycleResult<Self> {
        Self::from_snapshot_with_config(MachineSnapshot::from_json(json)?, config)
    }
}

/// Write `snapshot` as pretty JSON, replacing `path` atomically.
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &MachineSnapshot) -> LifecycleResult<()> {
    let path = path.as_ref();
    let json = snapshot.to_json_pretty()?;
    let tmp = path.with_extension("json.tmp");

    std::fs::write(&tmp, json).map_err(|e| LifecycleError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| LifecycleError::io(path, e))?;

    debug!(path = %path.display(), "Snapshot saved");
    Ok(())
}

pub fn load_snapshot(path: impl AsRef<Path>) -> LifecycleResult<MachineSnapshot> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| LifecycleError::io(path, e))?;
    MachineSnapshot::from_json(&json)
}
