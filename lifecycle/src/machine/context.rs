//! Run context: fine-grained progress that changes independently of state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::types::{EpochMillis, RunPhase};

/// Open key/value bag attached to a run. No schema is imposed on values.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Mutable progress record for the current run.
///
/// Missing fields deserialize to their zero value, so a partial snapshot
/// context merges cleanly into the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentContext {
    pub run_id: Option<String>,
    /// Mirrors the machine state; maintained by transitions only.
    pub current_phase: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Fraction complete, 0.0 ..= 1.0.
    pub progress: f64,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<EpochMillis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<EpochMillis>,
    pub metadata: Metadata,
}

impl Default for AgentContext {
    fn default() -> Self {
        Self {
            run_id: None,
            current_phase: RunPhase::Plan,
            current_file: None,
            line: None,
            progress: 0.0,
            error: None,
            start_time: None,
            end_time: None,
            metadata: Metadata::new(),
        }
    }
}

impl AgentContext {
    /// Whether this context equals the zero value.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Shallow merge: every field present in `update` replaces ours.
    pub(crate) fn apply(&mut self, update: &ContextUpdate) {
        if let Some(run_id) = &update.run_id {
            self.run_id = run_id.clone();
        }
        if let Some(file) = &update.current_file {
            self.current_file = file.clone();
        }
        if let Some(line) = update.line {
            self.line = line;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(start) = update.start_time {
            self.start_time = start;
        }
        if let Some(end) = update.end_time {
            self.end_time = end;
        }
        if let Some(metadata) = &update.metadata {
            self.metadata = metadata.clone();
        }
    }
}

/// A partial context update.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears a nullable
/// field. The phase and error are owned by transitions and cannot be set
/// here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<Option<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Option<EpochMillis>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Option<EpochMillis>>,
    /// Replaces the whole metadata map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ContextUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(Some(run_id.into()));
        self
    }

    pub fn current_file(mut self, path: impl Into<String>) -> Self {
        self.current_file = Some(Some(path.into()));
        self
    }

    pub fn clear_current_file(mut self) -> Self {
        self.current_file = Some(None);
        self.line = Some(None);
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.line = Some(Some(line));
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn start_time(mut self, at: EpochMillis) -> Self {
        self.start_time = Some(Some(at));
        self
    }

    pub fn end_time(mut self, at: EpochMillis) -> Self {
        self.end_time = Some(Some(at));
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// True when applying this update would change nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
