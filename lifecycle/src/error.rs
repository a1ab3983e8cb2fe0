//! Error types for lifecycle operations.
//!
//! Illegal transitions are not errors in this sense: they come back as a
//! reported [`TransitionRejection`] inside a `TransitionResult`. Everything
//! here is for restore, configuration, IO, and registry failures.

use std::path::PathBuf;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::machine::RunLifecycleState;

/// Result type alias for lifecycle operations
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Unknown lifecycle state: {0}")]
    UnknownState(String),

    #[error("Unknown step id: {0}")]
    UnknownStep(String),

    #[error("Snapshot JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot integrity check failed: {}", errors.join("; "))]
    IntegrityCheckFailed { errors: Vec<String> },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run already registered: {0}")]
    DuplicateRun(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),
}

impl LifecycleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why a requested transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionRejection {
    #[error("Cannot transition to same state")]
    SameState { state: RunLifecycleState },

    #[error("Invalid transition: {from} → {to}")]
    NotAllowed {
        from: RunLifecycleState,
        to: RunLifecycleState,
    },
}

/// Serialized as its message, which is what UI consumers display.
impl Serialize for TransitionRejection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        let same = TransitionRejection::SameState {
            state: RunLifecycleState::Idle,
        };
        assert_eq!(same.to_string(), "Cannot transition to same state");

        let invalid = TransitionRejection::NotAllowed {
            from: RunLifecycleState::Idle,
            to: RunLifecycleState::Done,
        };
        assert_eq!(invalid.to_string(), "Invalid transition: idle → done");
        assert_eq!(
            serde_json::to_value(invalid).unwrap(),
            serde_json::json!("Invalid transition: idle → done")
        );
    }

    #[test]
    fn test_integrity_error_joins_reasons() {
        let err = LifecycleError::IntegrityCheckFailed {
            errors: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Snapshot integrity check failed: a; b");
    }
}
