//! Lifecycle configuration
//!
//! Defaults cover the common case; `from_env` and the TOML loaders override
//! individual fields.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{LifecycleError, LifecycleResult};

/// Default number of history entries retained per run.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// How `from_json`/`from_snapshot` treat restored input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
    /// Accept any well-typed snapshot. History is not re-validated.
    #[default]
    Trust,
    /// Reject snapshots whose history breaks the transition graph or
    /// disagrees with the restored state.
    Strict,
}

/// How `update_context` treats progress values outside `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPolicy {
    #[default]
    Clamp,
    PassThrough,
}

impl ProgressPolicy {
    /// Apply the policy. NaN clamps to 0.
    pub fn apply(self, progress: f64) -> f64 {
        match self {
            Self::PassThrough => progress,
            Self::Clamp if progress.is_nan() => 0.0,
            Self::Clamp => progress.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Maximum transition history entries kept (oldest dropped first).
    pub history_limit: usize,

    pub restore_policy: RestorePolicy,

    pub progress_policy: ProgressPolicy,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            restore_policy: RestorePolicy::default(),
            progress_policy: ProgressPolicy::default(),
        }
    }
}

impl LifecycleConfig {
    /// Create config from environment variables
    ///
    /// - `LIFECYCLE_HISTORY_LIMIT`: positive integer
    /// - `LIFECYCLE_RESTORE_POLICY`: `trust` | `strict`
    /// - `LIFECYCLE_PROGRESS_POLICY`: `clamp` | `pass_through`
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(limit) = std::env::var("LIFECYCLE_HISTORY_LIMIT") {
            match limit.parse::<usize>() {
                Ok(n) if n > 0 => config.history_limit = n,
                _ => warn!(value = %limit, "Ignoring invalid LIFECYCLE_HISTORY_LIMIT"),
            }
        }
        if let Ok(policy) = std::env::var("LIFECYCLE_RESTORE_POLICY") {
            match policy.to_lowercase().as_str() {
                "trust" => config.restore_policy = RestorePolicy::Trust,
                "strict" => config.restore_policy = RestorePolicy::Strict,
                _ => warn!(value = %policy, "Ignoring invalid LIFECYCLE_RESTORE_POLICY"),
            }
        }
        if let Ok(policy) = std::env::var("LIFECYCLE_PROGRESS_POLICY") {
            match policy.to_lowercase().replace('-', "_").as_str() {
                "clamp" => config.progress_policy = ProgressPolicy::Clamp,
                "pass_through" => config.progress_policy = ProgressPolicy::PassThrough,
                _ => warn!(value = %policy, "Ignoring invalid LIFECYCLE_PROGRESS_POLICY"),
            }
        }

        config
    }

    /// Parse config from a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> LifecycleResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> LifecycleResult<Self> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).map_err(|e| LifecycleError::io(path, e))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> LifecycleResult<()> {
        if self.history_limit == 0 {
            return Err(LifecycleError::Config(
                "history_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamp out-of-range values instead of rejecting them.
    pub(crate) fn normalized(mut self) -> Self {
        if self.history_limit == 0 {
            warn!("history_limit 0 is below the minimum, using 1");
            self.history_limit = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.restore_policy, RestorePolicy::Trust);
        assert_eq!(config.progress_policy, ProgressPolicy::Clamp);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_partial_override() {
        let config = LifecycleConfig::from_toml_str(
            r#"
            history_limit = 25
            restore_policy = "strict"
            "#,
        )
        .unwrap();
        assert_eq!(config.history_limit, 25);
        assert_eq!(config.restore_policy, RestorePolicy::Strict);
        assert_eq!(config.progress_policy, ProgressPolicy::Clamp);
    }

    #[test]
    fn test_normalized_clamps_zero_limit() {
        let config = LifecycleConfig {
            history_limit: 0,
            ..Default::default()
        };
        assert_eq!(config.normalized().history_limit, 1);
        assert_eq!(LifecycleConfig::default().normalized(), LifecycleConfig::default());
    }

    #[test]
    fn test_toml_rejects_zero_limit() {
        let err = LifecycleConfig::from_toml_str("history_limit = 0").unwrap_err();
        assert!(matches!(err, LifecycleError::Config(_)));
    }

    #[test]
    fn test_toml_rejects_unknown_policy() {
        let err = LifecycleConfig::from_toml_str(r#"restore_policy = "lenient""#).unwrap_err();
        assert!(matches!(err, LifecycleError::ConfigParse(_)));
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lifecycle.toml");
        std::fs::write(&path, "progress_policy = \"pass_through\"\n").unwrap();

        let config = LifecycleConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.progress_policy, ProgressPolicy::PassThrough);

        let missing = LifecycleConfig::from_toml_file(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(LifecycleError::Io { .. })));
    }

    #[test]
    fn test_progress_policy() {
        assert_eq!(ProgressPolicy::Clamp.apply(1.5), 1.0);
        assert_eq!(ProgressPolicy::Clamp.apply(-0.2), 0.0);
        assert_eq!(ProgressPolicy::Clamp.apply(f64::NAN), 0.0);
        assert_eq!(ProgressPolicy::Clamp.apply(0.4), 0.4);
        assert_eq!(ProgressPolicy::PassThrough.apply(1.5), 1.5);
    }
}
