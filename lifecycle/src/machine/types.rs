//! Lifecycle states, UI phases, and the fixed transition graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// The lifecycle state of one agent run.
///
/// A run moves plan → execute → test, loops through fix ↔ test until it is
/// done, and routes every failure through `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLifecycleState {
    /// No run in progress.
    Idle,
    /// Building a plan for the user request.
    Planning,
    /// Applying the planned changes.
    Executing,
    /// Running the test suite against the changes.
    Testing,
    /// Repairing failures reported by the tests.
    Fixing,
    /// The run failed; waiting for retry or abandon.
    Error,
    /// The run finished successfully. Only a fresh run (via `Idle`) may follow.
    Done,
}

impl RunLifecycleState {
    /// All states in declaration order.
    pub const ALL: [RunLifecycleState; 7] = [
        Self::Idle,
        Self::Planning,
        Self::Executing,
        Self::Testing,
        Self::Fixing,
        Self::Error,
        Self::Done,
    ];

    /// Legal targets from this state.
    ///
    /// ```text
    /// idle      → planning | error
    /// planning  → executing | error
    /// executing → testing | error
    /// testing   → fixing | done | error
    /// fixing    → testing | done | error
    /// error     → idle | planning
    /// done      → idle
    /// ```
    pub fn valid_transitions(self) -> &'static [RunLifecycleState] {
        match self {
            Self::Idle => &[Self::Planning, Self::Error],
            Self::Planning => &[Self::Executing, Self::Error],
            Self::Executing => &[Self::Testing, Self::Error],
            Self::Testing => &[Self::Fixing, Self::Done, Self::Error],
            Self::Fixing => &[Self::Testing, Self::Done, Self::Error],
            Self::Error => &[Self::Idle, Self::Planning],
            Self::Done => &[Self::Idle],
        }
    }

    /// Whether `to` is a legal edge from this state. Self-edges never are.
    pub fn can_transition_to(self, to: RunLifecycleState) -> bool {
        self != to && self.valid_transitions().contains(&to)
    }

    /// The UI phase this state belongs to.
    pub fn phase(self) -> RunPhase {
        match self {
            Self::Idle | Self::Planning | Self::Error | Self::Done => RunPhase::Plan,
            Self::Executing => RunPhase::Execute,
            Self::Testing => RunPhase::Test,
            Self::Fixing => RunPhase::Fix,
        }
    }

    /// A run is active while it is neither idle nor done.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Idle | Self::Done)
    }

    /// `Done` is the only terminal state.
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Testing => "testing",
            Self::Fixing => "fixing",
            Self::Error => "error",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for RunLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunLifecycleState {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == needle)
            .ok_or_else(|| LifecycleError::UnknownState(s.to_string()))
    }
}

/// UI-facing grouping of lifecycle states. Always derived, never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Plan,
    Execute,
    Test,
    Fix,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::Execute => write!(f, "execute"),
            Self::Test => write!(f, "test"),
            Self::Fix => write!(f, "fix"),
        }
    }
}
