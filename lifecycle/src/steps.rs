//! UI step checklist derived from lifecycle state.
//!
//! Pure projection: the same `(state, failed_step)` always yields the same
//! four steps, so the checklist can be rebuilt from a snapshot.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LifecycleError;
use crate::machine::{RunLifecycleState, RunPhase};

/// The four fixed checklist items, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Plan,
    Execute,
    Tests,
    Fix,
}

impl StepId {
    pub const ORDER: [StepId; 4] = [Self::Plan, Self::Execute, Self::Tests, Self::Fix];

    fn index(self) -> usize {
        match self {
            Self::Plan => 0,
            Self::Execute => 1,
            Self::Tests => 2,
            Self::Fix => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Execute => "execute",
            Self::Tests => "tests",
            Self::Fix => "fix",
        }
    }
}

impl From<RunPhase> for StepId {
    fn from(phase: RunPhase) -> Self {
        match phase {
            RunPhase::Plan => Self::Plan,
            RunPhase::Execute => Self::Execute,
            RunPhase::Test => Self::Tests,
            RunPhase::Fix => Self::Fix,
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = LifecycleError;

    /// Accepts step ids and, for convenience, phase names (`test`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plan" => Ok(Self::Plan),
            "execute" => Ok(Self::Execute),
            "tests" | "test" => Ok(Self::Tests),
            "fix" => Ok(Self::Fix),
            _ => Err(LifecycleError::UnknownStep(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub status: StepStatus,
}

/// Derive the checklist for `state`.
///
/// `failed_step` only matters in `error`; when it is missing there, the
/// `plan` step is marked failed.
pub fn derive_steps(state: RunLifecycleState, failed_step: Option<StepId>) -> [Step; 4] {
    let status_for = |id: StepId| -> StepStatus {
        match state {
            RunLifecycleState::Idle => StepStatus::Pending,
            RunLifecycleState::Done => StepStatus::Completed,
            RunLifecycleState::Error => {
                let failed = failed_step.unwrap_or(StepId::Plan);
                position(id, failed.index(), StepStatus::Failed)
            }
            _ => position(id, StepId::from(state.phase()).index(), StepStatus::Active),
        }
    };

    StepId::ORDER.map(|id| Step {
        id,
        status: status_for(id),
    })
}

fn position(id: StepId, current: usize, at_current: StepStatus) -> StepStatus {
    match id.index().cmp(&current) {
        std::cmp::Ordering::Less => StepStatus::Completed,
        std::cmp::Ordering::Equal => at_current,
        std::cmp::Ordering::Greater => StepStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StepStatus::*;

    fn statuses(state: RunLifecycleState, failed: Option<StepId>) -> [StepStatus; 4] {
        derive_steps(state, failed).map(|s| s.status)
    }

    #[test]
    fn test_step_order() {
        let ids = derive_steps(RunLifecycleState::Idle, None).map(|s| s.id);
        assert_eq!(ids, StepId::ORDER);
    }

    #[test]
    fn test_error_without_failed_step_fails_plan() {
        assert_eq!(
            statuses(RunLifecycleState::Error, None),
            [Failed, Pending, Pending, Pending]
        );
    }

    #[test]
    fn test_error_at_fix() {
        assert_eq!(
            statuses(RunLifecycleState::Error, Some(StepId::Fix)),
            [Completed, Completed, Completed, Failed]
        );
    }

    #[test]
    fn test_failed_step_ignored_outside_error() {
        assert_eq!(
            statuses(RunLifecycleState::Executing, Some(StepId::Fix)),
            [Completed, Active, Pending, Pending]
        );
    }

    #[test]
    fn test_step_id_parse() {
        assert_eq!("tests".parse::<StepId>().unwrap(), StepId::Tests);
        assert_eq!("Test".parse::<StepId>().unwrap(), StepId::Tests);
        assert!("deploy".parse::<StepId>().is_err());
    }

    #[test]
    fn test_step_serialization() {
        let value = serde_json::to_value(derive_steps(RunLifecycleState::Planning, None)).unwrap();
        assert_eq!(value[0], serde_json::json!({"id": "plan", "status": "active"}));
        assert_eq!(value[2], serde_json::json!({"id": "tests", "status": "pending"}));
    }
}
