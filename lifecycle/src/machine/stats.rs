//! Statistics derived from transition history.

use serde::{Deserialize, Serialize};

use super::engine::{AgentStateMachine, TransitionRecord};
use super::types::{EpochMillis, RunLifecycleState};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStats {
    pub total_transitions: usize,
    /// Milliseconds since the last transition (0 with no history).
    pub time_in_current_state: i64,
    /// Mean of recorded durations; the first entry has none and is skipped.
    pub average_state_duration: f64,
    /// Transitions into `error`.
    pub error_count: usize,
}

impl MachineStats {
    pub fn from_history<'a>(
        history: impl IntoIterator<Item = &'a TransitionRecord>,
        now: EpochMillis,
    ) -> Self {
        let mut total = 0;
        let mut errors = 0;
        let mut duration_sum = 0i64;
        let mut duration_count = 0usize;
        let mut last_timestamp = None;

        for record in history {
            total += 1;
            if record.to == RunLifecycleState::Error {
                errors += 1;
            }
            if let Some(duration) = record.duration {
                duration_sum = duration_sum.saturating_add(duration);
                duration_count += 1;
            }
            last_timestamp = Some(record.timestamp);
        }

        let average_state_duration = if duration_count == 0 {
            0.0
        } else {
            duration_sum as f64 / duration_count as f64
        };

        Self {
            total_transitions: total,
            time_in_current_state: last_timestamp.map_or(0, |at| now.saturating_sub(at)),
            average_state_duration,
            error_count: errors,
        }
    }
}

impl AgentStateMachine {
    pub fn stats(&self) -> MachineStats {
        MachineStats::from_history(&self.history, self.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_empty_history() {
        let stats = AgentStateMachine::new().stats();
        assert_eq!(stats.total_transitions, 0);
        assert_eq!(stats.time_in_current_state, 0);
        assert_eq!(stats.average_state_duration, 0.0);
        assert_eq!(stats.error_count, 0);
    }

    #[test]
    fn test_stats_from_known_timestamps() {
        let clock = ManualClock::new(1_000);
        let mut sm = AgentStateMachine::new().with_clock(clock.clone());

        sm.transition(RunLifecycleState::Planning, None, None);
        clock.set(1_200);
        sm.transition(RunLifecycleState::Error, Some("llm unavailable"), None);
        clock.set(1_600);
        sm.transition(RunLifecycleState::Planning, Some("retry"), None);
        clock.set(1_650);

        let stats = sm.stats();
        assert_eq!(stats.total_transitions, 3);
        assert_eq!(stats.average_state_duration, 300.0);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.time_in_current_state, 50);
    }

    #[test]
    fn test_extreme_durations_saturate() {
        let record = |from, to, timestamp, duration| TransitionRecord {
            from,
            to,
            timestamp,
            reason: None,
            duration,
        };
        let history = [
            record(RunLifecycleState::Idle, RunLifecycleState::Planning, 0, None),
            record(RunLifecycleState::Planning, RunLifecycleState::Executing, 10, Some(i64::MAX)),
            record(RunLifecycleState::Executing, RunLifecycleState::Testing, 20, Some(i64::MAX)),
        ];
        let stats = MachineStats::from_history(&history, i64::MIN);
        assert_eq!(stats.total_transitions, 3);
        assert_eq!(stats.average_state_duration, i64::MAX as f64 / 2.0);
        assert_eq!(stats.time_in_current_state, i64::MIN);
    }
}
