//! Agent State Machine — the single source of truth for where a run is.
//!
//! The orchestrator calls [`AgentStateMachine::transition`] as the run moves
//! through planning → executing → testing → fixing → done/error. Every
//! attempt is validated against the transition graph; legal moves are
//! recorded in a bounded history and announced to listeners.
//!
//! Illegal moves are *reported*, not raised: the caller checks
//! [`TransitionResult::success`] (or uses [`TransitionResult::into_result`]).

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::context::{AgentContext, ContextUpdate};
use super::types::{EpochMillis, RunLifecycleState, RunPhase};
use crate::clock::{Clock, SystemClock};
use crate::config::LifecycleConfig;
use crate::error::TransitionRejection;
use crate::events::{LifecycleEvent, ListenerId, ListenerSet};
use crate::steps::{derive_steps, Step, StepId};

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: RunLifecycleState,
    pub to: RunLifecycleState,
    pub timestamp: EpochMillis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Milliseconds since the previous entry. `None` for the first entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

/// Outcome of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    pub success: bool,
    pub from: RunLifecycleState,
    pub to: RunLifecycleState,
    pub timestamp: EpochMillis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TransitionRejection>,
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Convert into a `Result` for callers that want `?`.
    pub fn into_result(self) -> Result<TransitionResult, TransitionRejection> {
        match self.error {
            Some(rejection) => Err(rejection),
            None => Ok(self),
        }
    }
}

/// Lifecycle state machine for one agent run.
///
/// Owned by a single driver; every method is synchronous. Listeners are
/// called in registration order before the mutating call returns.
pub struct AgentStateMachine {
    pub(crate) current: RunLifecycleState,
    pub(crate) context: AgentContext,
    pub(crate) history: VecDeque<TransitionRecord>,
    pub(crate) config: LifecycleConfig,
    clock: Arc<dyn Clock>,
    listeners: ListenerSet,
}

impl AgentStateMachine {
    /// Create an idle machine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    /// A `history_limit` of 0 is raised to 1.
    pub fn with_config(config: LifecycleConfig) -> Self {
        let config = config.normalized();
        Self {
            current: RunLifecycleState::Idle,
            context: AgentContext::default(),
            history: VecDeque::new(),
            config,
            clock: Arc::new(SystemClock),
            listeners: ListenerSet::new(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub(crate) fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn now(&self) -> EpochMillis {
        self.clock.now_millis()
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Attempt to move to `to`.
    ///
    /// `reason` is recorded in history and, when entering `error`, becomes
    /// `context.error`. `run_id` is stamped into the context when given.
    pub fn transition(
        &mut self,
        to: RunLifecycleState,
        reason: Option<&str>,
        run_id: Option<&str>,
    ) -> TransitionResult {
        let from = self.current;
        let timestamp = self.now();

        let rejection = if to == from {
            Some(TransitionRejection::SameState { state: from })
        } else if !from.can_transition_to(to) {
            Some(TransitionRejection::NotAllowed { from, to })
        } else {
            None
        };

        if let Some(rejection) = rejection {
            warn!(%from, %to, error = %rejection, "Transition rejected");
            return TransitionResult {
                success: false,
                from,
                to,
                timestamp,
                reason: reason.map(String::from),
                error: Some(rejection),
            };
        }

        let record = TransitionRecord {
            from,
            to,
            timestamp,
            reason: reason.map(String::from),
            duration: self
                .history
                .back()
                .map(|last| timestamp.saturating_sub(last.timestamp)),
        };

        self.current = to;
        self.context.current_phase = to.phase();
        if let Some(run_id) = run_id {
            self.context.run_id = Some(run_id.to_string());
        }
        self.context.error = match to {
            RunLifecycleState::Error => reason.map(String::from),
            _ => None,
        };

        match to {
            RunLifecycleState::Planning => {
                if self.context.start_time.is_none() {
                    self.context.start_time = Some(timestamp);
                }
            }
            RunLifecycleState::Done => {
                self.context.end_time = Some(timestamp);
                self.context.progress = 1.0;
            }
            RunLifecycleState::Idle => {
                self.context = AgentContext::default();
            }
            _ => {}
        }

        self.history.push_back(record);
        while self.history.len() > self.config.history_limit {
            self.history.pop_front();
        }

        debug!(
            %from,
            %to,
            phase = %self.context.current_phase,
            run_id = self.context.run_id.as_deref().unwrap_or("-"),
            "State transition"
        );

        self.listeners.emit(&LifecycleEvent::StateChanged {
            from,
            to,
            context: self.context.clone(),
            reason: reason.map(String::from),
        });
        if to == RunLifecycleState::Error {
            self.listeners.emit(&LifecycleEvent::Error {
                reason: reason.map(String::from),
            });
        }

        TransitionResult {
            success: true,
            from,
            to,
            timestamp,
            reason: reason.map(String::from),
            error: None,
        }
    }

    /// Move to `error` with `reason`. Convenience for the common failure path.
    pub fn fail(&mut self, reason: &str) -> TransitionResult {
        self.transition(RunLifecycleState::Error, Some(reason), None)
    }

    /// Merge `updates` into the context without touching state.
    pub fn update_context(&mut self, mut updates: ContextUpdate) {
        if let Some(progress) = updates.progress {
            let adjusted = self.config.progress_policy.apply(progress);
            if adjusted.to_bits() != progress.to_bits() {
                warn!(progress, adjusted, "Progress outside 0..=1 clamped");
            }
            updates.progress = Some(adjusted);
        }

        let previous = self.context.clone();
        self.context.apply(&updates);

        self.listeners.emit(&LifecycleEvent::ContextUpdated {
            previous,
            current: self.context.clone(),
            updates,
        });
    }

    /// Return to `idle` from anywhere, discarding context and history.
    pub fn reset(&mut self) {
        let from = self.current;
        self.current = RunLifecycleState::Idle;
        self.context = AgentContext::default();
        self.history.clear();

        info!(%from, "State machine reset");
        self.listeners.emit(&LifecycleEvent::Reset { from });
    }

    pub fn current_state(&self) -> RunLifecycleState {
        self.current
    }

    pub fn current_phase(&self) -> RunPhase {
        self.current.phase()
    }

    pub fn context(&self) -> AgentContext {
        self.context.clone()
    }

    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history.iter().cloned().collect()
    }

    pub fn is_active(&self) -> bool {
        self.current.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn is_error(&self) -> bool {
        self.current == RunLifecycleState::Error
    }

    pub fn possible_transitions(&self) -> Vec<RunLifecycleState> {
        self.current.valid_transitions().to_vec()
    }

    /// UI steps for the current state. In `error`, the failed step is the
    /// phase the run was in when it failed.
    pub fn steps(&self) -> [Step; 4] {
        derive_steps(self.current, failed_step_from(self.current, self.history.back()))
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] phase={} progress={:.0}% | {} transitions | run={}",
            self.current,
            self.current_phase(),
            self.context.progress * 100.0,
            self.history.len(),
            self.context.run_id.as_deref().unwrap_or("-"),
        )
    }

    /// Register a listener for every notification.
    pub fn on_event<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    pub fn on_state_changed<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(RunLifecycleState, RunLifecycleState, &AgentContext, Option<&str>)
            + Send
            + Sync
            + 'static,
    {
        self.on_event(move |event| {
            if let LifecycleEvent::StateChanged {
                from,
                to,
                context,
                reason,
            } = event
            {
                listener(*from, *to, context, reason.as_deref());
            }
        })
    }

    pub fn on_context_updated<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&AgentContext, &AgentContext, &ContextUpdate) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let LifecycleEvent::ContextUpdated {
                previous,
                current,
                updates,
            } = event
            {
                listener(previous, current, updates);
            }
        })
    }

    pub fn on_error<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(Option<&str>) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let LifecycleEvent::Error { reason } = event {
                listener(reason.as_deref());
            }
        })
    }

    pub fn on_reset<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(RunLifecycleState) + Send + Sync + 'static,
    {
        self.on_event(move |event| {
            if let LifecycleEvent::Reset { from } = event {
                listener(*from);
            }
        })
    }

    /// Unsubscribe. Returns whether the listener was registered.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// The step that failed: the phase of the state the run left to enter `error`.
pub(crate) fn failed_step_from(
    state: RunLifecycleState,
    last: Option<&TransitionRecord>,
) -> Option<StepId> {
    match last {
        Some(record) if state == RunLifecycleState::Error && record.to == state => {
            Some(StepId::from(record.from.phase()))
        }
        _ => None,
    }
}

impl Default for AgentStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AgentStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentStateMachine")
            .field("current", &self.current)
            .field("context", &self.context)
            .field("history_len", &self.history.len())
            .field("config", &self.config)
            .field("listeners", &self.listeners)
            .finish()
    }
}
