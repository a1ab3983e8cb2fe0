//! Run registry — an explicit store of live state machines keyed by run id.
//!
//! There is no global instance: callers create a registry, share it, and
//! call [`RunRegistry::dispose`] on teardown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::machine::AgentStateMachine;
use crate::snapshot::MachineSnapshot;

/// A machine shared between the registry and its driver.
pub type SharedMachine = Arc<Mutex<AgentStateMachine>>;

pub struct RunRegistry {
    config: LifecycleConfig,
    clock: Arc<dyn Clock>,
    runs: Mutex<HashMap<String, SharedMachine>>,
}

/// Lock a machine, recovering the guard if a previous holder panicked.
///
/// A transition never leaves the machine half-updated across a listener
/// panic (listeners are isolated), so the inner value is still consistent.
pub fn lock_machine(machine: &SharedMachine) -> MutexGuard<'_, AgentStateMachine> {
    machine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RunRegistry {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            config: config.normalized(),
            clock: Arc::new(SystemClock),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Use `clock` for every machine this registry creates or restores.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn runs(&self) -> MutexGuard<'_, HashMap<String, SharedMachine>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn new_machine(&self) -> AgentStateMachine {
        AgentStateMachine::with_config(self.config.clone()).with_shared_clock(self.clock.clone())
    }

    /// Register a fresh idle machine. Generates a UUID when `run_id` is `None`.
    pub fn create_run(&self, run_id: Option<&str>) -> LifecycleResult<(String, SharedMachine)> {
        let id = run_id
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut runs = self.runs();
        if runs.contains_key(&id) {
            return Err(LifecycleError::DuplicateRun(id));
        }

        let machine = Arc::new(Mutex::new(self.new_machine()));
        runs.insert(id.clone(), Arc::clone(&machine));
        info!(run_id = %id, total = runs.len(), "Run registered");
        Ok((id, machine))
    }

    pub fn get(&self, run_id: &str) -> Option<SharedMachine> {
        self.runs().get(run_id).cloned()
    }

    /// Like [`get`](Self::get), but a missing run is an error.
    pub fn require(&self, run_id: &str) -> LifecycleResult<SharedMachine> {
        self.get(run_id)
            .ok_or_else(|| LifecycleError::RunNotFound(run_id.to_string()))
    }

    pub fn remove(&self, run_id: &str) -> Option<SharedMachine> {
        let removed = self.runs().remove(run_id);
        if removed.is_some() {
            debug!(run_id, "Run removed");
        }
        removed
    }

    /// Registered ids, sorted.
    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids of runs that are neither idle nor done, sorted.
    pub fn active_run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .runs()
            .iter()
            .filter(|(_, machine)| lock_machine(machine).is_active())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.runs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs().is_empty()
    }

    pub fn snapshot_all(&self) -> HashMap<String, MachineSnapshot> {
        self.runs()
            .iter()
            .map(|(id, machine)| (id.clone(), lock_machine(machine).to_snapshot()))
            .collect()
    }

    /// Rebuild a run from a snapshot, replacing any run with the same id.
    pub fn restore(&self, run_id: &str, snapshot: MachineSnapshot) -> LifecycleResult<SharedMachine> {
        let machine = AgentStateMachine::from_snapshot_with_config(snapshot, self.config.clone())?
            .with_shared_clock(self.clock.clone());
        let machine = Arc::new(Mutex::new(machine));

        self.runs().insert(run_id.to_string(), Arc::clone(&machine));
        info!(run_id, "Run restored");
        Ok(machine)
    }

    /// Reset and drop every run.
    pub fn dispose(&self) {
        let drained: Vec<(String, SharedMachine)> = self.runs().drain().collect();
        for (_, machine) in &drained {
            lock_machine(machine).reset();
        }
        info!(count = drained.len(), "Run registry disposed");
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new(LifecycleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::machine::RunLifecycleState;

    #[test]
    fn test_create_and_get() {
        let registry = RunRegistry::default();
        let (id, machine) = registry.create_run(Some("run-1")).unwrap();
        assert_eq!(id, "run-1");

        lock_machine(&machine).transition(RunLifecycleState::Planning, None, Some("run-1"));

        let fetched = registry.get("run-1").unwrap();
        assert_eq!(lock_machine(&fetched).current_state(), RunLifecycleState::Planning);
        assert!(registry.get("run-2").is_none());
    }

    #[test]
    fn test_require_missing_run() {
        let registry = RunRegistry::default();
        registry.create_run(Some("run-1")).unwrap();
        assert!(registry.require("run-1").is_ok());
        assert!(matches!(
            registry.require("run-9"),
            Err(LifecycleError::RunNotFound(id)) if id == "run-9"
        ));
    }

    #[test]
    fn test_zero_history_limit_config_still_records() {
        let config = LifecycleConfig {
            history_limit: 0,
            ..Default::default()
        };
        let registry = RunRegistry::new(config);
        let (_, machine) = registry.create_run(Some("z")).unwrap();
        lock_machine(&machine).transition(RunLifecycleState::Planning, None, None);
        assert_eq!(lock_machine(&machine).history().len(), 1);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let registry = RunRegistry::default();
        let (a, _) = registry.create_run(None).unwrap();
        let (b, _) = registry.create_run(None).unwrap();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_rejected() {
        let registry = RunRegistry::default();
        registry.create_run(Some("dup")).unwrap();
        assert!(matches!(
            registry.create_run(Some("dup")),
            Err(LifecycleError::DuplicateRun(id)) if id == "dup"
        ));
    }

    #[test]
    fn test_active_run_ids() {
        let registry = RunRegistry::default();
        let (_, a) = registry.create_run(Some("a")).unwrap();
        registry.create_run(Some("b")).unwrap();
        lock_machine(&a).transition(RunLifecycleState::Planning, None, None);

        assert_eq!(registry.active_run_ids(), vec!["a".to_string()]);
        assert_eq!(registry.run_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_snapshot_and_restore_share_clock() {
        let clock = ManualClock::new(100);
        let registry = RunRegistry::default().with_clock(clock.clone());
        let (_, machine) = registry.create_run(Some("r")).unwrap();
        lock_machine(&machine).transition(RunLifecycleState::Planning, None, None);

        let snapshots = registry.snapshot_all();
        registry.remove("r");
        assert!(registry.is_empty());

        let restored = registry.restore("r", snapshots["r"].clone()).unwrap();
        clock.advance(40);
        let stats = lock_machine(&restored).stats();
        assert_eq!(stats.time_in_current_state, 40);
    }

    #[test]
    fn test_dispose_resets_runs() {
        let registry = RunRegistry::default();
        let (_, machine) = registry.create_run(Some("x")).unwrap();
        lock_machine(&machine).transition(RunLifecycleState::Planning, None, None);

        registry.dispose();
        assert!(registry.is_empty());
        assert_eq!(lock_machine(&machine).current_state(), RunLifecycleState::Idle);
    }
}
