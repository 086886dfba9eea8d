use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use keel_policy::{AssertionPath, VariableStore};

use crate::error::{DebugError, DebugResult};
use crate::hook::DebugHook;
use crate::session::DebugSession;
use crate::snapshot::DebugSnapshot;

/// What a debug session is bound to: a published service or a standalone
/// policy. At most one live session per target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DebugTarget {
    Service(String),
    Policy(String),
}

impl fmt::Display for DebugTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugTarget::Service(id) => write!(f, "service `{id}`"),
            DebugTarget::Policy(id) => write!(f, "policy `{id}`"),
        }
    }
}

/// Process-wide session registry and controller-facing admin surface.
///
/// Owned and injected by the hosting process; every operation is keyed by
/// task id and an unknown id is a [`DebugError::NoSuchSession`], never a
/// silent no-op. The registry map sits behind its own lock, disjoint from
/// each session's internal lock, so lookups never contend with a session
/// mid-pause.
#[derive(Default)]
pub struct DebugManager {
    inner: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<String, DebugSession>,
    targets: HashMap<DebugTarget, String>,
    next_task: u64,
}

impl DebugManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a new debug session to a published service and return its task
    /// id plus the initial (empty) snapshot.
    pub fn initialize_service(
        &self,
        service_id: impl Into<String>,
    ) -> DebugResult<(String, DebugSnapshot)> {
        self.initialize(DebugTarget::Service(service_id.into()))
    }

    /// Bind a new debug session to a standalone policy.
    pub fn initialize_policy(
        &self,
        policy_id: impl Into<String>,
    ) -> DebugResult<(String, DebugSnapshot)> {
        self.initialize(DebugTarget::Policy(policy_id.into()))
    }

    fn initialize(&self, target: DebugTarget) -> DebugResult<(String, DebugSnapshot)> {
        let session = {
            let mut registry = self.inner.lock();
            if registry.targets.contains_key(&target) {
                return Err(DebugError::TargetAlreadyDebugged(target));
            }
            registry.next_task += 1;
            let task_id = format!("debug-{}", registry.next_task);
            let session = DebugSession::new(task_id.clone());
            registry.sessions.insert(task_id.clone(), session.clone());
            registry.targets.insert(target.clone(), task_id);
            session
        };
        tracing::debug!(task_id = session.task_id(), %target, "debug session created");
        Ok((session.task_id().to_string(), session.snapshot()))
    }

    /// Tear the session down, releasing a blocked execution thread as in
    /// `stop`. The task id is dead afterwards.
    pub fn terminate_debug(&self, task_id: &str) -> DebugResult<()> {
        let session = {
            let mut registry = self.inner.lock();
            let session = registry
                .sessions
                .remove(task_id)
                .ok_or_else(|| DebugError::NoSuchSession(task_id.to_string()))?;
            registry.targets.retain(|_, id| id != task_id);
            session
        };
        session.stop();
        tracing::debug!(task_id, "debug session terminated");
        Ok(())
    }

    /// Drop every session, releasing any blocked execution threads. Called
    /// when the owning module unloads.
    pub fn clean_up(&self) {
        let sessions: Vec<DebugSession> = {
            let mut registry = self.inner.lock();
            registry.targets.clear();
            registry.sessions.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.stop();
        }
    }

    pub fn start_debug(&self, task_id: &str) -> DebugResult<()> {
        self.session(task_id)?.start();
        Ok(())
    }

    pub fn stop_debug(&self, task_id: &str) -> DebugResult<()> {
        self.session(task_id)?.stop();
        Ok(())
    }

    pub fn step_into(&self, task_id: &str) -> DebugResult<()> {
        self.session(task_id)?.step_into()
    }

    pub fn step_over(
        &self,
        task_id: &str,
        targets: impl IntoIterator<Item = AssertionPath>,
    ) -> DebugResult<()> {
        self.session(task_id)?.step_over(targets.into_iter().collect())
    }

    pub fn step_out(
        &self,
        task_id: &str,
        targets: impl IntoIterator<Item = AssertionPath>,
    ) -> DebugResult<()> {
        self.session(task_id)?.step_out(targets.into_iter().collect())
    }

    pub fn resume(&self, task_id: &str) -> DebugResult<()> {
        self.session(task_id)?.resume()
    }

    pub fn toggle_breakpoint(&self, task_id: &str, path: AssertionPath) -> DebugResult<()> {
        self.session(task_id)?.toggle_breakpoint(path);
        Ok(())
    }

    pub fn remove_all_breakpoints(&self, task_id: &str) -> DebugResult<()> {
        self.session(task_id)?.remove_all_breakpoints();
        Ok(())
    }

    pub fn add_user_context_variable(&self, task_id: &str, name: &str) -> DebugResult<()> {
        self.session(task_id)?.add_user_context_variable(name);
        Ok(())
    }

    pub fn remove_user_context_variable(&self, task_id: &str, name: &str) -> DebugResult<()> {
        self.session(task_id)?.remove_user_context_variable(name);
        Ok(())
    }

    /// Long-poll for a state change; `Ok(None)` on timeout.
    pub fn wait_for_updates(
        &self,
        task_id: &str,
        max_wait: Duration,
    ) -> DebugResult<Option<DebugSnapshot>> {
        Ok(self.session(task_id)?.wait_for_updates(max_wait))
    }

    /// Called by the execution engine when it begins processing a request
    /// for `target`. Returns a checkpoint hook when a started session is
    /// bound to the target and is not already debugging another request;
    /// `None` means the request runs unmonitored.
    pub fn attach(&self, target: &DebugTarget, store: Arc<dyn VariableStore>) -> Option<DebugHook> {
        let session = {
            let registry = self.inner.lock();
            let task_id = registry.targets.get(target)?;
            registry.sessions.get(task_id)?.clone()
        };
        session.attach(store).then(|| DebugHook::new(session))
    }

    fn session(&self, task_id: &str) -> DebugResult<DebugSession> {
        self.inner
            .lock()
            .sessions
            .get(task_id)
            .cloned()
            .ok_or_else(|| DebugError::NoSuchSession(task_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use keel_policy::MapVariableStore;

    use crate::session::DebugState;

    #[test]
    fn initialize_rejects_second_session_for_same_target() {
        let manager = DebugManager::new();
        let (task_id, snapshot) = manager.initialize_service("svc-1").unwrap();
        assert_eq!(snapshot.debug_state, DebugState::Stopped);
        assert!(snapshot.breakpoints.is_empty());

        let err = manager.initialize_service("svc-1").unwrap_err();
        assert_eq!(
            err,
            DebugError::TargetAlreadyDebugged(DebugTarget::Service("svc-1".to_string()))
        );

        // The existing session is untouched.
        manager.start_debug(&task_id).unwrap();
        // A different target is fine.
        manager.initialize_policy("svc-1").unwrap();
    }

    #[test]
    fn unknown_task_id_is_a_distinct_error() {
        let manager = DebugManager::new();
        let err = manager.start_debug("debug-404").unwrap_err();
        assert_eq!(err, DebugError::NoSuchSession("debug-404".to_string()));
        assert!(matches!(
            manager.wait_for_updates("debug-404", Duration::from_millis(1)),
            Err(DebugError::NoSuchSession(_))
        ));
    }

    #[test]
    fn terminate_frees_the_target_and_kills_the_task_id() {
        let manager = DebugManager::new();
        let (task_id, _) = manager.initialize_policy("pol-9").unwrap();
        manager.terminate_debug(&task_id).unwrap();

        assert_eq!(
            manager.stop_debug(&task_id),
            Err(DebugError::NoSuchSession(task_id))
        );
        // Target can be debugged again.
        manager.initialize_policy("pol-9").unwrap();
    }

    #[test]
    fn attach_requires_a_started_session() {
        let manager = DebugManager::new();
        let target = DebugTarget::Service("svc-2".to_string());
        let store = Arc::new(MapVariableStore::new());

        // No session at all.
        assert!(manager.attach(&target, store.clone()).is_none());

        let (task_id, _) = manager.initialize_service("svc-2").unwrap();
        // Session exists but is stopped.
        assert!(manager.attach(&target, store.clone()).is_none());

        manager.start_debug(&task_id).unwrap();
        let hook = manager.attach(&target, store.clone());
        assert!(hook.is_some());
        // One in-flight request per session.
        assert!(manager.attach(&target, store.clone()).is_none());

        // Finishing the request frees the slot.
        hook.unwrap().finished();
        assert!(manager.attach(&target, store).is_some());
    }
}
