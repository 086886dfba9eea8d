use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use keel_policy::{AssertionPath, VariableStore};

use crate::context_tree::build_context_tree;
use crate::error::{DebugError, DebugResult};
use crate::snapshot::DebugSnapshot;

/// Debugger state machine states.
///
/// `Stopped` is both the initial and the terminal state. `Started` means
/// armed and waiting for a request to debug; the break states describe what
/// the next checkpoint should do; `AtBreakpoint` means the execution thread
/// is parked inside [`DebugSession::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DebugState {
    Stopped,
    Started,
    BreakAtNextLine,
    BreakAtNextBreakpoint,
    AtBreakpoint,
}

/// One debug session: the state machine, breakpoint set, poll cursor and the
/// rendezvous primitives coordinating the execution thread with controller
/// threads.
///
/// The handle is cheap to clone; all clones observe the same session. Every
/// field lives behind one per-session mutex, and the only place the
/// execution thread ever blocks is inside [`checkpoint`](Self::checkpoint)
/// while `AtBreakpoint`, holding no other lock, so concurrently running
/// undebugged requests are never delayed.
#[derive(Clone)]
pub struct DebugSession {
    inner: Arc<Inner>,
}

struct Inner {
    task_id: String,
    shared: Mutex<Shared>,
    /// Wakes the execution thread parked at a pause.
    resume: Condvar,
    /// Wakes controller threads parked in `wait_for_updates`.
    updates: Condvar,
}

struct Shared {
    state: DebugState,
    breakpoints: HashSet<AssertionPath>,
    /// Transient "also stop here" paths installed by step-over/step-out;
    /// cleared on every pause and replaced on every release.
    step_targets: HashSet<AssertionPath>,
    current_line: Option<AssertionPath>,
    watch: BTreeSet<String>,
    /// Monotonic counter, bumped on every observable mutation. Totally
    /// orders session changes for the long-poll protocol.
    version: u64,
    /// Version last handed out in a snapshot. Kept per task, not per
    /// caller: the protocol assumes one controller polling sequentially.
    delivered: u64,
    /// Variable store of the in-flight request currently being debugged,
    /// bound for snapshot assembly while the request is attached.
    request: Option<Arc<dyn VariableStore>>,
}

impl DebugSession {
    pub(crate) fn new(task_id: String) -> Self {
        Self {
            inner: Arc::new(Inner {
                task_id,
                shared: Mutex::new(Shared {
                    state: DebugState::Stopped,
                    breakpoints: HashSet::new(),
                    step_targets: HashSet::new(),
                    current_line: None,
                    watch: BTreeSet::new(),
                    version: 1,
                    delivered: 0,
                    request: None,
                }),
                resume: Condvar::new(),
                updates: Condvar::new(),
            }),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.inner.task_id
    }

    pub fn debug_state(&self) -> DebugState {
        self.inner.shared.lock().state
    }

    pub fn current_line(&self) -> Option<AssertionPath> {
        self.inner.shared.lock().current_line.clone()
    }

    /// Arm the session to intercept the next matching request. No-op when
    /// not `Stopped`.
    pub fn start(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.state != DebugState::Stopped {
            return;
        }
        shared.state = DebugState::Started;
        self.touch(&mut shared);
        tracing::debug!(task_id = %self.inner.task_id, "debug session started");
    }

    /// Disable debugging from any state. If the execution thread is parked
    /// at a pause it is released, and the remainder of that request runs
    /// unmonitored; killing someone else's in-flight traffic would be a
    /// worse failure mode than losing observability. Idempotent.
    pub fn stop(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.state == DebugState::Stopped {
            return;
        }
        let released = shared.state == DebugState::AtBreakpoint;
        shared.state = DebugState::Stopped;
        shared.current_line = None;
        shared.step_targets.clear();
        self.touch(&mut shared);
        // Broadcast, not a single-waiter signal: a step/resume racing with
        // this stop must never leave the execution thread parked.
        self.inner.resume.notify_all();
        tracing::debug!(
            task_id = %self.inner.task_id,
            released_execution_thread = released,
            "debug session stopped"
        );
    }

    /// Pause again at the very next checkpoint, regardless of breakpoints.
    pub fn step_into(&self) -> DebugResult<()> {
        self.release(DebugState::BreakAtNextLine, HashSet::new())
    }

    /// Pause next at a real breakpoint or at one of `targets`. The caller
    /// computes the targets (e.g. the sibling after the current composite).
    pub fn step_over(&self, targets: HashSet<AssertionPath>) -> DebugResult<()> {
        self.release(DebugState::BreakAtNextBreakpoint, targets)
    }

    /// Same machinery as [`step_over`](Self::step_over); consoles pass the
    /// enclosing composite's continuation paths instead.
    pub fn step_out(&self, targets: HashSet<AssertionPath>) -> DebugResult<()> {
        self.release(DebugState::BreakAtNextBreakpoint, targets)
    }

    /// Pause next at a real breakpoint only.
    pub fn resume(&self) -> DebugResult<()> {
        self.release(DebugState::BreakAtNextBreakpoint, HashSet::new())
    }

    fn release(&self, next: DebugState, targets: HashSet<AssertionPath>) -> DebugResult<()> {
        let mut shared = self.inner.shared.lock();
        if shared.state != DebugState::AtBreakpoint {
            return Err(DebugError::NotAtBreakpoint(shared.state));
        }
        shared.state = next;
        shared.step_targets = targets;
        self.touch(&mut shared);
        self.inner.resume.notify_all();
        tracing::debug!(task_id = %self.inner.task_id, state = ?next, "released execution thread");
        Ok(())
    }

    /// Flip `path` in the breakpoint set. Legal in any state; the change is
    /// seen by the very next checkpoint evaluation, including one racing
    /// with this call.
    pub fn toggle_breakpoint(&self, path: AssertionPath) {
        let mut shared = self.inner.shared.lock();
        if !shared.breakpoints.remove(&path) {
            shared.breakpoints.insert(path);
        }
        self.touch(&mut shared);
    }

    pub fn remove_all_breakpoints(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.breakpoints.is_empty() {
            return;
        }
        shared.breakpoints.clear();
        self.touch(&mut shared);
    }

    /// Add `name` to the watch list. Idempotent; bumps the version only
    /// when the list actually changes.
    pub fn add_user_context_variable(&self, name: impl Into<String>) {
        let mut shared = self.inner.shared.lock();
        if shared.watch.insert(name.into()) {
            self.touch(&mut shared);
        }
    }

    pub fn remove_user_context_variable(&self, name: &str) {
        let mut shared = self.inner.shared.lock();
        if shared.watch.remove(name) {
            self.touch(&mut shared);
        }
    }

    /// Bind the in-flight request about to execute under this session.
    ///
    /// Returns `false` when the session is stopped or already debugging a
    /// request (only one in-flight request is debugged at a time). Binding
    /// arms an armed session: `Started` becomes `BreakAtNextBreakpoint`, so
    /// persistent breakpoints fire without any controller interaction.
    pub(crate) fn attach(&self, store: Arc<dyn VariableStore>) -> bool {
        let mut shared = self.inner.shared.lock();
        if shared.state == DebugState::Stopped || shared.request.is_some() {
            return false;
        }
        shared.request = Some(store);
        if shared.state == DebugState::Started {
            shared.state = DebugState::BreakAtNextBreakpoint;
        }
        self.touch(&mut shared);
        tracing::debug!(task_id = %self.inner.task_id, "request attached");
        true
    }

    /// Unbind the finished request. Unless the session was stopped
    /// meanwhile, it returns to `Started`, armed for the next request.
    pub(crate) fn detach(&self) {
        let mut shared = self.inner.shared.lock();
        if shared.request.take().is_none() {
            return;
        }
        if shared.state != DebugState::Stopped {
            shared.state = DebugState::Started;
            shared.current_line = None;
            shared.step_targets.clear();
        }
        self.touch(&mut shared);
        tracing::debug!(task_id = %self.inner.task_id, "request detached");
    }

    /// Decide pause/continue for the assertion about to execute at `path`.
    ///
    /// Called on the execution thread, immediately before each assertion of
    /// the attached request. When pausing, blocks until a subsequent
    /// step/resume/stop releases it.
    pub(crate) fn checkpoint(&self, path: &AssertionPath) {
        let mut shared = self.inner.shared.lock();
        let pause = match shared.state {
            DebugState::BreakAtNextLine => true,
            DebugState::BreakAtNextBreakpoint => {
                shared.breakpoints.contains(path) || shared.step_targets.contains(path)
            }
            // Not armed for this request, or stopped mid-flight, or (not
            // normally reachable) already paused: keep traffic moving.
            DebugState::Stopped | DebugState::Started | DebugState::AtBreakpoint => false,
        };
        if !pause {
            tracing::trace!(task_id = %self.inner.task_id, line = %path, "checkpoint passed");
            return;
        }

        shared.state = DebugState::AtBreakpoint;
        shared.current_line = Some(path.clone());
        shared.step_targets.clear();
        self.touch(&mut shared);
        tracing::debug!(task_id = %self.inner.task_id, line = %path, "paused at checkpoint");

        // Park until released. The session lock is dropped while waiting and
        // no other lock is held, so nothing else in the process stalls.
        while shared.state == DebugState::AtBreakpoint {
            self.inner.resume.wait(&mut shared);
        }
        tracing::debug!(
            task_id = %self.inner.task_id,
            line = %path,
            state = ?shared.state,
            "checkpoint released"
        );
    }

    /// Block until the session has changed since the last delivered
    /// snapshot, or `max_wait` elapses.
    ///
    /// Returns `None` on timeout. A controller polling in a loop sees
    /// versions in increasing order and is never handed the same state
    /// twice; a state superseded before the poll arrives is skipped in
    /// favor of the latest one.
    pub fn wait_for_updates(&self, max_wait: Duration) -> Option<DebugSnapshot> {
        let deadline = Instant::now() + max_wait;
        let mut shared = self.inner.shared.lock();
        while shared.version == shared.delivered {
            if self.inner.updates.wait_until(&mut shared, deadline).timed_out()
                && shared.version == shared.delivered
            {
                return None;
            }
        }
        Some(self.deliver(&mut shared))
    }

    /// Assemble a snapshot of the current state, marking it delivered for
    /// the long-poll cursor. Used for the initial snapshot at session
    /// creation; pollers go through [`wait_for_updates`](Self::wait_for_updates).
    pub fn snapshot(&self) -> DebugSnapshot {
        let mut shared = self.inner.shared.lock();
        self.deliver(&mut shared)
    }

    fn deliver(&self, shared: &mut Shared) -> DebugSnapshot {
        shared.delivered = shared.version;
        DebugSnapshot {
            task_id: self.inner.task_id.clone(),
            debug_state: shared.state,
            breakpoints: shared.breakpoints.iter().cloned().collect(),
            current_line: shared.current_line.clone(),
            // The tree reads the live store of the attached request; the
            // store is not under this session's lock, so variable contents
            // are a best-effort view while state/breakpoints/current line
            // are one atomic point-in-time capture.
            context_variables: match &shared.request {
                Some(store) => build_context_tree(&shared.watch, store.as_ref()),
                None => BTreeSet::new(),
            },
        }
    }

    fn touch(&self, shared: &mut Shared) {
        shared.version += 1;
        self.inner.updates.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use keel_policy::MapVariableStore;

    fn path(indices: &[u32]) -> AssertionPath {
        AssertionPath::new(indices.to_vec())
    }

    fn attached_session() -> DebugSession {
        let session = DebugSession::new("task-1".to_string());
        session.start();
        assert!(session.attach(Arc::new(MapVariableStore::new())));
        session
    }

    #[test]
    fn start_is_idempotent() {
        let session = DebugSession::new("task-1".to_string());
        assert_eq!(session.debug_state(), DebugState::Stopped);
        session.start();
        session.start();
        assert_eq!(session.debug_state(), DebugState::Started);
    }

    #[test]
    fn attach_arms_breakpoint_matching() {
        let session = attached_session();
        assert_eq!(session.debug_state(), DebugState::BreakAtNextBreakpoint);
    }

    #[test]
    fn attach_rejected_when_stopped_or_busy() {
        let session = DebugSession::new("task-1".to_string());
        assert!(!session.attach(Arc::new(MapVariableStore::new())));

        let session = attached_session();
        assert!(!session.attach(Arc::new(MapVariableStore::new())));
    }

    #[test]
    fn checkpoint_pauses_only_on_matching_paths() {
        let session = attached_session();
        session.toggle_breakpoint(path(&[2]));

        // Not a breakpoint: the call returns without pausing.
        session.checkpoint(&path(&[0]));
        assert_eq!(session.debug_state(), DebugState::BreakAtNextBreakpoint);
        assert_eq!(session.current_line(), None);
    }

    #[test]
    fn step_outside_pause_is_rejected() {
        let session = attached_session();
        assert_eq!(
            session.resume(),
            Err(DebugError::NotAtBreakpoint(DebugState::BreakAtNextBreakpoint))
        );
        assert_eq!(
            session.step_into(),
            Err(DebugError::NotAtBreakpoint(DebugState::BreakAtNextBreakpoint))
        );
    }

    #[test]
    fn toggle_twice_restores_breakpoint_set() {
        let session = DebugSession::new("task-1".to_string());
        session.toggle_breakpoint(path(&[1]));
        session.toggle_breakpoint(path(&[4, 0]));
        session.toggle_breakpoint(path(&[4, 0]));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.breakpoints.len(), 1);
        assert!(snapshot.breakpoints.contains(&path(&[1])));
    }

    #[test]
    fn detach_returns_to_started() {
        let session = attached_session();
        session.detach();
        assert_eq!(session.debug_state(), DebugState::Started);
        assert_eq!(session.current_line(), None);
    }

    #[test]
    fn detach_preserves_stopped() {
        let session = attached_session();
        session.stop();
        session.detach();
        assert_eq!(session.debug_state(), DebugState::Stopped);
    }

    #[test]
    fn poll_returns_none_without_new_version() {
        let session = DebugSession::new("task-1".to_string());
        // Creation state not yet delivered.
        assert!(session.wait_for_updates(Duration::from_millis(10)).is_some());
        // Nothing changed since: time out empty, not an error.
        assert!(session.wait_for_updates(Duration::from_millis(10)).is_none());

        session.start();
        let snapshot = session.wait_for_updates(Duration::from_millis(10));
        assert_eq!(snapshot.map(|s| s.debug_state), Some(DebugState::Started));
    }

    #[test]
    fn watch_list_edits_are_idempotent() {
        let session = DebugSession::new("task-1".to_string());
        session.snapshot();

        session.add_user_context_variable("a");
        assert!(session.wait_for_updates(Duration::from_millis(10)).is_some());

        // Same name again: no observable change.
        session.add_user_context_variable("a");
        assert!(session.wait_for_updates(Duration::from_millis(10)).is_none());

        session.remove_user_context_variable("a");
        assert!(session.wait_for_updates(Duration::from_millis(10)).is_some());
        session.remove_user_context_variable("a");
        assert!(session.wait_for_updates(Duration::from_millis(10)).is_none());
    }
}
