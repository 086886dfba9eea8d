use keel_policy::AssertionPath;

use crate::session::DebugSession;

/// Engine-side handle for one in-flight request being debugged.
///
/// The engine obtains a hook from [`DebugManager::attach`] when it starts
/// processing a request for a debugged target, calls
/// [`checkpoint`](Self::checkpoint) before every assertion, and drops the
/// hook (or calls [`finished`](Self::finished)) when the request completes.
/// Dropping without an explicit `finished` still detaches the request, so a
/// request that errors out mid-policy cannot wedge its session.
///
/// [`DebugManager::attach`]: crate::manager::DebugManager::attach
pub struct DebugHook {
    session: DebugSession,
    detached: bool,
}

impl DebugHook {
    pub(crate) fn new(session: DebugSession) -> Self {
        Self {
            session,
            detached: false,
        }
    }

    pub fn task_id(&self) -> &str {
        self.session.task_id()
    }

    /// Consult the session before executing the assertion at `path`. May
    /// block the calling thread for an unbounded time, until an operator
    /// acts or the session is stopped.
    pub fn checkpoint(&self, path: &AssertionPath) {
        self.session.checkpoint(path);
    }

    /// The request finished; re-arm the session for the next one.
    pub fn finished(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.detached {
            self.detached = true;
            self.session.detach();
        }
    }
}

impl Drop for DebugHook {
    fn drop(&mut self) {
        self.detach();
    }
}
