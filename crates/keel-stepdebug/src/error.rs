use thiserror::Error;

use crate::manager::DebugTarget;
use crate::session::DebugState;

pub type DebugResult<T> = Result<T, DebugError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebugError {
    /// The task id does not name a live session. Controllers use this to
    /// detect sessions torn down behind their back.
    #[error("no debug session with task id `{0}`")]
    NoSuchSession(String),

    /// A session is already bound to this target; the existing session is
    /// left untouched.
    #[error("{0} already has a debug session attached")]
    TargetAlreadyDebugged(DebugTarget),

    /// A step/resume operation arrived while the execution thread was not
    /// paused; it has nothing to act on.
    #[error("session is not paused at a breakpoint (state: {0:?})")]
    NotAtBreakpoint(DebugState),
}
