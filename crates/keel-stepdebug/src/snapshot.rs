use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use keel_policy::AssertionPath;

use crate::context_tree::ContextVariableNode;
use crate::session::DebugState;

/// Immutable point-in-time view of a session, delivered to the controller
/// by the long-poll protocol.
///
/// State, breakpoints and current line are captured atomically under the
/// session lock; the variable tree is read from the live request store and
/// is best-effort. Nothing here shares mutable structure with the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub task_id: String,
    pub debug_state: DebugState,
    pub breakpoints: BTreeSet<AssertionPath>,
    pub current_line: Option<AssertionPath>,
    pub context_variables: BTreeSet<ContextVariableNode>,
}
