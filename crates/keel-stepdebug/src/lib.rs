//! Interactive, in-process step debugger for Keel policy execution.
//!
//! An operator console attaches to a live policy, sets breakpoints on
//! assertion paths, single-steps, and inspects variable values while a
//! separate thread pushes real traffic through the same policy. The crate
//! provides:
//! - [`DebugManager`], the process-wide session registry and admin surface.
//! - [`DebugSession`], the per-session state machine and the rendezvous
//!   between the execution thread and controller threads.
//! - [`DebugHook`], the single entry point the execution engine calls
//!   before running each assertion of a debugged request.
//! - [`DebugSnapshot`] / [`ContextVariableNode`], the immutable view handed
//!   to controllers by the long-poll protocol.

pub mod context_tree;
pub mod error;
pub mod hook;
pub mod manager;
pub mod session;
pub mod snapshot;

pub use crate::context_tree::ContextVariableNode;
pub use crate::error::{DebugError, DebugResult};
pub use crate::hook::DebugHook;
pub use crate::manager::{DebugManager, DebugTarget};
pub use crate::session::{DebugSession, DebugState};
pub use crate::snapshot::DebugSnapshot;
