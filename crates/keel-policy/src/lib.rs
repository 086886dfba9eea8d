//! Policy object model shared by the Keel execution engine and its tooling.
//!
//! This crate provides:
//! - [`AssertionPath`], the value type addressing one assertion inside a
//!   nested composite-assertion tree.
//! - [`PolicyTree`], an arena of assertion nodes with child-index paths,
//!   including the execution-order walk and step-target helpers used by
//!   debugger consoles.
//! - The variable [`Value`] model and the [`VariableStore`] trait through
//!   which tooling reads named values out of an in-flight request.

pub mod assertion;
pub mod path;
pub mod variables;

pub use crate::assertion::{Assertion, AssertionId, AssertionKind, PolicyTree};
pub use crate::path::AssertionPath;
pub use crate::variables::{MapVariableStore, Message, MessagePart, Value, VariableStore};
