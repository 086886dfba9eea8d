use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::RwLock;

/// One renderable policy variable value.
///
/// The set of kinds is deliberately small: everything tooling can display is
/// either a scalar, an explicit null, or a composite with children
/// (a message with named parts, or a multi-valued variable).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The variable exists but carries no value. Distinct from an empty
    /// string, and rendered as an explicit marker by display layers.
    Null,
    Text(String),
    Number(i64),
    Timestamp(SystemTime),
    Binary(Vec<u8>),
    /// A message with a content type and named sub-parts.
    Message(Message),
    /// A multi-valued variable; children are addressed by position.
    Multi(Vec<Value>),
}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub content_type: String,
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessagePart {
    pub name: String,
    pub value: Value,
}

impl Message {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            parts: Vec::new(),
        }
    }

    pub fn with_part(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parts.push(MessagePart {
            name: name.into(),
            value,
        });
        self
    }
}

/// Read access to the named values of one in-flight request.
///
/// The store belongs to the request being executed and may be mutated by the
/// subject policy at any time; readers get a best-effort view. A name that
/// resolves to `None` has gone out of scope and should be skipped, not
/// treated as an error.
pub trait VariableStore: Send + Sync {
    /// Names the engine always exposes (e.g. the request/response messages),
    /// independent of any user watch list.
    fn builtin_names(&self) -> Vec<String>;

    fn get(&self, name: &str) -> Option<Value>;
}

/// In-memory [`VariableStore`] used by the engine's request context and by
/// tests. Writers and readers run on different threads.
#[derive(Debug, Default)]
pub struct MapVariableStore {
    builtins: Vec<String>,
    values: RwLock<HashMap<String, Value>>,
}

impl MapVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            builtins: names.into_iter().map(Into::into).collect(),
            values: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.values.write().insert(name.into(), value);
    }

    pub fn unset(&self, name: &str) {
        self.values.write().remove(name);
    }
}

impl VariableStore for MapVariableStore {
    fn builtin_names(&self) -> Vec<String> {
        self.builtins.clone()
    }

    fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }
}
