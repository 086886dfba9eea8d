use std::cmp::Ordering;
use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use keel_policy::{Value, VariableStore};

/// Marker shown for a variable that exists but has no value, so "unset" is
/// distinguishable from an empty string in the console.
const NULL_MARKER: &str = "<NULL>";

/// One variable in the rendered context tree handed to the controller.
///
/// Values are already rendered to text; composites (messages, multi-valued
/// variables) carry their parts as children annotated with the owner's name
/// and, for multi-valued parents, the position within the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextVariableNode {
    pub name: String,
    pub value: Option<String>,
    pub data_type: Option<String>,
    pub is_user_added: bool,
    pub parent_name: Option<String>,
    /// Position within a multi-valued parent; -1 everywhere else.
    pub child_index: i32,
    pub children: BTreeSet<ContextVariableNode>,
}

/// Presentation order: parent name (case-insensitive, `None` first), then
/// child index, then name (same rules), then user-added last. The remaining
/// fields only break ties, keeping the order total and consistent with `Eq`.
impl Ord for ContextVariableNode {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_opt_name(&self.parent_name, &other.parent_name)
            .then_with(|| self.child_index.cmp(&other.child_index))
            .then_with(|| cmp_name(&self.name, &other.name))
            .then_with(|| self.is_user_added.cmp(&other.is_user_added))
            .then_with(|| self.value.cmp(&other.value))
            .then_with(|| self.data_type.cmp(&other.data_type))
            .then_with(|| self.children.cmp(&other.children))
    }
}

impl PartialOrd for ContextVariableNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn cmp_name(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn cmp_opt_name(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => cmp_name(a, b),
    }
}

/// Build the rendered variable tree for a snapshot: one root per builtin
/// name the store exposes plus one per watched name.
///
/// The store belongs to the request being debugged and may be mutated
/// concurrently; a name that no longer resolves is omitted rather than
/// failing the whole snapshot.
pub(crate) fn build_context_tree(
    watch: &BTreeSet<String>,
    store: &dyn VariableStore,
) -> BTreeSet<ContextVariableNode> {
    let mut roots = BTreeSet::new();
    for name in store.builtin_names() {
        if let Some(value) = store.get(&name) {
            roots.insert(node_for(&name, &value, false, None, -1));
        }
    }
    for name in watch {
        if let Some(value) = store.get(name) {
            roots.insert(node_for(name, &value, true, None, -1));
        }
    }
    roots
}

fn node_for(
    name: &str,
    value: &Value,
    is_user_added: bool,
    parent_name: Option<&str>,
    child_index: i32,
) -> ContextVariableNode {
    let mut node = ContextVariableNode {
        name: name.to_string(),
        value: None,
        data_type: None,
        is_user_added,
        parent_name: parent_name.map(str::to_string),
        child_index,
        children: BTreeSet::new(),
    };

    match value {
        Value::Message(message) => {
            node.value = Some(message.content_type.clone());
            node.data_type = Some("message".to_string());
            for part in &message.parts {
                node.children
                    .insert(node_for(&part.name, &part.value, is_user_added, Some(name), -1));
            }
        }
        Value::Multi(values) => {
            node.data_type = Some("multi".to_string());
            for (index, element) in values.iter().enumerate() {
                node.children
                    .insert(node_for(name, element, is_user_added, Some(name), index as i32));
            }
        }
        scalar => {
            let (rendered, data_type) = render_scalar(scalar);
            node.value = Some(rendered);
            node.data_type = data_type.map(str::to_string);
        }
    }

    node
}

fn render_scalar(value: &Value) -> (String, Option<&'static str>) {
    match value {
        Value::Null => (NULL_MARKER.to_string(), None),
        Value::Text(text) => (text.clone(), Some("string")),
        Value::Number(number) => (number.to_string(), Some("number")),
        Value::Timestamp(at) => {
            let rendered = time::OffsetDateTime::from(*at)
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| format!("{at:?}"));
            (rendered, Some("timestamp"))
        }
        Value::Binary(bytes) => (BASE64.encode(bytes), Some("binary")),
        // Composites are handled by `node_for` before we get here.
        Value::Message(_) | Value::Multi(_) => (String::new(), None),
    }
}
