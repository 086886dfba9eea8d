use crate::path::AssertionPath;

/// Index of an assertion node inside a [`PolicyTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssertionId(u32);

impl AssertionId {
    /// The implicit root composite every policy starts with.
    pub const ROOT: AssertionId = AssertionId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionKind {
    /// A simple assertion with no children.
    Leaf,
    /// Composite: every child must succeed, in order.
    All,
    /// Composite: children are tried in order until one succeeds.
    OneOrMore,
}

impl AssertionKind {
    pub fn is_composite(self) -> bool {
        !matches!(self, AssertionKind::Leaf)
    }
}

#[derive(Debug, Clone)]
pub struct Assertion {
    name: String,
    kind: AssertionKind,
    parent: Option<AssertionId>,
    children: Vec<AssertionId>,
}

impl Assertion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AssertionKind {
        self.kind
    }

    pub fn children(&self) -> &[AssertionId] {
        &self.children
    }
}

/// A policy's assertion tree, stored as an arena of nodes addressed by
/// integer child-index paths.
///
/// The root is an implicit `All` composite; the top-level assertions are its
/// children, so the first top-level assertion has path `[0]`.
#[derive(Debug, Clone)]
pub struct PolicyTree {
    nodes: Vec<Assertion>,
}

impl PolicyTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Assertion {
                name: "policy".to_string(),
                kind: AssertionKind::All,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Append a child assertion under `parent` and return its id.
    pub fn add_child(
        &mut self,
        parent: AssertionId,
        name: impl Into<String>,
        kind: AssertionKind,
    ) -> AssertionId {
        let id = AssertionId(self.nodes.len() as u32);
        self.nodes.push(Assertion {
            name: name.into(),
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0 as usize].children.push(id);
        id
    }

    pub fn node(&self, id: AssertionId) -> &Assertion {
        &self.nodes[id.0 as usize]
    }

    /// Walk `path` down from the root; `None` if any index is out of range.
    pub fn resolve(&self, path: &AssertionPath) -> Option<AssertionId> {
        let mut id = AssertionId::ROOT;
        for &index in path.indices() {
            id = *self.node(id).children.get(index as usize)?;
        }
        Some(id)
    }

    /// The child-index path of `id`, relative to the root.
    pub fn path_of(&self, id: AssertionId) -> AssertionPath {
        let mut indices = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            let index = self
                .node(parent)
                .children
                .iter()
                .position(|&child| child == current)
                .unwrap_or(0) as u32;
            indices.push(index);
            current = parent;
        }
        indices.reverse();
        AssertionPath::new(indices)
    }

    /// All assertions in execution order: a pre-order walk where a composite
    /// is visited before its children. The root itself is not included.
    pub fn execution_order(&self) -> Vec<(AssertionPath, AssertionId)> {
        let mut out = Vec::new();
        self.walk(AssertionId::ROOT, &AssertionPath::root(), &mut out);
        out
    }

    fn walk(
        &self,
        id: AssertionId,
        path: &AssertionPath,
        out: &mut Vec<(AssertionPath, AssertionId)>,
    ) {
        for (index, &child) in self.node(id).children.iter().enumerate() {
            let child_path = path.child(index as u32);
            out.push((child_path.clone(), child));
            self.walk(child, &child_path, out);
        }
    }

    /// Target set for a console "step over" issued while paused at `at`: the
    /// next sibling of `at`, plus the next sibling of each enclosing
    /// composite. The ancestor targets matter inside branching composites,
    /// where the direct sibling may never execute.
    ///
    /// Only paths that actually exist in this tree are returned.
    pub fn step_over_targets(&self, at: &AssertionPath) -> Vec<AssertionPath> {
        let mut targets = Vec::new();
        let mut current = at.clone();
        loop {
            if let Some(sibling) = current.next_sibling() {
                if self.resolve(&sibling).is_some() {
                    targets.push(sibling);
                }
            }
            match current.parent() {
                Some(parent) if !parent.is_root() => current = parent,
                _ => break,
            }
        }
        targets
    }

    /// Target set for a console "step out" issued while paused at `at`: the
    /// next sibling of each enclosing composite, excluding `at`'s own next
    /// sibling.
    pub fn step_out_targets(&self, at: &AssertionPath) -> Vec<AssertionPath> {
        match at.parent() {
            Some(parent) if !parent.is_root() => self.step_over_targets(&parent),
            _ => Vec::new(),
        }
    }
}

impl Default for PolicyTree {
    fn default() -> Self {
        Self::new()
    }
}
