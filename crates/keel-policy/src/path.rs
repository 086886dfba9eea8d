use std::fmt;

use serde::{Deserialize, Serialize};

/// Root-relative location of one assertion inside a nested composite
/// assertion tree: the sequence of child indices walked down from the root.
///
/// Paths are plain values. Equality, hashing and ordering follow the index
/// sequence, so the same type serves both as breakpoint identity and as the
/// "current line" of a paused debug session.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AssertionPath(Vec<u32>);

impl AssertionPath {
    pub fn new(indices: impl Into<Vec<u32>>) -> Self {
        Self(indices.into())
    }

    /// The empty path, addressing the root composite itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn indices(&self) -> &[u32] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Path of the `index`-th child of this assertion.
    pub fn child(&self, index: u32) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Path of the enclosing composite, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Index of this assertion within its parent, or `None` at the root.
    pub fn last_index(&self) -> Option<u32> {
        self.0.last().copied()
    }

    /// Path of the next sibling (same parent, index + 1), or `None` at the
    /// root. The sibling is not guaranteed to exist in any particular tree.
    pub fn next_sibling(&self) -> Option<Self> {
        let last = self.last_index()?;
        let mut indices = self.0.clone();
        *indices.last_mut()? = last + 1;
        Some(Self(indices))
    }

    /// Whether `self` is `other` or a descendant of `other`.
    pub fn starts_with(&self, other: &AssertionPath) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }
}

impl From<Vec<u32>> for AssertionPath {
    fn from(indices: Vec<u32>) -> Self {
        Self(indices)
    }
}

impl FromIterator<u32> for AssertionPath {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for AssertionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        let mut first = true;
        for index in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{index}")?;
            first = false;
        }
        Ok(())
    }
}
