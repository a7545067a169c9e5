//! Nodes of the causal tree.
//!
//! A node is a run of content inserted by one operation. Its `branches` are
//! concurrent continuations starting right after the run, kept sorted by
//! [`Node::sibling_key`]; its `next` is the continuation of the same chain.
//! Document order visits a node, then each branch (with everything hanging
//! off it), then `next`.

use crate::op_id::OpId;
use std::collections::BTreeSet;

/// Stable index of a node inside its tree's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The operations that deleted a node's content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tombstones(BTreeSet<OpId>);

impl Tombstones {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, version: OpId) -> bool {
        self.0.insert(version)
    }

    pub fn contains(&self, version: &OpId) -> bool {
        self.0.contains(version)
    }

    /// True if any deleting operation is visible under `is_visible`.
    pub fn any_visible(&self, mut is_visible: impl FnMut(&OpId) -> bool) -> bool {
        self.0.iter().any(|v| is_visible(v))
    }

    /// True if every deleting operation is `version` (vacuously true when empty).
    pub fn only(&self, version: &OpId) -> bool {
        self.0.iter().all(|v| v == version)
    }

    /// Rewrite every id through `rename`.
    pub fn rename(&mut self, mut rename: impl FnMut(&OpId) -> Option<OpId>) {
        if self.0.iter().all(|v| rename(v).is_none()) {
            return;
        }
        self.0 = std::mem::take(&mut self.0)
            .into_iter()
            .map(|v| rename(&v).unwrap_or(v))
            .collect();
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<OpId> for Tombstones {
    fn from_iter<I: IntoIterator<Item = OpId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A contiguous run of content created by one operation.
#[derive(Clone, Debug, PartialEq)]
pub struct Node<T> {
    /// Set on branch heads only; continuation nodes inherit their chain's id.
    pub(crate) version: Option<OpId>,
    /// Overrides `version` for sibling ordering once compaction renamed the node.
    pub(crate) sort_key: Option<OpId>,
    pub(crate) elems: Vec<T>,
    pub(crate) tombstones: Tombstones,
    /// Concurrent inserts at the end of a closed node become siblings.
    pub(crate) closed: bool,
    pub(crate) branches: Vec<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl<T> Node<T> {
    pub(crate) fn new(
        version: Option<OpId>,
        elems: Vec<T>,
        closed: bool,
        sort_key: Option<OpId>,
    ) -> Self {
        Node {
            version,
            sort_key,
            elems,
            tombstones: Tombstones::new(),
            closed,
            branches: Vec::new(),
            next: None,
        }
    }

    pub fn version(&self) -> Option<&OpId> {
        self.version.as_ref()
    }

    pub fn sort_key(&self) -> Option<&OpId> {
        self.sort_key.as_ref()
    }

    /// The key siblings are ordered by: the sort key if present, else the id.
    pub fn sibling_key(&self) -> Option<&OpId> {
        self.sort_key.as_ref().or(self.version.as_ref())
    }

    pub fn elems(&self) -> &[T] {
        &self.elems
    }

    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn branches(&self) -> &[NodeId] {
        &self.branches
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }
}
