//! The causal tree.
//!
//! A [`Tree`] owns every node of one document in an arena and links them by
//! [`NodeId`]. The root node carries no operation id and is always visible.
//! After compaction the tree may also carry a *base version*, the id that
//! settled operations were folded into; it is visible under every predicate.

use crate::error::{Result, TreeError};
use crate::node::{Node, NodeId, Tombstones};
use crate::op_id::OpId;
use std::ops::ControlFlow;

/// A causal tree over elements of type `T`.
#[derive(Clone, Debug)]
pub struct Tree<T> {
    pub(crate) nodes: Vec<Node<T>>,
    pub(crate) root: NodeId,
    pub(crate) base: Option<OpId>,
}

/// A tree of characters, the usual shape for collaborative text.
pub type TextTree = Tree<char>;

impl<T> Tree<T> {
    /// Create a tree holding only the empty root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(None, Vec::new(), false, None)],
            root: NodeId(0),
            base: None,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node<T>> {
        self.nodes.get(id.0)
    }

    /// Number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The id settled operations were renamed to, if the tree was compacted.
    pub fn base_version(&self) -> Option<&OpId> {
        self.base.as_ref()
    }

    pub fn set_base_version(&mut self, base: Option<OpId>) {
        self.base = base;
    }

    pub(crate) fn alloc(&mut self, node: Node<T>) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Split `id` at element `at`.
    ///
    /// The new tail node takes `elems[at..]`, a copy of the tombstones, the
    /// old branches, the old continuation and the old `closed` flag. The head
    /// keeps `elems[..at]`, gets `closed` and `branch` (if any) as its only
    /// branch, and continues into the tail. Returns the tail.
    pub fn split(
        &mut self,
        id: NodeId,
        at: usize,
        closed: bool,
        branch: Option<NodeId>,
    ) -> Result<NodeId> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or_else(|| TreeError::Corrupt(format!("split of unknown node {}", id.0)))?;
        if at > node.elems.len() {
            return Err(TreeError::IndexOutOfBounds {
                index: at,
                length: node.elems.len(),
            });
        }

        let mut tail = Node::new(None, node.elems.split_off(at), node.closed, None);
        tail.tombstones = node.tombstones.clone();
        tail.branches = std::mem::take(&mut node.branches);
        tail.next = node.next.take();

        node.closed = closed;
        node.branches.extend(branch);

        let tail_id = self.alloc(tail);
        self.nodes[id.0].next = Some(tail_id);
        Ok(tail_id)
    }

    /// Insert `child` among `parent`'s branches, keeping them sorted by
    /// sibling key. Returns the slot it landed in.
    pub(crate) fn add_branch(&mut self, parent: NodeId, child: NodeId) -> usize {
        let key = self.nodes[child.0].sibling_key();
        let slot = self.nodes[parent.0]
            .branches
            .partition_point(|b| self.nodes[b.0].sibling_key() <= key);
        self.nodes[parent.0].branches.insert(slot, child);
        slot
    }

    /// Walk every node in document order, ignoring visibility.
    pub(crate) fn walk(&self) -> Walk<'_, T> {
        Walk {
            tree: self,
            stack: vec![(self.root, None, false)],
        }
    }

    /// Walk the subtree hanging off a branch head.
    pub(crate) fn walk_from(&self, head: NodeId) -> Walk<'_, T> {
        let version = self.nodes[head.0].version.as_ref();
        Walk {
            tree: self,
            stack: vec![(head, version, false)],
        }
    }

    /// Content under `heads` that existed before `op` was applied: every run
    /// not created by `op` and not deleted by anything but `op`.
    pub(crate) fn base_len(&self, heads: &[NodeId], op: &OpId) -> usize {
        heads
            .iter()
            .flat_map(|&head| self.walk_from(head))
            .filter(|step| step.version != Some(op) && step.node.tombstones.only(op))
            .map(|step| step.node.len())
            .sum()
    }

    /// Number of visible elements under `is_anc`.
    pub fn len(&self, is_anc: impl Fn(&OpId) -> bool) -> usize {
        self.visible_len(&Visibility::new(self.base.clone(), is_anc))
    }

    pub fn is_empty(&self, is_anc: impl Fn(&OpId) -> bool) -> bool {
        self.len(is_anc) == 0
    }

    pub(crate) fn visible_len<F: Fn(&OpId) -> bool>(&self, vis: &Visibility<F>) -> usize {
        let mut count = 0;
        self.traverse_visible(
            vis,
            false,
            |visit| {
                count += visit.node.len();
                ControlFlow::Continue(())
            },
            |_| {},
        );
        count
    }

    /// Locate the node and in-node index of visible element `index`.
    fn locate(&self, index: usize, is_anc: impl Fn(&OpId) -> bool) -> Option<(NodeId, usize)> {
        let mut found = None;
        self.traverse(is_anc, false, |visit| {
            if index - visit.offset < visit.node.len() {
                found = Some((visit.id, index - visit.offset));
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        });
        found
    }

    /// The element at visible position `index`, if any.
    pub fn get(&self, index: usize, is_anc: impl Fn(&OpId) -> bool) -> Option<&T> {
        let (id, at) = self.locate(index, is_anc)?;
        self.nodes[id.0].elems.get(at)
    }

    /// Overwrite the element at visible position `index` in place.
    ///
    /// This records no provenance: the change is local to this tree and does
    /// not take part in convergence.
    pub fn set(&mut self, index: usize, value: T, is_anc: impl Fn(&OpId) -> bool) -> Result<()> {
        let length = self.len(&is_anc);
        let (id, at) = self
            .locate(index, &is_anc)
            .ok_or(TreeError::IndexOutOfBounds { index, length })?;
        self.nodes[id.0].elems[at] = value;
        Ok(())
    }

    /// Check the structural invariants.
    ///
    /// The root carries no id, branch heads carry one and continuations do
    /// not, branches are sorted by sibling key, and every node in the arena is
    /// reachable from the root exactly once.
    pub fn verify(&self) -> Result<()> {
        enum Link {
            Root,
            Branch,
            Next,
        }

        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![(self.root, Link::Root)];

        while let Some((id, link)) = stack.pop() {
            let node = self
                .nodes
                .get(id.0)
                .ok_or_else(|| TreeError::Corrupt(format!("dangling node reference {}", id.0)))?;
            if std::mem::replace(&mut seen[id.0], true) {
                return Err(TreeError::Corrupt(format!(
                    "node {} is reachable more than once",
                    id.0
                )));
            }

            match link {
                Link::Root if node.version.is_some() => {
                    return Err(TreeError::Corrupt("root carries an operation id".into()));
                }
                Link::Branch if node.version.is_none() => {
                    return Err(TreeError::Corrupt(format!(
                        "branch head {} has no operation id",
                        id.0
                    )));
                }
                Link::Next if node.version.is_some() => {
                    return Err(TreeError::Corrupt(format!(
                        "continuation {} carries its own operation id",
                        id.0
                    )));
                }
                _ => {}
            }

            let keys: Vec<_> = node
                .branches
                .iter()
                .map(|b| self.nodes.get(b.0).and_then(|n| n.sibling_key()))
                .collect();
            if keys.windows(2).any(|pair| pair[0] > pair[1]) {
                return Err(TreeError::Corrupt(format!(
                    "branches of node {} are out of order",
                    id.0
                )));
            }

            if let Some(next) = node.next {
                stack.push((next, Link::Next));
            }
            stack.extend(node.branches.iter().map(|&b| (b, Link::Branch)));
        }

        match seen.iter().position(|reached| !reached) {
            Some(orphan) => Err(TreeError::Corrupt(format!(
                "node {orphan} is not reachable from the root"
            ))),
            None => Ok(()),
        }
    }

    /// Panics if [`Tree::verify`] fails.
    pub fn dbg_check(&self) {
        if let Err(err) = self.verify() {
            panic!("{err}");
        }
    }

    /// Drop unreachable nodes and renumber the rest in document order.
    pub(crate) fn retain_reachable(&mut self) {
        let order: Vec<NodeId> = self.walk().map(|step| step.id).collect();
        let mut remap = vec![None; self.nodes.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.0] = Some(NodeId(new));
        }

        let mut old: Vec<Option<Node<T>>> =
            std::mem::take(&mut self.nodes).into_iter().map(Some).collect();
        self.nodes = order
            .iter()
            .filter_map(|id| old[id.0].take())
            .map(|mut node| {
                node.branches = node.branches.iter().filter_map(|b| remap[b.0]).collect();
                node.next = node.next.and_then(|n| remap[n.0]);
                node
            })
            .collect();
        self.root = NodeId(0);
    }
}

impl<T: Clone> Tree<T> {
    /// The visible content under `is_anc`.
    pub fn content(&self, is_anc: impl Fn(&OpId) -> bool) -> Vec<T> {
        let mut out = Vec::new();
        self.traverse(is_anc, false, |visit| {
            out.extend_from_slice(&visit.node.elems);
            ControlFlow::Continue(())
        });
        out
    }
}

impl Tree<char> {
    pub fn text(&self, is_anc: impl Fn(&OpId) -> bool) -> String {
        self.content(is_anc).into_iter().collect()
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An ancestor predicate extended with the tree's base version.
pub(crate) struct Visibility<F> {
    base: Option<OpId>,
    exclude: Option<OpId>,
    is_anc: F,
}

impl<F: Fn(&OpId) -> bool> Visibility<F> {
    pub(crate) fn new(base: Option<OpId>, is_anc: F) -> Self {
        Self {
            base,
            exclude: None,
            is_anc,
        }
    }

    /// Treat `version` as invisible whatever the predicate says.
    pub(crate) fn excluding(mut self, version: &OpId) -> Self {
        self.exclude = Some(version.clone());
        self
    }

    pub(crate) fn op(&self, version: &OpId) -> bool {
        if self.exclude.as_ref() == Some(version) {
            return false;
        }
        self.base.as_ref() == Some(version) || (self.is_anc)(version)
    }

    /// Visibility of a chain; `None` is the root line.
    pub(crate) fn chain(&self, version: Option<&OpId>) -> bool {
        version.map_or(true, |v| self.op(v))
    }

    pub(crate) fn deletes(&self, tombstones: &Tombstones) -> bool {
        tombstones.any_visible(|v| self.op(v))
    }
}

/// One node reached by [`Walk`].
pub(crate) struct Step<'a, T> {
    pub(crate) id: NodeId,
    pub(crate) node: &'a Node<T>,
    /// Id of the chain the node belongs to.
    pub(crate) version: Option<&'a OpId>,
    /// Set for branch heads whose parent is closed.
    pub(crate) parent_closed: bool,
}

/// Unfiltered document-order iterator.
pub(crate) struct Walk<'a, T> {
    tree: &'a Tree<T>,
    stack: Vec<(NodeId, Option<&'a OpId>, bool)>,
}

impl<'a, T> Iterator for Walk<'a, T> {
    type Item = Step<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        let (id, version, parent_closed) = self.stack.pop()?;
        let node = &tree.nodes[id.0];

        // Branches go on top so they come out before the continuation.
        if let Some(next) = node.next {
            self.stack.push((next, version, false));
        }
        for &b in node.branches.iter().rev() {
            let branch_version = tree.nodes[b.0].version.as_ref();
            self.stack.push((b, branch_version, node.closed));
        }

        Some(Step {
            id,
            node,
            version,
            parent_closed,
        })
    }
}
