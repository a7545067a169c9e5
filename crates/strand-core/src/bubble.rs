//! Compaction.
//!
//! [`Tree::apply_bubbles`] folds groups of operations into one representative
//! id and then collapses the structure that no longer needs to be told apart:
//! branch sets owned entirely by their line are lifted into the chain, runs
//! the line itself deleted are emptied, and neighbouring runs that always
//! share visibility are merged.

use crate::node::NodeId;
use crate::op_id::OpId;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Maps an operation id to the representative id of its group.
pub type BubbleMap = HashMap<OpId, OpId>;

/// What one [`Tree::apply_bubbles`] call did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BubbleOutcome {
    /// Runs whose operation id was rewritten.
    pub renamed: usize,
    pub nodes_before: usize,
    pub nodes_after: usize,
}

impl<T> Tree<T> {
    /// Rename operations through `bubbles` and collapse the tree.
    ///
    /// The root line runs under the tree's base version. Content seen through
    /// any predicate that includes every renamed operation is unchanged.
    pub fn apply_bubbles(&mut self, bubbles: &BubbleMap) -> BubbleOutcome {
        let nodes_before = self.nodes.len();
        let renamed = self.rename(bubbles);
        debug!(renamed, nodes_before, "renamed bubbled operations");

        let mut lines = vec![(self.root, self.base.clone())];
        let mut queued = HashSet::from([self.root]);
        while let Some((start, version)) = lines.pop() {
            self.collapse_line(start, version.as_ref(), &mut |id: NodeId, version: Option<OpId>| {
                if queued.insert(id) {
                    lines.push((id, version));
                }
            });
        }

        self.retain_reachable();
        let outcome = BubbleOutcome {
            renamed,
            nodes_before,
            nodes_after: self.nodes.len(),
        };
        info!(
            renamed,
            nodes_before,
            nodes_after = outcome.nodes_after,
            "compacted tree"
        );
        outcome
    }

    fn rename(&mut self, bubbles: &BubbleMap) -> usize {
        let mut renamed = 0;
        for node in &mut self.nodes {
            if let Some(version) = node.version.take() {
                node.version = match bubbles.get(&version) {
                    Some(to) if *to != version => {
                        renamed += 1;
                        node.sort_key.get_or_insert_with(|| version.clone());
                        Some(to.clone())
                    }
                    _ => Some(version),
                };
            }
            node.tombstones.rename(|v| bubbles.get(v).cloned());
        }
        renamed
    }

    /// Collapse one chain whose runs all belong to `version`, handing every
    /// branch left standing to `branch_line`.
    fn collapse_line(
        &mut self,
        start: NodeId,
        version: Option<&OpId>,
        branch_line: &mut impl FnMut(NodeId, Option<OpId>),
    ) {
        let mut prev: Option<NodeId> = None;
        let mut cur = Some(start);

        while let Some(id) = cur {
            if let Some(version) = version {
                let branches = &self.nodes[id.0].branches;
                let owned = !branches.is_empty()
                    && branches
                        .iter()
                        .all(|b| self.nodes[b.0].version.as_ref() == Some(version));
                if owned {
                    self.lift_branches(id);
                }

                let node = &mut self.nodes[id.0];
                if node.tombstones.contains(version) {
                    node.elems.clear();
                    node.tombstones.clear();
                    if let Some(p) = prev {
                        cur = Some(p);
                        continue;
                    }
                }
            }

            let node = &self.nodes[id.0];
            if let Some(next_id) = node.next {
                let next = &self.nodes[next_id.0];
                let mergeable = node.branches.is_empty()
                    && (node.elems.is_empty()
                        || next.elems.is_empty()
                        || node.tombstones == next.tombstones);
                if mergeable {
                    self.absorb_next(id, next_id);
                    continue;
                }
            }

            for &b in &self.nodes[id.0].branches {
                branch_line(b, self.nodes[b.0].version.clone());
            }
            prev = Some(id);
            cur = self.nodes[id.0].next;
        }
    }

    /// Turn the branches of `id` into its continuation, one after the other.
    fn lift_branches(&mut self, id: NodeId) {
        let branches = std::mem::take(&mut self.nodes[id.0].branches);
        let after = self.nodes[id.0].next;
        for (i, &b) in branches.iter().enumerate() {
            let lifted = &mut self.nodes[b.0];
            lifted.version = None;
            lifted.sort_key = None;
            let follow = branches.get(i + 1).copied().or(after);
            self.set_chain_end(b, follow);
        }
        self.nodes[id.0].next = branches.first().copied();
    }

    fn set_chain_end(&mut self, start: NodeId, next: Option<NodeId>) {
        let mut end = start;
        while let Some(n) = self.nodes[end.0].next {
            end = n;
        }
        self.nodes[end.0].next = next;
    }

    /// Merge `next_id` into `id`; the absorbed node becomes unreachable.
    fn absorb_next(&mut self, id: NodeId, next_id: NodeId) {
        let next = &mut self.nodes[next_id.0];
        let mut elems = std::mem::take(&mut next.elems);
        let tombstones = std::mem::take(&mut next.tombstones);
        let closed = next.closed;
        let branches = std::mem::take(&mut next.branches);
        let after = next.next.take();

        let node = &mut self.nodes[id.0];
        if node.elems.is_empty() {
            node.tombstones = tombstones;
        }
        node.elems.append(&mut elems);
        node.closed = closed;
        node.branches = branches;
        node.next = after;
    }
}
