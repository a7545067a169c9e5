//! Merging an edit into the tree.
//!
//! [`Tree::add_version`] walks the whole tree once. Nodes on chains the caller
//! can see are matched against the pending splices in the caller's view
//! coordinates; every node, seen or not, advances a second offset over the
//! *universal* view (all content no operation has deleted) so each structural
//! change can be re-expressed for peers that see a different history.

use crate::error::{Result, TreeError};
use crate::node::{Node, NodeId};
use crate::op_id::OpId;
use crate::splice::{self, Splice};
use crate::tree::{Tree, Visibility};
use tracing::{debug, trace, warn};

struct Frame {
    id: NodeId,
    prev: Option<NodeId>,
    version: Option<OpId>,
}

/// Where a visible node sits in the walk.
struct Anchor {
    id: NodeId,
    prev: Option<NodeId>,
    has_branches: bool,
    deleted: bool,
}

/// Cursor state of one `add_version` call.
struct Rebase<'s, T> {
    version: &'s OpId,
    sort_key: Option<OpId>,
    splices: &'s [Splice<T>],
    next: usize,
    delete_up_to: usize,
    /// Offset in the caller's view.
    offset: usize,
    /// Offset in the universal view before this edit.
    rebase_offset: usize,
    rebased: Vec<Splice<T>>,
}

impl<'s, T: Clone> Rebase<'s, T> {
    fn done(&self) -> bool {
        self.next == self.splices.len()
    }

    fn new_node(&self, tree: &mut Tree<T>, elems: &[T]) -> NodeId {
        tree.alloc(Node::new(
            Some(self.version.clone()),
            elems.to_vec(),
            false,
            self.sort_key.clone(),
        ))
    }

    fn emit(&mut self, splice: Splice<T>) {
        if let Some(last) = self.rebased.last_mut() {
            if last.end() == splice.offset {
                last.delete += splice.delete;
                last.insert.extend(splice.insert);
                return;
            }
        }
        self.rebased.push(splice);
    }

    /// Match the pending splice against one visible node.
    fn process(&mut self, tree: &mut Tree<T>, at: Anchor) -> Result<()> {
        let splices = self.splices;
        let s = &splices[self.next];
        let Anchor {
            id,
            prev,
            has_branches,
            deleted,
        } = at;
        let node = &tree.nodes[id.0];
        let len = node.len();
        let closed = node.closed;
        let offset = self.offset;
        let was_base = node.tombstones.only(self.version);

        if deleted {
            // Only an insertion right at this point can anchor to deleted content.
            if s.delete == 0 && s.offset == offset {
                if len == 0 && !closed && has_branches {
                    return Ok(());
                }
                let new = self.new_node(tree, &s.insert);
                let position = if len == 0 && !closed {
                    let slot = tree.add_branch(id, new);
                    self.rebase_offset + tree.base_len(&tree.nodes[id.0].branches[..slot], self.version)
                } else {
                    tree.split(id, 0, false, Some(new))?;
                    self.rebase_offset
                };
                trace!(splice = self.next, position, "insert before deleted run");
                self.emit(Splice::new(position, 0, s.insert.clone()));
                self.next += 1;
            }
            return Ok(());
        }

        if s.delete == 0 {
            let end = offset + len;
            if s.offset > end || (s.offset == end && !closed && has_branches) {
                return Ok(());
            }
            let within = s.offset.checked_sub(offset).ok_or_else(|| {
                TreeError::Corrupt(format!("insert at {} passed by the walk", s.offset))
            })?;
            let new = self.new_node(tree, &s.insert);
            let position = if s.offset == end && !closed {
                let slot = tree.add_branch(id, new);
                let own = if was_base { len } else { 0 };
                self.rebase_offset
                    + own
                    + tree.base_len(&tree.nodes[id.0].branches[..slot], self.version)
            } else {
                tree.split(id, within, false, Some(new))?;
                self.rebase_offset + if was_base { within } else { 0 }
            };
            trace!(splice = self.next, position, "insert");
            self.emit(Splice::new(position, 0, s.insert.clone()));
            self.next += 1;
            return Ok(());
        }

        if self.delete_up_to <= offset {
            if s.offset >= offset + len {
                return Ok(());
            }
            let within = s.offset.checked_sub(offset).ok_or_else(|| {
                TreeError::Corrupt(format!("delete at {} passed by the walk", s.offset))
            })?;
            self.delete_up_to = s.end();

            if !s.insert.is_empty() {
                let new = self.new_node(tree, &s.insert);
                match prev.filter(|p| within == 0 && tree.nodes[p.0].closed) {
                    Some(p) => {
                        let slot = tree.add_branch(p, new);
                        let after = tree.base_len(&tree.nodes[p.0].branches[slot + 1..], self.version);
                        let position = self.rebase_offset.checked_sub(after).ok_or_else(|| {
                            TreeError::Corrupt("sibling content exceeds rebase offset".into())
                        })?;
                        trace!(splice = self.next, position, "replace beside closed sibling");
                        self.emit(Splice::new(position, 0, s.insert.clone()));
                    }
                    None => {
                        tree.split(id, within, true, Some(new))?;
                        let position = self.rebase_offset + if was_base { within } else { 0 };
                        trace!(splice = self.next, position, "replace");
                        self.emit(Splice::new(position, 0, s.insert.clone()));
                        return Ok(());
                    }
                }
            } else if within != 0 {
                tree.split(id, within, false, None)?;
                return Ok(());
            }
        }

        if self.delete_up_to > offset {
            if self.delete_up_to <= offset + len {
                if self.delete_up_to < offset + len {
                    tree.split(id, self.delete_up_to - offset, false, None)?;
                }
                self.next += 1;
            }
            let node = &mut tree.nodes[id.0];
            node.tombstones.insert(self.version.clone());
            if was_base {
                let count = node.len();
                trace!(position = self.rebase_offset, count, "delete");
                self.emit(Splice::new(self.rebase_offset, count, Vec::new()));
            }
        }
        Ok(())
    }
}

impl<T: Clone> Tree<T> {
    /// Merge operation `version` into the tree.
    ///
    /// `splices` are expressed against the view `is_anc` describes (the
    /// operation's causal past); `version` itself is never part of that view.
    /// New runs get `sort_key` for sibling ordering, falling back to
    /// `version`.
    ///
    /// Returns the same edit rebased onto the universal view: applied with
    /// [`apply_splices`](crate::apply_splices) to the content no operation had
    /// deleted before this call, it yields that content afterwards.
    ///
    /// Malformed splice lists are rejected before the tree is touched.
    pub fn add_version(
        &mut self,
        version: &OpId,
        splices: &[Splice<T>],
        sort_key: Option<OpId>,
        is_anc: impl Fn(&OpId) -> bool,
    ) -> Result<Vec<Splice<T>>> {
        let vis = Visibility::new(self.base.clone(), is_anc).excluding(version);

        let length = self.visible_len(&vis);
        if let Err(err) = splice::validate(splices, length) {
            warn!(%version, %err, "rejecting edit");
            return Err(err);
        }
        let splices = splice::normalize(splices);
        debug!(%version, splices = splices.len(), length, "adding version");

        let mut state = Rebase {
            version,
            sort_key,
            splices: &splices,
            next: 0,
            delete_up_to: 0,
            offset: 0,
            rebase_offset: 0,
            rebased: Vec::new(),
        };

        let mut stack = vec![Frame {
            id: self.root,
            prev: None,
            version: None,
        }];
        while let Some(frame) = stack.pop() {
            if state.done() {
                break;
            }
            let Frame { id, prev, version: chain } = frame;

            if vis.chain(chain.as_ref()) {
                let node = &self.nodes[id.0];
                let deleted = vis.deletes(&node.tombstones);
                let has_branches = node
                    .branches
                    .iter()
                    .any(|b| vis.chain(self.nodes[b.0].version.as_ref()));
                state.process(
                    self,
                    Anchor {
                        id,
                        prev,
                        has_branches,
                        deleted,
                    },
                )?;
                if !deleted {
                    state.offset += self.nodes[id.0].len();
                }
            }

            // Read the node after processing: a split shortens it and hands
            // the rest to a fresh continuation.
            let node = &self.nodes[id.0];
            if chain.as_ref() != Some(version) && node.tombstones.only(version) {
                state.rebase_offset += node.len();
            }
            if let Some(next) = node.next {
                stack.push(Frame {
                    id: next,
                    prev: Some(id),
                    version: chain,
                });
            }
            for &b in node.branches.iter().rev() {
                stack.push(Frame {
                    id: b,
                    prev: None,
                    version: self.nodes[b.0].version.clone(),
                });
            }
        }

        if !state.done() {
            return Err(TreeError::Unanchored {
                applied: state.next,
                total: splices.len(),
            });
        }
        Ok(state.rebased)
    }
}
