//! Reconstructing an operation for another replica.
//!
//! [`Tree::generate_braid`] re-derives the splices an operation consists of,
//! expressed against the view of a destination replica. Offsets only advance
//! over content that replica can see.

use crate::op_id::OpId;
use crate::splice::Splice;
use crate::tree::{Tree, Visibility};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a braid splice came to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpliceKind {
    /// Content inserted at an open boundary.
    Insert,
    /// Content inserted beside a closed boundary, replacing what follows.
    Replace,
    /// Removal only.
    Delete,
}

/// A splice produced by [`Tree::generate_braid`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BraidSplice<T> {
    pub splice: Splice<T>,
    /// Sort key of the inserted run, if it carries one.
    pub sort_key: Option<OpId>,
    pub kind: SpliceKind,
}

impl<T> From<BraidSplice<T>> for Splice<T> {
    fn from(braid: BraidSplice<T>) -> Self {
        braid.splice
    }
}

struct Braid<T> {
    splices: Vec<BraidSplice<T>>,
}

impl<T> Braid<T> {
    fn add_insert(&mut self, offset: usize, elems: Vec<T>, sort_key: Option<OpId>, closed: bool) {
        if let Some(prev) = self.splices.last_mut() {
            let extends = prev.kind == SpliceKind::Insert
                || (prev.kind == SpliceKind::Replace && prev.splice.delete == 0);
            if prev.splice.end() == offset && !closed && extends {
                prev.splice.insert.extend(elems);
                return;
            }
        }
        self.splices.push(BraidSplice {
            splice: Splice::new(offset, 0, elems),
            sort_key,
            kind: if closed {
                SpliceKind::Replace
            } else {
                SpliceKind::Insert
            },
        });
    }

    fn add_delete(&mut self, offset: usize, count: usize) {
        if let Some(prev) = self.splices.last_mut() {
            if prev.splice.end() == offset && prev.kind != SpliceKind::Insert {
                prev.splice.delete += count;
                return;
            }
        }
        self.splices.push(BraidSplice {
            splice: Splice::new(offset, count, Vec::new()),
            sort_key: None,
            kind: SpliceKind::Delete,
        });
    }

    fn finish(mut self) -> Vec<BraidSplice<T>> {
        // Several concurrent replacements of one range leave the deletion
        // with only one of them; a replacement still consumes an element.
        for braid in &mut self.splices {
            if braid.kind == SpliceKind::Replace && braid.splice.delete == 0 {
                braid.splice.delete = 1;
            }
        }
        self.splices
    }
}

impl<T: Clone> Tree<T> {
    /// The splices operation `version` contributed, relative to the view
    /// `is_anc` describes.
    ///
    /// Insertions are emitted for every run `version` created, deletions for
    /// every run it tombstoned that is still visible in that view. With
    /// `is_anc` set to the operation's causal past, applying the result to that
    /// view reproduces the operation.
    pub fn generate_braid(
        &self,
        version: &OpId,
        is_anc: impl Fn(&OpId) -> bool,
    ) -> Vec<BraidSplice<T>> {
        let vis = Visibility::new(self.base.clone(), is_anc).excluding(version);
        let mut braid = Braid {
            splices: Vec::new(),
        };
        let mut offset = 0;

        for step in self.walk() {
            let node = step.node;
            let shown = vis.chain(step.version) && !vis.deletes(&node.tombstones);

            if step.version == Some(version) {
                braid.add_insert(
                    offset,
                    node.elems.clone(),
                    node.sort_key.clone(),
                    step.parent_closed,
                );
            } else if shown && !node.is_empty() && node.tombstones.contains(version) {
                braid.add_delete(offset, node.len());
            }

            if shown {
                offset += node.len();
            }
        }

        let splices = braid.finish();
        debug!(%version, splices = splices.len(), "generated braid");
        splices
    }
}
