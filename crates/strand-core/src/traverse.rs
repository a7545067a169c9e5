//! Ancestor-filtered traversal in document order.
//!
//! The walk keeps an explicit stack instead of recursing, so arbitrarily deep
//! chains of branches cannot exhaust the call stack. Visitors stop the walk by
//! returning [`ControlFlow::Break`].

use crate::node::{Node, NodeId};
use crate::op_id::OpId;
use crate::tree::{Tree, Visibility};
use std::ops::ControlFlow;

/// What a traversal visitor sees for one node.
#[derive(Debug)]
pub struct Visit<'a, T> {
    pub id: NodeId,
    pub node: &'a Node<T>,
    /// Visible elements preceding this node.
    pub offset: usize,
    /// Whether at least one branch of the node is visible.
    pub has_branches: bool,
    /// The node whose continuation this is; `None` for branch heads and the root.
    pub prev: Option<NodeId>,
    /// Id of the chain the node belongs to; `None` on the root line.
    pub version: Option<&'a OpId>,
    /// Whether a visible operation deleted the node's content.
    pub deleted: bool,
}

enum Frame<'a> {
    Visit {
        id: NodeId,
        prev: Option<NodeId>,
        version: Option<&'a OpId>,
    },
    Tail(NodeId),
}

impl<T> Tree<T> {
    /// Visit every node visible under `is_anc` in document order.
    ///
    /// Deleted nodes are skipped and do not count towards offsets unless
    /// `view_deleted` is set.
    pub fn traverse(
        &self,
        is_anc: impl Fn(&OpId) -> bool,
        view_deleted: bool,
        visitor: impl FnMut(Visit<'_, T>) -> ControlFlow<()>,
    ) {
        self.traverse_with_tail(is_anc, view_deleted, visitor, |_| {});
    }

    /// Like [`Tree::traverse`], also calling `tail` on the last node of every
    /// visited chain once that chain's branches are done.
    pub fn traverse_with_tail(
        &self,
        is_anc: impl Fn(&OpId) -> bool,
        view_deleted: bool,
        visitor: impl FnMut(Visit<'_, T>) -> ControlFlow<()>,
        tail: impl FnMut(NodeId),
    ) {
        let vis = Visibility::new(self.base.clone(), is_anc);
        self.traverse_visible(&vis, view_deleted, visitor, tail);
    }

    pub(crate) fn traverse_visible<F: Fn(&OpId) -> bool>(
        &self,
        vis: &Visibility<F>,
        view_deleted: bool,
        mut visitor: impl FnMut(Visit<'_, T>) -> ControlFlow<()>,
        mut tail: impl FnMut(NodeId),
    ) {
        let mut offset = 0;
        let mut stack = vec![Frame::Visit {
            id: self.root,
            prev: None,
            version: None,
        }];

        while let Some(frame) = stack.pop() {
            let (id, prev, version) = match frame {
                Frame::Tail(id) => {
                    tail(id);
                    continue;
                }
                Frame::Visit { id, prev, version } => (id, prev, version),
            };

            let node = &self.nodes[id.0];
            let deleted = vis.deletes(&node.tombstones);
            if view_deleted || !deleted {
                let has_branches = node
                    .branches
                    .iter()
                    .any(|b| vis.chain(self.nodes[b.0].version.as_ref()));
                let visit = Visit {
                    id,
                    node,
                    offset,
                    has_branches,
                    prev,
                    version,
                    deleted,
                };
                if visitor(visit).is_break() {
                    return;
                }
                offset += node.len();
            }

            stack.push(match node.next {
                Some(next) => Frame::Visit {
                    id: next,
                    prev: Some(id),
                    version,
                },
                None => Frame::Tail(id),
            });
            for &b in node.branches.iter().rev() {
                let branch_version = self.nodes[b.0].version.as_ref();
                if vis.chain(branch_version) {
                    stack.push(Frame::Visit {
                        id: b,
                        prev: None,
                        version: branch_version,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{OpId, Splice, TextTree};
    use std::ops::ControlFlow;

    fn id(seq: u64, agent: &str) -> OpId {
        OpId::new(seq, agent)
    }

    /// "abcd" by A, then B (after A) inserts "XY" at 2.
    fn sample() -> (TextTree, OpId, OpId) {
        let a = id(1, "a");
        let b = id(2, "b");
        let mut tree = TextTree::new();
        tree.add_version(&a, &[Splice::insert(0, "abcd".chars())], None, |_: &OpId| false)
            .unwrap();
        tree.add_version(&b, &[Splice::insert(2, "XY".chars())], None, |v: &OpId| *v == a)
            .unwrap();
        (tree, a, b)
    }

    #[test]
    fn test_offsets_follow_visible_content() {
        let (tree, a, _) = sample();

        let mut seen = Vec::new();
        tree.traverse(|_: &OpId| true, false, |visit| {
            seen.push((visit.offset, visit.node.elems().iter().collect::<String>()));
            ControlFlow::Continue(())
        });
        assert_eq!(
            seen,
            vec![
                (0, String::new()),
                (0, "ab".to_string()),
                (2, "XY".to_string()),
                (4, "cd".to_string()),
            ]
        );

        let mut seen = Vec::new();
        tree.traverse(|v: &OpId| *v == a, false, |visit| {
            seen.push((visit.offset, visit.has_branches, visit.version.cloned()));
            ControlFlow::Continue(())
        });
        assert_eq!(
            seen,
            vec![
                (0, true, None),
                (0, false, Some(a.clone())),
                (2, false, Some(a.clone())),
            ]
        );
    }

    #[test]
    fn test_break_stops_walk() {
        let (tree, _, _) = sample();

        let mut visits = 0;
        tree.traverse(|_: &OpId| true, false, |visit| {
            visits += 1;
            if visit.node.len() > 0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(visits, 2);
    }

    #[test]
    fn test_view_deleted() {
        let (mut tree, a, b) = sample();
        let c = id(3, "c");
        let ab = |v: &OpId| *v == a || *v == b;
        tree.add_version(&c, &[Splice::delete(0, 3)], None, ab).unwrap();

        let all = |_: &OpId| true;
        assert_eq!(tree.text(all), "Ycd");

        let mut deleted = Vec::new();
        tree.traverse(all, true, |visit| {
            if visit.deleted {
                deleted.push(visit.node.elems().iter().collect::<String>());
            }
            ControlFlow::Continue(())
        });
        assert_eq!(deleted, vec!["ab".to_string(), "X".to_string()]);

        // without view_deleted the tombstoned runs are never handed out
        let mut count = 0;
        tree.traverse(all, false, |visit| {
            assert!(!visit.deleted);
            count += visit.node.len();
            ControlFlow::Continue(())
        });
        assert_eq!(count, 3);
    }

    #[test]
    fn test_tail_fires_per_chain() {
        let (tree, _, b) = sample();

        let mut tails = Vec::new();
        tree.traverse_with_tail(
            |_: &OpId| true,
            false,
            |_| ControlFlow::Continue(()),
            |id| tails.push(tree.node(id).unwrap().elems().iter().collect::<String>()),
        );
        assert_eq!(
            tails,
            vec!["XY".to_string(), "cd".to_string(), String::new()]
        );

        let mut tails = 0;
        tree.traverse_with_tail(
            |v: &OpId| *v != b,
            false,
            |_| ControlFlow::Continue(()),
            |_| tails += 1,
        );
        assert_eq!(tails, 2);
    }
}
