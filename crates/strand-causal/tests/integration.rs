//! Integration tests for the version graph.
//!
//! These tests verify:
//! - Predicates built from the graph drive the causal tree correctly
//! - Lamport ids order descendants after their ancestors
//! - The graph survives a JSON round trip
//! - Topological order respects every parent link

use proptest::prelude::*;
use strand_causal::{GraphError, VersionGraph};
use strand_core::{OpId, Splice, TextTree};

struct Peer {
    name: &'static str,
    graph: VersionGraph,
    tree: TextTree,
}

impl Peer {
    fn new(name: &'static str) -> Self {
        Peer {
            name,
            graph: VersionGraph::new(),
            tree: TextTree::new(),
        }
    }

    fn edit(&mut self, splices: &[Splice<char>]) -> OpId {
        let heads = self.graph.heads();
        let version = OpId::new(self.graph.next_seq(&heads), self.name);
        self.tree
            .add_version(&version, splices, None, self.graph.predicate(&heads))
            .unwrap();
        self.graph.add(version.clone(), heads).unwrap();
        version
    }

    /// Pull every operation `other` has that this peer lacks.
    fn pull(&mut self, other: &Peer) {
        for version in other.graph.topological_order() {
            if self.graph.contains(&version) {
                continue;
            }
            let parents = other.graph.parents(&version).unwrap().to_vec();
            let is_anc = other.graph.predicate(&parents);
            let braid = other.tree.generate_braid(&version, &is_anc);
            let sort_key = braid.iter().find_map(|s| s.sort_key.clone());
            let splices: Vec<Splice<char>> = braid.into_iter().map(Splice::from).collect();
            self.tree
                .add_version(&version, &splices, sort_key, &is_anc)
                .unwrap();
            self.graph.add(version, parents).unwrap();
        }
    }

    fn text(&self) -> String {
        self.tree.text(self.graph.predicate(&self.graph.heads()))
    }
}

#[test]
fn test_two_peers_converge() {
    let mut alice = Peer::new("alice");
    let mut bob = Peer::new("bob");

    alice.edit(&[Splice::insert(0, "hello".chars())]);
    bob.pull(&alice);

    alice.edit(&[Splice::insert(5, " world".chars())]);
    bob.edit(&[Splice::replace(0, 1, "J".chars())]);
    assert_eq!(alice.text(), "hello world");
    assert_eq!(bob.text(), "Jello");

    alice.pull(&bob);
    bob.pull(&alice);

    assert_eq!(alice.text(), "Jello world");
    assert_eq!(bob.text(), "Jello world");
    assert_eq!(alice.graph.heads(), bob.graph.heads());
    assert_eq!(alice.graph.heads().len(), 2);
}

#[test]
fn test_merge_edit_sees_both_branches() {
    let mut alice = Peer::new("alice");
    let mut bob = Peer::new("bob");

    alice.edit(&[Splice::insert(0, "ab".chars())]);
    bob.pull(&alice);
    alice.edit(&[Splice::insert(0, "x".chars())]);
    bob.edit(&[Splice::insert(2, "y".chars())]);
    alice.pull(&bob);

    let merged = alice.edit(&[Splice::delete(0, 4)]);
    assert_eq!(merged.seq, 3);
    assert_eq!(alice.text(), "");
    assert_eq!(alice.graph.heads(), vec![merged]);

    bob.pull(&alice);
    assert_eq!(bob.text(), "");
}

#[test]
fn test_stale_view_is_preserved() {
    let mut alice = Peer::new("alice");
    let first = alice.edit(&[Splice::insert(0, "draft".chars())]);
    alice.edit(&[Splice::delete(0, 5), Splice::insert(5, "final".chars())]);

    assert_eq!(alice.text(), "final");
    assert_eq!(alice.tree.text(alice.graph.predicate(&[first])), "draft");
}

#[test]
fn test_out_of_order_delivery_is_rejected() {
    let mut alice = Peer::new("alice");
    let a = alice.edit(&[Splice::insert(0, "a".chars())]);
    let b = alice.edit(&[Splice::insert(1, "b".chars())]);

    let mut graph = VersionGraph::new();
    assert_eq!(
        graph.add(b.clone(), vec![a.clone()]),
        Err(GraphError::MissingParents(vec![a.clone()]))
    );
    graph.add(a.clone(), vec![]).unwrap();
    graph.add(b.clone(), vec![a]).unwrap();
    assert_eq!(graph.heads(), vec![b]);
}

#[test]
fn test_graph_serialization() {
    let mut alice = Peer::new("alice");
    alice.edit(&[Splice::insert(0, "a".chars())]);
    alice.edit(&[Splice::insert(1, "b".chars())]);

    let json = serde_json::to_string(&alice.graph).unwrap();
    let graph: VersionGraph = serde_json::from_str(&json).unwrap();

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.heads(), alice.graph.heads());
    assert_eq!(graph.topological_order(), alice.graph.topological_order());
}

proptest! {
    #[test]
    fn topological_order_respects_parents(
        picks in prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), 1..20),
    ) {
        let mut graph = VersionGraph::new();
        let mut added: Vec<OpId> = Vec::new();
        for (i, pick) in picks.iter().enumerate() {
            let parents: Vec<OpId> = if added.is_empty() {
                Vec::new()
            } else {
                pick.iter().map(|ix| ix.get(&added).clone()).collect()
            };
            let version = OpId::new(graph.next_seq(&parents), format!("r{i}"));
            graph.add(version.clone(), parents).unwrap();
            added.push(version);
        }

        let order = graph.topological_order();
        prop_assert_eq!(order.len(), added.len());
        for (position, version) in order.iter().enumerate() {
            for parent in graph.parents(version).unwrap() {
                let parent_position = order.iter().position(|v| v == parent).unwrap();
                prop_assert!(parent_position < position);
                // Lamport ids sort after their ancestors
                prop_assert!(parent < version);
            }
        }
        for head in graph.heads() {
            prop_assert!(graph.children(&head).is_empty());
        }
    }
}
