//! One simulated editing replica.
//!
//! A replica owns a text tree, the version graph describing what it has seen
//! and a compactor. Operations travel between replicas as [`Update`]s whose
//! splices are expressed against the view of the operation's parents, so the
//! receiver can replay them with `add_version` under the same predicate.

use serde::{Deserialize, Serialize};
use strand_causal::{GraphError, VersionGraph};
use strand_compaction::{
    CompactionConfig, CompactionError, CompactionResult, Compactor, FrontierUpdate,
};
use strand_core::{OpId, Splice, TextTree, TreeError};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum ReplicaError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Compaction(#[from] CompactionError),

    #[error("Replica {replica} diverged: expected {expected:?}, found {found:?}")]
    Diverged {
        replica: String,
        expected: String,
        found: String,
    },
}

/// An operation on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub version: OpId,
    pub parents: Vec<OpId>,
    pub sort_key: Option<OpId>,
    pub splices: Vec<Splice<char>>,
}

pub struct Replica {
    name: String,
    tree: TextTree,
    graph: VersionGraph,
    compactor: Compactor,
    /// Updates waiting for their parents.
    buffered: Vec<Update>,
}

impl Replica {
    pub fn new(name: impl Into<String>, config: CompactionConfig) -> Self {
        let name = name.into();
        Replica {
            compactor: Compactor::with_config(name.as_str(), config),
            name,
            tree: TextTree::new(),
            graph: VersionGraph::new(),
            buffered: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn heads(&self) -> Vec<OpId> {
        self.graph.heads()
    }

    pub fn text(&self) -> String {
        self.tree.text(self.graph.predicate(&self.graph.heads()))
    }

    pub fn len(&self) -> usize {
        self.tree.len(self.graph.predicate(&self.graph.heads()))
    }

    pub fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    pub fn op_count(&self) -> usize {
        self.graph.len()
    }

    /// Apply a local edit against the current text.
    pub fn edit(&mut self, splices: Vec<Splice<char>>) -> Result<Update, ReplicaError> {
        let parents = self.graph.heads();
        let version = OpId::new(self.graph.next_seq(&parents), self.name.as_str());
        self.tree
            .add_version(&version, &splices, None, self.graph.predicate(&parents))?;
        self.graph.add(version.clone(), parents.clone())?;
        self.compactor.update_local_frontier(self.graph.heads());
        trace!(replica = %self.name, %version, "local edit");

        Ok(Update {
            version,
            parents,
            sort_key: None,
            splices,
        })
    }

    /// Every operation this replica has that is not in the causal past of
    /// `frontier`, parents first.
    pub fn missing_for(&self, frontier: &[OpId]) -> Vec<Update> {
        let known = self.graph.ancestors(frontier);
        self.graph
            .topological_order()
            .into_iter()
            .filter(|v| !known.contains(v))
            .filter_map(|version| {
                let parents = self.graph.parents(&version).ok()?.to_vec();
                let braid = self
                    .tree
                    .generate_braid(&version, self.graph.predicate(&parents));
                let sort_key = braid.iter().find_map(|s| s.sort_key.clone());
                Some(Update {
                    version,
                    parents,
                    sort_key,
                    splices: braid.into_iter().map(Splice::from).collect(),
                })
            })
            .collect()
    }

    /// Accept an update, applying it and anything it unblocks.
    ///
    /// Returns the number of operations applied.
    pub fn receive(&mut self, update: Update) -> Result<usize, ReplicaError> {
        if self.graph.contains(&update.version) {
            return Ok(0);
        }
        self.buffered.push(update);

        let mut applied = 0;
        while let Some(index) = self
            .buffered
            .iter()
            .position(|u| u.parents.iter().all(|p| self.graph.contains(p)))
        {
            let update = self.buffered.swap_remove(index);
            if self.graph.contains(&update.version) {
                continue;
            }
            self.tree.add_version(
                &update.version,
                &update.splices,
                update.sort_key,
                self.graph.predicate(&update.parents),
            )?;
            self.graph.add(update.version, update.parents)?;
            applied += 1;
        }

        if applied > 0 {
            self.compactor.update_local_frontier(self.graph.heads());
        }
        Ok(applied)
    }

    pub fn buffered(&self) -> usize {
        self.buffered.len()
    }

    /// Pull everything `other` has that this replica lacks.
    pub fn pull(&mut self, other: &Replica) -> Result<usize, ReplicaError> {
        let mut applied = 0;
        for update in other.missing_for(&self.graph.heads()) {
            applied += self.receive(update)?;
        }
        debug!(from = %other.name, to = %self.name, applied, "pulled operations");
        Ok(applied)
    }

    pub fn frontier_update(&mut self, time: u64) -> FrontierUpdate {
        self.compactor.set_time(time);
        self.compactor.create_frontier_update()
    }

    pub fn process_frontier(&mut self, update: FrontierUpdate) {
        if update.peer_id != self.name {
            self.compactor.process_peer_update(update);
        }
    }

    pub fn compact(&mut self) -> Result<CompactionResult, ReplicaError> {
        Ok(self.compactor.compact(&mut self.tree, &self.graph)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(name: &str) -> Replica {
        Replica::new(name, CompactionConfig::default())
    }

    #[test]
    fn test_edit_and_pull() {
        let mut alice = replica("alice");
        let mut bob = replica("bob");
        alice.edit(vec![Splice::insert(0, "hello".chars())]).unwrap();
        bob.pull(&alice).unwrap();
        assert_eq!(bob.text(), "hello");

        alice.edit(vec![Splice::insert(5, "!".chars())]).unwrap();
        bob.edit(vec![Splice::replace(0, 1, "J".chars())]).unwrap();
        alice.pull(&bob).unwrap();
        bob.pull(&alice).unwrap();

        assert_eq!(alice.text(), "Jello!");
        assert_eq!(bob.text(), "Jello!");
        assert_eq!(alice.heads(), bob.heads());
    }

    #[test]
    fn test_out_of_order_updates_are_buffered() {
        let mut alice = replica("alice");
        let first = alice.edit(vec![Splice::insert(0, "ab".chars())]).unwrap();
        let second = alice.edit(vec![Splice::insert(2, "c".chars())]).unwrap();

        let mut bob = replica("bob");
        assert_eq!(bob.receive(second.clone()).unwrap(), 0);
        assert_eq!(bob.buffered(), 1);
        assert_eq!(bob.receive(first).unwrap(), 2);
        assert_eq!(bob.buffered(), 0);
        assert_eq!(bob.text(), "abc");

        // duplicates are ignored
        assert_eq!(bob.receive(second).unwrap(), 0);
    }

    #[test]
    fn test_missing_for_skips_known_history() {
        let mut alice = replica("alice");
        alice.edit(vec![Splice::insert(0, "a".chars())]).unwrap();
        let heads = alice.heads();
        alice.edit(vec![Splice::insert(1, "b".chars())]).unwrap();

        let missing = alice.missing_for(&heads);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].parents, heads);
        assert_eq!(missing[0].splices, vec![Splice::insert(1, "b".chars())]);
    }

    #[test]
    fn test_update_serializes() {
        let mut alice = replica("alice");
        let update = alice.edit(vec![Splice::insert(0, "x".chars())]).unwrap();

        let json = serde_json::to_string(&update).unwrap();
        let back: Update = serde_json::from_str(&json).unwrap();
        assert_eq!(back, update);
    }

    #[test]
    fn test_compact_after_exchange() {
        let mut alice = replica("alice");
        let mut bob = replica("bob");
        alice.edit(vec![Splice::insert(0, "abc".chars())]).unwrap();
        bob.pull(&alice).unwrap();
        bob.edit(vec![Splice::delete(1, 1)]).unwrap();
        alice.pull(&bob).unwrap();

        let from_alice = alice.frontier_update(1);
        let from_bob = bob.frontier_update(1);
        alice.process_frontier(from_bob);
        bob.process_frontier(from_alice);

        for replica in [&mut alice, &mut bob] {
            let before = replica.node_count();
            let result = replica.compact().unwrap();
            assert_eq!(result.folded, 2);
            assert!(replica.node_count() < before);
            assert_eq!(replica.text(), "ac");
        }
    }
}
