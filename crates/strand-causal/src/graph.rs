//! Version DAG storage.
//!
//! [`VersionGraph`] records the parents of every operation a replica has
//! applied and keeps the heads (operations without children) current, so the
//! frontier of the replica is always at hand.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use strand_core::OpId;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during graph operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The operation names parents this graph has not seen yet.
    #[error("Missing parents: {0:?}")]
    MissingParents(Vec<OpId>),

    #[error("Operation not found: {0}")]
    NotFound(OpId),
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// Causal history of the operations known to one replica.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VersionGraph {
    /// Parents of every known operation.
    parents: HashMap<OpId, Vec<OpId>>,

    /// Reverse index: parent -> children.
    children: HashMap<OpId, BTreeSet<OpId>>,

    /// Operations without children.
    heads: BTreeSet<OpId>,
}

impl VersionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `version` with its direct `parents`.
    ///
    /// Adding a known operation again is a no-op. Every parent must already be
    /// in the graph; an operation that arrives early has to wait for its
    /// history.
    pub fn add(&mut self, version: OpId, mut parents: Vec<OpId>) -> Result<()> {
        if self.parents.contains_key(&version) {
            return Ok(());
        }

        let missing: Vec<OpId> = parents
            .iter()
            .filter(|p| !self.parents.contains_key(p))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(GraphError::MissingParents(missing));
        }

        parents.sort();
        parents.dedup();
        for parent in &parents {
            self.heads.remove(parent);
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(version.clone());
        }
        debug!(%version, parents = parents.len(), "recorded operation");
        self.heads.insert(version.clone());
        self.parents.insert(version, parents);
        Ok(())
    }

    pub fn contains(&self, version: &OpId) -> bool {
        self.parents.contains_key(version)
    }

    /// Direct parents of `version`, sorted.
    pub fn parents(&self, version: &OpId) -> Result<&[OpId]> {
        self.parents
            .get(version)
            .map(Vec::as_slice)
            .ok_or_else(|| GraphError::NotFound(version.clone()))
    }

    /// Direct children of `version`, sorted.
    pub fn children(&self, version: &OpId) -> Vec<OpId> {
        self.children
            .get(version)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The current frontier, sorted.
    pub fn heads(&self) -> Vec<OpId> {
        self.heads.iter().cloned().collect()
    }

    /// Every operation in the causal past of `frontier`, the frontier included.
    ///
    /// Unknown ids are skipped.
    pub fn ancestors(&self, frontier: &[OpId]) -> HashSet<OpId> {
        let mut result = HashSet::new();
        let mut queue: VecDeque<&OpId> = frontier.iter().collect();

        while let Some(current) = queue.pop_front() {
            if let Some(parents) = self.parents.get(current) {
                if result.insert(current.clone()) {
                    queue.extend(parents.iter());
                }
            }
        }

        result
    }

    /// Ancestor predicate describing the view at `frontier`.
    ///
    /// The closure owns its ancestor set and stays valid while the graph
    /// keeps growing.
    pub fn predicate(&self, frontier: &[OpId]) -> impl Fn(&OpId) -> bool {
        let known = self.ancestors(frontier);
        move |v: &OpId| known.contains(v)
    }

    /// Sequence number for a new operation whose parents are `frontier`.
    ///
    /// One more than the largest sequence in the frontier's history, so the
    /// new id sorts after all of its ancestors.
    pub fn next_seq(&self, frontier: &[OpId]) -> u64 {
        self.ancestors(frontier)
            .iter()
            .map(|v| v.seq)
            .max()
            .map_or(1, |seq| seq + 1)
    }

    /// All operations with parents before children.
    ///
    /// Ties are broken by id, so every replica holding the same history gets
    /// the same order.
    pub fn topological_order(&self) -> Vec<OpId> {
        // Kahn's algorithm
        let mut in_degree: HashMap<&OpId, usize> = self
            .parents
            .iter()
            .map(|(v, parents)| (v, parents.len()))
            .collect();
        let mut ready: BTreeSet<&OpId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(v, _)| *v)
            .collect();
        let mut result = Vec::with_capacity(self.parents.len());

        while let Some(version) = ready.pop_first() {
            result.push(version.clone());
            for child in self.children.get(version).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        result
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Get statistics about the graph.
    pub fn stats(&self) -> GraphStats {
        let mut depths: HashMap<OpId, usize> = HashMap::new();
        for version in self.topological_order() {
            let depth = self
                .parents
                .get(&version)
                .into_iter()
                .flatten()
                .filter_map(|p| depths.get(p))
                .max()
                .map_or(1, |d| d + 1);
            depths.insert(version, depth);
        }

        GraphStats {
            total_ops: self.parents.len(),
            head_count: self.heads.len(),
            max_depth: depths.values().max().copied().unwrap_or(0),
        }
    }
}

/// Statistics about a version graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphStats {
    pub total_ops: usize,
    pub head_count: usize,
    pub max_depth: usize,
}
