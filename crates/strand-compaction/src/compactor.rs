//! High-level compaction orchestrator.
//!
//! The Compactor ties stability monitoring to the tree: it decides which
//! settled operations have not been folded yet, maps them onto the tree's
//! base version and runs [`Tree::apply_bubbles`].

use crate::stability::{FrontierUpdate, StabilityConfig, StabilityMonitor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strand_causal::VersionGraph;
use strand_core::{BubbleMap, BubbleOutcome, OpId, Tree};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during compaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompactionError {
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for CompactionError {
    fn from(err: serde_json::Error) -> Self {
        CompactionError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CompactionError>;

/// Configuration for the compactor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Whether `tick` compacts on its own when thresholds are met.
    pub auto_compact: bool,

    /// Minimum number of settled, unfolded operations before compacting.
    pub min_settled_ops: usize,

    /// Whether to check the tree and the current view after compaction.
    pub verify_after_compaction: bool,

    pub stability: StabilityConfig,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        CompactionConfig {
            auto_compact: true,
            min_settled_ops: 64,
            verify_after_compaction: true,
            stability: StabilityConfig::default(),
        }
    }
}

impl CompactionConfig {
    /// Parse a configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CompactionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stability.min_peers_for_stability == 0 {
            return Err(CompactionError::InvalidConfig(
                "min_peers_for_stability must be at least 1".to_string(),
            ));
        }
        if self.stability.max_frontier_age == 0 {
            return Err(CompactionError::InvalidConfig(
                "max_frontier_age must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Statistics about compaction operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub compactions: u64,

    /// Total operations folded into the base version.
    pub ops_folded: u64,

    /// Total tree nodes removed.
    pub nodes_removed: u64,

    /// Last compaction timestamp.
    pub last_compaction: Option<u64>,

    /// Tree size after the last compaction.
    pub current_node_count: usize,
}

/// Result of a compaction operation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactionResult {
    /// Operations folded by this run.
    pub folded: usize,

    pub outcome: BubbleOutcome,
}

/// High-level compactor for one replica's tree.
pub struct Compactor {
    config: CompactionConfig,

    stability: StabilityMonitor,

    stats: CompactionStats,

    /// Operations already folded into the base version.
    folded: HashSet<OpId>,

    /// Current logical time.
    current_time: u64,
}

impl Compactor {
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self::with_config(replica_id, CompactionConfig::default())
    }

    pub fn with_config(replica_id: impl Into<String>, config: CompactionConfig) -> Self {
        Compactor {
            stability: StabilityMonitor::with_config(replica_id, config.stability.clone()),
            config,
            stats: CompactionStats::default(),
            folded: HashSet::new(),
            current_time: 0,
        }
    }

    pub fn replica_id(&self) -> &str {
        self.stability.replica_id()
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn stability(&self) -> &StabilityMonitor {
        &self.stability
    }

    pub fn stability_mut(&mut self) -> &mut StabilityMonitor {
        &mut self.stability
    }

    pub fn stats(&self) -> &CompactionStats {
        &self.stats
    }

    pub fn set_time(&mut self, time: u64) {
        self.current_time = time;
    }

    pub fn is_folded(&self, version: &OpId) -> bool {
        self.folded.contains(version)
    }

    /// Update local frontier (call after applying operations).
    pub fn update_local_frontier(&mut self, frontier: Vec<OpId>) {
        self.stability.update_local_frontier(frontier);
    }

    /// Process a frontier update from a peer.
    pub fn process_peer_update(&mut self, update: FrontierUpdate) {
        self.stability.update_peer_frontier(update);
    }

    /// Create a frontier update for broadcasting.
    pub fn create_frontier_update(&self) -> FrontierUpdate {
        self.stability.create_frontier_update(self.current_time)
    }

    /// Settled operations that have not been folded yet, sorted.
    pub fn pending(&self, graph: &VersionGraph) -> Vec<OpId> {
        let mut pending: Vec<OpId> = self
            .stability
            .settled(graph)
            .into_iter()
            .filter(|v| !self.folded.contains(v))
            .collect();
        pending.sort();
        pending
    }

    /// Bubble map folding every pending operation into the base version of
    /// `tree`, or into [`OpId::genesis`] when the tree has none yet.
    pub fn plan<T>(&self, tree: &Tree<T>, graph: &VersionGraph) -> BubbleMap {
        let base = tree.base_version().cloned().unwrap_or_else(OpId::genesis);
        self.pending(graph)
            .into_iter()
            .map(|v| (v, base.clone()))
            .collect()
    }

    /// Check if compaction should be performed.
    pub fn should_compact(&self, graph: &VersionGraph) -> bool {
        if !self.config.auto_compact || !self.stability.has_quorum() {
            return false;
        }
        self.pending(graph).len() >= self.config.min_settled_ops
    }

    /// Fold every pending operation into the tree's base version.
    ///
    /// With verification enabled the tree structure is checked afterwards and
    /// the content at the local frontier must not have changed.
    pub fn compact<T: Clone + PartialEq>(
        &mut self,
        tree: &mut Tree<T>,
        graph: &VersionGraph,
    ) -> Result<CompactionResult> {
        let bubbles = self.plan(tree, graph);
        if bubbles.is_empty() {
            debug!(replica = %self.replica_id(), "nothing settled to fold");
            return Ok(CompactionResult::default());
        }

        let view = graph.predicate(self.stability.local_frontier());
        let before = self
            .config
            .verify_after_compaction
            .then(|| tree.content(&view));

        if tree.base_version().is_none() {
            tree.set_base_version(Some(OpId::genesis()));
        }
        let outcome = tree.apply_bubbles(&bubbles);

        if let Some(before) = before {
            tree.verify()
                .map_err(|err| CompactionError::VerificationFailed(err.to_string()))?;
            if tree.content(&view) != before {
                return Err(CompactionError::VerificationFailed(
                    "content at the local frontier changed".to_string(),
                ));
            }
        }

        let folded = bubbles.len();
        self.folded.extend(bubbles.into_keys());
        self.stats.compactions += 1;
        self.stats.ops_folded += folded as u64;
        self.stats.nodes_removed += outcome.nodes_before.saturating_sub(outcome.nodes_after) as u64;
        self.stats.last_compaction = Some(self.current_time);
        self.stats.current_node_count = outcome.nodes_after;
        info!(
            replica = %self.replica_id(),
            folded,
            nodes_before = outcome.nodes_before,
            nodes_after = outcome.nodes_after,
            "compaction finished"
        );

        Ok(CompactionResult { folded, outcome })
    }

    /// Perform automatic maintenance (GC stale peers, auto-compact if needed).
    pub fn tick<T: Clone + PartialEq>(
        &mut self,
        tree: &mut Tree<T>,
        graph: &VersionGraph,
        time: u64,
    ) -> Result<Option<CompactionResult>> {
        self.current_time = time;
        self.stability.gc_stale_peers(time);

        if self.should_compact(graph) {
            self.compact(tree, graph).map(Some)
        } else {
            Ok(None)
        }
    }
}
