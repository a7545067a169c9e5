//! Stability monitoring for safe compaction.
//!
//! The stability monitor tracks the frontier each replica has reported and
//! works out which operations are settled: in the causal past of every
//! tracked frontier, the local one included.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use strand_causal::VersionGraph;
use strand_core::OpId;
use tracing::debug;

/// Update about a peer's frontier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierUpdate {
    /// The peer that sent this update.
    pub peer_id: String,

    /// The peer's current heads.
    pub frontier: Vec<OpId>,

    /// Timestamp of the update.
    pub timestamp: u64,
}

/// State of stability tracking for a single operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StabilityState {
    /// Not yet delivered to any replica.
    Pending,

    /// Delivered to some but not all replicas.
    Partial {
        delivered_to: HashSet<String>,
        pending_for: HashSet<String>,
    },

    /// Delivered to every tracked replica; safe to fold.
    Stable,

    /// No peer has reported yet.
    Unknown,
}

/// Configuration for stability monitoring.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Minimum number of replicas (this one included) that must be tracked
    /// before anything counts as settled.
    pub min_peers_for_stability: usize,

    /// Maximum age of a peer frontier before the peer is considered stale.
    pub max_frontier_age: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        StabilityConfig {
            min_peers_for_stability: 1,
            max_frontier_age: 10000,
        }
    }
}

/// Monitors the frontiers of all replicas.
pub struct StabilityMonitor {
    replica_id: String,

    /// Last reported heads of each peer.
    peer_frontiers: HashMap<String, Vec<OpId>>,

    /// Timestamp of last update from each peer.
    last_update: HashMap<String, u64>,

    local_frontier: Vec<OpId>,

    config: StabilityConfig,
}

impl StabilityMonitor {
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self::with_config(replica_id, StabilityConfig::default())
    }

    pub fn with_config(replica_id: impl Into<String>, config: StabilityConfig) -> Self {
        StabilityMonitor {
            replica_id: replica_id.into(),
            peer_frontiers: HashMap::new(),
            last_update: HashMap::new(),
            local_frontier: Vec::new(),
            config,
        }
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    pub fn config(&self) -> &StabilityConfig {
        &self.config
    }

    /// Update our local frontier.
    pub fn update_local_frontier(&mut self, frontier: Vec<OpId>) {
        self.local_frontier = frontier;
    }

    /// Record a peer's frontier.
    ///
    /// Reports older than the last one seen from the same peer are ignored.
    pub fn update_peer_frontier(&mut self, update: FrontierUpdate) {
        if let Some(&last) = self.last_update.get(&update.peer_id) {
            if update.timestamp < last {
                debug!(peer = %update.peer_id, "ignoring outdated frontier");
                return;
            }
        }
        self.last_update
            .insert(update.peer_id.clone(), update.timestamp);
        self.peer_frontiers.insert(update.peer_id, update.frontier);
    }

    /// Remove a peer from tracking.
    pub fn remove_peer(&mut self, peer_id: &str) {
        self.peer_frontiers.remove(peer_id);
        self.last_update.remove(peer_id);
    }

    /// Get the list of tracked peers, sorted.
    pub fn tracked_peers(&self) -> Vec<&String> {
        let mut peers: Vec<_> = self.peer_frontiers.keys().collect();
        peers.sort();
        peers
    }

    pub fn peer_count(&self) -> usize {
        self.peer_frontiers.len()
    }

    pub fn peer_frontier(&self, peer_id: &str) -> Option<&[OpId]> {
        self.peer_frontiers.get(peer_id).map(Vec::as_slice)
    }

    pub fn local_frontier(&self) -> &[OpId] {
        &self.local_frontier
    }

    /// Operations in the causal past of every tracked frontier.
    ///
    /// Empty without quorum. Heads the local graph has not seen yet are
    /// skipped, which only makes the set smaller.
    pub fn settled(&self, graph: &VersionGraph) -> HashSet<OpId> {
        if !self.has_quorum() {
            return HashSet::new();
        }

        let mut settled = graph.ancestors(&self.local_frontier);
        for frontier in self.peer_frontiers.values() {
            if settled.is_empty() {
                break;
            }
            let delivered = graph.ancestors(frontier);
            settled.retain(|v| delivered.contains(v));
        }
        settled
    }

    /// Check if a single operation is settled.
    pub fn is_stable(&self, graph: &VersionGraph, version: &OpId) -> bool {
        self.has_quorum()
            && graph.ancestors(&self.local_frontier).contains(version)
            && self
                .peer_frontiers
                .values()
                .all(|frontier| graph.ancestors(frontier).contains(version))
    }

    /// Get the stability state of one operation.
    pub fn stability_state(&self, graph: &VersionGraph, version: &OpId) -> StabilityState {
        if self.peer_frontiers.is_empty() {
            return StabilityState::Unknown;
        }

        let mut delivered_to = HashSet::new();
        let mut pending_for = HashSet::new();

        let replicas = std::iter::once((&self.replica_id, &self.local_frontier))
            .chain(self.peer_frontiers.iter());
        for (replica, frontier) in replicas {
            if graph.ancestors(frontier).contains(version) {
                delivered_to.insert(replica.clone());
            } else {
                pending_for.insert(replica.clone());
            }
        }

        if pending_for.is_empty() {
            StabilityState::Stable
        } else if delivered_to.is_empty() {
            StabilityState::Pending
        } else {
            StabilityState::Partial {
                delivered_to,
                pending_for,
            }
        }
    }

    /// Check if enough replicas are tracked for stability to mean anything.
    pub fn has_quorum(&self) -> bool {
        // +1 for self
        self.peer_frontiers.len() + 1 >= self.config.min_peers_for_stability
    }

    /// Peers whose last frontier update is older than `max_frontier_age`.
    pub fn stale_peers(&self, current_time: u64) -> Vec<String> {
        self.last_update
            .iter()
            .filter(|(_, &update_time)| {
                current_time.saturating_sub(update_time) > self.config.max_frontier_age
            })
            .map(|(peer_id, _)| peer_id.clone())
            .collect()
    }

    /// Remove stale peers.
    pub fn gc_stale_peers(&mut self, current_time: u64) -> usize {
        let stale = self.stale_peers(current_time);
        for peer_id in &stale {
            debug!(peer = %peer_id, "dropping stale peer");
            self.remove_peer(peer_id);
        }
        stale.len()
    }

    pub fn stats(&self, graph: &VersionGraph) -> StabilityStats {
        let local_operations = graph.ancestors(&self.local_frontier).len();
        let settled_operations = self.settled(graph).len();

        StabilityStats {
            peer_count: self.peer_frontiers.len(),
            local_operations,
            settled_operations,
            unsettled_operations: local_operations.saturating_sub(settled_operations),
            has_quorum: self.has_quorum(),
        }
    }

    /// Create a frontier update message for broadcasting.
    pub fn create_frontier_update(&self, timestamp: u64) -> FrontierUpdate {
        FrontierUpdate {
            peer_id: self.replica_id.clone(),
            frontier: self.local_frontier.clone(),
            timestamp,
        }
    }
}

/// Statistics about stability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StabilityStats {
    pub peer_count: usize,
    pub local_operations: usize,
    pub settled_operations: usize,
    pub unsettled_operations: usize,
    pub has_quorum: bool,
}
