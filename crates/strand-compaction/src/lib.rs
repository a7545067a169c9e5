//! # strand-compaction
//!
//! Compaction and stability subsystem for the Strand causal tree.
//!
//! This crate provides:
//! - Stability monitoring: track the frontier every peer has reported
//! - Settled sets: operations every tracked replica already has
//! - Compaction: fold settled operations into the tree's base version
//!
//! ## Architecture
//!
//! Compaction keeps the tree from growing with its history by:
//! 1. Tracking which operations are in the causal past of every replica
//! 2. Mapping those operations onto one representative id
//! 3. Running `apply_bubbles` so runs that no view tells apart are merged
//!
//! Folding an operation makes it visible under every predicate, so a
//! replica may only fold what no concurrent operation still in flight could
//! need to see past. Frontier reports therefore have to travel on the same
//! ordered channel as the reporting peer's operations.
//!
//! ## Example
//!
//! ```rust
//! use strand_causal::VersionGraph;
//! use strand_compaction::{Compactor, FrontierUpdate};
//! use strand_core::{OpId, Splice, TextTree};
//!
//! let mut graph = VersionGraph::new();
//! let mut tree = TextTree::new();
//! let a = OpId::new(1, "r1");
//! tree.add_version(&a, &[Splice::insert(0, "abc".chars())], None, |_: &OpId| false)
//!     .unwrap();
//! graph.add(a.clone(), vec![]).unwrap();
//!
//! let mut compactor = Compactor::new("r1");
//! compactor.update_local_frontier(graph.heads());
//! compactor.process_peer_update(FrontierUpdate {
//!     peer_id: "r2".to_string(),
//!     frontier: vec![a],
//!     timestamp: 1,
//! });
//!
//! let result = compactor.compact(&mut tree, &graph).unwrap();
//! assert_eq!(result.folded, 1);
//! assert_eq!(tree.text(|_: &OpId| false), "abc");
//! ```

mod compactor;
mod stability;

pub use compactor::{CompactionConfig, CompactionError, CompactionResult, CompactionStats, Compactor};
pub use stability::{FrontierUpdate, StabilityConfig, StabilityMonitor, StabilityState, StabilityStats};
