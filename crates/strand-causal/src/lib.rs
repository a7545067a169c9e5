//! # strand-causal
//!
//! Causal history for the Strand causal tree.
//!
//! The tree never stores which operation saw which; every query takes an
//! ancestor predicate instead. This crate keeps the version DAG a replica
//! needs to answer that predicate:
//! - Parent links for every operation the replica knows
//! - Heads (the current frontier) maintained on insertion
//! - Inclusive ancestor closures and predicates built from them
//! - Lamport sequence numbers for new operation ids
//!
//! ## Example
//!
//! ```rust
//! use strand_causal::VersionGraph;
//! use strand_core::{OpId, Splice, TextTree};
//!
//! let mut graph = VersionGraph::new();
//! let mut tree = TextTree::new();
//!
//! let first = OpId::new(graph.next_seq(&graph.heads()), "alice");
//! tree.add_version(&first, &[Splice::insert(0, "hi".chars())], None, graph.predicate(&[]))
//!     .unwrap();
//! graph.add(first.clone(), vec![]).unwrap();
//!
//! let heads = graph.heads();
//! let second = OpId::new(graph.next_seq(&heads), "alice");
//! assert_eq!(second.seq, 2);
//! tree.add_version(&second, &[Splice::insert(2, "!".chars())], None, graph.predicate(&heads))
//!     .unwrap();
//! graph.add(second, heads).unwrap();
//!
//! assert_eq!(tree.text(graph.predicate(&graph.heads())), "hi!");
//! ```

mod graph;

pub use graph::{GraphError, GraphStats, VersionGraph};
