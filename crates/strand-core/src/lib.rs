//! # strand-core
//!
//! Causal-tree sequence CRDT for the Strand collaborative editing engine.
//!
//! A document is a branching tree of content runs. Every run was inserted by one
//! operation; concurrent insertions at the same position become sibling
//! branches, deletions add tombstones instead of removing content. Which parts
//! of the tree a replica sees is decided by an *ancestor predicate*: a test that
//! says whether an operation id is in the caller's causal past.
//!
//! This crate provides:
//! - The node/tree model and its ancestor-filtered document-order traversal
//! - `add_version`: merge an edit into the tree and rebase it for broadcast
//! - `generate_braid`: reconstruct an operation's edits for another replica's view
//! - `apply_bubbles`: rename settled operations and collapse the tree
//!
//! ## Example
//!
//! ```rust
//! use strand_core::{OpId, Splice, TextTree};
//!
//! let mut tree = TextTree::new();
//! let a = OpId::new(1, "alice");
//! let b = OpId::new(2, "bob");
//!
//! // alice types "ab" into the empty document
//! tree.add_version(&a, &[Splice::insert(0, "ab".chars())], None, |_: &OpId| false)
//!     .unwrap();
//!
//! // bob, who has seen alice's edit, deletes the "a"
//! tree.add_version(&b, &[Splice::delete(0, 1)], None, |v: &OpId| *v == a)
//!     .unwrap();
//!
//! assert_eq!(tree.text(|v: &OpId| *v == a), "ab");
//! assert_eq!(tree.text(|_: &OpId| true), "b");
//! ```

mod braid;
mod bubble;
mod edit;
pub mod error;
mod node;
mod op_id;
mod splice;
mod traverse;
mod tree;

pub use braid::{BraidSplice, SpliceKind};
pub use bubble::{BubbleMap, BubbleOutcome};
pub use error::{Result, TreeError};
pub use node::{Node, NodeId, Tombstones};
pub use op_id::{OpId, ParseOpIdError};
pub use splice::{apply_splices, Splice};
pub use traverse::Visit;
pub use tree::{TextTree, Tree};

/// Ancestor predicate that sees every operation.
pub fn all_visible(_: &OpId) -> bool {
    true
}
