//! Error types for the causal tree.

use thiserror::Error;

/// Errors that can occur while editing or inspecting a tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Splice {index} starts at {offset}, before the end of the previous splice ({previous_end})")]
    UnorderedSplices {
        index: usize,
        offset: usize,
        previous_end: usize,
    },

    #[error("Splice range {offset}..{end} exceeds the visible length {length}")]
    RangeOutOfBounds {
        offset: usize,
        end: usize,
        length: usize,
    },

    #[error("Invalid index: {index} (length: {length})")]
    IndexOutOfBounds { index: usize, length: usize },

    #[error("Only {applied} of {total} splices could be anchored in the tree")]
    Unanchored { applied: usize, total: usize },

    #[error("Tree invariant violated: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;
