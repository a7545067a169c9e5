//! Edit operations.
//!
//! A splice list describes one edit against a view of the document. Every
//! offset refers to the view *before* the edit, so splices never overlap and
//! each one starts at or after the end of the previous one's deleted range.

use crate::error::{Result, TreeError};
use serde::{Deserialize, Serialize};

/// Delete `delete` elements at `offset` and insert `insert` in their place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splice<T> {
    pub offset: usize,
    pub delete: usize,
    pub insert: Vec<T>,
}

impl<T> Splice<T> {
    pub fn new(offset: usize, delete: usize, insert: Vec<T>) -> Self {
        Self {
            offset,
            delete,
            insert,
        }
    }

    pub fn insert(offset: usize, items: impl IntoIterator<Item = T>) -> Self {
        Self::new(offset, 0, items.into_iter().collect())
    }

    pub fn delete(offset: usize, count: usize) -> Self {
        Self::new(offset, count, Vec::new())
    }

    pub fn replace(offset: usize, count: usize, items: impl IntoIterator<Item = T>) -> Self {
        Self::new(offset, count, items.into_iter().collect())
    }

    /// End of the deleted range in the pre-edit view.
    pub fn end(&self) -> usize {
        self.offset + self.delete
    }

    pub fn is_noop(&self) -> bool {
        self.delete == 0 && self.insert.is_empty()
    }
}

/// Check ordering and bounds of a splice list against a view of `length`.
pub(crate) fn validate<T>(splices: &[Splice<T>], length: usize) -> Result<()> {
    let mut previous_end = 0;
    for (index, splice) in splices.iter().enumerate() {
        if splice.offset < previous_end {
            return Err(TreeError::UnorderedSplices {
                index,
                offset: splice.offset,
                previous_end,
            });
        }
        if splice.end() > length {
            return Err(TreeError::RangeOutOfBounds {
                offset: splice.offset,
                end: splice.end(),
                length,
            });
        }
        previous_end = splice.end();
    }
    Ok(())
}

/// Drop no-op splices and fuse each splice into its predecessor when they
/// touch, so consecutive splices are separated by at least one element.
pub(crate) fn normalize<T: Clone>(splices: &[Splice<T>]) -> Vec<Splice<T>> {
    let mut out: Vec<Splice<T>> = Vec::with_capacity(splices.len());
    for splice in splices.iter().filter(|s| !s.is_noop()) {
        match out.last_mut() {
            Some(last) if last.end() == splice.offset => {
                last.delete += splice.delete;
                last.insert.extend(splice.insert.iter().cloned());
            }
            _ => out.push(splice.clone()),
        }
    }
    out
}

/// Apply a splice list to a plain sequence.
pub fn apply_splices<T: Clone>(target: &mut Vec<T>, splices: &[Splice<T>]) -> Result<()> {
    validate(splices, target.len())?;

    // Offsets are pre-edit; track how far earlier splices shifted the rest.
    let mut shift: isize = 0;
    for splice in splices {
        let at = (splice.offset as isize + shift) as usize;
        target.splice(at..at + splice.delete, splice.insert.iter().cloned());
        shift += splice.insert.len() as isize - splice.delete as isize;
    }
    Ok(())
}
