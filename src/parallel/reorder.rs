//! Reordering of out-of-order completions into submission order.

use std::collections::BTreeMap;
use thiserror::Error;

/// Rejected insertion into a [`ReorderBuffer`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    #[error("result #{index} was already emitted (next expected is #{next_expected})")]
    AlreadyEmitted { index: usize, next_expected: usize },

    #[error("result #{0} is already buffered")]
    Duplicate(usize),
}

/// Completed-but-unemitted results keyed by submission index.
///
/// The cursor only moves forward, every buffered index is at or past it, and
/// each index leaves the buffer exactly once through [`pop_ready`].
///
/// [`pop_ready`]: ReorderBuffer::pop_ready
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    pending: BTreeMap<usize, T>,
    next_expected: usize,
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReorderBuffer<T> {
    /// Create an empty buffer expecting index 0 first.
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_expected: 0,
        }
    }

    /// Index the next emitted result must carry.
    pub fn next_expected(&self) -> usize {
        self.next_expected
    }

    /// Number of buffered results.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Buffer the result for `index`.
    ///
    /// Never overwrites: an index that is buffered or already emitted is a
    /// logic error and is rejected.
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), InsertError> {
        if index < self.next_expected {
            return Err(InsertError::AlreadyEmitted {
                index,
                next_expected: self.next_expected,
            });
        }
        if self.pending.contains_key(&index) {
            return Err(InsertError::Duplicate(index));
        }
        self.pending.insert(index, value);
        Ok(())
    }

    /// Remove the result at the cursor, if it has arrived, and advance.
    pub fn pop_ready(&mut self) -> Option<T> {
        let value = self.pending.remove(&self.next_expected)?;
        self.next_expected += 1;
        Some(value)
    }
}
