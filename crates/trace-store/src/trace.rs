//! Append-Only Trace with Forward Cursor

use std::sync::Arc;

/// Ordered trace of records with a forward-only read cursor.
///
/// Records stay in insertion (file) order; nothing is re-sorted. Cloning a
/// trace shares the stored records but gives the clone its own cursor, so
/// concurrent replay sessions can each walk the same data from the start.
#[derive(Debug, Clone)]
pub struct Trace<T> {
    /// Shared storage
    items: Arc<Vec<T>>,
    /// Index of the next record to hand out
    cursor: usize,
}

impl<T> Default for Trace<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            cursor: 0,
        }
    }
}

impl<T: Clone> Trace<T> {
    /// Create an empty trace
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a trace from records already in order
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            items: Arc::new(items),
            cursor: 0,
        }
    }

    /// Append a record
    pub fn push(&mut self, item: T) {
        Arc::make_mut(&mut self.items).push(item);
    }

    /// Return the next record and advance, or `None` once exhausted
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&T> {
        let item = self.items.get(self.cursor)?;
        self.cursor += 1;
        Some(item)
    }

    /// Look at the next record without advancing
    pub fn peek(&self) -> Option<&T> {
        self.items.get(self.cursor)
    }

    /// Rewind the cursor to the first record
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the trace holds no records
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Records not yet handed out
    pub fn remaining(&self) -> usize {
        self.items.len() - self.cursor
    }

    /// Iterate over all records regardless of the cursor
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
