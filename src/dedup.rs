//! In-memory index of recorded mention ids
//!
//! The index is loaded once from the sink at session start and extended as
//! mentions are queued. It only saves round trips; the sink's idempotent insert
//! is what keeps the stored data correct when the index is stale.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Set of mention ids already recorded or queued in this session
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<String>,
}

impl DedupIndex {
    /// Index seeded with the ids already stored by the sink
    #[must_use]
    pub const fn new(existing: HashSet<String>) -> Self {
        Self { seen: existing }
    }

    /// True when `mention_id` has been seen
    #[must_use]
    pub fn contains(&self, mention_id: &str) -> bool {
        self.seen.contains(mention_id)
    }

    /// Remember `mention_id`. Returns `false` if it was already known.
    pub fn record(&mut self, mention_id: &str) -> bool {
        if self.seen.contains(mention_id) {
            return false;
        }
        self.seen.insert(mention_id.to_string())
    }

    /// Number of known ids
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when no id is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Dedup index shared by concurrent submission workers.
///
/// The lock covers one check-then-insert pair at a time.
#[derive(Debug, Default)]
pub struct SharedDedupIndex {
    inner: Mutex<DedupIndex>,
}

impl SharedDedupIndex {
    /// Wrap an index for shared use
    #[must_use]
    pub const fn new(index: DedupIndex) -> Self {
        Self {
            inner: Mutex::new(index),
        }
    }

    /// Record `mention_id` if it is new. Returns `true` when the caller should
    /// queue the mention.
    pub fn check_and_record(&self, mention_id: &str) -> bool {
        // A poisoned lock still holds a consistent set; keep using it.
        let mut index = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        index.record(mention_id)
    }

    /// Number of known ids
    #[must_use]
    pub fn known(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
