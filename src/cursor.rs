//! Crawl cursor: the ingestion high-water mark
//!
//! The cursor only moves forward. Once frozen (after a persistence failure)
//! it ignores further advances so the next session re-crawls the same window.

use crate::models::{HighWaterMark, Submission};

/// Session-local view of the high-water mark for one community
#[derive(Debug, Clone, Default)]
pub struct CrawlCursor {
    initial: Option<HighWaterMark>,
    current: Option<HighWaterMark>,
    frozen: bool,
}

impl CrawlCursor {
    /// Cursor starting at the mark recorded by the sink
    #[must_use]
    pub fn new(recorded: Option<HighWaterMark>) -> Self {
        Self {
            initial: recorded.clone(),
            current: recorded,
            frozen: false,
        }
    }

    /// Mark the session started with
    #[must_use]
    pub const fn initial(&self) -> Option<&HighWaterMark> {
        self.initial.as_ref()
    }

    /// Current mark
    #[must_use]
    pub const fn current(&self) -> Option<&HighWaterMark> {
        self.current.as_ref()
    }

    /// True when `submission` is newer than the mark the session started with.
    ///
    /// Incremental crawls only process submissions that pass this check.
    #[must_use]
    pub fn is_unseen(&self, submission: &Submission) -> bool {
        match &self.initial {
            Some(mark) => HighWaterMark::of(submission) > *mark,
            None => true,
        }
    }

    /// Move the mark to `candidate` if it is newer.
    ///
    /// Returns `true` when the mark moved and must be persisted.
    pub fn advance(&mut self, candidate: HighWaterMark) -> bool {
        if self.frozen {
            return false;
        }
        match &self.current {
            Some(current) if candidate <= *current => false,
            _ => {
                self.current = Some(candidate);
                true
            }
        }
    }

    /// Stop advancing for the rest of the session.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// True after [`freeze`](Self::freeze)
    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen
    }
}
