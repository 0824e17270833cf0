//! Collaborator seams of the ingestion pipeline
//!
//! The collector only talks to these traits: a content source that lists
//! submissions and comment trees, a symbol source used once to bootstrap the
//! registry, and a persistence sink whose inserts are idempotent.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    BatchReport, Comment, CommentRef, HighWaterMark, MentionEvent, PendingBatch, SortMode, Submission, SubmissionRef,
    Ticker,
};

/// Social-content API that exposes submissions and their comment trees
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Community this source crawls, used as `source_name` and cursor key
    fn community(&self) -> &str;

    /// List up to `limit` submissions in `sort` order.
    ///
    /// When `cursor` is given the listing stops at the first submission that
    /// is not newer than it.
    async fn list_submissions(
        &self, sort: SortMode, cursor: Option<&HighWaterMark>, limit: usize,
    ) -> Result<Vec<SubmissionRef>>;

    /// Fetch the flattened comment tree of a submission, expanding at most
    /// `expand_limit` "load more" placeholders.
    async fn fetch_comments(&self, submission_id: &str, expand_limit: usize) -> Result<Vec<CommentRef>>;
}

/// Reference-data provider for valid ticker symbols
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SymbolSource: Send + Sync {
    /// All listed symbols with their company names
    async fn list_symbols(&self) -> Result<Vec<Ticker>>;
}

/// Idempotent storage for tickers, submissions, comments and mentions
#[async_trait]
pub trait MentionSink: Send + Sync {
    /// Insert or update one ticker
    async fn upsert_ticker(&self, ticker: &Ticker) -> Result<()>;

    /// Insert or update many tickers in one transaction; returns rows written
    async fn upsert_tickers(&self, tickers: &[Ticker]) -> Result<usize>;

    /// All registered tickers
    async fn list_tickers(&self) -> Result<Vec<Ticker>>;

    /// Number of registered tickers
    async fn count_tickers(&self) -> Result<usize>;

    /// Insert a submission; `false` when it already existed
    async fn insert_submission(&self, submission: &Submission) -> Result<bool>;

    /// Insert a comment; `false` when it already existed
    async fn insert_comment(&self, comment: &Comment) -> Result<bool>;

    /// Insert mentions row by row. Duplicates are counted, other row failures
    /// are reported while the remaining rows are kept.
    async fn insert_mention_batch(&self, mentions: &[MentionEvent]) -> Result<BatchReport>;

    /// Persist a submission with its comments and mentions in one transaction
    async fn persist_batch(&self, batch: &PendingBatch) -> Result<BatchReport>;

    /// Recorded high-water mark for a community
    async fn get_high_water_mark(&self, source_name: &str) -> Result<Option<HighWaterMark>>;

    /// Move the recorded mark forward; `false` when `mark` is not newer
    async fn advance_high_water_mark(&self, source_name: &str, mark: &HighWaterMark) -> Result<bool>;

    /// Ids of every stored mention, used to seed the dedup index
    async fn get_existing_mention_ids(&self) -> Result<HashSet<String>>;
}
