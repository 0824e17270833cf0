//! Data models for ticker mention harvesting
//!
//! This module contains the domain records persisted by the sink, the loosely
//! typed references handed over by the content source, and the summaries
//! returned by a crawl session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MentionError;

/// A valid ticker symbol and its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    /// Exchange symbol, 1-10 characters, case-sensitive
    pub symbol: String,
    /// Company display name
    pub company_name: String,
}

/// One discussion thread, created when first observed and never mutated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Source-assigned submission id
    pub id: String,
    /// Creation time at the source
    pub created_at: DateTime<Utc>,
    /// Score at the time of observation
    pub score: i64,
    /// Comment count at the time of observation
    pub comment_count: i64,
    /// Author identifier
    pub author_id: String,
    /// Community the submission was posted in
    pub source_name: String,
}

/// A comment that mentioned at least one valid ticker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Source-assigned comment id
    pub id: String,
    /// Creation time at the source
    pub created_at: DateTime<Utc>,
    /// Score at the time of observation
    pub score: i64,
    /// Author identifier
    pub author_id: String,
    /// Parent submission id
    pub submission_id: String,
}

/// One observed occurrence of a valid ticker in one comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionEvent {
    /// Deterministic id derived from `(comment_id, ticker)`
    pub mention_id: String,
    /// Submission the comment belongs to
    pub submission_id: String,
    /// Comment the ticker was found in
    pub comment_id: String,
    /// Ticker symbol
    pub ticker: String,
    /// Comment creation time
    pub timestamp: DateTime<Utc>,
    /// Comment score
    pub score: i64,
    /// Community name
    pub source_name: String,
}

impl MentionEvent {
    /// Build the mention id for a `(comment, ticker)` pair.
    ///
    /// Re-ingesting the same comment always yields the same id, which is what
    /// makes inserts idempotent.
    #[must_use]
    pub fn mention_id(comment_id: &str, ticker: &str) -> String {
        format!("{comment_id}|{ticker}")
    }

    /// Build the event for `ticker` found in `comment` of `submission`.
    #[must_use]
    pub fn new(submission: &Submission, comment: &Comment, ticker: &str) -> Self {
        Self {
            mention_id: Self::mention_id(&comment.id, ticker),
            submission_id: submission.id.clone(),
            comment_id: comment.id.clone(),
            ticker: ticker.to_string(),
            timestamp: comment.created_at,
            score: comment.score,
            source_name: submission.source_name.clone(),
        }
    }
}

/// Newest submission whose mentions are durably stored.
///
/// Ordered by creation time first, id second.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HighWaterMark {
    /// Creation time of the submission
    pub created_at: DateTime<Utc>,
    /// Submission id
    pub submission_id: String,
}

impl HighWaterMark {
    /// Mark pointing at `submission`.
    #[must_use]
    pub fn of(submission: &Submission) -> Self {
        Self {
            created_at: submission.created_at,
            submission_id: submission.id.clone(),
        }
    }
}

impl fmt::Display for HighWaterMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.submission_id, self.created_at.to_rfc3339())
    }
}

/// Time window for the `top` listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    /// Past hour
    Hour,
    /// Past day
    Day,
    /// Past week
    Week,
    /// Past month
    Month,
    /// Past year
    Year,
    /// All time
    All,
}

impl TimeWindow {
    /// Query-string value understood by the content source
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }
}

impl FromStr for TimeWindow {
    type Err = MentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            other => Err(MentionError::Configuration(format!(
                "Unknown time window: {other}. Must be one of: hour, day, week, month, year, all"
            ))),
        }
    }
}

/// Listing order requested from the content source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortMode {
    /// Source's "hot" ranking
    Hot,
    /// Newest first
    New,
    /// Highest score within a time window
    Top(TimeWindow),
}

impl SortMode {
    /// Parse a sort name plus the window used when the sort is `top`.
    pub fn parse(sort: &str, window: &str) -> Result<Self, MentionError> {
        match sort.to_lowercase().as_str() {
            "hot" => Ok(Self::Hot),
            "new" => Ok(Self::New),
            "top" => Ok(Self::Top(window.parse()?)),
            other => Err(MentionError::Configuration(format!(
                "Unknown sort order: {other}. Must be one of: hot, new, top"
            ))),
        }
    }

    /// Listing path segment
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::Top(_) => "top",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top(window) => write!(f, "top/{}", window.as_str()),
            other => f.write_str(other.path()),
        }
    }
}

/// How a crawl session chooses its submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    /// Bounded historical backfill ordered by the given ranking
    ColdStart(SortMode),
    /// Only submissions newer than the high-water mark, newest first
    Incremental,
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColdStart(sort) => write!(f, "cold-start ({sort})"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}

/// Submission as delivered by the content source, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRef {
    /// Submission id
    pub id: String,
    /// Creation time in epoch seconds
    pub created_utc: Option<f64>,
    /// Score
    pub score: i64,
    /// Number of comments
    pub num_comments: i64,
    /// Author id, absent for deleted accounts
    pub author_id: Option<String>,
    /// Community name
    pub source_name: Option<String>,
    /// Pinned/announcement flag
    pub stickied: bool,
}

/// Comment as delivered by the content source, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentRef {
    /// Comment id
    pub id: String,
    /// Creation time in epoch seconds
    pub created_utc: Option<f64>,
    /// Score
    pub score: i64,
    /// Author id, absent for deleted accounts
    pub author_id: Option<String>,
    /// Parent submission id
    pub submission_id: Option<String>,
    /// Raw text body
    pub body: Option<String>,
}

/// Rows queued for one transactional flush
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBatch {
    /// Submission the rows belong to
    pub submission: Submission,
    /// Comments carrying at least one queued mention
    pub comments: Vec<Comment>,
    /// Mention events that survived deduplication
    pub mentions: Vec<MentionEvent>,
}

impl PendingBatch {
    /// Empty batch for `submission`.
    #[must_use]
    pub const fn new(submission: Submission) -> Self {
        Self {
            submission,
            comments: Vec::new(),
            mentions: Vec::new(),
        }
    }

    /// Number of queued mention events
    #[must_use]
    pub fn len(&self) -> usize {
        self.mentions.len()
    }

    /// True when no mention is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty()
    }

    /// Take the queued rows, leaving an empty batch for the same submission.
    pub fn take(&mut self) -> Self {
        Self {
            submission: self.submission.clone(),
            comments: std::mem::take(&mut self.comments),
            mentions: std::mem::take(&mut self.mentions),
        }
    }
}

/// A row the sink refused for a reason other than being a duplicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    /// Primary key of the refused row
    pub id: String,
    /// Database error message
    pub reason: String,
}

/// Outcome of persisting rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Whether the submission row was new
    pub submission_inserted: bool,
    /// New comment rows
    pub comments_inserted: usize,
    /// New mention rows
    pub mentions_inserted: usize,
    /// Rows that already existed
    pub duplicates: usize,
    /// Rows refused for other reasons
    pub failed: Vec<RowFailure>,
}

impl BatchReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.submission_inserted |= other.submission_inserted;
        self.comments_inserted += other.comments_inserted;
        self.mentions_inserted += other.mentions_inserted;
        self.duplicates += other.duplicates;
        self.failed.extend(other.failed);
    }
}

/// Aggregate counts returned by a crawl session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Submissions whose comments were scanned and flushed
    pub submissions_processed: usize,
    /// Stickied, malformed or unreachable submissions
    pub submissions_skipped: usize,
    /// Submissions never started because the session was stopped
    pub submissions_cancelled: usize,
    /// Comments run through the extractor
    pub comments_scanned: usize,
    /// Comments skipped as malformed
    pub comments_skipped: usize,
    /// Mention events queued after deduplication
    pub mentions_found: usize,
    /// Mention events rejected by the dedup index
    pub mentions_duplicate: usize,
    /// Mention rows actually inserted
    pub mentions_inserted: usize,
    /// Rows the sink refused individually
    pub rows_failed: usize,
    /// Mark before the session started
    pub mark_before: Option<HighWaterMark>,
    /// Mark after the session ended
    pub mark_after: Option<HighWaterMark>,
}

/// Hourly activity for one ticker, used by the report export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerActivity {
    /// Ticker symbol
    pub ticker: String,
    /// Company display name
    pub company_name: String,
    /// Hour bucket formatted as `%Y-%m-%d %H`
    pub hour: String,
    /// Mentions in the bucket
    pub mention_count: i64,
    /// Sum of comment scores in the bucket
    pub total_score: i64,
}

/// Row counts for the `stats` command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Ticker rows
    pub tickers: usize,
    /// Submission rows
    pub submissions: usize,
    /// Comment rows
    pub comments: usize,
    /// Mention rows
    pub mentions: usize,
}

/// Output format for exported reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Comma-separated values format
    Csv,
    /// Plain text format
    Txt,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Get the file extension for this format
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = MentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "txt" => Ok(Self::Txt),
            "json" => Ok(Self::Json),
            other => Err(MentionError::Configuration(format!(
                "Invalid format: {other}. Must be one of: txt, csv, json"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn submission() -> Submission {
        Submission {
            id: "s1".into(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            score: 10,
            comment_count: 3,
            author_id: "t2_a".into(),
            source_name: "wallstreetbets".into(),
        }
    }

    #[test]
    fn test_mention_id_is_deterministic() {
        assert_eq!(MentionEvent::mention_id("c1", "GME"), "c1|GME");
        assert_eq!(MentionEvent::mention_id("c1", "GME"), MentionEvent::mention_id("c1", "GME"));
        assert_ne!(MentionEvent::mention_id("c1", "GME"), MentionEvent::mention_id("c2", "GME"));
    }

    #[test]
    fn test_mention_event_copies_comment_fields() {
        let sub = submission();
        let comment = Comment {
            id: "c9".into(),
            created_at: Utc.timestamp_opt(1_700_000_500, 0).unwrap(),
            score: 42,
            author_id: "t2_b".into(),
            submission_id: "s1".into(),
        };
        let event = MentionEvent::new(&sub, &comment, "AMC");
        assert_eq!(event.mention_id, "c9|AMC");
        assert_eq!(event.score, 42);
        assert_eq!(event.timestamp, comment.created_at);
        assert_eq!(event.source_name, "wallstreetbets");
    }

    #[test]
    fn test_high_water_mark_ordering() {
        let early = HighWaterMark {
            created_at: Utc.timestamp_opt(100, 0).unwrap(),
            submission_id: "zzz".into(),
        };
        let late = HighWaterMark {
            created_at: Utc.timestamp_opt(200, 0).unwrap(),
            submission_id: "aaa".into(),
        };
        assert!(late > early);
    }

    #[test]
    fn test_sort_mode_parse() {
        assert_eq!(SortMode::parse("hot", "all").unwrap(), SortMode::Hot);
        assert_eq!(SortMode::parse("TOP", "week").unwrap(), SortMode::Top(TimeWindow::Week));
        assert!(matches!(SortMode::parse("rising", "all"), Err(MentionError::Configuration(_))));
        assert!(SortMode::parse("top", "decade").is_err());
    }

    #[test]
    fn test_pending_batch_take_keeps_submission() {
        let mut batch = PendingBatch::new(submission());
        batch.mentions.push(MentionEvent {
            mention_id: "c|X".into(),
            submission_id: "s1".into(),
            comment_id: "c".into(),
            ticker: "X".into(),
            timestamp: Utc.timestamp_opt(1, 0).unwrap(),
            score: 1,
            source_name: "wallstreetbets".into(),
        });
        let taken = batch.take();
        assert_eq!(taken.len(), 1);
        assert!(batch.is_empty());
        assert_eq!(batch.submission.id, "s1");
    }
}
