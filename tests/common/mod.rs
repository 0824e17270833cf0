//! Shared fixtures for integration tests: a scripted content source, a sink
//! that can be told to fail, and a throwaway database.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use ticker_mentions::db::Database;
use ticker_mentions::error::{MentionError, Result};
use ticker_mentions::models::{
    BatchReport, Comment, CommentRef, HighWaterMark, MentionEvent, PendingBatch, SortMode, Submission,
    SubmissionRef, Ticker,
};
use ticker_mentions::repository::{ContentSource, MentionSink};
use ticker_mentions::service::StopHandle;

pub const COMMUNITY: &str = "wallstreetbets";
pub const BASE_TIME: f64 = 1_700_000_000.0;

/// Database in a temporary directory that lives as long as the fixture
pub struct TestDb {
    pub db: Arc<Database>,
    _dir: TempDir,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let url = format!("sqlite://{}", dir.path().join("mentions.db").display());
        let db = Database::new(&url).expect("Failed to create database");
        Self {
            db: Arc::new(db),
            _dir: dir,
        }
    }

    /// Database with the given symbols registered
    pub async fn with_tickers(symbols: &[&str]) -> Self {
        let fixture = Self::new();
        let tickers: Vec<Ticker> = symbols
            .iter()
            .map(|s| Ticker {
                symbol: (*s).to_string(),
                company_name: format!("{s} Corp."),
            })
            .collect();
        fixture
            .db
            .upsert_tickers(&tickers)
            .await
            .expect("Failed to register tickers");
        fixture
    }
}

/// Submission created `minutes` after the base time
pub fn submission(id: &str, minutes: u32) -> SubmissionRef {
    SubmissionRef {
        id: id.to_string(),
        created_utc: Some(BASE_TIME + f64::from(minutes) * 60.0),
        score: 10,
        num_comments: 0,
        author_id: Some(format!("t2_{id}")),
        source_name: Some(COMMUNITY.to_string()),
        stickied: false,
    }
}

/// Comment of `submission_id` with the given body
pub fn comment(id: &str, submission_id: &str, body: &str) -> CommentRef {
    CommentRef {
        id: id.to_string(),
        created_utc: Some(BASE_TIME + 30.0),
        score: 5,
        author_id: Some(format!("t2_{id}")),
        submission_id: Some(submission_id.to_string()),
        body: Some(body.to_string()),
    }
}

/// Scripted in-memory content source
#[derive(Default)]
pub struct FakeSource {
    submissions: Mutex<Vec<SubmissionRef>>,
    comments: Mutex<HashMap<String, Vec<CommentRef>>>,
    unavailable: Mutex<HashSet<String>>,
    fetched: Mutex<Vec<String>>,
    stop_after: Mutex<Option<(usize, StopHandle)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_submission(&self, submission: SubmissionRef, comments: Vec<CommentRef>) {
        self.comments
            .lock()
            .unwrap()
            .insert(submission.id.clone(), comments);
        self.submissions.lock().unwrap().push(submission);
    }

    /// Make `fetch_comments` fail for `submission_id` as if retries ran out
    pub fn make_unavailable(&self, submission_id: &str) {
        self.unavailable
            .lock()
            .unwrap()
            .insert(submission_id.to_string());
    }

    /// Let `fetch_comments` succeed again for `submission_id`
    pub fn make_available(&self, submission_id: &str) {
        self.unavailable.lock().unwrap().remove(submission_id);
    }

    /// Fire `handle` once `count` comment trees have been fetched
    pub fn stop_after(&self, count: usize, handle: StopHandle) {
        *self.stop_after.lock().unwrap() = Some((count, handle));
    }

    /// Submission ids whose comments were requested, in call order
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

fn mark_of(submission: &SubmissionRef) -> Option<HighWaterMark> {
    let created_at = ticker_mentions::validation::epoch_to_utc(submission.created_utc)?;
    Some(HighWaterMark {
        created_at,
        submission_id: submission.id.clone(),
    })
}

#[async_trait]
impl ContentSource for FakeSource {
    fn community(&self) -> &str {
        COMMUNITY
    }

    async fn list_submissions(
        &self, sort: SortMode, cursor: Option<&HighWaterMark>, limit: usize,
    ) -> Result<Vec<SubmissionRef>> {
        let mut listed = self.submissions.lock().unwrap().clone();
        if sort == SortMode::New {
            listed.sort_by(|a, b| mark_of(b).cmp(&mark_of(a)));
        }

        let mut out = Vec::new();
        for submission in listed {
            if let (Some(mark), Some(own)) = (cursor, mark_of(&submission)) {
                if own <= *mark {
                    break;
                }
            }
            out.push(submission);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    async fn fetch_comments(&self, submission_id: &str, _expand_limit: usize) -> Result<Vec<CommentRef>> {
        let fetched = {
            let mut fetched = self.fetched.lock().unwrap();
            fetched.push(submission_id.to_string());
            fetched.len()
        };
        if let Some((count, handle)) = self.stop_after.lock().unwrap().as_ref() {
            if fetched >= *count {
                handle.stop();
            }
        }

        if self.unavailable.lock().unwrap().contains(submission_id) {
            return Err(MentionError::SourceUnavailable {
                component: "fake",
                message: "timed out".to_string(),
            });
        }
        Ok(self
            .comments
            .lock()
            .unwrap()
            .get(submission_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Sink that delegates to a database but can refuse batches
pub struct FlakySink {
    pub inner: Arc<Database>,
    pub fail_batches: AtomicBool,
    /// Number of upcoming `persist_batch` calls to refuse
    pub fail_next: AtomicUsize,
    pub batch_attempts: AtomicUsize,
}

impl FlakySink {
    pub fn new(inner: Arc<Database>) -> Self {
        Self {
            inner,
            fail_batches: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            batch_attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MentionSink for FlakySink {
    async fn upsert_ticker(&self, ticker: &Ticker) -> Result<()> {
        self.inner.upsert_ticker(ticker).await
    }

    async fn upsert_tickers(&self, tickers: &[Ticker]) -> Result<usize> {
        self.inner.upsert_tickers(tickers).await
    }

    async fn list_tickers(&self) -> Result<Vec<Ticker>> {
        self.inner.list_tickers().await
    }

    async fn count_tickers(&self) -> Result<usize> {
        self.inner.count_tickers().await
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<bool> {
        self.inner.insert_submission(submission).await
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<bool> {
        self.inner.insert_comment(comment).await
    }

    async fn insert_mention_batch(&self, mentions: &[MentionEvent]) -> Result<BatchReport> {
        self.inner.insert_mention_batch(mentions).await
    }

    async fn persist_batch(&self, batch: &PendingBatch) -> Result<BatchReport> {
        self.batch_attempts.fetch_add(1, Ordering::SeqCst);
        let refuse_once = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse_once || self.fail_batches.load(Ordering::SeqCst) {
            return Err(MentionError::Persistence("disk I/O error".to_string()));
        }
        self.inner.persist_batch(batch).await
    }

    async fn get_high_water_mark(&self, source_name: &str) -> Result<Option<HighWaterMark>> {
        self.inner.get_high_water_mark(source_name).await
    }

    async fn advance_high_water_mark(&self, source_name: &str, mark: &HighWaterMark) -> Result<bool> {
        self.inner.advance_high_water_mark(source_name, mark).await
    }

    async fn get_existing_mention_ids(&self) -> Result<HashSet<String>> {
        self.inner.get_existing_mention_ids().await
    }
}
