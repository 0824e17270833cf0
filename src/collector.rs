//! Crawl session: list submissions, scan comment trees, persist mentions
//!
//! A session moves forward through `Init -> Crawling -> Flushing -> Done`.
//! Comment trees of up to `concurrency` submissions are fetched at once, but
//! results are consumed in submission order (oldest first) so the cursor only
//! ever moves over a contiguous prefix of finished work. The mark is written to
//! the sink once, in the flushing phase, and never after a persistence failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::cursor::CrawlCursor;
use crate::dedup::{DedupIndex, SharedDedupIndex};
use crate::error::{MentionError, Result};
use crate::extract::{extract, TickerRegistry};
use crate::metrics::{CrawlMetrics, MetricsTimer};
use crate::models::{
    BatchReport, CrawlMode, HighWaterMark, MentionEvent, PendingBatch, SessionReport, SortMode, Submission,
    SubmissionRef,
};
use crate::registry::load_registry;
use crate::repository::{ContentSource, MentionSink};
use crate::service::StopSignal;
use crate::validation::InputValidator;

/// Session lifecycle; phases only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionPhase {
    /// Loading the registry, dedup index and mark
    Init,
    /// Listing and processing submissions
    Crawling,
    /// Recording the high-water mark
    Flushing,
    /// Session over, successfully or not
    Done,
}

/// Tuning knobs of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    /// Queued mentions that trigger a flush
    pub flush_threshold: usize,
    /// Submissions processed at once
    pub concurrency: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            flush_threshold: 100,
            concurrency: 4,
        }
    }
}

impl From<&CrawlConfig> for CollectorSettings {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            flush_threshold: config.flush_threshold,
            concurrency: config.concurrency,
        }
    }
}

/// Counters gathered while processing one submission
#[derive(Debug, Default)]
struct SubmissionStats {
    comments_scanned: usize,
    comments_skipped: usize,
    mentions_found: usize,
    mentions_duplicate: usize,
    persisted: BatchReport,
}

enum SubmissionOutcome {
    /// Comments scanned and every batch flushed
    Processed(HighWaterMark, SubmissionStats),
    /// Comment tree unavailable after retries; the next session re-fetches it
    Skipped,
    /// Not started because the session is stopping
    Cancelled,
    /// A batch could not be persisted
    Failed(MentionError, SubmissionStats),
}

/// Runs crawl sessions against one content source and one sink
pub struct Collector {
    source: Arc<dyn ContentSource>,
    sink: Arc<dyn MentionSink>,
    settings: CollectorSettings,
    metrics: CrawlMetrics,
    phase: SessionPhase,
}

impl Collector {
    pub fn new(source: Arc<dyn ContentSource>, sink: Arc<dyn MentionSink>, settings: CollectorSettings) -> Self {
        Self {
            source,
            sink,
            settings,
            metrics: CrawlMetrics,
            phase: SessionPhase::Done,
        }
    }

    /// Phase of the current or last session
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    fn enter(&mut self, next: SessionPhase) {
        if next < self.phase {
            warn!(from = ?self.phase, to = ?next, "Ignoring backward session transition");
            return;
        }
        debug!(from = ?self.phase, to = ?next, "Session phase");
        self.phase = next;
    }

    /// Run one session.
    ///
    /// Source failures and malformed records are logged and skipped. A batch
    /// that cannot be persisted after one retry aborts the session with
    /// [`MentionError::Persistence`] and leaves the recorded mark untouched.
    pub async fn run(
        &mut self, mode: CrawlMode, submission_limit: usize, comment_limit: usize, stop: &StopSignal,
    ) -> Result<SessionReport> {
        let started = Instant::now();
        self.phase = SessionPhase::Init;
        let community = self.source.community().to_string();

        let registry = load_registry(self.sink.as_ref()).await?;
        self.metrics.record_registry_size(registry.len());
        let dedup = SharedDedupIndex::new(DedupIndex::new(self.sink.get_existing_mention_ids().await?));
        let mut cursor = CrawlCursor::new(self.sink.get_high_water_mark(&community).await?);

        let mut report = SessionReport {
            mark_before: cursor.current().cloned(),
            ..SessionReport::default()
        };
        info!(
            mode = %mode,
            community = %community,
            registry = registry.len(),
            known_mentions = dedup.known(),
            mark = ?report.mark_before,
            "Crawl session starting"
        );

        self.enter(SessionPhase::Crawling);
        let (sort, listing_mark) = match mode {
            CrawlMode::ColdStart(sort) => (sort, None),
            CrawlMode::Incremental => (SortMode::New, cursor.initial()),
        };

        let listed = match self.source.list_submissions(sort, listing_mark, submission_limit).await {
            Ok(listed) => listed,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(component = e.component(), error = %e, "Listing unavailable, nothing to crawl");
                Vec::new()
            },
        };

        let work = self.select_work(listed, &community, &cursor, mode, &mut report);
        let aborted = AtomicBool::new(false);
        let mut failure: Option<MentionError> = None;

        {
            let this = &*self;
            let registry = &registry;
            let dedup = &dedup;
            let aborted = &aborted;
            let mut outcomes = stream::iter(
                work.into_iter()
                    .map(|submission| this.process_submission(submission, comment_limit, registry, dedup, stop, aborted)),
            )
            .buffered(this.settings.concurrency.max(1));

            while let Some(outcome) = outcomes.next().await {
                match outcome {
                    SubmissionOutcome::Processed(mark, stats) => {
                        report.submissions_processed += 1;
                        absorb(&mut report, stats);
                        cursor.advance(mark);
                    },
                    SubmissionOutcome::Skipped => {
                        report.submissions_skipped += 1;
                        cursor.freeze();
                    },
                    SubmissionOutcome::Cancelled => {
                        report.submissions_cancelled += 1;
                        cursor.freeze();
                    },
                    SubmissionOutcome::Failed(e, stats) => {
                        absorb(&mut report, stats);
                        cursor.freeze();
                        aborted.store(true, Ordering::SeqCst);
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    },
                }
            }
        }

        self.enter(SessionPhase::Flushing);
        if let Some(e) = failure {
            report.mark_after = report.mark_before.clone();
            self.finish(mode, &report, started, false);
            return Err(e);
        }

        if let Some(mark) = cursor.current() {
            if report.mark_before.as_ref() != Some(mark) {
                self.sink
                    .advance_high_water_mark(&community, mark)
                    .await
                    .map_err(|e| MentionError::Persistence(format!("recording high-water mark: {e}")))?;
            }
        }
        report.mark_after = cursor.current().cloned();

        if stop.is_stopped() {
            info!(cancelled = report.submissions_cancelled, "Session stopped before all submissions were processed");
        }
        self.finish(mode, &report, started, true);
        Ok(report)
    }

    /// Validate and order the listed submissions, oldest first.
    fn select_work(
        &self, listed: Vec<SubmissionRef>, community: &str, cursor: &CrawlCursor, mode: CrawlMode,
        report: &mut SessionReport,
    ) -> Vec<Submission> {
        let mut work = Vec::with_capacity(listed.len());
        for raw in listed {
            if raw.stickied {
                debug!(submission_id = %raw.id, "Skipping stickied submission");
                self.metrics.record_submission_skipped("stickied");
                report.submissions_skipped += 1;
                continue;
            }

            let submission = match InputValidator::validate_submission(&raw, community) {
                Ok(submission) => submission,
                Err(e) => {
                    warn!(submission_id = %raw.id, error = %e, "Skipping malformed submission");
                    self.metrics.record_submission_skipped("malformed");
                    report.submissions_skipped += 1;
                    continue;
                },
            };

            if mode == CrawlMode::Incremental && !cursor.is_unseen(&submission) {
                debug!(submission_id = %submission.id, "Submission not newer than the mark");
                continue;
            }
            work.push(submission);
        }

        work.sort_by_key(HighWaterMark::of);
        work.dedup_by(|a, b| a.id == b.id);
        work
    }

    async fn process_submission(
        &self, submission: Submission, comment_limit: usize, registry: &TickerRegistry, dedup: &SharedDedupIndex,
        stop: &StopSignal, aborted: &AtomicBool,
    ) -> SubmissionOutcome {
        if stop.is_stopped() || aborted.load(Ordering::SeqCst) {
            return SubmissionOutcome::Cancelled;
        }

        let comments = match self.source.fetch_comments(&submission.id, comment_limit).await {
            Ok(comments) => comments,
            Err(e) if e.is_fatal() => return SubmissionOutcome::Failed(e, SubmissionStats::default()),
            Err(e) => {
                warn!(submission_id = %submission.id, error = %e, "Skipping submission, comments unavailable");
                self.metrics.record_submission_skipped("source_unavailable");
                return SubmissionOutcome::Skipped;
            },
        };

        let mark = HighWaterMark::of(&submission);

        let mut stats = SubmissionStats::default();
        let mut batch = PendingBatch::new(submission);

        for raw in &comments {
            let tickers = extract(raw.body.as_deref().unwrap_or_default(), registry.symbols());
            if tickers.is_empty() {
                stats.comments_scanned += 1;
                continue;
            }

            // Only comments that mention a ticker are turned into records.
            let comment = match InputValidator::validate_comment(raw, &batch.submission) {
                Ok(comment) => comment,
                Err(e) => {
                    warn!(submission_id = %batch.submission.id, comment_id = %raw.id, error = %e, "Skipping malformed comment");
                    self.metrics.record_comment_skipped();
                    stats.comments_skipped += 1;
                    continue;
                },
            };
            stats.comments_scanned += 1;

            let mut queued = false;
            for ticker in &tickers {
                let event = MentionEvent::new(&batch.submission, &comment, ticker);
                if dedup.check_and_record(&event.mention_id) {
                    batch.mentions.push(event);
                    stats.mentions_found += 1;
                    queued = true;
                } else {
                    stats.mentions_duplicate += 1;
                }
            }
            if queued {
                batch.comments.push(comment);
            }

            if batch.len() >= self.settings.flush_threshold {
                if let Err(e) = self.flush(&mut batch, &mut stats).await {
                    return SubmissionOutcome::Failed(e, stats);
                }
            }
        }

        // Always flush at the end so the submission row itself is stored.
        if let Err(e) = self.flush(&mut batch, &mut stats).await {
            return SubmissionOutcome::Failed(e, stats);
        }

        debug!(
            submission_id = %mark.submission_id,
            comments = stats.comments_scanned,
            mentions = stats.persisted.mentions_inserted,
            "Submission processed"
        );
        SubmissionOutcome::Processed(mark, stats)
    }

    /// Persist the queued rows, retrying the whole batch once.
    async fn flush(&self, batch: &mut PendingBatch, stats: &mut SubmissionStats) -> Result<()> {
        let pending = batch.take();
        let timer = MetricsTimer::start(self.metrics);

        let result = match self.sink.persist_batch(&pending).await {
            Ok(persisted) => Ok(persisted),
            Err(first) => {
                warn!(
                    submission_id = %pending.submission.id,
                    mentions = pending.len(),
                    error = %first,
                    "Batch flush failed, retrying once"
                );
                self.sink.persist_batch(&pending).await
            },
        };
        timer.finish(result.is_ok());

        let persisted = result.map_err(|e| {
            MentionError::Persistence(format!("flushing batch of submission {}: {e}", pending.submission.id))
        })?;
        stats.persisted.merge(persisted);
        Ok(())
    }

    fn finish(&mut self, mode: CrawlMode, report: &SessionReport, started: Instant, success: bool) {
        let duration = started.elapsed();
        self.metrics.record_session(report, duration);
        self.enter(SessionPhase::Done);

        let summary = if success {
            "Crawl session finished"
        } else {
            "Crawl session aborted"
        };
        info!(
            mode = %mode,
            submissions_processed = report.submissions_processed,
            submissions_skipped = report.submissions_skipped,
            submissions_cancelled = report.submissions_cancelled,
            comments_scanned = report.comments_scanned,
            comments_skipped = report.comments_skipped,
            mentions_found = report.mentions_found,
            mentions_duplicate = report.mentions_duplicate,
            mentions_inserted = report.mentions_inserted,
            rows_failed = report.rows_failed,
            mark_before = ?report.mark_before.as_ref().map(ToString::to_string),
            mark_after = ?report.mark_after.as_ref().map(ToString::to_string),
            duration_ms = duration.as_millis() as u64,
            "{summary}"
        );
    }
}

fn absorb(report: &mut SessionReport, stats: SubmissionStats) {
    report.comments_scanned += stats.comments_scanned;
    report.comments_skipped += stats.comments_skipped;
    report.mentions_found += stats.mentions_found;
    report.mentions_duplicate += stats.mentions_duplicate + stats.persisted.duplicates;
    report.mentions_inserted += stats.persisted.mentions_inserted;
    report.rows_failed += stats.persisted.failed.len();
}
