use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

use crate::models::SessionReport;

/// Submissions whose comments were scanned and flushed
pub const SUBMISSIONS_PROCESSED_TOTAL: &str = "ticker_mentions_submissions_processed_total";
/// Submissions skipped (stickied, malformed, unreachable)
pub const SUBMISSIONS_SKIPPED_TOTAL: &str = "ticker_mentions_submissions_skipped_total";
/// Comments skipped as malformed
pub const COMMENTS_SKIPPED_TOTAL: &str = "ticker_mentions_comments_skipped_total";
/// Mention rows inserted
pub const MENTIONS_INSERTED_TOTAL: &str = "ticker_mentions_mentions_inserted_total";
/// Mentions rejected by the dedup index or the sink
pub const MENTIONS_DUPLICATE_TOTAL: &str = "ticker_mentions_mentions_duplicate_total";
/// Retries against a content or symbol source
pub const SOURCE_RETRIES_TOTAL: &str = "ticker_mentions_source_retries_total";
/// Batch flush latency
pub const FLUSH_DURATION_SECONDS: &str = "ticker_mentions_flush_duration_seconds";
/// Failed batch flushes
pub const FLUSH_FAILURES_TOTAL: &str = "ticker_mentions_flush_failures_total";
/// Session wall-clock duration
pub const SESSION_DURATION_SECONDS: &str = "ticker_mentions_session_duration_seconds";
/// Size of the registry loaded at session start
pub const REGISTRY_SIZE: &str = "ticker_mentions_registry_size";

/// Metrics emitted by the crawl pipeline.
///
/// Calls go through the `metrics` facade; without an installed recorder they
/// are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlMetrics;

impl CrawlMetrics {
    /// Record why a submission was skipped
    pub fn record_submission_skipped(&self, reason: &'static str) {
        counter!(SUBMISSIONS_SKIPPED_TOTAL, "reason" => reason).increment(1);
    }

    /// Record a comment skipped as malformed
    pub fn record_comment_skipped(&self) {
        counter!(COMMENTS_SKIPPED_TOTAL).increment(1);
    }

    /// Record one flush attempt
    pub fn record_flush(&self, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        histogram!(FLUSH_DURATION_SECONDS, "status" => status).record(duration.as_secs_f64());
        if !success {
            counter!(FLUSH_FAILURES_TOTAL).increment(1);
        }
    }

    /// Record the registry size loaded at session start
    pub fn record_registry_size(&self, size: usize) {
        gauge!(REGISTRY_SIZE).set(size as f64);
    }

    /// Record the totals of a finished session
    pub fn record_session(&self, report: &SessionReport, duration: Duration) {
        counter!(SUBMISSIONS_PROCESSED_TOTAL).increment(report.submissions_processed as u64);
        counter!(MENTIONS_INSERTED_TOTAL).increment(report.mentions_inserted as u64);
        counter!(MENTIONS_DUPLICATE_TOTAL).increment(report.mentions_duplicate as u64);
        histogram!(SESSION_DURATION_SECONDS).record(duration.as_secs_f64());
    }
}

/// Times a flush and reports it on [`finish`](Self::finish)
pub struct MetricsTimer {
    metrics: CrawlMetrics,
    start: Instant,
}

impl MetricsTimer {
    /// Start timing
    #[must_use]
    pub fn start(metrics: CrawlMetrics) -> Self {
        Self {
            metrics,
            start: Instant::now(),
        }
    }

    /// Stop timing and record the outcome
    pub fn finish(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        self.metrics.record_flush(duration, success);
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            SUBMISSIONS_PROCESSED_TOTAL,
            SUBMISSIONS_SKIPPED_TOTAL,
            COMMENTS_SKIPPED_TOTAL,
            MENTIONS_INSERTED_TOTAL,
            SOURCE_RETRIES_TOTAL,
            FLUSH_DURATION_SECONDS,
        ] {
            assert!(name.starts_with("ticker_mentions_"));
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = CrawlMetrics;
        metrics.record_submission_skipped("stickied");
        metrics.record_comment_skipped();
        metrics.record_registry_size(10);
        metrics.record_session(&SessionReport::default(), Duration::from_millis(5));
        let elapsed = MetricsTimer::start(metrics).finish(true);
        assert!(elapsed < Duration::from_secs(5));
    }
}
