//! Unit tests for metrics.rs module

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use ticker_mentions::metrics::{
    CrawlMetrics, MetricsTimer, COMMENTS_SKIPPED_TOTAL, FLUSH_FAILURES_TOTAL, MENTIONS_INSERTED_TOTAL,
    SUBMISSIONS_PROCESSED_TOTAL, SUBMISSIONS_SKIPPED_TOTAL,
};
use ticker_mentions::models::SessionReport;

/// Recorder that keeps counter totals by name and ignores everything else
#[derive(Default)]
struct CountingRecorder {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

struct CounterHandle(Arc<AtomicU64>);

impl CounterFn for CounterHandle {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::SeqCst);
    }

    fn absolute(&self, value: u64) {
        self.0.fetch_max(value, Ordering::SeqCst);
    }
}

impl CountingRecorder {
    fn total(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        let cell = self
            .counters
            .lock()
            .unwrap()
            .entry(key.name().to_string())
            .or_default()
            .clone();
        Counter::from_arc(Arc::new(CounterHandle(cell)))
    }

    fn register_gauge(&self, _key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

#[test]
fn test_session_totals_are_counted() {
    let recorder = CountingRecorder::default();
    let report = SessionReport {
        submissions_processed: 4,
        mentions_inserted: 17,
        ..SessionReport::default()
    };

    metrics::with_local_recorder(&recorder, || {
        CrawlMetrics.record_session(&report, Duration::from_millis(250));
        CrawlMetrics.record_session(&report, Duration::from_millis(250));
    });

    assert_eq!(recorder.total(SUBMISSIONS_PROCESSED_TOTAL), 8);
    assert_eq!(recorder.total(MENTIONS_INSERTED_TOTAL), 34);
}

#[test]
fn test_skips_are_counted() {
    let recorder = CountingRecorder::default();

    metrics::with_local_recorder(&recorder, || {
        let metrics = CrawlMetrics;
        metrics.record_submission_skipped("stickied");
        metrics.record_submission_skipped("malformed");
        metrics.record_comment_skipped();
    });

    assert_eq!(recorder.total(SUBMISSIONS_SKIPPED_TOTAL), 2);
    assert_eq!(recorder.total(COMMENTS_SKIPPED_TOTAL), 1);
}

#[test]
fn test_only_failed_flushes_are_counted_as_failures() {
    let recorder = CountingRecorder::default();

    metrics::with_local_recorder(&recorder, || {
        MetricsTimer::start(CrawlMetrics).finish(true);
        MetricsTimer::start(CrawlMetrics).finish(false);
    });

    assert_eq!(recorder.total(FLUSH_FAILURES_TOTAL), 1);
}

#[test]
fn test_timer_measures_elapsed_time() {
    let timer = MetricsTimer::start(CrawlMetrics);
    std::thread::sleep(Duration::from_millis(10));
    let elapsed = timer.finish(true);
    assert!(elapsed >= Duration::from_millis(10));
}
