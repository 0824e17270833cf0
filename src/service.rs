//! Long-running polling service and the stop signal shared with sessions

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use crate::collector::Collector;
use crate::error::{MentionError, Result};
use crate::models::{CrawlMode, SessionReport};

/// Receiving side of the stop signal, checked between submissions
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side of the stop signal
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopSignal {
    /// Linked handle/signal pair
    #[must_use]
    pub fn new() -> (StopHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (StopHandle { tx }, Self { rx })
    }

    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        Self::new().1
    }

    /// True once a stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve when a stop is requested. Pends forever if the handle is gone.
    pub async fn stopped(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl StopHandle {
    /// Ask running sessions to stop after their in-flight submissions
    pub fn stop(&self) {
        // No receivers left means nothing is running.
        let _ = self.tx.send(true);
    }
}

/// Alternates `sleep(interval)` and incremental sessions until stopped
pub struct PollingService {
    collector: Collector,
    interval: Duration,
    submission_limit: usize,
    comment_limit: usize,
}

impl PollingService {
    pub fn new(collector: Collector, interval: Duration, submission_limit: usize, comment_limit: usize) -> Self {
        Self {
            collector,
            interval,
            submission_limit,
            comment_limit,
        }
    }

    /// Run until `stop` fires or a session fails fatally.
    ///
    /// Returns the number of completed sessions. Non-fatal session errors are
    /// logged and the loop continues with the next interval.
    pub async fn run(&mut self, mut stop: StopSignal) -> Result<usize> {
        let mut sessions = 0;
        info!(interval_secs = self.interval.as_secs(), "Polling service started");

        loop {
            if stop.is_stopped() {
                break;
            }

            match self.run_once(&stop).await {
                Ok(report) => {
                    sessions += 1;
                    info!(
                        sessions,
                        mentions_inserted = report.mentions_inserted,
                        "Incremental session completed"
                    );
                },
                Err(e) if e.is_fatal() => {
                    error!(component = e.component(), error = %e, "Stopping polling service");
                    return Err(e);
                },
                Err(e) => error!(component = e.component(), error = %e, "Incremental session failed"),
            }

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {},
                () = stop.stopped() => break,
            }
        }

        info!(sessions, "Polling service stopped");
        Ok(sessions)
    }

    async fn run_once(&mut self, stop: &StopSignal) -> Result<SessionReport> {
        self.collector
            .run(CrawlMode::Incremental, self.submission_limit, self.comment_limit, stop)
            .await
    }
}

/// Exit code for a failed command
#[must_use]
pub const fn exit_code(err: &MentionError) -> u8 {
    match err {
        MentionError::Persistence(_) | MentionError::Database(_) | MentionError::Pool(_) => 2,
        MentionError::Configuration(_) => 3,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_signal_fires() {
        let (handle, mut signal) = StopSignal::new();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), signal.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_signal_stays_pending() {
        let mut signal = StopSignal::never();
        assert!(!signal.is_stopped());
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.stopped()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&MentionError::Persistence("x".into())), 2);
        assert_eq!(exit_code(&MentionError::Configuration("x".into())), 3);
        assert_eq!(exit_code(&MentionError::malformed("comment", "c1", "missing author")), 1);
    }
}
