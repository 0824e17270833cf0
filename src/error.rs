//! Error types for the ticker-mentions library.
//!
//! The variants follow the failure taxonomy of the ingestion pipeline: source
//! failures are retried, malformed records are skipped, persistence failures
//! abort the session and configuration errors stop the process before any
//! fetch begins. Duplicate rows are never an error; the sink reports them as
//! counts.

use thiserror::Error;

/// Errors that can occur while harvesting ticker mentions.
#[derive(Error, Debug)]
pub enum MentionError {
    /// Network, timeout, rate-limit or server failure talking to a remote source
    #[error("{component} unavailable: {message}")]
    SourceUnavailable {
        /// Name of the collaborator that failed (e.g. `reddit`, `iex`)
        component: &'static str,
        /// Human-readable failure detail
        message: String,
    },

    /// The remote source answered with a status that will not change on retry
    #[error("{component} rejected request (status {status}): {message}")]
    SourceRejected {
        /// Name of the collaborator that failed
        component: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body or detail
        message: String,
    },

    /// A single record could not be turned into a domain value
    #[error("Malformed {kind} {id}: {reason}")]
    MalformedRecord {
        /// Record kind (`submission`, `comment`, `symbol`)
        kind: &'static str,
        /// Record identifier, or `<unknown>`
        id: String,
        /// What was wrong with it
        reason: String,
    },

    /// The persistence sink is unreachable or rejected a batch
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Invalid configuration or command-line input
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Result with `MentionError`
pub type Result<T> = std::result::Result<T, MentionError>;

impl MentionError {
    /// Build a `MalformedRecord` error.
    pub fn malformed(kind: &'static str, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            kind,
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Classify a `reqwest` failure for the given component.
    ///
    /// Timeouts, connection failures and body decode failures are retryable;
    /// a status error keeps its status code.
    pub fn from_http(component: &'static str, err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(component, status.as_u16(), err.to_string());
        }
        Self::SourceUnavailable {
            component,
            message: err.to_string(),
        }
    }

    /// Classify a non-success HTTP status for the given component.
    pub fn from_status(component: &'static str, status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || status == 408 || status >= 500 {
            Self::SourceUnavailable {
                component,
                message: format!("status {status}: {message}"),
            }
        } else {
            Self::SourceRejected {
                component,
                status,
                message,
            }
        }
    }

    /// True when retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. })
    }

    /// True for errors that must end the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Database(_) | Self::Pool(_) | Self::Configuration(_)
        )
    }

    /// Name of the component the error originated from, for operator messages.
    #[must_use]
    pub const fn component(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { component, .. } | Self::SourceRejected { component, .. } => *component,
            Self::MalformedRecord { .. } => "validation",
            Self::Persistence(_) | Self::Database(_) | Self::Pool(_) => "persistence",
            Self::Configuration(_) => "configuration",
            Self::Serialization(_) | Self::Csv(_) | Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(MentionError::from_status("reddit", 429, "slow down").is_retryable());
        assert!(MentionError::from_status("reddit", 503, "").is_retryable());
        assert!(!MentionError::from_status("reddit", 404, "gone").is_retryable());
        assert!(!MentionError::from_status("reddit", 403, "private").is_retryable());
    }

    #[test]
    fn test_fatal_errors() {
        assert!(MentionError::Persistence("disk full".into()).is_fatal());
        assert!(MentionError::Configuration("bad sort".into()).is_fatal());
        assert!(!MentionError::malformed("comment", "c1", "missing author").is_fatal());
    }

    #[test]
    fn test_component_names() {
        assert_eq!(MentionError::Persistence("x".into()).component(), "persistence");
        assert_eq!(MentionError::from_status("iex", 500, "").component(), "iex");
    }
}
