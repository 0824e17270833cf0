use anyhow::{anyhow, Result as AnyResult};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

use crate::error::{MentionError, Result};
use crate::models::{Comment, CommentRef, Submission, SubmissionRef, Ticker};

/// Author placeholder the source uses for removed accounts
const DELETED_AUTHOR: &str = "[deleted]";
/// Placeholder used when a record has no id
const UNKNOWN_ID: &str = "<unknown>";

/// Validation of source records, registry symbols and settings
#[derive(Debug, Clone)]
pub struct InputValidator {
    symbol_regex: Regex,
    community_regex: Regex,
}

impl InputValidator {
    /// Compile the validator's patterns
    pub fn new() -> Result<Self> {
        let symbol_regex = Regex::new(r"^\S{1,10}$")
            .map_err(|e| MentionError::Configuration(format!("Failed to compile symbol regex: {e}")))?;
        let community_regex = Regex::new(r"^[A-Za-z0-9_]{2,21}$")
            .map_err(|e| MentionError::Configuration(format!("Failed to compile community regex: {e}")))?;

        Ok(Self {
            symbol_regex,
            community_regex,
        })
    }

    /// Validate a registry entry: 1-10 non-whitespace characters
    pub fn validate_symbol(&self, ticker: &Ticker) -> Result<()> {
        if !self.symbol_regex.is_match(&ticker.symbol) {
            return Err(MentionError::malformed(
                "symbol",
                ticker.symbol.clone(),
                "symbol must be 1-10 characters without whitespace",
            ));
        }
        Ok(())
    }

    /// Validate a community name
    pub fn validate_community(&self, name: &str) -> Result<()> {
        if !self.community_regex.is_match(name) {
            return Err(MentionError::Configuration(format!(
                "Invalid community name '{name}': expected 2-21 letters, digits or underscores"
            )));
        }
        Ok(())
    }

    /// Turn a listed submission into a domain record.
    ///
    /// `community` is used when the listing omits the subreddit name.
    pub fn validate_submission(submission: &SubmissionRef, community: &str) -> Result<Submission> {
        let id = submission.id.trim();
        if id.is_empty() {
            return Err(MentionError::malformed("submission", UNKNOWN_ID, "missing id"));
        }

        let author_id = author(submission.author_id.as_deref())
            .ok_or_else(|| MentionError::malformed("submission", id, "missing author"))?;
        let created_at = epoch_to_utc(submission.created_utc)
            .ok_or_else(|| MentionError::malformed("submission", id, "missing or invalid creation time"))?;

        Ok(Submission {
            id: id.to_string(),
            created_at,
            score: submission.score,
            comment_count: submission.num_comments.max(0),
            author_id,
            source_name: submission
                .source_name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(community)
                .to_string(),
        })
    }

    /// Turn a fetched comment into a domain record belonging to `submission`.
    pub fn validate_comment(comment: &CommentRef, submission: &Submission) -> Result<Comment> {
        let id = comment.id.trim();
        if id.is_empty() {
            return Err(MentionError::malformed("comment", UNKNOWN_ID, "missing id"));
        }

        if let Some(parent) = comment.submission_id.as_deref() {
            if parent != submission.id {
                return Err(MentionError::malformed(
                    "comment",
                    id,
                    format!("belongs to submission {parent}, expected {}", submission.id),
                ));
            }
        }

        let author_id = author(comment.author_id.as_deref())
            .ok_or_else(|| MentionError::malformed("comment", id, "missing author"))?;
        let created_at = epoch_to_utc(comment.created_utc)
            .ok_or_else(|| MentionError::malformed("comment", id, "missing or invalid creation time"))?;

        Ok(Comment {
            id: id.to_string(),
            created_at,
            score: comment.score,
            author_id,
            submission_id: submission.id.clone(),
        })
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> AnyResult<()> {
        if url.trim().is_empty() {
            return Err(anyhow!("Database URL cannot be empty"));
        }

        if url.len() > 1000 {
            return Err(anyhow!("Database URL too long"));
        }

        Ok(())
    }

    /// Validate the number of mentions that triggers a flush
    pub fn validate_flush_threshold(threshold: usize) -> AnyResult<()> {
        if threshold == 0 {
            return Err(anyhow!("Flush threshold must be greater than 0"));
        }

        if threshold > 10_000 {
            return Err(anyhow!("Flush threshold too large (max 10,000)"));
        }

        Ok(())
    }

    /// Validate the number of submissions processed at once
    pub fn validate_concurrency(concurrency: usize) -> AnyResult<()> {
        if concurrency == 0 {
            return Err(anyhow!("Concurrency must be greater than 0"));
        }

        if concurrency > 64 {
            return Err(anyhow!("Concurrency too large (max 64)"));
        }

        Ok(())
    }

    /// Validate a listing or comment limit
    pub fn validate_limit(name: &str, limit: usize) -> AnyResult<()> {
        if limit == 0 {
            return Err(anyhow!("{name} must be greater than 0"));
        }

        if limit > 100_000 {
            return Err(anyhow!("{name} too large (max 100,000)"));
        }

        Ok(())
    }
}

fn author(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|a| !a.is_empty() && *a != DELETED_AUTHOR)
        .map(ToString::to_string)
}

/// Convert epoch seconds to a UTC timestamp; `None` for absent or invalid input
#[must_use]
pub fn epoch_to_utc(epoch: Option<f64>) -> Option<DateTime<Utc>> {
    let secs = epoch.filter(|s| s.is_finite() && *s >= 0.0)?;
    let nanos = (secs.fract() * 1e9) as u32;
    Utc.timestamp_opt(secs.trunc() as i64, nanos).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_conversion() {
        let ts = epoch_to_utc(Some(1_700_000_000.0)).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert!(epoch_to_utc(None).is_none());
        assert!(epoch_to_utc(Some(f64::NAN)).is_none());
        assert!(epoch_to_utc(Some(-5.0)).is_none());
    }

    #[test]
    fn test_deleted_author_is_missing() {
        assert_eq!(author(Some("[deleted]")), None);
        assert_eq!(author(Some("  ")), None);
        assert_eq!(author(Some("t2_abc")).as_deref(), Some("t2_abc"));
    }
}
