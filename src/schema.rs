//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.
//! The DDL itself lives in `migrations/` and is embedded by [`crate::db`].

/// Tickers table schema
pub mod tickers {
    /// Table name
    pub const TABLE: &str = "tickers";
    /// Primary key column
    pub const SYMBOL: &str = "symbol";
    /// Company display name column
    pub const COMPANY_NAME: &str = "company_name";
}

/// Submissions table schema
pub mod submissions {
    /// Table name
    pub const TABLE: &str = "submissions";
    /// Primary key column
    pub const ID: &str = "id";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Score column
    pub const SCORE: &str = "score";
    /// Comment count column
    pub const COMMENT_COUNT: &str = "comment_count";
    /// Author identifier column
    pub const AUTHOR_ID: &str = "author_id";
    /// Community name column
    pub const SOURCE_NAME: &str = "source_name";
}

/// Comments table schema
pub mod comments {
    /// Table name
    pub const TABLE: &str = "comments";
    /// Primary key column
    pub const ID: &str = "id";
    /// Foreign key to submissions table
    pub const SUBMISSION_ID: &str = "submission_id";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Score column
    pub const SCORE: &str = "score";
    /// Author identifier column
    pub const AUTHOR_ID: &str = "author_id";
}

/// Mentions table schema
pub mod mentions {
    /// Table name
    pub const TABLE: &str = "mentions";
    /// Primary key column, `comment_id|ticker`
    pub const MENTION_ID: &str = "mention_id";
    /// Foreign key to submissions table
    pub const SUBMISSION_ID: &str = "submission_id";
    /// Foreign key to comments table
    pub const COMMENT_ID: &str = "comment_id";
    /// Foreign key to tickers table
    pub const TICKER: &str = "ticker";
    /// Comment timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Comment score column
    pub const SCORE: &str = "score";
    /// Community name column
    pub const SOURCE_NAME: &str = "source_name";
}

/// Crawl cursor table schema
pub mod crawl_cursors {
    /// Table name
    pub const TABLE: &str = "crawl_cursors";
    /// Primary key column
    pub const SOURCE_NAME: &str = "source_name";
    /// Creation time of the newest flushed submission
    pub const CREATED_AT: &str = "created_at";
    /// Id of the newest flushed submission
    pub const SUBMISSION_ID: &str = "submission_id";
    /// Last update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}
