//! Ticker Mentions - Stock ticker mention harvesting
//!
//! A Rust library that crawls a discussion community, extracts stock ticker
//! mentions from comments and stores them idempotently in SQLite for time
//! series analysis.
//!
//! # Features
//!
//! - Registry bootstrap from IEX Cloud or a CSV file
//! - Cold-start backfill and incremental crawls behind a high-water mark
//! - Idempotent, transactional persistence of mention events
//! - Hourly activity export (TXT, CSV, JSON)

/// Crawl sessions
pub mod collector;
/// Configuration management
pub mod config;
/// Crawl cursor (high-water mark)
pub mod cursor;
/// Database operations and connection pooling
pub mod db;
/// Mention id deduplication
pub mod dedup;
/// Error types
pub mod error;
/// Ticker extraction
pub mod extract;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Reddit content source
pub mod reddit;
/// Ticker registry bootstrap
pub mod registry;
/// Activity report export
pub mod report;
/// Collaborator traits
pub mod repository;
/// Bounded retries with backoff
pub mod retry;
/// Database schema definitions
pub mod schema;
/// Polling service and stop signal
pub mod service;
/// Input validation
pub mod validation;

// Re-export key components for easier access
pub use collector::{Collector, CollectorSettings, SessionPhase};
pub use db::Database;
pub use error::{MentionError, Result};
pub use extract::{extract, TickerRegistry};
pub use models::{CrawlMode, HighWaterMark, MentionEvent, OutputFormat, SessionReport, SortMode, TimeWindow};
pub use service::{StopHandle, StopSignal};
