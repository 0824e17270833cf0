use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::error::{MentionError, Result};
use crate::models::{
    BatchReport, Comment, HighWaterMark, MentionEvent, PendingBatch, RowFailure, StoreStats, Submission, Ticker,
    TickerActivity,
};
use crate::repository::MentionSink;
use crate::schema::{comments, crawl_cursors, mentions, submissions, tickers};

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
/// Connection checked out of [`DbPool`]
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const CREATE_TABLES: &str = include_str!("../migrations/2026-10-01-000000_create_tables/up.sql");

/// SQLite-backed persistence sink
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database at `database_url` and run migrations.
    ///
    /// Accepts plain paths as well as `sqlite:` and `sqlite://` prefixed urls.
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_pool(database_url, 10, Duration::from_secs(30))
    }

    /// Like [`Database::new`] with explicit pool size and checkout timeout.
    pub fn with_pool(database_url: &str, max_connections: u32, connection_timeout: Duration) -> Result<Self> {
        let path = strip_scheme(database_url);
        if path == ":memory:" {
            return Self::open_in_memory();
        }

        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(init_connection);
        let pool = Pool::builder()
            .max_size(max_connections.max(1))
            .connection_timeout(connection_timeout)
            .build(manager)?;

        let conn = pool.get()?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "SQLite journal mode set");
        Self::run_migrations(&conn)?;

        info!(path, "Database ready");
        Ok(Self { pool })
    }

    /// Open a private in-memory database; the pool holds a single connection.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder().max_size(1).build(manager)?;
        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(CREATE_TABLES)?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Run blocking database work off the async runtime.
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            work(&mut conn)
        })
        .await
        .map_err(|e| MentionError::Persistence(format!("database task failed: {e}")))?
    }

    /// Row counts per table
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.get_connection()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            tickers: count(tickers::TABLE)?,
            submissions: count(submissions::TABLE)?,
            comments: count(comments::TABLE)?,
            mentions: count(mentions::TABLE)?,
        })
    }

    /// Hourly mention counts and score sums for the `top_n` most mentioned tickers
    pub fn ticker_activity(&self, top_n: usize) -> Result<Vec<TickerActivity>> {
        let conn = self.get_connection()?;
        let query = format!(
            "WITH top AS (
                SELECT {ticker} FROM {mentions} GROUP BY {ticker} ORDER BY COUNT(*) DESC, {ticker} LIMIT ?1
            )
            SELECT m.{ticker}, t.{company}, substr(m.{created}, 1, 13) AS hour, COUNT(*), COALESCE(SUM(m.{score}), 0)
            FROM {mentions} m
            INNER JOIN {tickers} t ON t.{symbol} = m.{ticker}
            WHERE m.{ticker} IN (SELECT {ticker} FROM top)
            GROUP BY m.{ticker}, hour
            ORDER BY hour ASC, COUNT(*) DESC, m.{ticker} ASC",
            ticker = mentions::TICKER,
            mentions = mentions::TABLE,
            company = tickers::COMPANY_NAME,
            created = mentions::CREATED_AT,
            score = mentions::SCORE,
            tickers = tickers::TABLE,
            symbol = tickers::SYMBOL,
        );

        let mut stmt = conn.prepare(&query)?;
        let rows = stmt.query_map(params![top_n as i64], |row| {
            Ok(TickerActivity {
                ticker: row.get(0)?,
                company_name: row.get(1)?,
                hour: row.get(2)?,
                mention_count: row.get(3)?,
                total_score: row.get(4)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Delete every mention and crawl cursor. Destructive admin escape hatch.
    pub fn purge_mentions(&self) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(&format!("DELETE FROM {}", mentions::TABLE), [])?;
        tx.execute(&format!("DELETE FROM {}", crawl_cursors::TABLE), [])?;
        tx.commit()?;
        warn!(deleted, "Purged all mention rows and crawl cursors");
        Ok(deleted)
    }

    /// All stored mentions, ordered by id
    pub fn all_mentions(&self) -> Result<Vec<MentionEvent>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {}, {}, {}, {}, {} FROM {} ORDER BY {}",
            mentions::MENTION_ID,
            mentions::SUBMISSION_ID,
            mentions::COMMENT_ID,
            mentions::TICKER,
            mentions::CREATED_AT,
            mentions::SCORE,
            mentions::SOURCE_NAME,
            mentions::TABLE,
            mentions::MENTION_ID
        ))?;
        let rows = stmt.query_map([], map_mention)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

/// Per-connection settings
fn init_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(Duration::from_secs(5))
}

fn strip_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

/// Map a database row to a `MentionEvent`
fn map_mention(row: &Row) -> rusqlite::Result<MentionEvent> {
    Ok(MentionEvent {
        mention_id: row.get(0)?,
        submission_id: row.get(1)?,
        comment_id: row.get(2)?,
        ticker: row.get(3)?,
        timestamp: row.get(4)?,
        score: row.get(5)?,
        source_name: row.get(6)?,
    })
}

fn upsert_ticker_row(conn: &Connection, ticker: &Ticker) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "INSERT INTO {table} ({symbol}, {name}) VALUES (?1, ?2)
             ON CONFLICT({symbol}) DO UPDATE SET {name} = excluded.{name}",
            table = tickers::TABLE,
            symbol = tickers::SYMBOL,
            name = tickers::COMPANY_NAME,
        ),
        params![ticker.symbol, ticker.company_name],
    )
}

fn insert_submission_row(conn: &Connection, submission: &Submission) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        &format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT DO NOTHING",
            submissions::TABLE,
            submissions::ID,
            submissions::CREATED_AT,
            submissions::SCORE,
            submissions::COMMENT_COUNT,
            submissions::AUTHOR_ID,
            submissions::SOURCE_NAME
        ),
        params![
            submission.id,
            submission.created_at,
            submission.score,
            submission.comment_count,
            submission.author_id,
            submission.source_name
        ],
    )?;
    Ok(changed == 1)
}

fn insert_comment_row(conn: &Connection, comment: &Comment) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        &format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT DO NOTHING",
            comments::TABLE,
            comments::ID,
            comments::SUBMISSION_ID,
            comments::CREATED_AT,
            comments::SCORE,
            comments::AUTHOR_ID
        ),
        params![
            comment.id,
            comment.submission_id,
            comment.created_at,
            comment.score,
            comment.author_id
        ],
    )?;
    Ok(changed == 1)
}

fn insert_mention_row(conn: &Connection, mention: &MentionEvent) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        &format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) ON CONFLICT DO NOTHING",
            mentions::TABLE,
            mentions::MENTION_ID,
            mentions::SUBMISSION_ID,
            mentions::COMMENT_ID,
            mentions::TICKER,
            mentions::CREATED_AT,
            mentions::SCORE,
            mentions::SOURCE_NAME
        ),
        params![
            mention.mention_id,
            mention.submission_id,
            mention.comment_id,
            mention.ticker,
            mention.timestamp,
            mention.score,
            mention.source_name
        ],
    )?;
    Ok(changed == 1)
}

/// Insert mentions one by one inside the caller's transaction.
///
/// A failing row is rolled back on its own by SQLite; the transaction stays
/// usable, so the other rows are kept.
fn insert_mentions(conn: &Connection, rows: &[MentionEvent], report: &mut BatchReport) {
    for mention in rows {
        match insert_mention_row(conn, mention) {
            Ok(true) => report.mentions_inserted += 1,
            Ok(false) => report.duplicates += 1,
            Err(e) => {
                warn!(mention_id = %mention.mention_id, error = %e, "Mention row rejected");
                report.failed.push(RowFailure {
                    id: mention.mention_id.clone(),
                    reason: e.to_string(),
                });
            },
        }
    }
}

fn read_high_water_mark(conn: &Connection, source_name: &str) -> rusqlite::Result<Option<HighWaterMark>> {
    conn.query_row(
        &format!(
            "SELECT {}, {} FROM {} WHERE {} = ?1",
            crawl_cursors::CREATED_AT,
            crawl_cursors::SUBMISSION_ID,
            crawl_cursors::TABLE,
            crawl_cursors::SOURCE_NAME
        ),
        params![source_name],
        |row| {
            Ok(HighWaterMark {
                created_at: row.get::<_, DateTime<Utc>>(0)?,
                submission_id: row.get(1)?,
            })
        },
    )
    .optional()
}

#[async_trait]
impl MentionSink for Database {
    async fn upsert_ticker(&self, ticker: &Ticker) -> Result<()> {
        let ticker = ticker.clone();
        self.blocking(move |conn| {
            upsert_ticker_row(conn, &ticker)?;
            Ok(())
        })
        .await
    }

    async fn upsert_tickers(&self, rows: &[Ticker]) -> Result<usize> {
        let rows = rows.to_vec();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let mut written = 0;
            for ticker in &rows {
                written += upsert_ticker_row(&tx, ticker)?;
            }
            tx.commit()?;
            Ok(written)
        })
        .await
    }

    async fn list_tickers(&self) -> Result<Vec<Ticker>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, {} FROM {}",
                tickers::SYMBOL,
                tickers::COMPANY_NAME,
                tickers::TABLE
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok(Ticker {
                    symbol: row.get(0)?,
                    company_name: row.get(1)?,
                })
            })?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok(results)
        })
        .await
    }

    async fn count_tickers(&self) -> Result<usize> {
        self.blocking(|conn| {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", tickers::TABLE), [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<bool> {
        let submission = submission.clone();
        self.blocking(move |conn| Ok(insert_submission_row(conn, &submission)?))
            .await
    }

    async fn insert_comment(&self, comment: &Comment) -> Result<bool> {
        let comment = comment.clone();
        self.blocking(move |conn| Ok(insert_comment_row(conn, &comment)?))
            .await
    }

    async fn insert_mention_batch(&self, rows: &[MentionEvent]) -> Result<BatchReport> {
        let rows = rows.to_vec();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let mut report = BatchReport::default();
            insert_mentions(&tx, &rows, &mut report);
            tx.commit()?;
            Ok(report)
        })
        .await
    }

    async fn persist_batch(&self, batch: &PendingBatch) -> Result<BatchReport> {
        let batch = batch.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let mut report = BatchReport {
                submission_inserted: insert_submission_row(&tx, &batch.submission)?,
                ..BatchReport::default()
            };

            for comment in &batch.comments {
                match insert_comment_row(&tx, comment) {
                    Ok(inserted) => report.comments_inserted += usize::from(inserted),
                    Err(e) => {
                        warn!(comment_id = %comment.id, error = %e, "Comment row rejected");
                        report.failed.push(RowFailure {
                            id: comment.id.clone(),
                            reason: e.to_string(),
                        });
                    },
                }
            }

            insert_mentions(&tx, &batch.mentions, &mut report);
            tx.commit()?;
            Ok(report)
        })
        .await
    }

    async fn get_high_water_mark(&self, source_name: &str) -> Result<Option<HighWaterMark>> {
        let source_name = source_name.to_string();
        self.blocking(move |conn| Ok(read_high_water_mark(conn, &source_name)?))
            .await
    }

    async fn advance_high_water_mark(&self, source_name: &str, mark: &HighWaterMark) -> Result<bool> {
        let source_name = source_name.to_string();
        let mark = mark.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            if let Some(current) = read_high_water_mark(&tx, &source_name)? {
                if mark <= current {
                    return Ok(false);
                }
            }

            tx.execute(
                &format!(
                    "INSERT INTO {table} ({source}, {created}, {id}, {updated}) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT({source}) DO UPDATE SET
                        {created} = excluded.{created},
                        {id} = excluded.{id},
                        {updated} = excluded.{updated}",
                    table = crawl_cursors::TABLE,
                    source = crawl_cursors::SOURCE_NAME,
                    created = crawl_cursors::CREATED_AT,
                    id = crawl_cursors::SUBMISSION_ID,
                    updated = crawl_cursors::UPDATED_AT,
                ),
                params![source_name, mark.created_at, mark.submission_id, Utc::now()],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn get_existing_mention_ids(&self) -> Result<HashSet<String>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM {}", mentions::MENTION_ID, mentions::TABLE))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut ids = HashSet::new();
            for id in rows {
                ids.insert(id?);
            }
            Ok(ids)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_scheme() {
        assert_eq!(strip_scheme("sqlite://data/m.db"), "data/m.db");
        assert_eq!(strip_scheme("sqlite:data/m.db"), "data/m.db");
        assert_eq!(strip_scheme("data/m.db"), "data/m.db");
        assert_eq!(strip_scheme("sqlite::memory:"), ":memory:");
    }

    #[test]
    fn test_in_memory_database_has_schema() {
        let db = Database::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats, StoreStats::default());
    }
}
