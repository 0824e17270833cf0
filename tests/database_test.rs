mod common;

use chrono::{TimeZone, Utc};
use common::{TestDb, COMMUNITY};
use ticker_mentions::db::Database;
use ticker_mentions::models::{Comment, HighWaterMark, MentionEvent, PendingBatch, Submission, Ticker};
use ticker_mentions::repository::MentionSink;

fn submission(id: &str, secs: i64) -> Submission {
    Submission {
        id: id.to_string(),
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        score: 12,
        comment_count: 4,
        author_id: "t2_op".to_string(),
        source_name: COMMUNITY.to_string(),
    }
}

fn comment(id: &str, submission: &Submission, score: i64) -> Comment {
    Comment {
        id: id.to_string(),
        created_at: submission.created_at,
        score,
        author_id: format!("t2_{id}"),
        submission_id: submission.id.clone(),
    }
}

fn batch(submission: &Submission, mentions: &[(&str, &str, i64)]) -> PendingBatch {
    let mut batch = PendingBatch::new(submission.clone());
    for (comment_id, ticker, score) in mentions {
        let comment = comment(comment_id, submission, *score);
        batch.mentions.push(MentionEvent::new(submission, &comment, ticker));
        if !batch.comments.iter().any(|c| c.id == comment.id) {
            batch.comments.push(comment);
        }
    }
    batch
}

fn mark(secs: i64, id: &str) -> HighWaterMark {
    HighWaterMark {
        created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        submission_id: id.to_string(),
    }
}

#[test]
fn test_database_creation_and_initialization() {
    let fixture = TestDb::new();

    // Test that we can get a connection
    let _conn = fixture.db.get_connection().expect("Failed to get database connection");
    let stats = fixture.db.stats().expect("Failed to read stats");
    assert_eq!(stats.mentions, 0);
}

#[test]
fn test_reopening_database_keeps_schema() {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let url = format!("sqlite:{}", dir.path().join("nested/dir/mentions.db").display());

    Database::new(&url).expect("Failed to create database");
    let reopened = Database::new(&url).expect("Failed to reopen database");
    assert_eq!(reopened.stats().unwrap().tickers, 0);
}

#[tokio::test]
async fn test_ticker_upsert_refreshes_name() {
    let fixture = TestDb::new();
    let db = &fixture.db;

    db.upsert_ticker(&Ticker {
        symbol: "GME".to_string(),
        company_name: "GameStop".to_string(),
    })
    .await
    .expect("Failed to add ticker");
    db.upsert_ticker(&Ticker {
        symbol: "GME".to_string(),
        company_name: "GameStop Corp.".to_string(),
    })
    .await
    .expect("Failed to update ticker");

    let tickers = db.list_tickers().await.expect("Failed to list tickers");
    assert_eq!(tickers.len(), 1);
    assert_eq!(tickers[0].company_name, "GameStop Corp.");
    assert_eq!(db.count_tickers().await.unwrap(), 1);
}

#[tokio::test]
async fn test_persist_batch_is_idempotent() {
    let fixture = TestDb::with_tickers(&["GME", "AMC"]).await;
    let s1 = submission("s1", 0);
    let pending = batch(&s1, &[("c1", "GME", 3), ("c1", "AMC", 3), ("c2", "GME", 8)]);

    let first = fixture.db.persist_batch(&pending).await.expect("First flush failed");
    assert!(first.submission_inserted);
    assert_eq!(first.comments_inserted, 2);
    assert_eq!(first.mentions_inserted, 3);
    assert!(first.failed.is_empty());

    let second = fixture.db.persist_batch(&pending).await.expect("Second flush failed");
    assert!(!second.submission_inserted);
    assert_eq!(second.comments_inserted, 0);
    assert_eq!(second.mentions_inserted, 0);
    assert_eq!(second.duplicates, 3);

    let stats = fixture.db.stats().unwrap();
    assert_eq!(stats.submissions, 1);
    assert_eq!(stats.comments, 2);
    assert_eq!(stats.mentions, 3);
}

#[tokio::test]
async fn test_unknown_ticker_row_fails_alone() {
    let fixture = TestDb::with_tickers(&["GME"]).await;
    let s1 = submission("s1", 0);
    let pending = batch(&s1, &[("c1", "GME", 1), ("c1", "NOPE", 1), ("c2", "GME", 1)]);

    let report = fixture.db.persist_batch(&pending).await.expect("Flush failed");

    assert_eq!(report.mentions_inserted, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, "c1|NOPE");

    let ids: Vec<String> = fixture
        .db
        .all_mentions()
        .unwrap()
        .into_iter()
        .map(|m| m.mention_id)
        .collect();
    assert_eq!(ids, vec!["c1|GME", "c2|GME"]);
}

#[tokio::test]
async fn test_mention_without_comment_row_is_rejected() {
    let fixture = TestDb::with_tickers(&["GME"]).await;
    let s1 = submission("s1", 0);
    fixture.db.insert_submission(&s1).await.expect("Failed to insert submission");

    let orphan = MentionEvent::new(&s1, &comment("ghost", &s1, 1), "GME");
    let report = fixture
        .db
        .insert_mention_batch(&[orphan])
        .await
        .expect("Batch insert failed");

    assert_eq!(report.mentions_inserted, 0);
    assert_eq!(report.failed.len(), 1);
}

#[tokio::test]
async fn test_existing_mention_ids_are_loaded() {
    let fixture = TestDb::with_tickers(&["GME", "AMC"]).await;
    let s1 = submission("s1", 0);
    fixture
        .db
        .persist_batch(&batch(&s1, &[("c1", "GME", 1), ("c2", "AMC", 1)]))
        .await
        .unwrap();

    let ids = fixture.db.get_existing_mention_ids().await.unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains("c1|GME"));
    assert!(ids.contains("c2|AMC"));
}

#[tokio::test]
async fn test_high_water_mark_never_moves_backwards() {
    let fixture = TestDb::new();
    let db = &fixture.db;

    assert_eq!(db.get_high_water_mark(COMMUNITY).await.unwrap(), None);
    assert!(db.advance_high_water_mark(COMMUNITY, &mark(100, "b")).await.unwrap());
    assert!(!db.advance_high_water_mark(COMMUNITY, &mark(50, "a")).await.unwrap());
    assert!(!db.advance_high_water_mark(COMMUNITY, &mark(100, "b")).await.unwrap());
    assert_eq!(db.get_high_water_mark(COMMUNITY).await.unwrap(), Some(mark(100, "b")));

    assert!(db.advance_high_water_mark(COMMUNITY, &mark(200, "c")).await.unwrap());
    assert_eq!(db.get_high_water_mark(COMMUNITY).await.unwrap(), Some(mark(200, "c")));

    // Marks are kept per community
    assert_eq!(db.get_high_water_mark("stocks").await.unwrap(), None);
}

#[tokio::test]
async fn test_ticker_activity_groups_by_hour() {
    let fixture = TestDb::with_tickers(&["GME", "AMC", "TSLA"]).await;
    let early = submission("s1", 0);
    let late = submission("s2", 7200);

    fixture
        .db
        .persist_batch(&batch(&early, &[("c1", "GME", 3), ("c2", "GME", 4), ("c3", "AMC", 1)]))
        .await
        .unwrap();
    fixture
        .db
        .persist_batch(&batch(&late, &[("c4", "GME", 10), ("c5", "TSLA", 2)]))
        .await
        .unwrap();

    let rows = fixture.db.ticker_activity(2).expect("Failed to query activity");

    // GME (3 mentions) and one of the single-mention tickers, alphabetical tie-break
    let tickers: Vec<&str> = rows.iter().map(|r| r.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["GME", "AMC", "GME"]);

    assert_eq!(rows[0].hour, "2023-11-14 22");
    assert_eq!(rows[0].mention_count, 2);
    assert_eq!(rows[0].total_score, 7);
    assert_eq!(rows[0].company_name, "GME Corp.");
    assert_eq!(rows[2].hour, "2023-11-15 00");
    assert_eq!(rows[2].total_score, 10);
}

#[tokio::test]
async fn test_purge_mentions_resets_cursor() {
    let fixture = TestDb::with_tickers(&["GME"]).await;
    let s1 = submission("s1", 0);
    fixture
        .db
        .persist_batch(&batch(&s1, &[("c1", "GME", 1)]))
        .await
        .unwrap();
    fixture
        .db
        .advance_high_water_mark(COMMUNITY, &HighWaterMark::of(&s1))
        .await
        .unwrap();

    let deleted = fixture.db.purge_mentions().expect("Purge failed");

    assert_eq!(deleted, 1);
    assert_eq!(fixture.db.stats().unwrap().mentions, 0);
    assert_eq!(fixture.db.stats().unwrap().tickers, 1);
    assert_eq!(fixture.db.get_high_water_mark(COMMUNITY).await.unwrap(), None);
}

#[tokio::test]
async fn test_in_memory_database_round_trips_mentions() {
    let db = Database::open_in_memory().expect("Failed to open in-memory database");
    db.upsert_tickers(&[Ticker {
        symbol: "GME".to_string(),
        company_name: "GameStop".to_string(),
    }])
    .await
    .unwrap();

    let s1 = submission("s1", 0);
    db.persist_batch(&batch(&s1, &[("c1", "GME", 5)])).await.unwrap();

    let stored = db.all_mentions().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].timestamp, s1.created_at);
    assert_eq!(stored[0].score, 5);
    assert_eq!(stored[0].source_name, COMMUNITY);
}
