use super::{RetryPolicy, Store};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use xrelay_core::{config::MemoryConfig, error::RelayError, post::Post};

/// Create an in-memory store for testing.
async fn test_store() -> Store {
    // For in-memory, we need to bypass shellexpand.
    let opts = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .unwrap();
    Store::run_migrations(&pool).await.unwrap();
    Store::from_pool(pool, RetryPolicy::default())
}

fn post(source_id: i64, author: &str, occurred_at: DateTime<Utc>, body: &str) -> Post {
    Post {
        source_id,
        author: author.to_string(),
        occurred_at,
        body: body.to_string(),
        is_posted: false,
    }
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

#[tokio::test]
async fn test_insert_and_retrieve_by_author() {
    let store = test_store().await;
    assert!(store
        .insert(&post(1, "u", at(2024, 3, 9, 11, 0), "first"))
        .await
        .unwrap());
    assert!(store
        .insert(&post(2, "u", at(2024, 3, 9, 12, 0), "second"))
        .await
        .unwrap());
    assert!(store
        .insert(&post(3, "other", at(2024, 3, 9, 12, 0), "elsewhere"))
        .await
        .unwrap());

    let mut posts = store.retrieve_by_author("u").await.unwrap();
    posts.sort_by_key(|p| p.source_id);
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].body, "first");
    assert_eq!(posts[0].occurred_at, at(2024, 3, 9, 11, 0));
    assert!(!posts[0].is_posted);
    assert_eq!(posts[1].body, "second");

    assert!(store.retrieve_by_author("nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_insert_is_silent_noop() {
    let store = test_store().await;
    let ts = at(2024, 3, 9, 11, 0);
    assert!(store.insert(&post(1001, "u", ts, "A")).await.unwrap());
    assert!(!store.insert(&post(1001, "u", ts, "B")).await.unwrap());

    let posts = store.retrieve_by_author("u").await.unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].body, "A");
}

#[tokio::test]
async fn test_duplicate_insert_keeps_posted_flag() {
    let store = test_store().await;
    let ts = at(2024, 3, 9, 11, 0);
    store.insert(&post(7, "u", ts, "A")).await.unwrap();
    store.mark_posted(7).await.unwrap();
    store.insert(&post(7, "u", ts, "A")).await.unwrap();

    let stored = store.get_post(7).await.unwrap().unwrap();
    assert!(stored.is_posted);
}

#[tokio::test]
async fn test_mark_posted_twice_is_idempotent() {
    let store = test_store().await;
    let now = Utc::now();
    store.insert(&post(42, "u", now, "hello")).await.unwrap();

    store.mark_posted(42).await.unwrap();
    store.mark_posted(42).await.unwrap();

    let unposted = store.retrieve_unposted_today("u").await.unwrap();
    assert!(unposted.iter().all(|p| p.source_id != 42));
    assert!(store.get_post(42).await.unwrap().unwrap().is_posted);
}

#[tokio::test]
async fn test_mark_posted_unknown_id_is_ok() {
    let store = test_store().await;
    store.mark_posted(999).await.unwrap();
    assert!(store.get_post(999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unposted_on_filters_day_author_and_flag() {
    let store = test_store().await;
    let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

    store.insert(&post(1, "u", at(2024, 3, 9, 15, 0), "late")).await.unwrap();
    store.insert(&post(2, "u", at(2024, 3, 9, 8, 30), "early")).await.unwrap();
    store.insert(&post(3, "u", at(2024, 3, 8, 23, 59), "yesterday")).await.unwrap();
    store.insert(&post(4, "u", at(2024, 3, 9, 12, 0), "posted")).await.unwrap();
    store.insert(&post(5, "v", at(2024, 3, 9, 12, 0), "other author")).await.unwrap();
    store.mark_posted(4).await.unwrap();

    let posts = store.retrieve_unposted_on("u", day).await.unwrap();
    let ids: Vec<i64> = posts.iter().map(|p| p.source_id).collect();
    assert_eq!(ids, vec![2, 1], "oldest first, same day, unposted, same author");
}

#[tokio::test]
async fn test_unposted_today_excludes_yesterday() {
    let store = test_store().await;
    let now = Utc::now();
    store.insert(&post(10, "u", now, "today")).await.unwrap();
    store
        .insert(&post(11, "u", now - Duration::days(1), "yesterday"))
        .await
        .unwrap();

    let posts = store.retrieve_unposted_today("u").await.unwrap();
    let ids: Vec<i64> = posts.iter().map(|p| p.source_id).collect();
    assert_eq!(ids, vec![10]);
}

#[tokio::test]
async fn test_count_posts() {
    let store = test_store().await;
    assert_eq!(store.count_posts().await.unwrap(), (0, 0));

    store.insert(&post(1, "u", at(2024, 3, 9, 11, 0), "a")).await.unwrap();
    store.insert(&post(2, "u", at(2024, 3, 9, 12, 0), "b")).await.unwrap();
    store.mark_posted(1).await.unwrap();
    assert_eq!(store.count_posts().await.unwrap(), (2, 1));
}

#[tokio::test]
async fn test_file_store_maintenance_and_close() {
    let dir = tempfile::tempdir().unwrap();
    let config = MemoryConfig {
        db_path: dir.path().join("data/posts.db").display().to_string(),
        ..MemoryConfig::default()
    };
    let store = Store::new(&config).await.unwrap();
    store.insert(&post(1, "u", at(2024, 3, 9, 11, 0), "a")).await.unwrap();

    store.checkpoint().await.unwrap();
    store.vacuum().await.unwrap();
    assert!(store.db_size().await.unwrap() > 0);
    store.close().await;

    // Reopening keeps rows and does not re-run migrations.
    let reopened = Store::new(&config).await.unwrap();
    assert_eq!(reopened.count_posts().await.unwrap(), (1, 1));
    reopened.close().await;
}

#[tokio::test]
async fn test_lock_contention_exhausts_retries() {
    let dir = tempfile::tempdir().unwrap();
    let opts = SqliteConnectOptions::from_str(&format!(
        "sqlite:{}",
        dir.path().join("locked.db").display()
    ))
    .unwrap()
    .create_if_missing(true)
    .journal_mode(SqliteJournalMode::Wal)
    .busy_timeout(std::time::Duration::ZERO);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts.clone())
        .await
        .unwrap();
    Store::run_migrations(&pool).await.unwrap();
    let store = Store::from_pool(
        pool,
        RetryPolicy::new(3, std::time::Duration::from_millis(1)),
    );

    // Another writer holds the write lock for the whole attempt budget.
    let mut other = opts.connect().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut other)
        .await
        .unwrap();

    let err = store
        .insert(&post(1, "u", at(2024, 3, 9, 11, 0), "blocked"))
        .await
        .unwrap_err();
    match err {
        RelayError::LockExhausted {
            operation,
            attempts,
        } => {
            assert_eq!(operation, "insert");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected LockExhausted, got {other:?}"),
    }

    sqlx::query("ROLLBACK").execute(&mut other).await.unwrap();
    other.close().await.unwrap();

    // Once the lock is gone the same insert goes through.
    assert!(store
        .insert(&post(1, "u", at(2024, 3, 9, 11, 0), "unblocked"))
        .await
        .unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clones_share_one_guard() {
    let dir = tempfile::tempdir().unwrap();
    let config = MemoryConfig {
        db_path: dir.path().join("shared.db").display().to_string(),
        ..MemoryConfig::default()
    };
    let store = Store::new(&config).await.unwrap();

    // Four writers per id, all racing on clones of the same store.
    let mut handles = Vec::new();
    for n in 0..200i64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let id = n % 50;
            let fresh = store
                .insert(&post(id, "u", at(2024, 3, 9, 11, 0), "race"))
                .await?;
            store.mark_posted(id).await?;
            Ok::<_, RelayError>(fresh)
        }));
    }

    let mut fresh_inserts = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            fresh_inserts += 1;
        }
    }

    assert_eq!(fresh_inserts, 50);
    assert_eq!(store.count_posts().await.unwrap(), (50, 0));
    store.close().await;
}
