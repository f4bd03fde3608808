//! SQLite-backed persistent post store.
//!
//! Every operation takes a store-wide mutex before touching the database
//! and runs under a [`RetryPolicy`] that absorbs `database is locked`
//! failures. Split into submodules:
//! - `posts` -- insert, queries and the posted flag
//! - `retry` -- the retry-on-lock policy

mod posts;
mod retry;

pub use retry::{is_locked, RetryError, RetryPolicy};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use xrelay_core::{config::MemoryConfig, error::RelayError, shellexpand};

/// How long SQLite itself waits on a locked database before reporting it.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Persistent post store backed by SQLite.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    guard: Arc<Mutex<()>>,
    retry: RetryPolicy,
}

impl Store {
    /// Open (or create) the store, running migrations on first use.
    pub async fn new(config: &MemoryConfig) -> Result<Self, RelayError> {
        let db_path = shellexpand(&config.db_path);

        // Ensure parent directory exists.
        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RelayError::Store(format!("failed to create data dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| RelayError::Store(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| RelayError::Store(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;

        info!("Post store initialized at {db_path}");

        let retry = RetryPolicy::new(
            config.lock_retry_attempts,
            Duration::from_millis(config.lock_retry_base_ms),
        );
        Ok(Self::from_pool(pool, retry))
    }

    fn from_pool(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self {
            pool,
            guard: Arc::new(Mutex::new(())),
            retry,
        }
    }

    /// Run `op` holding the store mutex, retrying while the database is locked.
    ///
    /// The mutex is taken per attempt, so it is released during backoff.
    async fn guarded<T, F, Fut>(&self, operation: &str, op: F) -> Result<T, RelayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let guard = &self.guard;
        let op = &op;
        self.retry
            .execute(operation, is_locked, move || async move {
                let _held = guard.lock().await;
                op().await
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted {
                    operation,
                    attempts,
                } => RelayError::LockExhausted {
                    operation,
                    attempts,
                },
                RetryError::Fatal(e) => RelayError::Store(format!("{operation} failed: {e}")),
            })
    }

    /// Get the database file size in bytes.
    pub async fn db_size(&self) -> Result<u64, RelayError> {
        let pool = &self.pool;
        let (page_count, page_size) = self
            .guarded("db_size", move || async move {
                let (page_count,): (i64,) = sqlx::query_as("PRAGMA page_count")
                    .fetch_one(pool)
                    .await?;
                let (page_size,): (i64,) = sqlx::query_as("PRAGMA page_size")
                    .fetch_one(pool)
                    .await?;
                Ok::<_, sqlx::Error>((page_count, page_size))
            })
            .await?;

        Ok((page_count * page_size) as u64)
    }

    /// Fold the write-ahead log back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), RelayError> {
        let pool = &self.pool;
        self.guarded("checkpoint", move || async move {
            sqlx::query("PRAGMA wal_checkpoint(FULL)")
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await?;
        info!("WAL checkpoint complete");
        Ok(())
    }

    /// Rebuild the database file, reclaiming free pages.
    pub async fn vacuum(&self) -> Result<(), RelayError> {
        let pool = &self.pool;
        self.guarded("vacuum", move || async move {
            sqlx::query("VACUUM").execute(pool).await.map(|_| ())
        })
        .await?;
        info!("VACUUM complete");
        Ok(())
    }

    /// Release all connections. Call once at shutdown.
    pub async fn close(&self) {
        let _held = self.guard.lock().await;
        self.pool.close().await;
        info!("Post store closed");
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), RelayError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| RelayError::Store(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] = &[
            ("001_posts", include_str!("../../migrations/001_posts.sql")),
            (
                "002_posts_author_day",
                include_str!("../../migrations/002_posts_author_day.sql"),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        RelayError::Store(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| RelayError::Store(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    RelayError::Store(format!("failed to record migration {name}: {e}"))
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
