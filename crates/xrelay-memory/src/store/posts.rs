//! Post insert, queries, and the posted flag.

use super::Store;
use chrono::{NaiveDate, Utc};
use tracing::debug;
use xrelay_core::{
    error::RelayError,
    post::{parse_timestamp, Post},
};

/// (source_id, author, occurred_at, body, is_posted)
type PostRow = (i64, String, String, String, i64);

const SELECT_POSTS: &str = "SELECT source_id, author, occurred_at, body, is_posted FROM posts";

impl Store {
    /// Insert a post. A `source_id` that is already stored is left untouched.
    ///
    /// Returns `true` when a new row was written.
    pub async fn insert(&self, post: &Post) -> Result<bool, RelayError> {
        let pool = &self.pool;
        let occurred_at = post.occurred_at_text();
        let occurred_at = &occurred_at;

        let inserted = self
            .guarded("insert", move || async move {
                let result = sqlx::query(
                    "INSERT INTO posts (source_id, is_posted, occurred_at, body, author) \
                     VALUES (?, 0, ?, ?, ?)",
                )
                .bind(post.source_id)
                .bind(occurred_at)
                .bind(&post.body)
                .bind(&post.author)
                .execute(pool)
                .await;

                match result {
                    Ok(_) => Ok(true),
                    Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
                    Err(e) => Err(e),
                }
            })
            .await?;

        if inserted {
            debug!("stored post {} by {}", post.source_id, post.author);
        } else {
            debug!("post {} already stored, skipping", post.source_id);
        }
        Ok(inserted)
    }

    /// Every stored post for an author, in no particular order.
    pub async fn retrieve_by_author(&self, author: &str) -> Result<Vec<Post>, RelayError> {
        let pool = &self.pool;
        let rows: Vec<PostRow> = self
            .guarded("retrieve_by_author", move || async move {
                sqlx::query_as(&format!("{SELECT_POSTS} WHERE author = ?"))
                    .bind(author)
                    .fetch_all(pool)
                    .await
            })
            .await?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Unposted posts by `author` from the current (UTC) date, oldest first.
    pub async fn retrieve_unposted_today(&self, author: &str) -> Result<Vec<Post>, RelayError> {
        self.retrieve_unposted_on(author, Utc::now().date_naive()).await
    }

    /// Unposted posts by `author` whose `occurred_at` falls on `day`, oldest first.
    pub async fn retrieve_unposted_on(
        &self,
        author: &str,
        day: NaiveDate,
    ) -> Result<Vec<Post>, RelayError> {
        let pool = &self.pool;
        let day = day.format("%Y-%m-%d").to_string();
        let day = &day;

        let rows: Vec<PostRow> = self
            .guarded("retrieve_unposted_today", move || async move {
                sqlx::query_as(&format!(
                    "{SELECT_POSTS} \
                     WHERE author = ? AND is_posted = 0 AND date(occurred_at) = ? \
                     ORDER BY occurred_at ASC, source_id ASC"
                ))
                .bind(author)
                .bind(day)
                .fetch_all(pool)
                .await
            })
            .await?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Look up a single post by its upstream id.
    pub async fn get_post(&self, source_id: i64) -> Result<Option<Post>, RelayError> {
        let pool = &self.pool;
        let row: Option<PostRow> = self
            .guarded("get_post", move || async move {
                sqlx::query_as(&format!("{SELECT_POSTS} WHERE source_id = ?"))
                    .bind(source_id)
                    .fetch_optional(pool)
                    .await
            })
            .await?;

        row.map(row_to_post).transpose()
    }

    /// Flag a post as evaluated. Marking twice is the same as marking once.
    pub async fn mark_posted(&self, source_id: i64) -> Result<(), RelayError> {
        let pool = &self.pool;
        self.guarded("mark_posted", move || async move {
            sqlx::query("UPDATE posts SET is_posted = 1 WHERE source_id = ?")
                .bind(source_id)
                .execute(pool)
                .await
                .map(|_| ())
        })
        .await
    }

    /// (total, unposted) row counts.
    pub async fn count_posts(&self) -> Result<(i64, i64), RelayError> {
        let pool = &self.pool;
        self.guarded("count_posts", move || async move {
            sqlx::query_as::<_, (i64, i64)>(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_posted = 0 THEN 1 ELSE 0 END), 0) \
                 FROM posts",
            )
            .fetch_one(pool)
            .await
        })
        .await
    }
}

fn row_to_post(row: PostRow) -> Result<Post, RelayError> {
    let (source_id, author, occurred_at, body, is_posted) = row;
    let occurred_at = parse_timestamp(&occurred_at).ok_or_else(|| {
        RelayError::Store(format!(
            "post {source_id} has malformed occurred_at '{occurred_at}'"
        ))
    })?;
    Ok(Post {
        source_id,
        author,
        occurred_at,
        body,
        is_posted: is_posted != 0,
    })
}
