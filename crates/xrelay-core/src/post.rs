//! Posts, monitored accounts and notifications.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Text format used to persist `occurred_at`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A post as returned by the upstream source, before ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPost {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub body: String,
    pub author_handle: String,
}

/// A stored post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub source_id: i64,
    pub author: String,
    pub occurred_at: DateTime<Utc>,
    pub body: String,
    pub is_posted: bool,
}

impl Post {
    /// Build an unposted row from a fetched post, filed under `author`.
    pub fn from_fetched(fetched: &FetchedPost, author: &str) -> Self {
        Self {
            source_id: fetched.id,
            author: author.to_string(),
            occurred_at: fetched.occurred_at,
            body: normalize_body(&fetched.body),
            is_posted: false,
        }
    }

    /// `occurred_at` in the persisted text form.
    pub fn occurred_at_text(&self) -> String {
        format_timestamp(&self.occurred_at)
    }
}

/// Upstream account details resolved for a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub numeric_id: String,
    pub display_name: String,
}

/// The account being watched, as persisted in the account cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredAccount {
    pub handle: String,
    pub numeric_id: String,
    pub display_name: String,
}

impl MonitoredAccount {
    pub fn new(handle: &str, resolved: ResolvedAccount) -> Self {
        Self {
            handle: format!("@{}", username(handle)),
            numeric_id: resolved.numeric_id,
            display_name: resolved.display_name,
        }
    }

    /// Handle without the leading `@`; this is the `author` posts are stored under.
    pub fn username(&self) -> &str {
        username(&self.handle)
    }

    /// Whether this cached account no longer matches the configured handle.
    pub fn is_stale_for(&self, handle: &str) -> bool {
        self.username() != username(handle)
    }
}

/// A notification-ready message with an optional illustrative image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub image_url: Option<String>,
}

/// Strip a leading `@` from a handle.
pub fn username(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}

/// Decode the HTML entities the upstream leaves in post text.
pub fn normalize_body(body: &str) -> String {
    body.replace("&amp;", "&")
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

/// Parse a persisted `occurred_at` value back into UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
