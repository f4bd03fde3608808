//! X (Twitter) API v2 post source.
//!
//! Uses `GET /2/users/by/username/:username` to resolve handles and
//! `GET /2/users/:id/tweets` for the recent timeline. Bearer-token auth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use xrelay_core::{
    config::SourceConfig,
    error::RelayError,
    post::{FetchedPost, ResolvedAccount},
    traits::PostSource,
};

/// The timeline endpoint only accepts `max_results` in this range.
const MIN_RESULTS: usize = 5;
const MAX_RESULTS: usize = 100;

/// X API v2 client.
pub struct XApiSource {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

// --- X API types ---

#[derive(Debug, Deserialize)]
struct XResponse<T> {
    data: Option<T>,
    #[serde(default)]
    includes: XIncludes,
    #[serde(default)]
    errors: Vec<XProblem>,
}

#[derive(Debug, Default, Deserialize)]
struct XIncludes {
    #[serde(default)]
    users: Vec<XUser>,
}

#[derive(Debug, Deserialize)]
struct XUser {
    id: String,
    name: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct XTweet {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
    author_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XProblem {
    title: Option<String>,
    detail: Option<String>,
}

impl XApiSource {
    /// Create from config values.
    pub fn from_config(config: &SourceConfig) -> Result<Self, RelayError> {
        if config.bearer_token.is_empty() {
            return Err(RelayError::Config(
                "source.bearer_token is empty (set it or XRELAY_BEARER_TOKEN)".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        })
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, RelayError> {
        debug!("x-api: GET {url}");
        self.client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("x-api request failed: {e}")))
    }
}

#[async_trait]
impl PostSource for XApiSource {
    fn name(&self) -> &str {
        "x-api"
    }

    async fn resolve_account(&self, handle: &str) -> Result<Option<ResolvedAccount>, RelayError> {
        let url = format!("{}/2/users/by/username/{handle}", self.base_url);
        let resp = self.get(&url, &[]).await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!(
                "x-api user lookup returned {status}: {text}"
            )));
        }

        let parsed: XResponse<XUser> = resp
            .json()
            .await
            .map_err(|e| RelayError::Upstream(format!("x-api: failed to parse user: {e}")))?;
        Ok(account_from_response(parsed))
    }

    async fn fetch_recent_posts(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<FetchedPost>, RelayError> {
        let url = format!("{}/2/users/{account_id}/tweets", self.base_url);
        let query = [
            (
                "max_results",
                limit.clamp(MIN_RESULTS, MAX_RESULTS).to_string(),
            ),
            ("tweet.fields", "created_at,author_id".to_string()),
            ("expansions", "author_id".to_string()),
            ("user.fields", "username".to_string()),
        ];
        let resp = self.get(&url, &query).await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!(
                "x-api timeline returned {status}: {text}"
            )));
        }

        let parsed: XResponse<Vec<XTweet>> = resp
            .json()
            .await
            .map_err(|e| RelayError::Upstream(format!("x-api: failed to parse timeline: {e}")))?;
        posts_from_timeline(parsed, limit)
    }
}

fn account_from_response(resp: XResponse<XUser>) -> Option<ResolvedAccount> {
    if resp.data.is_none() {
        for problem in &resp.errors {
            debug!(
                "x-api: user lookup problem: {}",
                problem
                    .detail
                    .as_deref()
                    .or(problem.title.as_deref())
                    .unwrap_or("unknown")
            );
        }
    }
    resp.data.map(|user| ResolvedAccount {
        numeric_id: user.id,
        display_name: user.name,
    })
}

fn posts_from_timeline(
    resp: XResponse<Vec<XTweet>>,
    limit: usize,
) -> Result<Vec<FetchedPost>, RelayError> {
    // An account with no posts comes back without `data` and without errors.
    let Some(tweets) = resp.data else {
        if let Some(problem) = resp.errors.first() {
            return Err(RelayError::Upstream(format!(
                "x-api timeline error: {}",
                problem
                    .detail
                    .as_deref()
                    .or(problem.title.as_deref())
                    .unwrap_or("unknown")
            )));
        }
        return Ok(Vec::new());
    };

    let mut posts = Vec::with_capacity(tweets.len().min(limit));
    for tweet in tweets.into_iter().take(limit) {
        let id: i64 = tweet
            .id
            .parse()
            .map_err(|e| RelayError::Upstream(format!("x-api: bad post id {}: {e}", tweet.id)))?;
        let Some(occurred_at) = tweet.created_at else {
            warn!("x-api: post {id} has no created_at, skipping");
            continue;
        };
        let author_handle = tweet
            .author_id
            .as_deref()
            .and_then(|author_id| resp.includes.users.iter().find(|u| u.id == author_id))
            .map(|u| u.username.clone())
            .unwrap_or_default();
        posts.push(FetchedPost {
            id,
            occurred_at,
            body: tweet.text,
            author_handle,
        });
    }
    Ok(posts)
}
