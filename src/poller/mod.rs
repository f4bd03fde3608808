//! One poll cycle: make sure the monitored account is known, pull its recent
//! posts into the store, then evaluate every unposted post from today
//! exactly once and turn the keyword hits into notifications.


use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use xrelay_core::{
    error::RelayError,
    post::{FetchedPost, MonitoredAccount, Notification, Post},
    traits::{ImageLookup, PostSource},
    window::{is_same_day, TimeWindow},
};
use xrelay_memory::{AccountCache, Store};

/// What a cycle is asked to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub handle: String,
    pub keywords: Vec<String>,
}

impl Watch {
    pub fn is_configured(&self) -> bool {
        !self.handle.trim().trim_start_matches('@').is_empty() && !self.keywords.is_empty()
    }
}

/// Cycle tuning taken from config.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub window: TimeWindow,
    pub batch_size: usize,
    pub resolve_attempts: u32,
}

/// A distinct message text and the keywords it matched, in keyword order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedMessage {
    pub message: String,
    pub keywords: Vec<String>,
}

pub struct Poller {
    store: Store,
    source: Arc<dyn PostSource>,
    images: Option<Arc<dyn ImageLookup>>,
    accounts: AccountCache,
    settings: PollerSettings,
}

impl Poller {
    pub fn new(
        store: Store,
        source: Arc<dyn PostSource>,
        images: Option<Arc<dyn ImageLookup>>,
        accounts: AccountCache,
        settings: PollerSettings,
    ) -> Self {
        Self {
            store,
            source,
            images,
            accounts,
            settings,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn window(&self) -> &TimeWindow {
        &self.settings.window
    }

    /// Run a full cycle and return the notifications it produced.
    pub async fn run_cycle(&self, watch: &Watch) -> Result<Vec<Notification>, RelayError> {
        self.run_cycle_at(watch, Utc::now()).await
    }

    /// Run a full cycle with `now` as the clock for the "today" filter.
    ///
    /// Any failure before evaluation aborts the cycle with nothing marked.
    /// Once evaluation starts each post is marked posted before it is judged,
    /// so a post is never evaluated twice even if a later step fails. A store
    /// error partway through evaluation fails the whole cycle: posts marked
    /// and matched before it produce no notification and are not retried.
    pub async fn run_cycle_at(
        &self,
        watch: &Watch,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, RelayError> {
        let account = self.ensure_account(&watch.handle).await?;

        let fetched = self
            .source
            .fetch_recent_posts(&account.numeric_id, self.settings.batch_size)
            .await?;
        let inserted = self.ingest(&account, &fetched).await?;
        debug!(
            "{}: fetched {} posts for {}, {inserted} new",
            self.source.name(),
            fetched.len(),
            account.handle
        );

        let matched = self.evaluate(account.username(), &watch.keywords, now).await?;
        let notifications = self.build_notifications(matched).await;
        if !notifications.is_empty() {
            info!(
                "{} notification(s) for {}",
                notifications.len(),
                account.handle
            );
        }
        Ok(notifications)
    }

    /// Cached account for `handle`, resolving upstream when the cache is
    /// empty, unreadable, or belongs to another handle.
    async fn ensure_account(&self, handle: &str) -> Result<MonitoredAccount, RelayError> {
        match self.accounts.load() {
            Some(account) if !account.is_stale_for(handle) => Ok(account),
            cached => {
                match cached {
                    Some(previous) => info!(
                        "monitored handle changed from {} to {handle}, re-resolving",
                        previous.handle
                    ),
                    None => info!("no cached account for {handle}, resolving"),
                }
                self.accounts
                    .resolve(
                        self.source.as_ref(),
                        handle,
                        self.settings.resolve_attempts,
                    )
                    .await
            }
        }
    }

    /// Store every fetched post. Returns how many were new.
    async fn ingest(
        &self,
        account: &MonitoredAccount,
        fetched: &[FetchedPost],
    ) -> Result<usize, RelayError> {
        let mut inserted = 0;
        for item in fetched {
            let post = Post::from_fetched(item, account.username());
            if self.store.insert(&post).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Mark and judge every unposted post `author` made on `now`'s date.
    ///
    /// Matching is case-sensitive substring search. Posts with identical
    /// text collapse into one entry.
    pub async fn evaluate(
        &self,
        author: &str,
        keywords: &[String],
        now: DateTime<Utc>,
    ) -> Result<Vec<MatchedMessage>, RelayError> {
        let posts = self.store.retrieve_unposted_on(author, now.date_naive()).await?;
        let mut matched: Vec<MatchedMessage> = Vec::new();

        for post in &posts {
            self.store.mark_posted(post.source_id).await?;

            if !is_same_day(&post.occurred_at, &now) {
                debug!("post {} is not from today, skipping", post.source_id);
                continue;
            }
            if !self.settings.window.is_in_window(&post.occurred_at) {
                debug!(
                    "post {} at {} is outside {}",
                    post.source_id, post.occurred_at, self.settings.window
                );
                continue;
            }

            let hits: Vec<&String> = keywords
                .iter()
                .filter(|k| post.body.contains(k.as_str()))
                .collect();
            if hits.is_empty() {
                continue;
            }

            match matched.iter_mut().find(|m| m.message == post.body) {
                Some(existing) => {
                    for kw in hits {
                        if !existing.keywords.contains(kw) {
                            existing.keywords.push(kw.clone());
                        }
                    }
                }
                None => matched.push(MatchedMessage {
                    message: post.body.clone(),
                    keywords: hits.into_iter().cloned().collect(),
                }),
            }
        }

        Ok(matched)
    }

    /// Attach an image to each matched message. Lookup failures only cost
    /// the image.
    async fn build_notifications(&self, matched: Vec<MatchedMessage>) -> Vec<Notification> {
        let mut notifications = Vec::with_capacity(matched.len());
        for entry in matched {
            let image_url = match (&self.images, entry.keywords.first()) {
                (Some(images), Some(keyword)) => match images.lookup_image(keyword).await {
                    Ok(url) => url,
                    Err(e) => {
                        warn!("image lookup for '{keyword}' failed: {e}");
                        None
                    }
                },
                _ => None,
            };
            notifications.push(Notification {
                message: entry.message,
                image_url,
            });
        }
        notifications
    }
}
