use crate::{
    error::RelayError,
    post::{FetchedPost, Notification, ResolvedAccount},
};
use async_trait::async_trait;

/// Upstream post source -- where monitored posts come from.
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Human-readable source name.
    fn name(&self) -> &str;

    /// Look up a handle. `Ok(None)` means the upstream returned nothing
    /// this time; callers may retry.
    async fn resolve_account(&self, handle: &str) -> Result<Option<ResolvedAccount>, RelayError>;

    /// Fetch up to `limit` of the most recent posts for an account id.
    async fn fetch_recent_posts(
        &self,
        account_id: &str,
        limit: usize,
    ) -> Result<Vec<FetchedPost>, RelayError>;
}

/// Best-effort image search used to decorate notifications.
#[async_trait]
pub trait ImageLookup: Send + Sync {
    async fn lookup_image(&self, keyword: &str) -> Result<Option<String>, RelayError>;
}

/// Delivery channel for finished notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, notification: &Notification) -> Result<(), RelayError>;
}
