//! Monitored account cache -- handle → upstream id, persisted as JSON.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use xrelay_core::{
    error::RelayError,
    post::{username, MonitoredAccount},
    traits::PostSource,
};

/// File-backed cache of the resolved monitored account.
#[derive(Debug, Clone)]
pub struct AccountCache {
    path: PathBuf,
}

impl AccountCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached account. A missing or unreadable file is a cache miss.
    pub fn load(&self) -> Option<MonitoredAccount> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("account cache {}: read failed: {e}", self.path.display());
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(account) => Some(account),
            Err(e) => {
                warn!(
                    "account cache {} is corrupt, treating as empty: {e}",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Overwrite the cache file. Writes a sibling temp file, then renames it.
    pub fn save(&self, account: &MonitoredAccount) -> Result<(), RelayError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(account)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Look `handle` up upstream, trying up to `attempts` times while the
    /// source comes back empty, and persist the result.
    ///
    /// Source errors are returned immediately. The cache file is only
    /// touched on success.
    pub async fn resolve(
        &self,
        source: &dyn PostSource,
        handle: &str,
        attempts: u32,
    ) -> Result<MonitoredAccount, RelayError> {
        let attempts = attempts.max(1);
        let login = username(handle);

        for attempt in 1..=attempts {
            if let Some(resolved) = source.resolve_account(login).await? {
                let account = MonitoredAccount::new(handle, resolved);
                self.save(&account)?;
                info!(
                    "resolved {} to {} ({}) on attempt {attempt}",
                    account.handle, account.numeric_id, account.display_name
                );
                return Ok(account);
            }
            warn!(
                "{}: no account for @{login} (attempt {attempt}/{attempts})",
                source.name()
            );
        }

        Err(RelayError::ResolutionExhausted {
            handle: handle.to_string(),
            attempts,
        })
    }
}
