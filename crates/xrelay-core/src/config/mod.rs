mod channels;
mod defaults;


pub use channels::*;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::RelayError;
use crate::window::TimeWindow;
use defaults::*;

/// Environment override for `source.bearer_token`.
pub const BEARER_TOKEN_ENV: &str = "XRELAY_BEARER_TOKEN";
/// Environment override for `channel.telegram.bot_token`.
pub const TELEGRAM_TOKEN_ENV: &str = "XRELAY_TELEGRAM_TOKEN";

/// Top-level xrelay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// What to watch and what to look for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Upstream handle, e.g. `@DeItaone`. Empty = nothing monitored.
    #[serde(default)]
    pub handle: String,
    /// Case-sensitive substrings matched against post text.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// How many recent posts to fetch per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_account_cache")]
    pub account_cache: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            handle: String::new(),
            keywords: Vec::new(),
            batch_size: default_batch_size(),
            account_cache: default_account_cache(),
        }
    }
}

/// Notification hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_start")]
    pub start: String,
    #[serde(default = "default_window_end")]
    pub end: String,
    /// IANA timezone the bounds are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start: default_window_start(),
            end: default_window_end(),
            timezone: default_timezone(),
        }
    }
}

impl WindowConfig {
    pub fn to_window(&self) -> Result<TimeWindow, RelayError> {
        TimeWindow::parse(&self.start, &self.end, &self.timezone)
    }
}

/// Post store config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_lock_retry_attempts")]
    pub lock_retry_attempts: u32,
    /// Base delay for lock retries; attempt `n` waits `base * 2^n`.
    #[serde(default = "default_lock_retry_base_ms")]
    pub lock_retry_base_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            lock_retry_attempts: default_lock_retry_attempts(),
            lock_retry_base_ms: default_lock_retry_base_ms(),
        }
    }
}

/// Upstream X API config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: String,
    /// Lookups allowed before a handle is declared unresolvable.
    #[serde(default = "default_resolve_attempts")]
    pub resolve_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            bearer_token: String::new(),
            resolve_attempts: default_resolve_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Image search used to decorate notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_image_search_url")]
    pub search_url: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_url: default_image_search_url(),
        }
    }
}

/// Poll scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Trim, drop empties, and dedupe keywords keeping the first occurrence.
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        let keyword = keyword.trim();
        if !keyword.is_empty() && !out.iter().any(|k| k == keyword) {
            out.push(keyword.to_string());
        }
    }
    out
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. Token environment
/// variables override whatever the file says.
pub fn load(path: &str) -> Result<Config, RelayError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        parse(&content)?
    } else {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Parse configuration text and normalize it.
pub fn parse(content: &str) -> Result<Config, RelayError> {
    let mut config: Config = toml::from_str(content)
        .map_err(|e| RelayError::Config(format!("failed to parse config: {e}")))?;
    config.monitor.keywords = normalize_keywords(&config.monitor.keywords);
    if config.monitor.batch_size == 0 {
        return Err(RelayError::Config(
            "monitor.batch_size must be at least 1".to_string(),
        ));
    }
    config.window.to_window()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup(BEARER_TOKEN_ENV).filter(|t| !t.is_empty()) {
        config.source.bearer_token = token;
    }
    if let Some(token) = lookup(TELEGRAM_TOKEN_ENV).filter(|t| !t.is_empty()) {
        config
            .channel
            .telegram
            .get_or_insert_with(TelegramConfig::default)
            .bot_token = token;
    }
}
