//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "xrelay".to_string()
}

pub fn default_data_dir() -> String {
    "~/.xrelay".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_batch_size() -> usize {
    10
}

pub fn default_account_cache() -> String {
    "~/.xrelay/data/monitored_account.json".to_string()
}

pub fn default_window_start() -> String {
    "10:00:00".to_string()
}

pub fn default_window_end() -> String {
    "23:30:00".to_string()
}

pub fn default_timezone() -> String {
    "Europe/Istanbul".to_string()
}

pub fn default_db_path() -> String {
    "~/.xrelay/data/posts.db".to_string()
}

pub fn default_lock_retry_attempts() -> u32 {
    5
}

pub fn default_lock_retry_base_ms() -> u64 {
    200
}

pub fn default_source_base_url() -> String {
    "https://api.x.com".to_string()
}

pub fn default_resolve_attempts() -> u32 {
    10
}

pub fn default_timeout_secs() -> u64 {
    30
}

pub fn default_image_search_url() -> String {
    "https://www.google.com/search".to_string()
}

pub fn default_poll_interval() -> u64 {
    45
}
