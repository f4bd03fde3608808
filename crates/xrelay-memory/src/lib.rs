//! # xrelay-memory
//!
//! Persistent post store (SQLite-backed) and the monitored account cache.

pub mod account_cache;
pub mod store;

pub use account_cache::AccountCache;
pub use store::{RetryError, RetryPolicy, Store};
