//! # xrelay-core
//!
//! Core types, traits, configuration, time window and error handling for xrelay.

pub mod config;
pub mod error;
pub mod post;
pub mod traits;
pub mod window;

pub use config::shellexpand;
