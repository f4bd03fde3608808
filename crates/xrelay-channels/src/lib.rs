//! # xrelay-channels
//!
//! Delivery channels for finished notifications.

pub mod telegram;

pub use telegram::TelegramNotifier;
