//! Telegram Bot API notifier.
//!
//! Sends each notification to every configured chat via `sendMessage`,
//! or `sendPhoto` when photos are enabled and an image was found.
//! Docs: <https://core.telegram.org/bots/api>

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use xrelay_core::{
    config::TelegramConfig, error::RelayError, post::Notification, traits::Notifier,
};

/// Telegram rejects photo captions longer than this.
const MAX_CAPTION_LEN: usize = 1024;

/// Telegram notifier using the Bot API.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TgResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    /// Create a new notifier from config.
    pub fn new(config: TelegramConfig) -> Self {
        let base_url = format!("https://api.telegram.org/bot{}", config.bot_token);
        Self {
            config,
            client: reqwest::Client::new(),
            base_url,
        }
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<(), RelayError> {
        let url = format!("{}/{method}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("telegram {method} failed: {e}")))?;

        let status = resp.status();
        let parsed: Option<TgResponse> = resp.json().await.ok();
        match parsed {
            Some(TgResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(TgResponse { description, .. }) => Err(RelayError::Channel(format!(
                "telegram {method} failed ({status}): {}",
                description.unwrap_or_default()
            ))),
            None => Err(RelayError::Channel(format!(
                "telegram {method} failed ({status}): unreadable response"
            ))),
        }
    }

    /// Deliver one notification to one chat.
    async fn deliver(&self, chat_id: i64, notification: &Notification) -> Result<(), RelayError> {
        if let Some(image_url) = photo_url(notification, self.config.send_photos) {
            match self
                .call("sendPhoto", photo_body(chat_id, image_url, &notification.message))
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => warn!("telegram: photo to {chat_id} failed, sending text: {e}"),
            }
        }
        self.call("sendMessage", text_body(chat_id, &notification.message)).await
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    /// Send to every configured chat. Fails only if no chat received it.
    async fn notify(&self, notification: &Notification) -> Result<(), RelayError> {
        let mut delivered = 0usize;
        let mut last_error = None;

        for &chat_id in &self.config.chat_ids {
            match self.deliver(chat_id, notification).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("telegram: delivery to {chat_id} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if delivered == 0 => Err(e),
            _ => {
                info!(
                    "telegram: delivered to {delivered}/{} chats",
                    self.config.chat_ids.len()
                );
                Ok(())
            }
        }
    }
}

/// The image to send as a photo, if photos are on and the caption fits.
fn photo_url(notification: &Notification, send_photos: bool) -> Option<&str> {
    if !send_photos || notification.message.chars().count() > MAX_CAPTION_LEN {
        return None;
    }
    notification.image_url.as_deref()
}

fn text_body(chat_id: i64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "chat_id": chat_id,
        "text": text,
        "disable_web_page_preview": true,
    })
}

fn photo_body(chat_id: i64, photo: &str, caption: &str) -> serde_json::Value {
    serde_json::json!({
        "chat_id": chat_id,
        "photo": photo,
        "caption": caption,
    })
}
