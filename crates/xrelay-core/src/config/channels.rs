use serde::{Deserialize, Serialize};

/// Delivery channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    pub telegram: Option<TelegramConfig>,
}

/// Telegram bot config.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    /// Chats and channels that receive every notification.
    #[serde(default)]
    pub chat_ids: Vec<i64>,
    /// Send the found image with the message as caption instead of plain text.
    #[serde(default)]
    pub send_photos: bool,
}
