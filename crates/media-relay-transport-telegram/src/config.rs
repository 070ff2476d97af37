//! Telegram transport settings.

use config::ConfigError;
use media_relay_core::config::RelaySettings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default number of retries of one history probe after a rate limit.
pub const DEFAULT_PROBE_RETRY_LIMIT: u32 = 3;

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
    /// Chat the bot may forward into and delete from while probing history.
    pub scratch_chat_id: Option<i64>,
    /// Rate-limit retries of one probe before the ID is given up.
    #[serde(default = "default_probe_retry_limit")]
    pub probe_retry_limit: u32,
}

const fn default_probe_retry_limit() -> u32 {
    DEFAULT_PROBE_RETRY_LIMIT
}

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        media_relay_core::config::build_config()?.try_deserialize()
    }
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Relay engine settings.
    pub relay: Arc<RelaySettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(relay: RelaySettings, telegram: TelegramSettings) -> Self {
        Self {
            relay: Arc::new(relay),
            telegram: Arc::new(telegram),
        }
    }
}

/// Minimum interval between progress edits of a status message, in milliseconds.
pub const PROGRESS_EDIT_INTERVAL_MS: u64 = 3000;
/// Initial backoff of resilient status-message calls, in milliseconds.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff of resilient status-message calls, in milliseconds.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Retries of resilient status-message calls.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_retry_limit_defaults_when_missing() {
        let settings: TelegramSettings = serde_json::from_value(serde_json::json!({
            "telegram_token": "123:abc",
        }))
        .expect("settings");
        assert_eq!(settings.probe_retry_limit, DEFAULT_PROBE_RETRY_LIMIT);
        assert_eq!(settings.scratch_chat_id, None);
    }

    #[test]
    fn scratch_chat_is_read() {
        let settings: TelegramSettings = serde_json::from_value(serde_json::json!({
            "telegram_token": "123:abc",
            "scratch_chat_id": -100_999,
            "probe_retry_limit": 1,
        }))
        .expect("settings");
        assert_eq!(settings.scratch_chat_id, Some(-100_999));
        assert_eq!(settings.probe_retry_limit, 1);
    }
}
