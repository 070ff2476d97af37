//! Configuration and settings management
//!
//! Loads relay tuning knobs from config files and environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default minimum spacing between successful sends, in milliseconds.
pub const DEFAULT_SEND_SPACING_MS: u64 = 1000;
/// Default number of retries of an item after a rate-limit signal.
pub const DEFAULT_FLOOD_RETRY_LIMIT: u32 = 1;
/// Default maximum number of message IDs one range job may cover.
pub const DEFAULT_MAX_RANGE_SPAN: u64 = 2000;

/// Relay settings loaded from environment variables and config files.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelaySettings {
    /// Minimum spacing between successful sends of one job, in milliseconds.
    #[serde(default = "default_send_spacing_ms")]
    pub send_spacing_ms: u64,
    /// How many times a rate-limited item is retried before it fails.
    #[serde(default = "default_flood_retry_limit")]
    pub flood_retry_limit: u32,
    /// Largest accepted `max_id - min_id + 1` of a range request.
    #[serde(default = "default_max_range_span")]
    pub max_range_span: u64,
}

const fn default_send_spacing_ms() -> u64 {
    DEFAULT_SEND_SPACING_MS
}

const fn default_flood_retry_limit() -> u32 {
    DEFAULT_FLOOD_RETRY_LIMIT
}

const fn default_max_range_span() -> u64 {
    DEFAULT_MAX_RANGE_SPAN
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            send_spacing_ms: DEFAULT_SEND_SPACING_MS,
            flood_retry_limit: DEFAULT_FLOOD_RETRY_LIMIT,
            max_range_span: DEFAULT_MAX_RANGE_SPAN,
        }
    }
}

impl RelaySettings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Minimum spacing between successful sends.
    #[must_use]
    pub const fn send_spacing(&self) -> Duration {
        Duration::from_millis(self.send_spacing_ms)
    }
}

/// Builds the layered configuration shared by every settings section.
///
/// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
/// `config/local` (all optional), `APP__*` variables, plain variables.
///
/// # Errors
///
/// Returns a `ConfigError` if a present source cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE maps to snake_case; empty values count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg = Config::builder().build().expect("empty config");
        let settings: RelaySettings = cfg.try_deserialize().expect("defaults");
        assert_eq!(settings.send_spacing_ms, DEFAULT_SEND_SPACING_MS);
        assert_eq!(settings.flood_retry_limit, DEFAULT_FLOOD_RETRY_LIMIT);
        assert_eq!(settings.max_range_span, DEFAULT_MAX_RANGE_SPAN);
        assert_eq!(settings.send_spacing(), Duration::from_secs(1));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = Config::builder()
            .set_override("send_spacing_ms", 250)
            .and_then(|b| b.set_override("flood_retry_limit", 3))
            .and_then(|b| b.build())
            .expect("config");
        let settings: RelaySettings = cfg.try_deserialize().expect("settings");
        assert_eq!(settings.send_spacing(), Duration::from_millis(250));
        assert_eq!(settings.flood_retry_limit, 3);
        assert_eq!(settings.max_range_span, DEFAULT_MAX_RANGE_SPAN);
    }
}
