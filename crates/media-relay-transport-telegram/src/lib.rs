#![deny(missing_docs)]
//! Telegram transport adapter for the media relay.

/// Telegram-specific bot handlers and status messaging.
pub mod bot;
/// Telegram transport configuration.
pub mod config;
/// Telegram runtime entrypoint.
pub mod runner;
/// Bot API implementation of the messaging transport.
pub mod transport;
