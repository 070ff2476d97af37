/// Command and link handlers
pub mod handlers;
/// Live progress of range jobs in their status message
pub mod progress;
/// Resilient messaging with automatic retry for Telegram API operations
pub mod resilient;
