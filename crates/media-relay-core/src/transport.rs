//! Messaging platform boundary.
//!
//! The relay never talks to a platform SDK directly; everything goes
//! through [`MessagingTransport`], which a transport crate implements.

use crate::model::{
    ConversationId, ConversationLocator, Destination, FloodSignal, MediaKind, RawMessage,
};
use async_trait::async_trait;
use thiserror::Error;

/// Why a conversation could not be resolved.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The conversation does not exist or is invisible to the relay.
    #[error("conversation not found")]
    NotFound,
    /// The conversation exists but the relay may not read it.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// The platform could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure while listing history.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The relay lost read access while listing.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// Any other platform failure.
    #[error("{0}")]
    Other(String),
}

/// Rejection of a single send.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The platform asked the relay to back off.
    #[error("rate limited for {}s", .0.wait_secs)]
    RateLimited(FloodSignal),
    /// Any other rejection.
    #[error("{0}")]
    Rejected(String),
}

/// Media payload handed to the platform on send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    /// Media kind, used to pick the platform send method.
    pub kind: MediaKind,
    /// Provider-issued file handle.
    pub file_reference: String,
}

/// Interface to the messaging platform client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Resolves a locator into a conversation the relay can read.
    async fn resolve_conversation(
        &self,
        locator: &ConversationLocator,
    ) -> Result<ConversationId, ResolveError>;

    /// Lists messages whose IDs lie in `[min_id, max_id]`, in any order.
    async fn list_messages(
        &self,
        conversation: ConversationId,
        min_id: i32,
        max_id: i32,
    ) -> Result<Vec<RawMessage>, TransportError>;

    /// Sends one media payload; `caption` is omitted when `None`.
    async fn send_media(
        &self,
        destination: Destination,
        media: &MediaPayload,
        caption: Option<String>,
    ) -> Result<(), SendError>;
}
