//! Testing helpers: an in-memory transport and message constructors.

use crate::model::{
    Attachment, ConversationId, ConversationLocator, Destination, MediaKind, RawMessage,
};
use crate::transport::{
    MediaPayload, MessagingTransport, ResolveError, SendError, TransportError,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

/// Message carrying media of `kind`, with file reference `file-<id>`.
#[must_use]
pub fn media_message(id: i32, kind: MediaKind) -> RawMessage {
    RawMessage {
        id,
        caption: Some(format!("caption {id}")),
        attachment: Some(Attachment::Media {
            kind,
            file_reference: format!("file-{id}"),
        }),
    }
}

/// Plain text message.
#[must_use]
pub fn text_message(id: i32) -> RawMessage {
    RawMessage {
        id,
        caption: Some(format!("text {id}")),
        attachment: None,
    }
}

/// Text message whose only attachment is a link preview.
#[must_use]
pub fn preview_message(id: i32) -> RawMessage {
    RawMessage {
        id,
        caption: Some("https://example.com".to_string()),
        attachment: Some(Attachment::LinkPreview),
    }
}

/// One recorded `send_media` call.
#[derive(Debug, Clone)]
pub struct SendRecord {
    /// Destination of the call.
    pub destination: Destination,
    /// File reference that was sent.
    pub file_reference: String,
    /// Caption field of the call.
    pub caption: Option<String>,
    /// Whether the transport accepted the call.
    pub accepted: bool,
    /// (Virtual) time of the call.
    pub at: Instant,
}

/// In-memory transport with scripted send results.
#[derive(Default)]
pub struct FakeTransport {
    history: Vec<RawMessage>,
    descending: bool,
    resolve_error: Option<ResolveError>,
    script: Mutex<HashMap<String, VecDeque<Result<(), SendError>>>>,
    calls: Mutex<Vec<SendRecord>>,
}

impl FakeTransport {
    /// Transport whose every conversation holds `history`.
    #[must_use]
    pub fn with_history(history: Vec<RawMessage>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    /// Deliver listed messages newest first.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Make conversation resolution fail.
    #[must_use]
    pub fn unresolvable(mut self, error: ResolveError) -> Self {
        self.resolve_error = Some(error);
        self
    }

    /// Queue results for sends of `file_reference`; unscripted sends succeed.
    #[must_use]
    pub fn script(self, file_reference: &str, results: Vec<Result<(), SendError>>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_reference.to_string(), results.into());
        self
    }

    /// Every send call, in order.
    pub fn calls(&self) -> Vec<SendRecord> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// File references of accepted sends, in order.
    pub fn delivered(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.accepted)
            .map(|c| c.file_reference)
            .collect()
    }
}

#[async_trait]
impl MessagingTransport for FakeTransport {
    async fn resolve_conversation(
        &self,
        locator: &ConversationLocator,
    ) -> Result<ConversationId, ResolveError> {
        if let Some(err) = &self.resolve_error {
            return Err(err.clone());
        }
        Ok(match locator {
            ConversationLocator::Id(id) => *id,
            ConversationLocator::Handle(_) => ConversationId(-1_000_000_000_001),
        })
    }

    async fn list_messages(
        &self,
        _conversation: ConversationId,
        min_id: i32,
        max_id: i32,
    ) -> Result<Vec<RawMessage>, TransportError> {
        let mut found: Vec<RawMessage> = self
            .history
            .iter()
            .filter(|m| m.id >= min_id && m.id <= max_id)
            .cloned()
            .collect();
        if self.descending {
            found.sort_by(|a, b| b.id.cmp(&a.id));
        }
        Ok(found)
    }

    async fn send_media(
        &self,
        destination: Destination,
        media: &MediaPayload,
        caption: Option<String>,
    ) -> Result<(), SendError> {
        let result = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&media.file_reference)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()));
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SendRecord {
                destination,
                file_reference: media.file_reference.clone(),
                caption,
                accepted: result.is_ok(),
                at: Instant::now(),
            });
        result
    }
}
