//! Bot API implementation of the relay's messaging boundary.
//!
//! The Bot API cannot list chat history, so history is read by probing:
//! every ID in the interval is forwarded into a scratch chat, the copy is
//! classified and then deleted. IDs that cannot be forwarded are treated
//! as absent.

use crate::config::TelegramSettings;
use async_trait::async_trait;
use media_relay_core::model::{
    Attachment, ConversationId, ConversationLocator, Destination, FloodSignal, MediaKind,
    RawMessage,
};
use media_relay_core::transport::{
    MediaPayload, MessagingTransport, ResolveError, SendError, TransportError,
};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InputFile, MessageEntityKind, MessageId, Recipient, ThreadId,
};
use teloxide::{ApiError, RequestError};
use tracing::{debug, warn};

/// How a failed forward probe is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProbeFailure {
    /// Wait and probe the same ID again.
    RateLimited(Duration),
    /// No forwardable message under this ID.
    Missing,
    /// The bot lost access to the source or scratch chat.
    Denied(String),
    /// Network or unexpected failure.
    Fatal(String),
}

/// [`MessagingTransport`] backed by a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    scratch_chat: Option<ChatId>,
    probe_retry_limit: u32,
}

impl TelegramTransport {
    /// Creates a transport; history scans need `scratch_chat_id` to be set.
    #[must_use]
    pub fn new(bot: Bot, settings: &TelegramSettings) -> Self {
        Self {
            bot,
            scratch_chat: settings.scratch_chat_id.map(ChatId),
            probe_retry_limit: settings.probe_retry_limit,
        }
    }

    async fn probe(
        &self,
        scratch: ChatId,
        source: ChatId,
        id: i32,
    ) -> Result<Option<RawMessage>, TransportError> {
        let mut retries = 0u32;
        let copy = loop {
            match self
                .bot
                .forward_message(scratch, source, MessageId(id))
                .disable_notification(true)
                .await
            {
                Ok(copy) => break copy,
                Err(err) => match classify_probe_error(&err) {
                    ProbeFailure::RateLimited(wait) if retries < self.probe_retry_limit => {
                        retries += 1;
                        warn!(
                            message_id = id,
                            retries,
                            retry_after_secs = wait.as_secs(),
                            "Probe rate limited, waiting before retry"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    ProbeFailure::RateLimited(_) => {
                        return Err(TransportError::Other(format!(
                            "rate limit persisted while reading message {id}"
                        )));
                    }
                    ProbeFailure::Missing => {
                        debug!(message_id = id, error = %err, "Probe found nothing");
                        return Ok(None);
                    }
                    ProbeFailure::Denied(reason) => return Err(TransportError::AccessDenied(reason)),
                    ProbeFailure::Fatal(reason) => return Err(TransportError::Other(reason)),
                },
            }
        };

        let raw = raw_message(id, &copy);
        if let Err(e) = self.bot.delete_message(scratch, copy.id).await {
            warn!(message_id = id, error = %e, "Failed to delete probe copy");
        }
        Ok(Some(raw))
    }
}

#[async_trait]
impl MessagingTransport for TelegramTransport {
    async fn resolve_conversation(
        &self,
        locator: &ConversationLocator,
    ) -> Result<ConversationId, ResolveError> {
        let recipient = match locator {
            ConversationLocator::Id(id) => Recipient::Id(ChatId(id.0)),
            ConversationLocator::Handle(handle) => Recipient::ChannelUsername(format!("@{handle}")),
        };
        self.bot
            .get_chat(recipient)
            .await
            .map(|chat| ConversationId(chat.id.0))
            .map_err(|e| resolve_error(&e))
    }

    async fn list_messages(
        &self,
        conversation: ConversationId,
        min_id: i32,
        max_id: i32,
    ) -> Result<Vec<RawMessage>, TransportError> {
        let Some(scratch) = self.scratch_chat else {
            return Err(TransportError::Other(
                "scratch_chat_id is not configured, history cannot be read".to_string(),
            ));
        };
        let source = ChatId(conversation.0);

        let mut found = Vec::new();
        for id in min_id..=max_id {
            if let Some(raw) = self.probe(scratch, source, id).await? {
                found.push(raw);
            }
        }
        debug!(
            %conversation,
            min_id,
            max_id,
            found = found.len(),
            "History probe finished"
        );
        Ok(found)
    }

    async fn send_media(
        &self,
        destination: Destination,
        media: &MediaPayload,
        caption: Option<String>,
    ) -> Result<(), SendError> {
        let chat = ChatId(destination.chat.0);
        let file = InputFile::file_id(FileId(media.file_reference.clone()));
        let thread = destination.thread.map(|t| ThreadId(MessageId(t)));

        let result = match media.kind {
            MediaKind::Photo => {
                let mut req = self.bot.send_photo(chat, file);
                if let Some(text) = caption {
                    req = req.caption(text);
                }
                if let Some(thread) = thread {
                    req = req.message_thread_id(thread);
                }
                req.await.map(|_| ())
            }
            MediaKind::Video => {
                let mut req = self.bot.send_video(chat, file);
                if let Some(text) = caption {
                    req = req.caption(text);
                }
                if let Some(thread) = thread {
                    req = req.message_thread_id(thread);
                }
                req.await.map(|_| ())
            }
            MediaKind::Document => {
                let mut req = self.bot.send_document(chat, file);
                if let Some(text) = caption {
                    req = req.caption(text);
                }
                if let Some(thread) = thread {
                    req = req.message_thread_id(thread);
                }
                req.await.map(|_| ())
            }
            MediaKind::Audio => {
                let mut req = self.bot.send_audio(chat, file);
                if let Some(text) = caption {
                    req = req.caption(text);
                }
                if let Some(thread) = thread {
                    req = req.message_thread_id(thread);
                }
                req.await.map(|_| ())
            }
            MediaKind::Unsupported => {
                return Err(SendError::Rejected(
                    "media kind cannot be re-sent (sticker, voice or video note)".to_string(),
                ));
            }
        };

        result.map_err(|e| send_error(&e))
    }
}

/// Builds the relay's view of a message from the probe copy of `original_id`.
pub(crate) fn raw_message(original_id: i32, msg: &Message) -> RawMessage {
    RawMessage {
        id: original_id,
        caption: msg.caption().or_else(|| msg.text()).map(str::to_owned),
        attachment: attachment_of(msg),
    }
}

fn attachment_of(msg: &Message) -> Option<Attachment> {
    let media = |kind: MediaKind, id: &FileId| {
        Some(Attachment::Media {
            kind,
            file_reference: id.0.clone(),
        })
    };

    if let Some(sizes) = msg.photo() {
        // sizes are ordered smallest first
        return sizes.last().and_then(|p| media(MediaKind::Photo, &p.file.id));
    }
    if let Some(video) = msg.video() {
        return media(MediaKind::Video, &video.file.id);
    }
    if let Some(audio) = msg.audio() {
        return media(MediaKind::Audio, &audio.file.id);
    }
    if let Some(animation) = msg.animation() {
        return media(MediaKind::Document, &animation.file.id);
    }
    if let Some(document) = msg.document() {
        return media(MediaKind::Document, &document.file.id);
    }
    if let Some(sticker) = msg.sticker() {
        return media(MediaKind::Unsupported, &sticker.file.id);
    }
    if let Some(voice) = msg.voice() {
        return media(MediaKind::Unsupported, &voice.file.id);
    }
    if let Some(note) = msg.video_note() {
        return media(MediaKind::Unsupported, &note.file.id);
    }

    let has_link = msg.entities().is_some_and(|entities| {
        entities.iter().any(|e| {
            matches!(
                e.kind,
                MessageEntityKind::Url | MessageEntityKind::TextLink { .. }
            )
        })
    });
    has_link.then_some(Attachment::LinkPreview)
}

fn flood_signal(error: &RequestError) -> Option<FloodSignal> {
    match error {
        RequestError::RetryAfter(wait) => Some(FloodSignal {
            wait_secs: wait.duration().as_secs(),
        }),
        _ => None,
    }
}

fn send_error(error: &RequestError) -> SendError {
    flood_signal(error).map_or_else(
        || SendError::Rejected(error.to_string()),
        SendError::RateLimited,
    )
}

fn resolve_error(error: &RequestError) -> ResolveError {
    match error {
        RequestError::Api(ApiError::ChatNotFound) => ResolveError::NotFound,
        RequestError::Api(api) => ResolveError::AccessDenied(api.to_string()),
        other => ResolveError::Transport(other.to_string()),
    }
}

fn classify_probe_error(error: &RequestError) -> ProbeFailure {
    match error {
        RequestError::RetryAfter(wait) => ProbeFailure::RateLimited(wait.duration()),
        RequestError::Api(
            ApiError::ChatNotFound | ApiError::BotKicked | ApiError::BotBlocked,
        ) => ProbeFailure::Denied(error.to_string()),
        // deleted, service or protected messages all refuse to forward
        RequestError::Api(_) => ProbeFailure::Missing,
        other => ProbeFailure::Fatal(other.to_string()),
    }
}
