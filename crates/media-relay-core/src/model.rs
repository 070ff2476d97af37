//! Data model shared by the scanner, dispatcher and engine.

use std::fmt;

/// Offset added to bare channel IDs to form the signed supergroup ID (`-100<id>`).
pub const SUPERGROUP_ID_OFFSET: i64 = 1_000_000_000_000;

/// Converts a bare positive channel ID into the signed supergroup convention.
///
/// Already-negative IDs are returned unchanged. Returns `None` when the
/// prefixed ID does not fit in an `i64`.
///
/// ```
/// use media_relay_core::model::to_supergroup_id;
/// assert_eq!(to_supergroup_id(2387726302), Some(-1002387726302));
/// assert_eq!(to_supergroup_id(-1002387726302), Some(-1002387726302));
/// assert_eq!(to_supergroup_id(i64::MAX), None);
/// ```
#[must_use]
pub const fn to_supergroup_id(raw: i64) -> Option<i64> {
    if raw <= 0 {
        return Some(raw);
    }
    match SUPERGROUP_ID_OFFSET.checked_add(raw) {
        Some(prefixed) => Some(-prefixed),
        None => None,
    }
}

/// Resolved, platform-internal conversation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a conversation is addressed before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationLocator {
    /// Numeric ID, already normalised to the platform's signed convention.
    Id(ConversationId),
    /// Public handle without the leading `@`.
    Handle(String),
}

impl fmt::Display for ConversationLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Handle(handle) => write!(f, "@{handle}"),
        }
    }
}

/// One retrievable item in a source conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference {
    /// Conversation holding the message.
    pub conversation: ConversationLocator,
    /// Message ID inside that conversation.
    pub message_id: i32,
}

/// Where relayed items land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    /// Target conversation.
    pub chat: ConversationId,
    /// Optional sub-thread (forum topic) inside the conversation.
    pub thread: Option<i32>,
}

impl Destination {
    /// Destination without a sub-thread.
    #[must_use]
    pub const fn chat(chat: ConversationId) -> Self {
        Self { chat, thread: None }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread {
            Some(thread) => write!(f, "{}/{thread}", self.chat),
            None => write!(f, "{}", self.chat),
        }
    }
}

/// A bulk relay request over a contiguous message-ID interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// Conversation to scan.
    pub source: ConversationLocator,
    /// First message ID as given by the requester.
    pub start_id: i32,
    /// Last message ID as given by the requester.
    pub end_id: i32,
    /// Where items are sent.
    pub destination: Destination,
}

impl RangeRequest {
    /// Inclusive scan bounds, independent of the order the IDs were given in.
    #[must_use]
    pub fn bounds(&self) -> IdRange {
        IdRange::new(self.start_id, self.end_id)
    }
}

/// Inclusive, normalised message-ID interval (`min <= max`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    min: i32,
    max: i32,
}

impl IdRange {
    /// Builds the interval `[min(a, b), max(a, b)]`.
    #[must_use]
    pub fn new(a: i32, b: i32) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Lower bound (inclusive).
    #[must_use]
    pub const fn min(&self) -> i32 {
        self.min
    }

    /// Upper bound (inclusive).
    #[must_use]
    pub const fn max(&self) -> i32 {
        self.max
    }

    /// Number of IDs covered by the interval.
    #[must_use]
    pub fn span(&self) -> u64 {
        u64::try_from(i64::from(self.max) - i64::from(self.min) + 1).unwrap_or(0)
    }

    /// Whether `id` falls inside the interval.
    #[must_use]
    pub const fn contains(&self, id: i32) -> bool {
        id >= self.min && id <= self.max
    }
}

/// Closed set of media kinds the relay knows how to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Still image.
    Photo,
    /// Video clip.
    Video,
    /// Generic file.
    Document,
    /// Music or other audio track.
    Audio,
    /// Media the relay cannot re-send by reference (stickers, voice notes, ...).
    Unsupported,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Unsupported => "unsupported",
        };
        f.write_str(name)
    }
}

/// What a raw message carries besides its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// An actual media payload.
    Media {
        /// Classified media kind.
        kind: MediaKind,
        /// Provider-issued handle allowing a re-send without re-upload.
        file_reference: String,
    },
    /// Only a link preview; never counts as media.
    LinkPreview,
}

/// A message as returned by the platform, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message ID inside its conversation.
    pub id: i32,
    /// Caption or text, if any.
    pub caption: Option<String>,
    /// Attached payload, if any.
    pub attachment: Option<Attachment>,
}

/// A media-bearing message selected for relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    /// Source message ID.
    pub message_id: i32,
    /// Media kind, classified once by the scanner.
    pub kind: MediaKind,
    /// Original caption, possibly empty.
    pub caption: String,
    /// Provider-issued file handle.
    pub file_reference: String,
}

impl MediaItem {
    /// Extracts a media item from a raw message, if it carries a media payload.
    #[must_use]
    pub fn from_raw(raw: RawMessage) -> Option<Self> {
        match raw.attachment {
            Some(Attachment::Media {
                kind,
                file_reference,
            }) => Some(Self {
                message_id: raw.id,
                kind,
                caption: raw.caption.unwrap_or_default(),
                file_reference,
            }),
            Some(Attachment::LinkPreview) | None => None,
        }
    }
}

/// Rate-limit rejection carrying the mandatory cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodSignal {
    /// Seconds to wait before the next attempt.
    pub wait_secs: u64,
}

impl FloodSignal {
    /// Cooldown as a `Duration`.
    #[must_use]
    pub const fn wait(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.wait_secs)
    }
}
