//! Destination resolution for single-item relays.
//!
//! Range jobs always use the destination carried by the request; only the
//! single-item path consults per-requester settings.

use crate::link::{parse_target, LinkError};
use crate::model::{ConversationId, Destination};
use crate::settings::{RequesterId, UserSettings};
use std::fmt;

/// Sentinel accepted by `/setdest` meaning "the requester's own chat".
pub const REQUESTER_SENTINEL: &str = "me";

/// Stored destination preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationOverride {
    /// Always deliver to the requester's own conversation.
    Requester,
    /// Deliver to an explicit chat and optional topic.
    Chat(Destination),
}

impl DestinationOverride {
    /// Parses `me`, `<chat_id>` or `<chat_id>/<topic_id>`.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError`] if the spec is neither the sentinel nor a valid target.
    pub fn parse(spec: &str) -> Result<Self, LinkError> {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case(REQUESTER_SENTINEL) {
            return Ok(Self::Requester);
        }
        parse_target(spec).map(Self::Chat)
    }
}

impl fmt::Display for DestinationOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requester => f.write_str(REQUESTER_SENTINEL),
            Self::Chat(dest) => write!(f, "{dest}"),
        }
    }
}

/// Resolves where a single-item relay for `requester` should go.
#[must_use]
pub fn resolve(requester: RequesterId, settings: &UserSettings) -> Destination {
    match settings.destination_override {
        Some(DestinationOverride::Chat(dest)) => dest,
        Some(DestinationOverride::Requester) | None => own_conversation(requester),
    }
}

/// The requester's private conversation.
#[must_use]
pub const fn own_conversation(requester: RequesterId) -> Destination {
    Destination::chat(ConversationId(requester.0))
}
