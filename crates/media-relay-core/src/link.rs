//! Parsing of message links and `group/topic` target specs.
//!
//! Source links come in two shapes:
//! - private: `https://<host>/c/<numeric id>/<message id>`
//! - public: `https://<host>/<handle>/<message id>`
//!
//! Both may carry a forum topic segment before the message ID
//! (`/c/<id>/<topic>/<message id>`); the last segment is always the message.

// lazy_regex! keeps compile-time validated patterns in statics
#![allow(clippy::non_std_lazy_statics)]

use crate::model::{
    to_supergroup_id, ConversationId, ConversationLocator, Destination, SourceReference,
};
use lazy_regex::lazy_regex;
use thiserror::Error;

/// `https://host/c/<id>[/<topic>]/<msg>`
static RE_PRIVATE_LINK: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^(?:https?://)?[^/\s]+/c/(\d+)(?:/\d+)?/(\d+)/?(?:[?#]\S*)?$");

/// `https://host/<handle>[/<topic>]/<msg>`
static RE_PUBLIC_LINK: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"^(?:https?://)?[^/\s]+/([A-Za-z][A-Za-z0-9_]{2,31})(?:/\d+)?/(\d+)/?(?:[?#]\S*)?$");

/// Any URL-looking token inside free text, scheme optional.
static RE_URL_TOKEN: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?:https?://)?[^/\s]+/[^/\s]+(?:/\S*)?");

/// Errors produced while parsing user-supplied links and targets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The URL does not match either supported link shape.
    #[error("unrecognised message link: {0}")]
    MalformedUrl(String),
    /// The target spec is not `<id>` or `<id>/<topic>`.
    #[error("invalid target '{0}', expected <group_id> or <group_id>/<topic_id>")]
    MalformedTarget(String),
    /// A numeric component was zero, negative where not allowed, or overflowed.
    #[error("invalid identifier '{0}'")]
    InvalidId(String),
}

/// Parses a message link into a [`SourceReference`].
///
/// Private numeric conversation IDs are normalised to the signed
/// supergroup form (`-100<id>`).
///
/// # Errors
///
/// Returns [`LinkError`] if the link is malformed or carries a non-positive ID.
///
/// ```
/// use media_relay_core::link::parse_message_link;
/// use media_relay_core::model::{ConversationId, ConversationLocator};
///
/// let r = parse_message_link("https://t.me/c/2387726302/7").unwrap();
/// assert_eq!(r.conversation, ConversationLocator::Id(ConversationId(-1002387726302)));
/// assert_eq!(r.message_id, 7);
/// ```
pub fn parse_message_link(url: &str) -> Result<SourceReference, LinkError> {
    let url = url.trim();

    if let Some(caps) = RE_PRIVATE_LINK.captures(url) {
        let raw_chat = parse_positive_i64(&caps[1])?;
        let chat = to_supergroup_id(raw_chat)
            .ok_or_else(|| LinkError::InvalidId(caps[1].to_string()))?;
        let message_id = parse_message_id(&caps[2])?;
        return Ok(SourceReference {
            conversation: ConversationLocator::Id(ConversationId(chat)),
            message_id,
        });
    }

    if let Some(caps) = RE_PUBLIC_LINK.captures(url) {
        let message_id = parse_message_id(&caps[2])?;
        return Ok(SourceReference {
            conversation: ConversationLocator::Handle(caps[1].to_string()),
            message_id,
        });
    }

    Err(LinkError::MalformedUrl(url.to_string()))
}

/// Finds the first message link in free text.
#[must_use]
pub fn find_message_link(text: &str) -> Option<SourceReference> {
    RE_URL_TOKEN
        .find_iter(text)
        .find_map(|m| parse_message_link(m.as_str()).ok())
}

/// Parses a `<group_id>` or `<group_id>/<topic_id>` target spec.
///
/// Positive group IDs are treated as bare channel IDs and normalised to
/// the supergroup form; negative IDs are used as given.
///
/// # Errors
///
/// Returns [`LinkError::MalformedTarget`] when the shape is wrong and
/// [`LinkError::InvalidId`] when a component is zero or out of range.
pub fn parse_target(spec: &str) -> Result<Destination, LinkError> {
    let spec = spec.trim();
    let (group, topic) = match spec.split_once('/') {
        Some((group, topic)) => (group, Some(topic)),
        None => (spec, None),
    };

    let chat = parse_chat_id(group).map_err(|e| match e {
        LinkError::InvalidId(_) => e,
        _ => LinkError::MalformedTarget(spec.to_string()),
    })?;

    let thread = match topic {
        Some(topic) if topic.contains('/') => {
            return Err(LinkError::MalformedTarget(spec.to_string()));
        }
        Some(topic) => {
            let topic = topic
                .trim()
                .parse::<i32>()
                .map_err(|_| LinkError::MalformedTarget(spec.to_string()))?;
            if topic <= 0 {
                return Err(LinkError::InvalidId(topic.to_string()));
            }
            Some(topic)
        }
        None => None,
    };

    Ok(Destination { chat, thread })
}

fn parse_chat_id(raw: &str) -> Result<ConversationId, LinkError> {
    let value = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| LinkError::MalformedTarget(raw.to_string()))?;
    if value == 0 {
        return Err(LinkError::InvalidId(raw.to_string()));
    }
    to_supergroup_id(value)
        .map(ConversationId)
        .ok_or_else(|| LinkError::InvalidId(raw.trim().to_string()))
}

fn parse_positive_i64(raw: &str) -> Result<i64, LinkError> {
    match raw.parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(LinkError::InvalidId(raw.to_string())),
    }
}

fn parse_message_id(raw: &str) -> Result<i32, LinkError> {
    match raw.trim().parse::<i32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(LinkError::InvalidId(raw.to_string())),
    }
}
