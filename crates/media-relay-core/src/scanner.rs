//! History scanning over an inclusive message-ID interval.

use crate::model::{ConversationId, ConversationLocator, IdRange, MediaItem};
use crate::transport::{MessagingTransport, ResolveError, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why a scan could not run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The source could not be resolved or listed.
    #[error("source {source_name} unavailable: {reason}")]
    SourceUnavailable {
        /// Source as given by the requester.
        source_name: String,
        /// Underlying reason.
        reason: String,
    },
    /// The source exists but the relay may not read it.
    #[error("access to {source_name} denied: {reason}")]
    AccessDenied {
        /// Source as given by the requester.
        source_name: String,
        /// Underlying reason.
        reason: String,
    },
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Resolved source conversation.
    pub conversation: ConversationId,
    /// Media items in strictly ascending ID order.
    pub items: Vec<MediaItem>,
    /// Number of distinct messages seen in the interval.
    pub scanned: usize,
}

impl ScanResult {
    /// Whether no media items were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl IntoIterator for ScanResult {
    type Item = MediaItem;
    type IntoIter = std::vec::IntoIter<MediaItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Enumerates media items of a source conversation.
///
/// Holds no cursor: every call to [`HistoryScanner::scan`] starts over.
#[derive(Clone)]
pub struct HistoryScanner {
    transport: Arc<dyn MessagingTransport>,
}

impl HistoryScanner {
    /// Creates a scanner over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn MessagingTransport>) -> Self {
        Self { transport }
    }

    /// Scans `bounds` in `source` and returns its media items, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if the source cannot be resolved or listed.
    pub async fn scan(
        &self,
        source: &ConversationLocator,
        bounds: IdRange,
    ) -> Result<ScanResult, ScanError> {
        let conversation = self
            .transport
            .resolve_conversation(source)
            .await
            .map_err(|e| match e {
                ResolveError::AccessDenied(reason) => ScanError::AccessDenied {
                    source_name: source.to_string(),
                    reason,
                },
                other => ScanError::SourceUnavailable {
                    source_name: source.to_string(),
                    reason: other.to_string(),
                },
            })?;

        info!(
            source = %source,
            conversation = %conversation,
            min_id = bounds.min(),
            max_id = bounds.max(),
            "Scanning history"
        );

        let raw = self
            .transport
            .list_messages(conversation, bounds.min(), bounds.max())
            .await
            .map_err(|e| match e {
                TransportError::AccessDenied(reason) => ScanError::AccessDenied {
                    source_name: source.to_string(),
                    reason,
                },
                TransportError::Other(reason) => ScanError::SourceUnavailable {
                    source_name: source.to_string(),
                    reason,
                },
            })?;

        let mut messages: Vec<_> = raw
            .into_iter()
            .filter(|m| {
                let inside = bounds.contains(m.id);
                if !inside {
                    warn!(message_id = m.id, "Transport returned message outside scan bounds");
                }
                inside
            })
            .collect();
        messages.sort_by_key(|m| m.id);
        messages.dedup_by_key(|m| m.id);
        let scanned = messages.len();

        let items: Vec<MediaItem> = messages.into_iter().filter_map(MediaItem::from_raw).collect();

        debug!(scanned, media = items.len(), "Scan finished");
        Ok(ScanResult {
            conversation,
            items,
            scanned,
        })
    }
}
