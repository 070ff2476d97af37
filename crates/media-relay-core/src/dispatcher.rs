//! Flood-aware, one-at-a-time media dispatch.
//!
//! The dispatcher owns the pacing state of a single job: the time of the
//! last successful send (for the courtesy spacing) and the cancellation
//! token. Rate-limit pauses and courtesy delays are the only places a job
//! suspends, and both wake up early on cancellation.

use crate::model::{Destination, FloodSignal, MediaItem, MediaKind};
use crate::transport::{MediaPayload, MessagingTransport, SendError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Result of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The platform accepted the item.
    Sent,
    /// The platform asked for a cooldown; the item is not sent yet.
    RateLimited(FloodSignal),
    /// The platform rejected the item for good.
    Failed(String),
}

/// The job was cancelled before the item was attempted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("relay job cancelled")]
pub struct Cancelled;

/// Terminal status of one relayed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Delivered.
    Sent,
    /// Not delivered.
    Failed(String),
}

/// Per-item record kept in the relay outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Source message ID.
    pub message_id: i32,
    /// Media kind of the item.
    pub kind: MediaKind,
    /// Terminal status.
    pub status: ItemStatus,
    /// Number of send attempts made, retries included.
    pub attempts: u32,
}

impl ItemReport {
    /// Whether the item was delivered.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        matches!(self.status, ItemStatus::Sent)
    }
}

/// Sends items of one job, observing flood signals and pacing.
pub struct FloodAwareDispatcher {
    transport: Arc<dyn MessagingTransport>,
    spacing: Duration,
    cancel: CancellationToken,
    last_success: Option<Instant>,
    flood_waits: u32,
}

impl FloodAwareDispatcher {
    /// Creates a dispatcher enforcing `spacing` between successful sends.
    #[must_use]
    pub fn new(
        transport: Arc<dyn MessagingTransport>,
        spacing: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            spacing,
            cancel,
            last_success: None,
            flood_waits: 0,
        }
    }

    /// Number of rate-limit pauses taken so far.
    #[must_use]
    pub const fn flood_waits(&self) -> u32 {
        self.flood_waits
    }

    /// Makes one attempt at sending `item`.
    ///
    /// Waits out the courtesy spacing first. A rate-limit rejection is
    /// returned as [`SendOutcome::RateLimited`] without sleeping; callers use
    /// [`FloodAwareDispatcher::deliver`] to get the backoff.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the job is cancelled before the attempt.
    pub async fn send(
        &mut self,
        destination: Destination,
        item: &MediaItem,
        caption: Option<String>,
    ) -> Result<SendOutcome, Cancelled> {
        self.courtesy_delay().await?;

        let payload = MediaPayload {
            kind: item.kind,
            file_reference: item.file_reference.clone(),
        };

        match self
            .transport
            .send_media(destination, &payload, caption)
            .await
        {
            Ok(()) => {
                self.last_success = Some(Instant::now());
                debug!(message_id = item.message_id, %destination, "Item sent");
                Ok(SendOutcome::Sent)
            }
            Err(SendError::RateLimited(signal)) => Ok(SendOutcome::RateLimited(signal)),
            Err(SendError::Rejected(reason)) => Ok(SendOutcome::Failed(reason)),
        }
    }

    /// Sends `item`, pausing for every flood signal and retrying the same
    /// item at most `flood_retry_limit` times.
    ///
    /// An item still rate-limited after the last retry is reported failed.
    /// Cancellation during a flood pause also fails the item, since it was
    /// already attempted.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the job is cancelled before the first attempt.
    pub async fn deliver(
        &mut self,
        destination: Destination,
        item: &MediaItem,
        caption: Option<String>,
        flood_retry_limit: u32,
    ) -> Result<ItemReport, Cancelled> {
        let mut attempts: u32 = 0;

        let status = loop {
            let outcome = match self.send(destination, item, caption.clone()).await {
                Ok(outcome) => outcome,
                Err(Cancelled) if attempts == 0 => return Err(Cancelled),
                Err(Cancelled) => break ItemStatus::Failed("cancelled before retry".to_string()),
            };
            attempts += 1;

            match outcome {
                SendOutcome::Sent => break ItemStatus::Sent,
                SendOutcome::Failed(reason) => {
                    warn!(message_id = item.message_id, %reason, "Item rejected");
                    break ItemStatus::Failed(reason);
                }
                SendOutcome::RateLimited(signal) => {
                    self.flood_waits += 1;
                    warn!(
                        message_id = item.message_id,
                        wait_secs = signal.wait_secs,
                        attempts,
                        "Flood wait, pausing job"
                    );
                    if self.pause(signal.wait()).await.is_err() {
                        break ItemStatus::Failed(
                            "cancelled while waiting out a rate limit".to_string(),
                        );
                    }
                    if attempts > flood_retry_limit {
                        break ItemStatus::Failed(format!(
                            "rate limited {attempts} times in a row (last wait {}s)",
                            signal.wait_secs
                        ));
                    }
                }
            }
        };

        Ok(ItemReport {
            message_id: item.message_id,
            kind: item.kind,
            status,
            attempts,
        })
    }

    async fn courtesy_delay(&self) -> Result<(), Cancelled> {
        if let Some(last) = self.last_success {
            let elapsed = last.elapsed();
            if elapsed < self.spacing {
                self.pause(self.spacing - elapsed).await?;
            }
        }
        if self.cancel.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }

    async fn pause(&self, duration: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
