//! Live progress of a running range job.
//!
//! The engine reports through [`ProgressObserver`], which only updates a
//! watch channel. A separate task turns the latest state into edits of the
//! job's status message, at most once per interval.

use crate::bot::resilient::edit_message_safe_resilient;
use media_relay_core::dispatcher::ItemReport;
use media_relay_core::engine::RelayObserver;
use std::future::Future;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tokio::sync::watch;

/// Snapshot of a job's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Messages scanned, once the scan has finished.
    pub scanned: Option<usize>,
    /// Items finished so far.
    pub done: usize,
    /// Media items to relay.
    pub total: usize,
    /// Items delivered so far.
    pub succeeded: usize,
}

/// [`RelayObserver`] publishing into a watch channel.
pub struct ProgressObserver {
    tx: watch::Sender<ProgressState>,
}

/// Creates an observer and the receiver of its updates.
#[must_use]
pub fn progress_channel() -> (ProgressObserver, watch::Receiver<ProgressState>) {
    let (tx, rx) = watch::channel(ProgressState::default());
    (ProgressObserver { tx }, rx)
}

impl RelayObserver for ProgressObserver {
    fn scan_finished(&self, found: usize, scanned: usize) {
        self.tx.send_modify(|state| {
            state.scanned = Some(scanned);
            state.total = found;
        });
    }

    fn item_finished(&self, done: usize, total: usize, report: &ItemReport) {
        self.tx.send_modify(|state| {
            state.done = done;
            state.total = total;
            if report.is_sent() {
                state.succeeded += 1;
            }
        });
    }
}

/// Renders the status text for an in-flight job.
#[must_use]
pub fn render_progress(state: &ProgressState) -> String {
    match state.scanned {
        None => "🔍 Scanning source messages...".to_string(),
        Some(scanned) if state.done == 0 => format!(
            "📤 Found {} media in {scanned} messages, sending...",
            state.total
        ),
        Some(_) => format!(
            "📤 Sending {}/{} ({} delivered)...\nUse /cancel to stop.",
            state.done, state.total, state.succeeded
        ),
    }
}

/// Mirrors progress updates into the status message until the sender is dropped.
pub async fn run_progress_updates(
    bot: Bot,
    chat_id: ChatId,
    status_id: MessageId,
    rx: watch::Receiver<ProgressState>,
    interval: Duration,
) {
    mirror_progress(rx, interval, |text| {
        let bot = bot.clone();
        async move {
            edit_message_safe_resilient(&bot, chat_id, status_id, &text).await;
        }
    })
    .await;
}

/// Feeds rendered progress to `edit`, at most once per `interval`.
///
/// Returns once the sender is dropped and the last edit has completed.
pub async fn mirror_progress<F, Fut>(
    mut rx: watch::Receiver<ProgressState>,
    interval: Duration,
    mut edit: F,
) where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    while rx.changed().await.is_ok() {
        let text = render_progress(&rx.borrow_and_update());
        edit(text).await;
        tokio::time::sleep(interval).await;
    }
}
