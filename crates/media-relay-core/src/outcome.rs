//! Relay outcomes and their human-readable summaries.

use crate::dispatcher::{ItemReport, ItemStatus};
use std::fmt::Write as _;

/// Maximum number of failed items listed in a summary.
pub const MAX_LISTED_FAILURES: usize = 10;

/// Note attached to a job that found nothing to relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyRange {
    /// Messages seen in the interval, media or not.
    pub scanned: usize,
}

impl EmptyRange {
    /// Whether the interval held no messages at all.
    #[must_use]
    pub const fn no_messages(&self) -> bool {
        self.scanned == 0
    }
}

/// Aggregated result of one relay job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Per-item records in dispatch (ascending ID) order.
    pub items: Vec<ItemReport>,
    /// Set when zero media items were found.
    pub empty_range: Option<EmptyRange>,
    /// Whether the job stopped early on cancellation.
    pub cancelled: bool,
    /// Rate-limit pauses taken during the job.
    pub flood_waits: u32,
}

impl RelayOutcome {
    /// Outcome of a job whose scan found no media.
    #[must_use]
    pub fn empty(scanned: usize) -> Self {
        Self {
            empty_range: Some(EmptyRange { scanned }),
            ..Self::default()
        }
    }

    /// Items the engine tried to send.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.items.len()
    }

    /// Items the platform accepted.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_sent()).count()
    }

    /// Items that ended in failure.
    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| !i.is_sent())
    }

    /// Records the terminal status of one item.
    pub fn record(&mut self, report: ItemReport) {
        self.items.push(report);
    }

    /// Renders the single summary returned to the requester.
    #[must_use]
    pub fn summary(&self) -> String {
        if let Some(empty) = self.empty_range {
            return if empty.no_messages() {
                "❌ No messages found in the specified range (0 scanned). \
                 Check the links and the relay's access to the source."
                    .to_string()
            } else {
                format!(
                    "❌ No media files found in the specified range ({} messages scanned, none had media)",
                    empty.scanned
                )
            };
        }

        let attempted = self.attempted();
        let succeeded = self.succeeded();

        let mut text = if self.cancelled {
            format!("🛑 Forward cancelled. {succeeded}/{attempted} files sent before stopping")
        } else if succeeded == attempted {
            format!("✅ Forward completed! {succeeded}/{attempted} files sent successfully")
        } else {
            format!("⚠️ Forward finished with errors. {succeeded}/{attempted} files sent successfully")
        };

        if self.flood_waits > 0 {
            let _ = write!(text, "\n⏳ Paused {} time(s) for rate limits", self.flood_waits);
        }

        let failures: Vec<&ItemReport> = self.failures().collect();
        if !failures.is_empty() {
            text.push_str("\n\nFailed:");
            for report in failures.iter().take(MAX_LISTED_FAILURES) {
                if let ItemStatus::Failed(reason) = &report.status {
                    let _ = write!(
                        text,
                        "\n• #{} ({}): {reason}",
                        report.message_id, report.kind
                    );
                }
            }
            if failures.len() > MAX_LISTED_FAILURES {
                let _ = write!(
                    text,
                    "\n… and {} more",
                    failures.len() - MAX_LISTED_FAILURES
                );
            }
        }

        text
    }
}
