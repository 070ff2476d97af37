//! Range relay engine.
//!
//! Orchestrates one job: validate the request, scan the source interval,
//! render each caption and dispatch items strictly one after another in
//! ascending ID order. Per-item failures never abort a job; only
//! validation and source resolution do.

use crate::config::RelaySettings;
use crate::dispatcher::{Cancelled, FloodAwareDispatcher, ItemReport};
use crate::model::{Destination, IdRange, RangeRequest, SourceReference};
use crate::outcome::RelayOutcome;
use crate::scanner::{HistoryScanner, ScanError, ScanResult};
use crate::transform::{caption_field, render, ReplacementRules};
use crate::transport::MessagingTransport;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Runtime knobs of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    /// Minimum spacing between successful sends of one job.
    pub send_spacing: Duration,
    /// Retries of one item after a rate-limit signal.
    pub flood_retry_limit: u32,
    /// Largest accepted interval span.
    pub max_range_span: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&RelaySettings::default())
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            send_spacing: settings.send_spacing(),
            flood_retry_limit: settings.flood_retry_limit,
            max_range_span: settings.max_range_span,
        }
    }
}

/// Failures that abort a job before any item is attempted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// User-correctable input problem.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The source could not be scanned.
    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl RelayError {
    /// Text shown to the requester, including a remediation hint.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidRequest(reason) => format!("❌ {reason}"),
            Self::Scan(ScanError::SourceUnavailable {
                source_name,
                reason,
            }) => format!(
                "❌ Source {source_name} is unavailable ({reason}). \
                 Check the link and make sure the relay is a member of that chat."
            ),
            Self::Scan(ScanError::AccessDenied {
                source_name,
                reason,
            }) => format!(
                "❌ Cannot read {source_name} ({reason}). \
                 Ensure the relay has read access to the source."
            ),
        }
    }
}

/// Receives progress notifications while a job runs.
///
/// Calls are synchronous and must return quickly.
pub trait RelayObserver: Send + Sync {
    /// The scan finished with `found` media items out of `scanned` messages.
    fn scan_finished(&self, found: usize, scanned: usize) {
        let _ = (found, scanned);
    }

    /// Item number `done` of `total` reached its terminal status.
    fn item_finished(&self, done: usize, total: usize, report: &ItemReport) {
        let _ = (done, total, report);
    }
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RelayObserver for NoopObserver {}

/// Relays media from a source conversation into a destination.
#[derive(Clone)]
pub struct RelayEngine {
    transport: Arc<dyn MessagingTransport>,
    scanner: HistoryScanner,
    config: RelayConfig,
    job_rules: ReplacementRules,
    job_override: Option<String>,
}

impl RelayEngine {
    /// Creates an engine that relays captions verbatim on range jobs.
    #[must_use]
    pub fn new(transport: Arc<dyn MessagingTransport>, config: RelayConfig) -> Self {
        Self {
            scanner: HistoryScanner::new(Arc::clone(&transport)),
            transport,
            config,
            job_rules: ReplacementRules::new(),
            job_override: None,
        }
    }

    /// Sets the caption transform applied to every item of a range job.
    #[must_use]
    pub fn with_job_transform(
        mut self,
        rules: ReplacementRules,
        override_caption: Option<String>,
    ) -> Self {
        self.job_rules = rules;
        self.job_override = override_caption;
        self
    }

    /// Engine configuration.
    #[must_use]
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Checks a request before any platform call is made.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] for non-positive IDs or an
    /// interval wider than the configured maximum.
    pub fn validate(&self, request: &RangeRequest) -> Result<IdRange, RelayError> {
        if request.start_id <= 0 || request.end_id <= 0 {
            return Err(RelayError::InvalidRequest(
                "Message IDs must be positive".to_string(),
            ));
        }
        let bounds = request.bounds();
        if bounds.span() > self.config.max_range_span {
            return Err(RelayError::InvalidRequest(format!(
                "Range covers {} messages, the limit is {}",
                bounds.span(),
                self.config.max_range_span
            )));
        }
        Ok(bounds)
    }

    /// Runs one range job to completion or cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] if validation or source resolution fails.
    /// Everything after that is reported through the outcome.
    pub async fn run(
        &self,
        request: &RangeRequest,
        cancel: CancellationToken,
        observer: &dyn RelayObserver,
    ) -> Result<RelayOutcome, RelayError> {
        let job_id = Uuid::new_v4();
        let span = info_span!(
            "relay_job",
            %job_id,
            source = %request.source,
            destination = %request.destination
        );
        self.run_job(request, cancel, observer).instrument(span).await
    }

    async fn run_job(
        &self,
        request: &RangeRequest,
        cancel: CancellationToken,
        observer: &dyn RelayObserver,
    ) -> Result<RelayOutcome, RelayError> {
        let bounds = self.validate(request)?;
        info!(
            min_id = bounds.min(),
            max_id = bounds.max(),
            "Relay job started"
        );

        let Some(scan) = self.scan_cancellable(request, bounds, &cancel).await? else {
            info!("Relay job cancelled during scan");
            return Ok(RelayOutcome {
                cancelled: true,
                ..RelayOutcome::default()
            });
        };
        observer.scan_finished(scan.items.len(), scan.scanned);

        if scan.is_empty() {
            info!(scanned = scan.scanned, "No media in range");
            return Ok(RelayOutcome::empty(scan.scanned));
        }

        let total = scan.items.len();
        let mut dispatcher = FloodAwareDispatcher::new(
            Arc::clone(&self.transport),
            self.config.send_spacing,
            cancel.clone(),
        );
        let mut outcome = RelayOutcome::default();

        for (index, item) in scan.into_iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let caption = caption_field(render(
                &item.caption,
                &self.job_rules,
                self.job_override.as_deref(),
            ));
            match dispatcher
                .deliver(
                    request.destination,
                    &item,
                    caption,
                    self.config.flood_retry_limit,
                )
                .await
            {
                Ok(report) => {
                    observer.item_finished(index + 1, total, &report);
                    outcome.record(report);
                }
                Err(Cancelled) => {
                    outcome.cancelled = true;
                    break;
                }
            }
        }
        outcome.flood_waits = dispatcher.flood_waits();

        info!(
            attempted = outcome.attempted(),
            succeeded = outcome.succeeded(),
            flood_waits = outcome.flood_waits,
            cancelled = outcome.cancelled,
            "Relay job finished"
        );
        Ok(outcome)
    }

    /// Relays the single item at `source` to `destination`.
    ///
    /// Returns `Ok(None)` when the message does not exist or carries no media.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] if the source cannot be scanned.
    pub async fn relay_item(
        &self,
        source: &SourceReference,
        destination: Destination,
        rules: &ReplacementRules,
        override_caption: Option<&str>,
    ) -> Result<Option<ItemReport>, RelayError> {
        if source.message_id <= 0 {
            return Err(RelayError::InvalidRequest(
                "Message IDs must be positive".to_string(),
            ));
        }
        let bounds = IdRange::new(source.message_id, source.message_id);
        let scan = self.scanner.scan(&source.conversation, bounds).await?;
        let Some(item) = scan.into_iter().next() else {
            return Ok(None);
        };

        let caption = caption_field(render(&item.caption, rules, override_caption));
        let mut dispatcher = FloodAwareDispatcher::new(
            Arc::clone(&self.transport),
            self.config.send_spacing,
            CancellationToken::new(),
        );
        let report = dispatcher
            .deliver(destination, &item, caption, self.config.flood_retry_limit)
            .await
            .map_err(|Cancelled| RelayError::InvalidRequest("Relay cancelled".to_string()))?;
        info!(
            message_id = report.message_id,
            %destination,
            sent = report.is_sent(),
            "Single item relayed"
        );
        Ok(Some(report))
    }

    async fn scan_cancellable(
        &self,
        request: &RangeRequest,
        bounds: IdRange,
        cancel: &CancellationToken,
    ) -> Result<Option<ScanResult>, RelayError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(None),
            result = self.scanner.scan(&request.source, bounds) => Ok(Some(result?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ItemStatus;
    use crate::model::{ConversationId, ConversationLocator, FloodSignal, MediaKind};
    use crate::testing::{media_message, text_message, FakeTransport};
    use crate::transport::{ResolveError, SendError};
    use std::sync::Mutex;

    fn request(start_id: i32, end_id: i32) -> RangeRequest {
        RangeRequest {
            source: ConversationLocator::Id(ConversationId(-1_002_387_726_302)),
            start_id,
            end_id,
            destination: Destination {
                chat: ConversationId(-1_003_187_801_487),
                thread: Some(38),
            },
        }
    }

    fn engine(transport: &Arc<FakeTransport>) -> RelayEngine {
        let transport: Arc<dyn MessagingTransport> = transport.clone();
        RelayEngine::new(transport, RelayConfig::default())
    }

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<(usize, usize)>>,
    }

    impl RelayObserver for Recorder {
        fn item_finished(&self, done: usize, total: usize, _report: &ItemReport) {
            self.progress
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((done, total));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn relays_media_in_ascending_order() {
        let transport = Arc::new(
            FakeTransport::with_history(vec![
                text_message(100),
                media_message(101, MediaKind::Photo),
                text_message(102),
                text_message(103),
                media_message(104, MediaKind::Video),
                text_message(105),
            ])
            .descending(),
        );
        let recorder = Recorder::default();
        let outcome = engine(&transport)
            .run(&request(100, 105), CancellationToken::new(), &recorder)
            .await
            .expect("outcome");

        assert_eq!(outcome.attempted(), 2);
        assert_eq!(outcome.succeeded(), 2);
        assert_eq!(transport.delivered(), vec!["file-101", "file-104"]);
        let calls = transport.calls();
        assert!(calls.iter().all(|c| c.destination == request(1, 1).destination));
        assert_eq!(calls[0].caption.as_deref(), Some("caption 101"));
        assert_eq!(
            *recorder
                .progress
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
            vec![(1, 2), (2, 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reversed_bounds_scan_same_interval() {
        let history = vec![
            media_message(10, MediaKind::Photo),
            media_message(12, MediaKind::Document),
        ];
        let forward = Arc::new(FakeTransport::with_history(history.clone()));
        let backward = Arc::new(FakeTransport::with_history(history));
        engine(&forward)
            .run(&request(10, 12), CancellationToken::new(), &NoopObserver)
            .await
            .expect("forward");
        engine(&backward)
            .run(&request(12, 10), CancellationToken::new(), &NoopObserver)
            .await
            .expect("backward");
        assert_eq!(forward.delivered(), backward.delivered());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_range_is_not_an_error() {
        let transport = Arc::new(FakeTransport::with_history(vec![text_message(5)]));
        let outcome = engine(&transport)
            .run(&request(1, 9), CancellationToken::new(), &NoopObserver)
            .await
            .expect("outcome");
        assert_eq!(outcome.succeeded(), 0);
        assert_eq!(outcome.empty_range.map(|e| e.scanned), Some(1));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_non_positive_ids() {
        let transport = Arc::new(FakeTransport::default());
        let err = engine(&transport)
            .run(&request(0, 5), CancellationToken::new(), &NoopObserver)
            .await
            .expect_err("invalid");
        assert!(matches!(err, RelayError::InvalidRequest(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_oversized_span() {
        let transport = Arc::new(FakeTransport::default());
        let err = engine(&transport)
            .run(&request(1, 2001), CancellationToken::new(), &NoopObserver)
            .await
            .expect_err("too wide");
        assert!(err.user_message().contains("limit is 2000"));
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_source_aborts_with_hint() {
        let transport = Arc::new(
            FakeTransport::default().unresolvable(ResolveError::AccessDenied("kicked".into())),
        );
        let err = engine(&transport)
            .run(&request(1, 5), CancellationToken::new(), &NoopObserver)
            .await
            .expect_err("denied");
        assert!(err.user_message().contains("read access"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_item_is_retried_in_place() {
        let transport = Arc::new(
            FakeTransport::with_history(
                (1..=5).map(|id| media_message(id, MediaKind::Photo)).collect(),
            )
            .script(
                "file-3",
                vec![Err(SendError::RateLimited(FloodSignal { wait_secs: 2 }))],
            ),
        );
        let outcome = engine(&transport)
            .run(&request(1, 5), CancellationToken::new(), &NoopObserver)
            .await
            .expect("outcome");

        assert_eq!(outcome.succeeded(), 5);
        assert_eq!(outcome.flood_waits, 1);
        assert_eq!(
            transport.delivered(),
            vec!["file-1", "file-2", "file-3", "file-4", "file-5"]
        );
        let calls = transport.calls();
        let limited = calls
            .iter()
            .position(|c| c.file_reference == "file-3")
            .expect("first attempt of item 3");
        assert!(calls[limited + 1].at - calls[limited].at >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn job_transform_applies_to_range() {
        let transport = Arc::new(FakeTransport::with_history(vec![media_message(
            1,
            MediaKind::Photo,
        )]));
        let rules: ReplacementRules = [("caption", "pic")].into_iter().collect();
        let outcome = engine(&transport)
            .with_job_transform(rules, Some("sig".to_string()))
            .run(&request(1, 1), CancellationToken::new(), &NoopObserver)
            .await
            .expect("outcome");
        assert_eq!(outcome.succeeded(), 1);
        assert_eq!(
            transport.calls()[0].caption.as_deref(),
            Some("pic 1\n\nsig")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_sends_nothing() {
        let transport = Arc::new(FakeTransport::with_history(vec![media_message(
            1,
            MediaKind::Photo,
        )]));
        let token = CancellationToken::new();
        token.cancel();
        let outcome = engine(&transport)
            .run(&request(1, 1), token, &NoopObserver)
            .await
            .expect("outcome");
        assert!(outcome.cancelled);
        assert_eq!(outcome.attempted(), 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn relay_item_uses_given_transform() {
        let transport = Arc::new(FakeTransport::with_history(vec![media_message(
            7,
            MediaKind::Audio,
        )]));
        let source = SourceReference {
            conversation: ConversationLocator::Handle("somechannel".to_string()),
            message_id: 7,
        };
        let rules: ReplacementRules = [("caption", "track")].into_iter().collect();
        let dest = Destination::chat(ConversationId(42));
        let report = engine(&transport)
            .relay_item(&source, dest, &rules, None)
            .await
            .expect("relay")
            .expect("media present");
        assert_eq!(report.status, ItemStatus::Sent);
        assert_eq!(transport.calls()[0].caption.as_deref(), Some("track 7"));
        assert_eq!(transport.calls()[0].destination, dest);
    }

    #[tokio::test(start_paused = true)]
    async fn relay_item_without_media_is_none() {
        let transport = Arc::new(FakeTransport::with_history(vec![text_message(7)]));
        let source = SourceReference {
            conversation: ConversationLocator::Id(ConversationId(-100_5)),
            message_id: 7,
        };
        let report = engine(&transport)
            .relay_item(
                &source,
                Destination::chat(ConversationId(1)),
                &ReplacementRules::new(),
                None,
            )
            .await
            .expect("relay");
        assert!(report.is_none());
    }
}
