//! Command-facing relay service.
//!
//! Every operation here returns text ready to be shown to the requester;
//! no error crosses this boundary.

use crate::destination::{self, DestinationOverride};
use crate::dispatcher::ItemStatus;
use crate::engine::{RelayEngine, RelayObserver};
use crate::jobs::{JobGuard, JobRegistry};
use crate::link::{find_message_link, parse_message_link, parse_target};
use crate::model::RangeRequest;
use crate::settings::{RequesterId, SettingsStore, UserSettings};
use std::fmt::Write as _;
use tracing::{info, warn};

/// Separator between the old and new text of a `/replace` rule.
pub const REPLACE_SEPARATOR: &str = "=>";

/// A validated range job holding its requester's job slot.
pub struct RangeJob {
    engine: RelayEngine,
    request: RangeRequest,
    guard: JobGuard,
}

impl RangeJob {
    /// The request this job will run.
    #[must_use]
    pub const fn request(&self) -> &RangeRequest {
        &self.request
    }

    /// Runs the job and returns its summary. The job slot is released on return.
    pub async fn run(self, observer: &dyn RelayObserver) -> String {
        let Self {
            engine,
            request,
            guard,
        } = self;
        let result = engine.run(&request, guard.token(), observer).await;
        drop(guard);
        match result {
            Ok(outcome) => outcome.summary(),
            Err(e) => {
                warn!(error = %e, "Relay job aborted");
                e.user_message()
            }
        }
    }
}

/// Relay operations and per-requester configuration.
#[derive(Clone)]
pub struct RelayService {
    engine: RelayEngine,
    settings: SettingsStore,
    jobs: JobRegistry,
}

impl RelayService {
    /// Creates a service with empty settings and no running jobs.
    #[must_use]
    pub fn new(engine: RelayEngine) -> Self {
        Self {
            engine,
            settings: SettingsStore::new(),
            jobs: JobRegistry::new(),
        }
    }

    /// Settings store backing the configuration commands.
    #[must_use]
    pub const fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Parses and validates a range command and claims the requester's job slot.
    ///
    /// # Errors
    ///
    /// Returns the text to show when the input is invalid or a job is
    /// already running.
    pub fn prepare_range(
        &self,
        requester: RequesterId,
        target_spec: &str,
        first_url: &str,
        last_url: &str,
    ) -> Result<RangeJob, String> {
        let destination =
            parse_target(target_spec).map_err(|e| format!("❌ Invalid target format: {e}"))?;
        let first = parse_message_link(first_url)
            .map_err(|e| format!("❌ Failed to parse source URLs: {e}"))?;
        let last = parse_message_link(last_url)
            .map_err(|e| format!("❌ Failed to parse source URLs: {e}"))?;

        if first.conversation != last.conversation {
            warn!(
                first = %first.conversation,
                last = %last.conversation,
                "Source links point at different chats, using the first"
            );
        }

        let request = RangeRequest {
            source: first.conversation,
            start_id: first.message_id,
            end_id: last.message_id,
            destination,
        };
        self.engine
            .validate(&request)
            .map_err(|e| e.user_message())?;

        let guard = self.jobs.try_start(requester).map_err(|busy| {
            format!(
                "⏳ A forward is already running (job {}). Use /cancel to stop it first.",
                busy.running
            )
        })?;

        info!(%requester, job_id = %guard.job_id(), "Range job accepted");
        Ok(RangeJob {
            engine: self.engine.clone(),
            request,
            guard,
        })
    }

    /// Runs a full range command and returns its summary.
    pub async fn handle_range_command(
        &self,
        requester: RequesterId,
        target_spec: &str,
        first_url: &str,
        last_url: &str,
        observer: &dyn RelayObserver,
    ) -> String {
        match self.prepare_range(requester, target_spec, first_url, last_url) {
            Ok(job) => job.run(observer).await,
            Err(text) => text,
        }
    }

    /// Relays the item referenced by the first message link in `text`.
    ///
    /// Settings are read at the moment the relay starts.
    pub async fn handle_single_item_link(&self, requester: RequesterId, text: &str) -> String {
        let Some(source) = find_message_link(text) else {
            return "❌ No message link found. Send a link like https://t.me/c/<chat>/<message>"
                .to_string();
        };

        let settings = self.settings.get(requester).await;
        let destination = destination::resolve(requester, &settings);

        match self
            .engine
            .relay_item(
                &source,
                destination,
                &settings.replacement_rules,
                settings.override_caption.as_deref(),
            )
            .await
        {
            Ok(Some(report)) => match report.status {
                ItemStatus::Sent => format!("✅ Message #{} relayed", report.message_id),
                ItemStatus::Failed(reason) => {
                    format!("❌ Failed to relay message #{}: {reason}", report.message_id)
                }
            },
            Ok(None) => format!(
                "❌ Message #{} does not exist or has no media to relay",
                source.message_id
            ),
            Err(e) => e.user_message(),
        }
    }

    /// Cancels the requester's running range job.
    #[must_use]
    pub fn cancel(&self, requester: RequesterId) -> String {
        if self.jobs.cancel(requester) {
            "🛑 Cancelling the running forward...".to_string()
        } else {
            "No forward is running.".to_string()
        }
    }

    /// Sets the override caption appended to relayed captions.
    pub async fn set_caption(&self, requester: RequesterId, text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return "❌ Usage: /caption <text>".to_string();
        }
        let caption = text.to_string();
        self.settings
            .update(requester, move |s| s.override_caption = Some(caption))
            .await;
        "✅ Caption set".to_string()
    }

    /// Removes the override caption.
    pub async fn clear_caption(&self, requester: RequesterId) -> String {
        self.settings
            .update(requester, |s| s.override_caption = None)
            .await;
        "✅ Caption cleared".to_string()
    }

    /// Adds or updates a replacement rule from `<old> => <new>`.
    pub async fn add_replacement(&self, requester: RequesterId, args: &str) -> String {
        let Some((old, new)) = args.split_once(REPLACE_SEPARATOR) else {
            return "❌ Usage: /replace <old> => <new>".to_string();
        };
        let old = old.trim().to_string();
        let new = new.trim().to_string();
        if old.is_empty() {
            return "❌ The text to replace cannot be empty".to_string();
        }
        let reply = format!("✅ Replacing \"{old}\" with \"{new}\"");
        self.settings
            .update(requester, move |s| s.replacement_rules.upsert(old, new))
            .await;
        reply
    }

    /// Drops all replacement rules.
    pub async fn clear_replacements(&self, requester: RequesterId) -> String {
        self.settings
            .update(requester, |s| s.replacement_rules.clear())
            .await;
        "✅ Replacement rules cleared".to_string()
    }

    /// Sets the destination override from `me`, `<chat>` or `<chat>/<topic>`.
    pub async fn set_destination(&self, requester: RequesterId, spec: &str) -> String {
        match DestinationOverride::parse(spec) {
            Ok(dest) => {
                self.settings
                    .update(requester, move |s| s.destination_override = Some(dest))
                    .await;
                format!("✅ Destination set to {dest}")
            }
            Err(e) => format!("❌ {e}"),
        }
    }

    /// Removes the destination override.
    pub async fn clear_destination(&self, requester: RequesterId) -> String {
        self.settings
            .update(requester, |s| s.destination_override = None)
            .await;
        "✅ Destination reset to this chat".to_string()
    }

    /// Renders the requester's current settings.
    pub async fn describe_settings(&self, requester: RequesterId) -> String {
        let settings = self.settings.get(requester).await;
        let running = self.jobs.is_running(requester);
        render_settings(&settings, running)
    }
}

fn render_settings(settings: &UserSettings, job_running: bool) -> String {
    let mut text = String::from("⚙️ Settings\n");
    let _ = writeln!(
        text,
        "Caption: {}",
        settings.override_caption.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(
        text,
        "Destination: {}",
        settings
            .destination_override
            .map_or_else(|| "this chat".to_string(), |d| d.to_string())
    );
    if settings.replacement_rules.is_empty() {
        text.push_str("Replacements: (none)\n");
    } else {
        text.push_str("Replacements:\n");
        for (index, (old, new)) in settings.replacement_rules.iter().enumerate() {
            let _ = writeln!(text, "{}. \"{old}\" => \"{new}\"", index + 1);
        }
    }
    let _ = write!(
        text,
        "Forward job: {}",
        if job_running { "running" } else { "idle" }
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NoopObserver, RelayConfig};
    use crate::model::{ConversationId, Destination, MediaKind};
    use crate::testing::{media_message, text_message, FakeTransport};
    use crate::transport::MessagingTransport;
    use std::sync::Arc;

    fn service(transport: &Arc<FakeTransport>) -> RelayService {
        let transport: Arc<dyn MessagingTransport> = transport.clone();
        RelayService::new(RelayEngine::new(transport, RelayConfig::default()))
    }

    const ME: RequesterId = RequesterId(777);

    #[tokio::test(start_paused = true)]
    async fn range_command_relays_and_summarises() {
        let transport = Arc::new(FakeTransport::with_history(vec![
            media_message(101, MediaKind::Photo),
            text_message(102),
            media_message(104, MediaKind::Video),
        ]));
        let text = service(&transport)
            .handle_range_command(
                ME,
                "-1003187801487/38",
                "https://t.me/c/2387726302/100",
                "https://t.me/c/2387726302/105",
                &NoopObserver,
            )
            .await;
        assert_eq!(text, "✅ Forward completed! 2/2 files sent successfully");
        let calls = transport.calls();
        assert_eq!(
            calls[0].destination,
            Destination {
                chat: ConversationId(-1_003_187_801_487),
                thread: Some(38),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_target_is_reported() {
        let transport = Arc::new(FakeTransport::default());
        let text = service(&transport)
            .handle_range_command(
                ME,
                "group/abc",
                "https://t.me/c/1/1",
                "https://t.me/c/1/2",
                &NoopObserver,
            )
            .await;
        assert!(text.starts_with("❌ Invalid target format"));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ids_are_reported_not_relayed() {
        let transport = Arc::new(FakeTransport::default());
        let svc = service(&transport);
        let text = svc
            .handle_range_command(
                ME,
                "9223372036854775807/5",
                "https://t.me/c/1/1",
                "https://t.me/c/1/2",
                &NoopObserver,
            )
            .await;
        assert!(text.starts_with("❌ Invalid target format"));
        let text = svc
            .handle_range_command(
                ME,
                "-100123",
                "https://t.me/c/9223372036854775000/7",
                "https://t.me/c/1/2",
                &NoopObserver,
            )
            .await;
        assert!(text.starts_with("❌ Failed to parse source URLs"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_url_is_reported() {
        let transport = Arc::new(FakeTransport::default());
        let text = service(&transport)
            .handle_range_command(ME, "-100123", "not a link", "https://t.me/c/1/2", &NoopObserver)
            .await;
        assert!(text.starts_with("❌ Failed to parse source URLs"));
    }

    #[tokio::test(start_paused = true)]
    async fn second_range_job_is_refused_while_first_holds_slot() {
        let transport = Arc::new(FakeTransport::default());
        let svc = service(&transport);
        let job = svc
            .prepare_range(ME, "-100123", "https://t.me/c/1/1", "https://t.me/c/1/2")
            .expect("first job");
        let refused = svc
            .prepare_range(ME, "-100123", "https://t.me/c/1/1", "https://t.me/c/1/2")
            .err()
            .expect("busy");
        assert!(refused.contains("/cancel"));
        drop(job);
        assert!(svc
            .prepare_range(ME, "-100123", "https://t.me/c/1/1", "https://t.me/c/1/2")
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn single_item_uses_settings() {
        let transport = Arc::new(FakeTransport::with_history(vec![media_message(
            9,
            MediaKind::Document,
        )]));
        let svc = service(&transport);
        svc.add_replacement(ME, "caption => doc").await;
        svc.set_caption(ME, "via relay").await;
        svc.set_destination(ME, "-100555/3").await;

        let text = svc
            .handle_single_item_link(ME, "please copy https://t.me/somechannel/9 thanks")
            .await;
        assert_eq!(text, "✅ Message #9 relayed");

        let call = &transport.calls()[0];
        assert_eq!(call.caption.as_deref(), Some("doc 9\n\nvia relay"));
        assert_eq!(
            call.destination,
            Destination {
                chat: ConversationId(-100_555),
                thread: Some(3),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_item_defaults_to_requester_chat() {
        let transport = Arc::new(FakeTransport::with_history(vec![media_message(
            2,
            MediaKind::Photo,
        )]));
        let svc = service(&transport);
        svc.handle_single_item_link(ME, "https://t.me/c/2387726302/2")
            .await;
        assert_eq!(
            transport.calls()[0].destination,
            Destination::chat(ConversationId(777))
        );
    }

    #[tokio::test]
    async fn replace_requires_separator() {
        let transport = Arc::new(FakeTransport::default());
        let svc = service(&transport);
        assert!(svc.add_replacement(ME, "no separator").await.starts_with("❌"));
        assert!(svc.add_replacement(ME, " => x").await.starts_with("❌"));
        assert!(!svc.settings().contains(ME).await);
    }

    #[tokio::test]
    async fn settings_description_lists_rules_in_order() {
        let transport = Arc::new(FakeTransport::default());
        let svc = service(&transport);
        svc.add_replacement(ME, "a => b").await;
        svc.add_replacement(ME, "b => c").await;
        svc.set_destination(ME, "me").await;
        let text = svc.describe_settings(ME).await;
        let a = text.find("\"a\" => \"b\"").expect("first rule");
        let b = text.find("\"b\" => \"c\"").expect("second rule");
        assert!(a < b);
        assert!(text.contains("Destination: me"));
        assert!(text.contains("Forward job: idle"));

        svc.clear_replacements(ME).await;
        svc.clear_destination(ME).await;
        let text = svc.describe_settings(ME).await;
        assert!(text.contains("Replacements: (none)"));
        assert!(text.contains("Destination: this chat"));
    }

    #[test]
    fn cancel_without_job() {
        let transport = Arc::new(FakeTransport::default());
        assert_eq!(service(&transport).cancel(ME), "No forward is running.");
    }
}
