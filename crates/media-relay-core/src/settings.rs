//! Per-requester relay settings.
//!
//! Settings are kept in memory for the lifetime of the process. Each
//! requester has at most one entry, created on the first configuration
//! command; updates to one key are atomic with respect to later reads of
//! that key.

use crate::destination::DestinationOverride;
use crate::transform::ReplacementRules;
use moka::future::Cache;
use std::fmt;

/// Identity of the user issuing relay commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequesterId(pub i64);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transform and routing preferences of one requester.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSettings {
    /// Text appended to every relayed caption.
    pub override_caption: Option<String>,
    /// Ordered literal replacements applied to captions.
    pub replacement_rules: ReplacementRules,
    /// Where single-item relays go instead of the requester's own chat.
    pub destination_override: Option<DestinationOverride>,
}

/// Concurrency-safe settings store keyed by requester.
#[derive(Clone)]
pub struct SettingsStore {
    cache: Cache<RequesterId, UserSettings>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    /// Creates an empty store. Entries never expire.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
        }
    }

    /// Returns the requester's settings, or defaults if none were configured.
    ///
    /// Reading never creates an entry.
    pub async fn get(&self, requester: RequesterId) -> UserSettings {
        self.cache.get(&requester).await.unwrap_or_default()
    }

    /// Atomically applies `mutate` to the requester's settings and returns
    /// the stored result. The entry is created on first use.
    pub async fn update<F>(&self, requester: RequesterId, mutate: F) -> UserSettings
    where
        F: FnOnce(&mut UserSettings) + Send,
    {
        self.cache
            .entry(requester)
            .and_upsert_with(|existing| {
                let mut settings = existing.map(|e| e.into_value()).unwrap_or_default();
                mutate(&mut settings);
                std::future::ready(settings)
            })
            .await
            .into_value()
    }

    /// Whether the requester has ever configured anything.
    pub async fn contains(&self, requester: RequesterId) -> bool {
        self.cache.contains_key(&requester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn get_returns_defaults_without_creating_entry() {
        let store = SettingsStore::new();
        let settings = store.get(RequesterId(1)).await;
        assert_eq!(settings, UserSettings::default());
        assert!(!store.contains(RequesterId(1)).await);
    }

    #[tokio::test]
    async fn update_is_visible_to_next_read() {
        let store = SettingsStore::new();
        store
            .update(RequesterId(7), |s| {
                s.override_caption = Some("sig".to_string());
            })
            .await;
        let settings = store.get(RequesterId(7)).await;
        assert_eq!(settings.override_caption.as_deref(), Some("sig"));
        assert!(store.contains(RequesterId(7)).await);
    }

    #[tokio::test]
    async fn requesters_are_isolated() {
        let store = SettingsStore::new();
        store
            .update(RequesterId(1), |s| s.replacement_rules.upsert("a", "b"))
            .await;
        assert!(store.get(RequesterId(2)).await.replacement_rules.is_empty());
        assert_eq!(store.get(RequesterId(1)).await.replacement_rules.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_updates_to_one_key_are_not_lost() {
        let store = Arc::new(SettingsStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .update(RequesterId(99), move |s| {
                        s.replacement_rules.upsert(format!("k{i}"), "v");
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }
        assert_eq!(store.get(RequesterId(99)).await.replacement_rules.len(), 32);
    }
}
