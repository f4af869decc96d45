//! The silence store seam.
//!
//! [`SilenceStore`] is the capability the reconciler needs from the alerting
//! system: list silences by a `name=value` filter and create a silence.
//! [`crate::alertmanager::AlertmanagerClient`] talks to a real Alertmanager;
//! [`InMemorySilenceStore`] keeps silences in memory for tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, SilencerError};
use crate::types::{ExistingSilence, Silence, SilenceState, SilenceStatus};

/// Storage for alert silences.
#[allow(async_fn_in_trait)]
pub trait SilenceStore {
    /// Lists silences having a matcher equal to the `name=value` filter.
    async fn list_silences(&self, filter: &str) -> Result<Vec<ExistingSilence>>;

    /// Creates a silence and returns its identifier.
    async fn create_silence(&self, silence: &Silence) -> Result<String>;
}

impl<T: SilenceStore> SilenceStore for Arc<T> {
    async fn list_silences(&self, filter: &str) -> Result<Vec<ExistingSilence>> {
        (**self).list_silences(filter).await
    }

    async fn create_silence(&self, silence: &Silence) -> Result<String> {
        (**self).create_silence(silence).await
    }
}

#[derive(Debug, Default)]
struct StoreState {
    silences: Vec<ExistingSilence>,
    queries: usize,
    query_failure: Option<String>,
    create_failure: Option<String>,
    creates_before_failure: Option<usize>,
}

/// An in-memory silence store.
#[derive(Debug, Default)]
pub struct InMemorySilenceStore {
    state: Mutex<StoreState>,
}

impl InMemorySilenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pre-existing silence.
    pub fn insert(&self, silence: ExistingSilence) {
        self.state.lock().silences.push(silence);
    }

    /// Returns a copy of every stored silence, in creation order.
    #[must_use]
    pub fn silences(&self) -> Vec<ExistingSilence> {
        self.state.lock().silences.clone()
    }

    /// Returns how many list queries were served.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.state.lock().queries
    }

    /// Makes every following list query fail with `reason`.
    pub fn fail_queries(&self, reason: impl Into<String>) {
        self.state.lock().query_failure = Some(reason.into());
    }

    /// Makes creations fail with `reason` once `successes` more have gone through.
    pub fn fail_creates_after(&self, successes: usize, reason: impl Into<String>) {
        let mut state = self.state.lock();
        state.create_failure = Some(reason.into());
        state.creates_before_failure = Some(successes);
    }

    /// Clears injected failures.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.query_failure = None;
        state.create_failure = None;
        state.creates_before_failure = None;
    }
}

impl SilenceStore for InMemorySilenceStore {
    async fn list_silences(&self, filter: &str) -> Result<Vec<ExistingSilence>> {
        let mut state = self.state.lock();
        state.queries += 1;
        if let Some(reason) = &state.query_failure {
            return Err(SilencerError::StoreQuery {
                filter: filter.to_string(),
                reason: reason.clone(),
            });
        }

        let Some((name, value)) = filter.split_once('=') else {
            return Err(SilencerError::StoreQuery {
                filter: filter.to_string(),
                reason: "filter must have the form name=value".to_string(),
            });
        };

        Ok(state
            .silences
            .iter()
            .filter(|s| {
                s.matchers
                    .iter()
                    .any(|m| m.name == name && m.value == value)
            })
            .cloned()
            .collect())
    }

    async fn create_silence(&self, silence: &Silence) -> Result<String> {
        let mut state = self.state.lock();
        if let Some(reason) = state.create_failure.clone() {
            match state.creates_before_failure {
                Some(remaining) if remaining > 0 => {
                    state.creates_before_failure = Some(remaining - 1);
                }
                _ => {
                    let matcher = silence
                        .matchers
                        .first()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    return Err(SilencerError::StoreCreate { matcher, reason });
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        debug!(silence_id = %id, "stored silence in memory");
        state.silences.push(ExistingSilence {
            id: id.clone(),
            status: SilenceStatus {
                state: SilenceState::Active,
            },
            matchers: silence.matchers.clone(),
            starts_at: silence.starts_at,
            ends_at: silence.ends_at,
            created_by: silence.created_by.clone(),
            comment: silence.comment.clone(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Matcher;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn silence_for(name: &str, value: &str) -> Silence {
        let start = Utc.with_ymd_and_hms(2024, 5, 31, 6, 0, 0).unwrap();
        Silence::new(
            vec![Matcher::equal(name, value)],
            start,
            start + TimeDelta::hours(1),
            "test",
            "test",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn lists_only_matching_silences() {
        let store = InMemorySilenceStore::new();
        store.create_silence(&silence_for("instance", "node1")).await.unwrap();
        store.create_silence(&silence_for("instance", "node2")).await.unwrap();
        store.create_silence(&silence_for("alertname", "node1")).await.unwrap();

        let found = store.list_silences("instance=node1").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matchers[0], Matcher::equal("instance", "node1"));
        assert_eq!(store.query_count(), 1);
    }

    #[tokio::test]
    async fn rejects_filter_without_equals() {
        let store = InMemorySilenceStore::new();
        assert!(matches!(
            store.list_silences("instance").await,
            Err(SilencerError::StoreQuery { .. })
        ));
    }

    #[tokio::test]
    async fn injected_query_failure() {
        let store = InMemorySilenceStore::new();
        store.fail_queries("boom");
        assert!(store.list_silences("instance=node1").await.is_err());

        store.heal();
        assert!(store.list_silences("instance=node1").await.is_ok());
    }

    #[tokio::test]
    async fn create_failure_after_successes() {
        let store = InMemorySilenceStore::new();
        store.fail_creates_after(1, "quota");

        assert!(store.create_silence(&silence_for("a", "1")).await.is_ok());
        let err = store.create_silence(&silence_for("b", "2")).await.unwrap_err();
        assert!(matches!(err, SilencerError::StoreCreate { ref matcher, .. } if matcher == "b=2"));
        assert_eq!(store.silences().len(), 1);
    }

    #[tokio::test]
    async fn arc_store_delegates() {
        let store = Arc::new(InMemorySilenceStore::new());
        let shared = Arc::clone(&store);
        shared.create_silence(&silence_for("instance", "n1")).await.unwrap();
        assert_eq!(store.silences().len(), 1);
    }
}
