//! Reconciliation of desired silence windows against the store.
//!
//! For every matcher rendered for a node the reconciler asks the store for
//! silences with that matcher. If one of them already lasts until the desired
//! end (compared at millisecond precision) nothing is created; otherwise a new
//! silence running from now until the desired end is added. Silences are never
//! edited or deleted, so running the same window twice creates nothing the
//! second time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, trace};

use crate::clock::Clock;
use crate::error::{Result, SilencerError};
use crate::matcher::MatcherTemplate;
use crate::store::SilenceStore;
use crate::types::{Matcher, Silence, SilenceWindow};

/// Identity recorded as the creator of every silence.
pub const DEFAULT_CREATED_BY: &str = "kured-alert-silencer";

/// Default deadline for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// What one reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Identifiers of the silences created.
    pub created: Vec<String>,
    /// Matchers already covered by an existing silence.
    pub skipped: usize,
}

impl ReconcileOutcome {
    fn merge(&mut self, other: Self) {
        self.created.extend(other.created);
        self.skipped += other.skipped;
    }
}

/// Creates silences for locked nodes.
#[derive(Debug)]
pub struct SilenceReconciler<S> {
    store: S,
    template: MatcherTemplate,
    clock: Arc<dyn Clock>,
    created_by: String,
    store_timeout: Duration,
}

impl<S: SilenceStore> SilenceReconciler<S> {
    /// Creates a reconciler writing to `store` with matchers from `template`.
    pub fn new(store: S, template: MatcherTemplate, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            template,
            clock,
            created_by: DEFAULT_CREATED_BY.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Sets the creator identity written on new silences.
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Sets the deadline applied to each store call.
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Reconciles a decoded window.
    ///
    /// # Errors
    ///
    /// See [`SilenceReconciler::reconcile`].
    pub async fn reconcile_window(&self, window: &SilenceWindow) -> Result<ReconcileOutcome> {
        self.reconcile(&window.node_id, window.silence_end).await
    }

    /// Makes sure every matcher for `node_id` is silenced until `silence_end`.
    ///
    /// A store failure stops the remaining matchers; silences already created
    /// for earlier matchers are kept.
    ///
    /// # Errors
    ///
    /// Returns template errors from rendering and `StoreQuery`/`StoreCreate`
    /// errors from the store.
    pub async fn reconcile(
        &self,
        node_id: &str,
        silence_end: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let matchers = self.template.render(node_id)?;
        info!(node = %node_id, count = matchers.len(), "silencing alerts with matchers");

        let now = self.clock.now();
        if silence_end <= now {
            debug!(node = %node_id, %silence_end, "silence window elapsed before reconciliation");
            return Ok(ReconcileOutcome::default());
        }

        let mut outcome = ReconcileOutcome::default();
        for matcher in matchers {
            outcome.merge(self.reconcile_matcher(node_id, matcher, now, silence_end).await?);
        }
        Ok(outcome)
    }

    async fn reconcile_matcher(
        &self,
        node_id: &str,
        matcher: Matcher,
        now: DateTime<Utc>,
        silence_end: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        debug!(
            name = %matcher.name,
            value = %matcher.value,
            is_regex = matcher.is_regex,
            is_equal = ?matcher.is_equal,
            "matcher"
        );

        if self.silence_exists_until(&matcher, silence_end).await? {
            info!(node = %node_id, matcher = %matcher, "silence already exists for matcher");
            return Ok(ReconcileOutcome {
                created: Vec::new(),
                skipped: 1,
            });
        }

        let label = matcher.to_string();
        let silence = Silence::new(
            vec![matcher],
            now,
            silence_end,
            self.created_by.as_str(),
            format!("Silencing during node reboot: {node_id}"),
        )?;

        let id = self
            .with_deadline(self.store.create_silence(&silence), || SilencerError::StoreCreate {
                matcher: label.clone(),
                reason: format!("timed out after {:?}", self.store_timeout),
            })
            .await?;

        info!(node = %node_id, matcher = %label, silence_id = %id, ends_at = %silence_end, "silence created");
        Ok(ReconcileOutcome {
            created: vec![id],
            skipped: 0,
        })
    }

    /// Returns true if any silence for `matcher` lasts at least until `silence_end`.
    async fn silence_exists_until(
        &self,
        matcher: &Matcher,
        silence_end: DateTime<Utc>,
    ) -> Result<bool> {
        let filter = matcher.filter();
        let existing = self
            .with_deadline(self.store.list_silences(&filter), || SilencerError::StoreQuery {
                filter: filter.clone(),
                reason: format!("timed out after {:?}", self.store_timeout),
            })
            .await?;

        trace!(expected = %silence_end, "expected silence end");
        Ok(existing.iter().any(|silence| {
            trace!(silence_id = %silence.id, ends_at = %silence.ends_at, state = %silence.status.state, "existing silence");
            silence.covers_until(silence_end)
        }))
    }

    async fn with_deadline<T>(
        &self,
        call: impl Future<Output = Result<T>>,
        on_timeout: impl FnOnce() -> SilencerError,
    ) -> Result<T> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .unwrap_or_else(|_| Err(on_timeout()))
    }
}
