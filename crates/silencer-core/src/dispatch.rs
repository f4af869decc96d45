//! Dispatching of coordination-resource change events.
//!
//! The dispatcher is the single consumer of a [`LockEventSource`]. Each added
//! or modified snapshot has its lock annotation decoded and every resulting
//! window reconciled, one after the other, in annotation order. Deleted
//! snapshots and source errors are logged and otherwise ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::lock::LockDecoder;
use crate::reconcile::{ReconcileOutcome, SilenceReconciler};
use crate::store::SilenceStore;

/// The parts of a coordination resource the dispatcher looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Namespace of the resource, if namespaced.
    pub namespace: Option<String>,
    /// Name of the resource.
    pub name: String,
    /// Resource annotations.
    pub annotations: BTreeMap<String, String>,
}

impl ResourceSnapshot {
    /// Creates a snapshot without annotations.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds an annotation.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Returns the value of annotation `key`, if present.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

impl fmt::Display for ResourceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A change to the coordination resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// The resource was seen for the first time.
    Added(ResourceSnapshot),
    /// The resource changed.
    Modified(ResourceSnapshot),
    /// The resource was deleted.
    Deleted(ResourceSnapshot),
    /// The source reported an error; it keeps delivering afterwards.
    Error(String),
}

impl LockEvent {
    /// Returns the event kind as a string.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
            Self::Error(_) => "error",
        }
    }
}

/// A stream of [`LockEvent`]s.
#[allow(async_fn_in_trait)]
pub trait LockEventSource {
    /// Waits for the next event; `None` once the source is closed.
    async fn next_event(&mut self) -> Option<LockEvent>;
}

impl LockEventSource for mpsc::Receiver<LockEvent> {
    async fn next_event(&mut self) -> Option<LockEvent> {
        self.recv().await
    }
}

/// What to do when processing an event fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ErrorPolicy {
    /// Stop dispatching and return the error.
    #[default]
    Abort,
    /// Log the error and continue with the next event.
    Skip,
}

impl ErrorPolicy {
    /// Returns the policy as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" | "fail" => Ok(Self::Abort),
            "skip" | "continue" => Ok(Self::Skip),
            other => Err(format!("unknown error policy {other:?}, expected abort or skip")),
        }
    }
}

/// Counters accumulated by [`Dispatcher::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events received.
    pub events: usize,
    /// Silence windows reconciled.
    pub windows: usize,
    /// Silences created.
    pub silences_created: usize,
    /// Matchers already covered by an existing silence.
    pub silences_skipped: usize,
    /// Events whose processing failed and was skipped.
    pub failed_events: usize,
}

/// Result of handling one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// Windows decoded from the event.
    pub windows: usize,
    /// Combined reconciliation result.
    pub reconciled: ReconcileOutcome,
}

/// Feeds coordination-resource events into the decoder and reconciler.
#[derive(Debug)]
pub struct Dispatcher<S> {
    decoder: LockDecoder,
    reconciler: SilenceReconciler<S>,
    annotation_key: String,
    policy: ErrorPolicy,
}

impl<S: SilenceStore> Dispatcher<S> {
    /// Creates a dispatcher reading the lock from `annotation_key`.
    pub fn new(
        decoder: LockDecoder,
        reconciler: SilenceReconciler<S>,
        annotation_key: impl Into<String>,
    ) -> Self {
        Self {
            decoder,
            reconciler,
            annotation_key: annotation_key.into(),
            policy: ErrorPolicy::default(),
        }
    }

    /// Sets the error policy.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the reconciler.
    #[must_use]
    pub const fn reconciler(&self) -> &SilenceReconciler<S> {
        &self.reconciler
    }

    /// Consumes events until the source closes.
    ///
    /// # Errors
    ///
    /// With [`ErrorPolicy::Abort`], returns the first decode, template or
    /// store error. With [`ErrorPolicy::Skip`] failures are only counted.
    pub async fn run<E: LockEventSource>(&self, source: &mut E) -> Result<DispatchStats> {
        let mut stats = DispatchStats::default();

        while let Some(event) = source.next_event().await {
            stats.events += 1;
            match self.handle_event(&event).await {
                Ok(outcome) => {
                    stats.windows += outcome.windows;
                    stats.silences_created += outcome.reconciled.created.len();
                    stats.silences_skipped += outcome.reconciled.skipped;
                }
                Err(e) => {
                    error!(event = event.kind(), policy = %self.policy, error = %e, "failed to process lock event");
                    match self.policy {
                        ErrorPolicy::Abort => return Err(e),
                        ErrorPolicy::Skip => stats.failed_events += 1,
                    }
                }
            }
        }

        info!(
            events = stats.events,
            created = stats.silences_created,
            failed = stats.failed_events,
            "event source closed"
        );
        Ok(stats)
    }

    /// Handles a single event.
    ///
    /// # Errors
    ///
    /// Returns decode errors for a malformed annotation and reconcile errors
    /// from the first failing window; later windows are not attempted.
    pub async fn handle_event(&self, event: &LockEvent) -> Result<EventOutcome> {
        match event {
            LockEvent::Added(snapshot) | LockEvent::Modified(snapshot) => {
                self.handle_snapshot(snapshot).await
            }
            LockEvent::Deleted(snapshot) => {
                info!(resource = %snapshot, "coordination resource deleted");
                Ok(EventOutcome::default())
            }
            LockEvent::Error(message) => {
                error!(error = %message, "error watching coordination resource");
                Ok(EventOutcome::default())
            }
        }
    }

    async fn handle_snapshot(&self, snapshot: &ResourceSnapshot) -> Result<EventOutcome> {
        let windows = self
            .decoder
            .decode(snapshot.annotation(&self.annotation_key))?;
        if windows.is_empty() {
            info!(resource = %snapshot, "no locked node to silence");
        }

        let mut outcome = EventOutcome {
            windows: windows.len(),
            reconciled: ReconcileOutcome::default(),
        };
        for window in &windows {
            info!(node = %window.node_id, ends_at = %window.silence_end, "silencing alerts for node");
            let reconciled = self.reconciler.reconcile_window(window).await.inspect_err(|e| {
                warn!(node = %window.node_id, error = %e, "silencing stopped for node");
            })?;
            outcome.reconciled.created.extend(reconciled.created);
            outcome.reconciled.skipped += reconciled.skipped;
        }
        Ok(outcome)
    }
}
