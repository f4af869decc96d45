//! Watches the kured DaemonSet and turns changes into [`LockEvent`]s.
//!
//! The kube runtime watcher re-lists on start and after desyncs; every
//! object it reports is delivered as `Added` (initial list) or `Modified`.
//! Watch errors are reported as `LockEvent::Error` and the watcher backs off
//! and resumes on its own.

use futures::StreamExt;
use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::DaemonSet;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Client, ResourceExt};
use silencer_core::{LockEvent, LockEventSource, ResourceSnapshot};
use tracing::{debug, info};

type WatchStream = BoxStream<'static, Result<watcher::Event<DaemonSet>, watcher::Error>>;

/// A [`LockEventSource`] backed by a watch on one DaemonSet.
pub struct DaemonSetLockSource {
    stream: WatchStream,
}

impl DaemonSetLockSource {
    /// Watches DaemonSet `name` in `namespace`.
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        info!(%namespace, %name, "watching daemonset");
        let api: Api<DaemonSet> = Api::namespaced(client, namespace);
        let config = watcher::Config::default().fields(&format!("metadata.name={name}"));
        Self {
            stream: watcher(api, config).default_backoff().boxed(),
        }
    }
}

impl std::fmt::Debug for DaemonSetLockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonSetLockSource").finish_non_exhaustive()
    }
}

impl LockEventSource for DaemonSetLockSource {
    async fn next_event(&mut self) -> Option<LockEvent> {
        while let Some(item) = self.stream.next().await {
            if let Some(event) = lock_event(item) {
                return Some(event);
            }
        }
        None
    }
}

/// Maps a watcher item to a lock event; list bookkeeping yields `None`.
pub fn lock_event(item: Result<watcher::Event<DaemonSet>, watcher::Error>) -> Option<LockEvent> {
    match item {
        Ok(watcher::Event::InitApply(ds)) => Some(LockEvent::Added(snapshot_from_daemonset(&ds))),
        Ok(watcher::Event::Apply(ds)) => Some(LockEvent::Modified(snapshot_from_daemonset(&ds))),
        Ok(watcher::Event::Delete(ds)) => Some(LockEvent::Deleted(snapshot_from_daemonset(&ds))),
        Ok(watcher::Event::Init) => {
            debug!("daemonset list started");
            None
        }
        Ok(watcher::Event::InitDone) => {
            debug!("daemonset list complete");
            None
        }
        Err(e) => Some(LockEvent::Error(e.to_string())),
    }
}

/// Copies the identity and annotations of a DaemonSet.
pub fn snapshot_from_daemonset(ds: &DaemonSet) -> ResourceSnapshot {
    ResourceSnapshot {
        namespace: ds.namespace(),
        name: ds.name_any(),
        annotations: ds.annotations().clone(),
    }
}
