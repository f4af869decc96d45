//! Runtime configuration.
//!
//! One immutable value carries everything the decoder, reconciler and
//! dispatcher need; [`SilencerConfig::validate`] checks it once at startup.

use std::sync::Arc;
use std::time::Duration;

use crate::alertmanager::{AlertmanagerClient, parse_base_url};
use crate::clock::Clock;
use crate::dispatch::{Dispatcher, ErrorPolicy};
use crate::error::{Result, SilencerError};
use crate::lock::LockDecoder;
use crate::matcher::MatcherTemplate;
use crate::reconcile::{DEFAULT_CREATED_BY, DEFAULT_STORE_TIMEOUT, SilenceReconciler};
use crate::store::SilenceStore;

/// Annotation kured writes its lock into.
pub const DEFAULT_LOCK_ANNOTATION: &str = "weave.works/kured-node-lock";

/// Matcher template silencing every alert carrying the node as `instance`.
pub const DEFAULT_MATCHERS_TEMPLATE: &str =
    r#"[{"name": "instance", "value": "{{NodeName}}", "isRegex": false}]"#;

/// Configuration of the silencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilencerConfig {
    /// Namespace of the kured DaemonSet.
    pub namespace: String,
    /// Name of the kured DaemonSet.
    pub daemonset: String,
    /// Annotation holding the lock.
    pub lock_annotation: String,
    /// Alertmanager base URL.
    pub alertmanager_url: String,
    /// How long after a lock was taken its node stays silenced.
    pub silence_duration: Duration,
    /// JSON matcher template with a `{{NodeName}}` placeholder.
    pub matchers_template: String,
    /// Deadline for each Alertmanager call.
    pub store_timeout: Duration,
    /// What to do when an event cannot be processed.
    pub error_policy: ErrorPolicy,
    /// Creator identity recorded on silences.
    pub created_by: String,
}

impl Default for SilencerConfig {
    fn default() -> Self {
        Self {
            namespace: "kube-system".to_string(),
            daemonset: "kured".to_string(),
            lock_annotation: DEFAULT_LOCK_ANNOTATION.to_string(),
            alertmanager_url: "http://localhost:9093".to_string(),
            silence_duration: Duration::from_secs(10 * 60),
            matchers_template: DEFAULT_MATCHERS_TEMPLATE.to_string(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            error_policy: ErrorPolicy::default(),
            created_by: DEFAULT_CREATED_BY.to_string(),
        }
    }
}

impl SilencerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `SilencerError::InvalidConfig` for empty names, a zero
    /// duration or a bad Alertmanager URL, and the template's own error for a
    /// bad matcher template.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("daemonset name", &self.daemonset),
            ("lock annotation", &self.lock_annotation),
            ("created-by identity", &self.created_by),
        ] {
            if value.trim().is_empty() {
                return Err(SilencerError::InvalidConfig {
                    reason: format!("{field} cannot be empty"),
                });
            }
        }

        if self.silence_duration.is_zero() {
            return Err(SilencerError::InvalidConfig {
                reason: "silence duration must be positive".to_string(),
            });
        }
        if self.store_timeout.is_zero() {
            return Err(SilencerError::InvalidConfig {
                reason: "store timeout must be positive".to_string(),
            });
        }

        parse_base_url(&self.alertmanager_url)?;
        MatcherTemplate::parse(self.matchers_template.as_str())?;
        Ok(())
    }

    /// Builds the Alertmanager client described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns `SilencerError::InvalidConfig` for a bad URL.
    pub fn alertmanager_client(&self) -> Result<AlertmanagerClient> {
        AlertmanagerClient::with_timeout(&self.alertmanager_url, self.store_timeout)
    }

    /// Wires a dispatcher writing to `store`.
    ///
    /// # Errors
    ///
    /// Returns configuration and template errors.
    pub fn dispatcher<S: SilenceStore>(&self, store: S, clock: Arc<dyn Clock>) -> Result<Dispatcher<S>> {
        self.validate()?;

        let decoder = LockDecoder::new(self.silence_duration, Arc::clone(&clock))?;
        let reconciler = SilenceReconciler::new(
            store,
            MatcherTemplate::parse(self.matchers_template.as_str())?,
            clock,
        )
        .with_created_by(self.created_by.as_str())
        .with_store_timeout(self.store_timeout);

        Ok(Dispatcher::new(decoder, reconciler, self.lock_annotation.as_str())
            .with_error_policy(self.error_policy))
    }
}
