//! Command-line argument parsing with clap.
//!
//! Every flag can also be set through a `KURED_ALERT_SILENCER_*` environment
//! variable named after the flag.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use silencer_core::{
    DEFAULT_CREATED_BY, DEFAULT_LOCK_ANNOTATION, DEFAULT_MATCHERS_TEMPLATE, ErrorPolicy,
    SilencerConfig,
};

/// Silences Alertmanager alerts for nodes rebooted by kured.
#[derive(Parser, Debug, Clone)]
#[command(name = "kured-alert-silencer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Namespace where the kured DaemonSet runs.
    #[arg(long, env = "KURED_ALERT_SILENCER_DS_NAMESPACE", default_value = "kube-system")]
    pub ds_namespace: String,

    /// Name of the kured DaemonSet.
    #[arg(long, env = "KURED_ALERT_SILENCER_DS_NAME", default_value = "kured")]
    pub ds_name: String,

    /// Annotation in which kured stores its lock.
    #[arg(long, env = "KURED_ALERT_SILENCER_LOCK_ANNOTATION", default_value = DEFAULT_LOCK_ANNOTATION)]
    pub lock_annotation: String,

    /// Log output format.
    #[arg(long, env = "KURED_ALERT_SILENCER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log level, or a full filter directive such as `silencer_core=debug`.
    #[arg(long, env = "KURED_ALERT_SILENCER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Alertmanager base URL.
    #[arg(long, env = "KURED_ALERT_SILENCER_ALERTMANAGER_URL", default_value = "http://localhost:9093")]
    pub alertmanager_url: String,

    /// How long after the lock was taken a node stays silenced.
    #[arg(
        long,
        env = "KURED_ALERT_SILENCER_SILENCE_DURATION",
        default_value = "10m",
        value_parser = humantime::parse_duration
    )]
    pub silence_duration: Duration,

    /// JSON list of matchers; `{{NodeName}}` is replaced with the locked node.
    #[arg(long, env = "KURED_ALERT_SILENCER_SILENCE_MATCHERS_JSON", default_value = DEFAULT_MATCHERS_TEMPLATE)]
    pub silence_matchers_json: String,

    /// Deadline for each Alertmanager request.
    #[arg(
        long,
        env = "KURED_ALERT_SILENCER_STORE_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub store_timeout: Duration,

    /// What to do when an event cannot be processed: abort or skip.
    #[arg(long, env = "KURED_ALERT_SILENCER_ON_ERROR", default_value_t = ErrorPolicy::Abort)]
    pub on_error: ErrorPolicy,

    /// Creator recorded on silences.
    #[arg(long, env = "KURED_ALERT_SILENCER_CREATED_BY", default_value = DEFAULT_CREATED_BY)]
    pub created_by: String,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Converts the arguments into the silencer configuration.
    #[must_use]
    pub fn into_config(self) -> SilencerConfig {
        SilencerConfig {
            namespace: self.ds_namespace,
            daemonset: self.ds_name,
            lock_annotation: self.lock_annotation,
            alertmanager_url: self.alertmanager_url,
            silence_duration: self.silence_duration,
            matchers_template: self.silence_matchers_json,
            store_timeout: self.store_timeout,
            error_policy: self.on_error,
            created_by: self.created_by,
        }
    }
}
