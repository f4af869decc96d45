//! CLI error types.

use thiserror::Error;

/// Errors raised while starting or running the silencer.
#[derive(Debug, Error)]
pub enum CliError {
    /// The log level or filter directive could not be parsed.
    #[error("invalid log filter {filter:?}: {reason}")]
    LogFilter {
        /// The rejected directive.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// The global subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),

    /// The Kubernetes client could not be created.
    #[error("kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    /// Silencer configuration or processing failed.
    #[error(transparent)]
    Silencer(#[from] silencer_core::SilencerError),
}
