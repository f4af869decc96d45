//! Error types for the silencer-core crate.

use thiserror::Error;

/// Longest prefix of a raw annotation kept in an error for diagnosis.
const SNIPPET_LIMIT: usize = 256;

/// Errors that can occur while turning lock annotations into silences.
#[derive(Debug, Error)]
pub enum SilencerError {
    /// The lock annotation is not valid JSON for either lock schema.
    #[error("failed to decode lock annotation: {reason} (annotation: {snippet})")]
    AnnotationDecode {
        /// The reason decoding failed.
        reason: String,
        /// A truncated copy of the raw annotation value.
        snippet: String,
    },

    /// The matcher template could not be rendered or parsed.
    #[error("invalid matcher template: {reason}")]
    TemplateRender {
        /// The reason the template is invalid.
        reason: String,
    },

    /// A rendered matcher is missing one of its required fields.
    #[error("matcher is missing required fields: {reason}")]
    MatcherValidation {
        /// Which matcher and which fields were missing.
        reason: String,
    },

    /// Listing existing silences failed.
    #[error("failed to query silences for filter {filter}: {reason}")]
    StoreQuery {
        /// The `name=value` filter that was queried.
        filter: String,
        /// The reason the query failed.
        reason: String,
    },

    /// Creating a silence failed.
    #[error("failed to create silence for matcher {matcher}: {reason}")]
    StoreCreate {
        /// The matcher the silence was meant for.
        matcher: String,
        /// The reason the creation failed.
        reason: String,
    },

    /// A silence was built with an invalid validity window.
    #[error("invalid silence: {reason}")]
    InvalidSilence {
        /// The reason the silence is invalid.
        reason: String,
    },

    /// Invalid runtime configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },
}

impl SilencerError {
    /// Builds an [`SilencerError::AnnotationDecode`] keeping a bounded snippet of the raw value.
    pub fn annotation_decode(reason: impl Into<String>, raw: &str) -> Self {
        let snippet = match raw.char_indices().nth(SNIPPET_LIMIT) {
            Some((idx, _)) => format!("{}...", &raw[..idx]),
            None => raw.to_string(),
        };
        Self::AnnotationDecode {
            reason: reason.into(),
            snippet,
        }
    }

    /// Returns true for failures talking to the silence store.
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(self, Self::StoreQuery { .. } | Self::StoreCreate { .. })
    }
}

/// Result type for silencer operations.
pub type Result<T> = std::result::Result<T, SilencerError>;
