//! Core types for silencing alerts during node maintenance.
//!
//! - [`Matcher`]: a single label condition of a silence
//! - [`Silence`]: a silence this crate asks the store to create
//! - [`ExistingSilence`]: a silence as reported back by the store
//! - [`SilenceWindow`]: a node together with the instant its silence should end

use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SilencerError};

/// A label condition used both to look up existing silences and to define new ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    /// Label name.
    pub name: String,
    /// Label value (or pattern when `is_regex` is set).
    pub value: String,
    /// Whether `value` is a regular expression.
    pub is_regex: bool,
    /// Whether the matcher is an equality (`true`) or inequality (`false`) match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_equal: Option<bool>,
}

impl Matcher {
    /// Creates a plain equality matcher.
    #[must_use]
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            is_regex: false,
            is_equal: None,
        }
    }

    /// Returns the `name=value` filter expression used to query the store.
    #[must_use]
    pub fn filter(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// A silence to be created in the alerting store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Silence {
    /// Label matchers (alerts matching all of them are silenced).
    pub matchers: Vec<Matcher>,
    /// When the silence starts.
    pub starts_at: DateTime<Utc>,
    /// When the silence ends.
    pub ends_at: DateTime<Utc>,
    /// Who created the silence.
    pub created_by: String,
    /// Comment explaining the silence.
    pub comment: String,
}

impl Silence {
    /// Creates a new silence.
    ///
    /// # Errors
    ///
    /// Returns `SilencerError::InvalidSilence` if `ends_at` is not after
    /// `starts_at` or no matcher is given.
    pub fn new(
        matchers: Vec<Matcher>,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        created_by: impl Into<String>,
        comment: impl Into<String>,
    ) -> Result<Self> {
        if ends_at <= starts_at {
            return Err(SilencerError::InvalidSilence {
                reason: "silence end time must be after start time".to_string(),
            });
        }
        if matchers.is_empty() {
            return Err(SilencerError::InvalidSilence {
                reason: "silence needs at least one matcher".to_string(),
            });
        }

        Ok(Self {
            matchers,
            starts_at,
            ends_at,
            created_by: created_by.into(),
            comment: comment.into(),
        })
    }
}

/// Lifecycle state of a silence as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilenceState {
    /// Currently suppressing alerts.
    Active,
    /// Starts in the future.
    Pending,
    /// Already over.
    Expired,
    /// A state this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl SilenceState {
    /// Returns the state as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SilenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status wrapper used by the Alertmanager API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceStatus {
    /// The silence state.
    pub state: SilenceState,
}

/// A silence already persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingSilence {
    /// Store-assigned identifier.
    pub id: String,
    /// Current state.
    pub status: SilenceStatus,
    /// Label matchers.
    pub matchers: Vec<Matcher>,
    /// When the silence starts.
    pub starts_at: DateTime<Utc>,
    /// When the silence ends.
    pub ends_at: DateTime<Utc>,
    /// Who created the silence.
    #[serde(default)]
    pub created_by: String,
    /// Comment explaining the silence.
    #[serde(default)]
    pub comment: String,
}

impl ExistingSilence {
    /// Returns true if this silence lasts at least until `end`, compared at
    /// millisecond precision.
    #[must_use]
    pub fn covers_until(&self, end: DateTime<Utc>) -> bool {
        truncate_to_millis(self.ends_at) >= truncate_to_millis(end)
    }
}

/// A node that should be silenced until `silence_end`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SilenceWindow {
    /// The locked node.
    pub node_id: String,
    /// When the silence for this node should end.
    pub silence_end: DateTime<Utc>,
}

impl SilenceWindow {
    /// Creates a new window.
    #[must_use]
    pub fn new(node_id: impl Into<String>, silence_end: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.into(),
            silence_end,
        }
    }
}

/// Drops sub-millisecond precision from `at`.
#[must_use]
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = at.nanosecond();
    at.with_nanosecond(nanos - nanos % 1_000_000).unwrap_or(at)
}
