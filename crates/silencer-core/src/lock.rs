//! Decoding of the kured node-lock annotation.
//!
//! kured records the node(s) holding its reboot lock in an annotation on its
//! DaemonSet. Two JSON shapes exist:
//!
//! ```text
//! single: {"nodeID":"node-1","metadata":{...},"created":"2024-05-31T06:31:37Z","TTL":0}
//! multi:  {"maxOwners":2,"locks":[<single>, <single>]}
//! ```
//!
//! Decoding tries the multi-lock shape first and only falls back to the
//! single-lock shape when the multi-lock list yields no admissible window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::error::{Result, SilencerError};
use crate::types::SilenceWindow;

/// Node id kured writes for a lock taken by hand; never silenced.
pub const MANUAL_NODE_ID: &str = "manual";

/// One node's lock claim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// The node holding the lock.
    #[serde(rename = "nodeID", default)]
    pub node_id: String,
    /// Opaque metadata attached by kured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// When the lock was taken.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Lock TTL in nanoseconds (zero means no TTL).
    #[serde(rename = "TTL", default)]
    pub ttl_nanos: i64,
}

impl LockRecord {
    /// Returns the lock TTL, if one is set.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        u64::try_from(self.ttl_nanos)
            .ok()
            .filter(|n| *n > 0)
            .map(Duration::from_nanos)
    }

    fn window(&self, duration: TimeDelta, now: DateTime<Utc>, raw: &str) -> Result<Option<SilenceWindow>> {
        if self.node_id.is_empty() || self.node_id == MANUAL_NODE_ID {
            trace!(node = %self.node_id, "lock does not name a silenceable node");
            return Ok(None);
        }
        let Some(created) = self.created else {
            trace!(node = %self.node_id, "lock has no creation time");
            return Ok(None);
        };

        let silence_end = created.checked_add_signed(duration).ok_or_else(|| {
            SilencerError::annotation_decode(
                format!("silence end for node {} overflows", self.node_id),
                raw,
            )
        })?;

        if silence_end > now {
            Ok(Some(SilenceWindow::new(self.node_id.clone(), silence_end)))
        } else {
            debug!(node = %self.node_id, %silence_end, "silence window already elapsed");
            Ok(None)
        }
    }
}

/// Lock shape used when kured allows several concurrent lock owners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiLockRecord {
    /// Maximum number of concurrent owners.
    #[serde(rename = "maxOwners", default)]
    pub max_owners: i64,
    /// Current owners, in the order kured recorded them.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub locks: Vec<LockRecord>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<LockRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<LockRecord>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Turns a raw lock annotation into the silence windows that are still open at `now`.
///
/// An absent annotation means no node is locked and yields an empty list.
///
/// # Errors
///
/// Returns `SilencerError::AnnotationDecode` if the value is not a JSON object
/// matching the lock schemas.
pub fn decode_lock_annotation(
    value: Option<&str>,
    duration: TimeDelta,
    now: DateTime<Utc>,
) -> Result<Vec<SilenceWindow>> {
    let Some(raw) = value else {
        return Ok(Vec::new());
    };

    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| SilencerError::annotation_decode(e.to_string(), raw))?;
    if !parsed.is_object() {
        return Err(SilencerError::annotation_decode(
            "lock annotation is not a JSON object",
            raw,
        ));
    }

    let multi = MultiLockRecord::deserialize(&parsed).map_err(|e| {
        SilencerError::annotation_decode(format!("multi-lock schema: {e}"), raw)
    })?;

    let mut windows = Vec::with_capacity(multi.locks.len());
    for lock in &multi.locks {
        if let Some(window) = lock.window(duration, now, raw)? {
            windows.push(window);
        }
    }
    if !windows.is_empty() {
        return Ok(windows);
    }

    let single = LockRecord::deserialize(&parsed).map_err(|e| {
        SilencerError::annotation_decode(format!("single-lock schema: {e}"), raw)
    })?;
    if single.node_id == MANUAL_NODE_ID {
        debug!("lock was taken manually, not silencing");
        return Ok(Vec::new());
    }

    Ok(single.window(duration, now, raw)?.into_iter().collect())
}

/// Decoder bound to a configured silence duration and a clock.
#[derive(Debug, Clone)]
pub struct LockDecoder {
    silence_duration: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl LockDecoder {
    /// Creates a decoder that silences each lock for `silence_duration` after it was taken.
    ///
    /// # Errors
    ///
    /// Returns `SilencerError::InvalidConfig` if the duration is zero or too large.
    pub fn new(silence_duration: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if silence_duration.is_zero() {
            return Err(SilencerError::InvalidConfig {
                reason: "silence duration must be positive".to_string(),
            });
        }
        let silence_duration =
            TimeDelta::from_std(silence_duration).map_err(|e| SilencerError::InvalidConfig {
                reason: format!("silence duration out of range: {e}"),
            })?;

        Ok(Self {
            silence_duration,
            clock,
        })
    }

    /// Returns the configured silence duration.
    #[must_use]
    pub const fn silence_duration(&self) -> TimeDelta {
        self.silence_duration
    }

    /// Decodes `value` against the clock's current time.
    ///
    /// # Errors
    ///
    /// See [`decode_lock_annotation`].
    pub fn decode(&self, value: Option<&str>) -> Result<Vec<SilenceWindow>> {
        decode_lock_annotation(value, self.silence_duration, self.clock.now())
    }
}
