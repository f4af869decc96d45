//! Silences Alertmanager alerts while kured reboots nodes.
//!
//! kured serializes node reboots through a lock stored in an annotation on its
//! DaemonSet. `silencer-core` turns that annotation into per-node silence
//! windows and makes sure Alertmanager holds a silence for every configured
//! matcher of every locked node until the window ends.
//!
//! # Pipeline
//!
//! ```text
//! LockEventSource ─► Dispatcher ─► LockDecoder ─► SilenceReconciler ─► SilenceStore
//!                                                     │
//!                                                     └─► MatcherTemplate
//! ```
//!
//! - [`lock`]: decodes both kured lock schemas into [`SilenceWindow`]s
//! - [`matcher`]: renders the `{{NodeName}}` matcher template
//! - [`reconcile`]: creates a silence per matcher unless one already lasts long enough
//! - [`dispatch`]: consumes add/modify/delete/error events sequentially
//! - [`alertmanager`]: the HTTP [`SilenceStore`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use chrono::{TimeZone, Utc};
//! use silencer_core::{FixedClock, LockDecoder};
//!
//! let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 31, 6, 33, 0).unwrap()));
//! let decoder = LockDecoder::new(Duration::from_secs(3600), clock).unwrap();
//!
//! let windows = decoder
//!     .decode(Some(r#"{"nodeID":"worker-2","created":"2024-05-31T06:31:32Z","TTL":0}"#))
//!     .unwrap();
//! assert_eq!(windows[0].node_id, "worker-2");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod alertmanager;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod lock;
pub mod matcher;
pub mod reconcile;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use alertmanager::AlertmanagerClient;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{DEFAULT_LOCK_ANNOTATION, DEFAULT_MATCHERS_TEMPLATE, SilencerConfig};
pub use dispatch::{
    DispatchStats, Dispatcher, ErrorPolicy, EventOutcome, LockEvent, LockEventSource,
    ResourceSnapshot,
};
pub use error::{Result, SilencerError};
pub use lock::{LockDecoder, LockRecord, MANUAL_NODE_ID, MultiLockRecord, decode_lock_annotation};
pub use matcher::{MatcherTemplate, render_matchers};
pub use reconcile::{DEFAULT_CREATED_BY, ReconcileOutcome, SilenceReconciler};
pub use store::{InMemorySilenceStore, SilenceStore};
pub use types::{
    ExistingSilence, Matcher, Silence, SilenceState, SilenceStatus, SilenceWindow,
    truncate_to_millis,
};
