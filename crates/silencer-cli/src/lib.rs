//! # silencer-cli
//!
//! The `kured-alert-silencer` binary: parses flags, sets up logging, watches
//! the kured DaemonSet and feeds its lock annotation to the
//! [`silencer_core::Dispatcher`], which silences locked nodes in Alertmanager.
//!
//! ```text
//! ┌────────────────┐  watch  ┌────────────┐  HTTP  ┌──────────────┐
//! │ kube-apiserver │────────►│ dispatcher │───────►│ Alertmanager │
//! └────────────────┘         └────────────┘        └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod error;
pub mod logging;
pub mod watch;

pub use cli::{Cli, LogFormat};
pub use error::CliError;
pub use watch::DaemonSetLockSource;
