//! # monitor-core
//!
//! Core library for seatable-monitor: observes local, ephemeral process
//! state (tmux panes, Claude Code todo/task/transcript files) and
//! normalizes it into [`TaskRecord`]s for the reconciliation engine in the
//! daemon crate.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency; the daemon's poll loop
//!   is single-threaded and sequential.
//! - **Graceful degradation**: Missing files, malformed JSON, and failed
//!   captures skip the affected unit and return what was readable.
//! - **Stateless collectors**: Records are rebuilt from scratch on every
//!   poll cycle; the remote table is the only durable state.

pub mod collectors;
pub mod config;
pub mod error;
pub mod project_path;
pub mod tail;
pub mod transcript;
pub mod types;

pub use config::{load_config, MonitorConfig};
pub use error::{MonitorError, Result};
pub use transcript::SessionSnapshot;
pub use types::{TaskRecord, TaskSource, TaskStatus};
