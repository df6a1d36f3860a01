//! Error types for monitor-core operations.

use std::path::PathBuf;

/// All errors that can occur in monitor-core operations.
///
/// Collectors recover from transient failures locally (skip the file or
/// session, keep going); these variants cover the failures that callers
/// do need to see, chiefly configuration problems at startup.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration incomplete: {0}")]
    ConfigIncomplete(String),

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using MonitorError.
pub type Result<T> = std::result::Result<T, MonitorError>;
