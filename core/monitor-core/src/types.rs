//! Core types shared by collectors and the reconciliation engine.
//!
//! Every collector converges on [`TaskRecord`]: one normalized, immutable
//! record per observed task, todo item, or live session. Records are built
//! fresh on every poll cycle and discarded after reconciliation; the remote
//! table is the only durable state.

use serde::{Deserialize, Serialize};

/// Maximum length of a record name, in characters.
pub const MAX_NAME_CHARS: usize = 200;

/// Maximum length of the latest-output field, in characters.
pub const MAX_OUTPUT_CHARS: usize = 500;

/// Maximum length of a session identifier, in characters.
pub const MAX_SESSION_ID_CHARS: usize = 36;

/// Fallback name for records whose source had no usable label.
pub const UNNAMED_TASK: &str = "(unnamed task)";

/// Normalized task status. No raw source vocabulary crosses this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Unknown,
}

impl TaskStatus {
    /// Maps source-specific status vocabulary to the closed enumeration.
    ///
    /// Anything unrecognized, including an absent status, maps to `Unknown`.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw {
            Some("pending") => Self::Pending,
            Some("in_progress") => Self::InProgress,
            Some("completed") => Self::Completed,
            _ => Self::Unknown,
        }
    }

    /// Display label used for the remote single-select column.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Unknown => "Unknown",
        }
    }
}

/// Provenance of a task record. Part of remote-row identity scoping and
/// the grouping key for stale-row pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskSource {
    Tmux,
    ClaudeTask,
    ClaudeSession,
}

impl TaskSource {
    /// Wire name stored in the remote source column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tmux => "tmux",
            Self::ClaudeTask => "claude-code",
            Self::ClaudeSession => "claude-session",
        }
    }
}

/// One normalized task observation, immutable once constructed.
///
/// Identity for upsert purposes is the triple (name, session_id, machine).
/// `name` and `latest_output` are length-bounded by the collectors before
/// a record is constructed; truncation is never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub status: TaskStatus,
    pub source: TaskSource,
    pub session_id: String,
    pub latest_output: String,
    /// Display-only parent label. A link edge materializes only when a row
    /// with this name exists under the same session and machine.
    pub parent_name: Option<String>,
    pub machine: String,
}

/// Truncates a string to at most `max` characters, on a character boundary.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Bounds a record name: truncated to the name cap, placeholder when empty.
pub fn bounded_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNNAMED_TASK.to_string()
    } else {
        truncate_chars(trimmed, MAX_NAME_CHARS)
    }
}
