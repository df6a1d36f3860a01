//! Pane collector: turns live tmux sessions into task records.
//!
//! Liveness implies activity here; a pane has no "completed" state, so
//! every record is `InProgress`. The stale rows left behind when a session
//! exits are pruned by the reconciliation engine, not by this collector.

use crate::types::{
    truncate_chars, TaskRecord, TaskSource, TaskStatus, MAX_NAME_CHARS, MAX_OUTPUT_CHARS,
};
use std::process::Command;
use tracing::warn;

/// Shown when a captured pane contains no non-blank line.
const BLANK_PANE: &str = "(blank pane)";

/// Access to the multiplexer. The command-backed implementation is the
/// production path; tests substitute a fake.
pub trait TmuxAdapter {
    /// Names of all live sessions. Errors surface as an empty list.
    fn list_sessions(&self) -> Vec<String>;

    /// Current pane text for one session, `None` on capture failure.
    fn capture_pane(&self, session_name: &str) -> Option<String>;
}

/// Adapter that shells out to the `tmux` CLI.
#[derive(Debug, Clone, Default)]
pub struct CommandTmuxAdapter;

impl TmuxAdapter for CommandTmuxAdapter {
    fn list_sessions(&self) -> Vec<String> {
        run_tmux(&["ls", "-F", "#{session_name}"])
            .map(|output| {
                output
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn capture_pane(&self, session_name: &str) -> Option<String> {
        run_tmux(&["capture-pane", "-p", "-t", session_name])
    }
}

/// Runs tmux with `args`. Non-zero exit or spawn failure is "no data".
fn run_tmux(args: &[&str]) -> Option<String> {
    match Command::new("tmux").args(args).output() {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).to_string())
        }
        _ => None,
    }
}

/// Collects one record per live session whose name starts with any of the
/// configured prefixes. Capture failures are logged and skipped; they never
/// fail the batch.
pub fn collect_by_prefixes<A: TmuxAdapter>(
    adapter: &A,
    prefixes: &[String],
    machine: &str,
) -> Vec<TaskRecord> {
    let mut records = Vec::new();

    for session_name in adapter.list_sessions() {
        if !prefixes.iter().any(|p| session_name.starts_with(p.as_str())) {
            continue;
        }
        let Some(pane_text) = adapter.capture_pane(&session_name) else {
            warn!(session = %session_name, "Failed to capture tmux pane; skipping session");
            continue;
        };

        let last_line = pane_text
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or(BLANK_PANE);

        records.push(TaskRecord {
            name: truncate_chars(&format!("tmux:{}", session_name), MAX_NAME_CHARS),
            status: TaskStatus::InProgress,
            source: TaskSource::Tmux,
            session_id: session_name.clone(),
            latest_output: truncate_chars(last_line, MAX_OUTPUT_CHARS),
            parent_name: None,
            machine: machine.to_string(),
        });
    }

    records
}
