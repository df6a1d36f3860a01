//! Collectors for Claude Code's on-disk state: per-session todo lists,
//! per-team task graphs, and session transcripts.
//!
//! All three flows are bounded by a lookback window on file modification
//! time; anything older is never read at all.

use crate::collectors::{lookback_cutoff, modified_since};
use crate::project_path::{decode_project_dir, project_label_from_cwd};
use crate::transcript::read_session_state;
use crate::types::{
    bounded_name, truncate_chars, TaskRecord, TaskSource, TaskStatus, MAX_OUTPUT_CHARS,
    MAX_SESSION_ID_CHARS,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Delimiter between session id and agent id in todo filenames
/// (`<sessionId>-agent-<agentId>.json`).
const AGENT_DELIMITER: &str = "-agent-";

#[derive(Debug, Deserialize)]
struct TodoItem {
    #[serde(default)]
    content: String,
    status: Option<String>,
    #[serde(rename = "activeForm")]
    active_form: Option<String>,
}

/// Task ids appear as strings or numbers depending on the writer version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum TaskId {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct TaskFile {
    id: TaskId,
    subject: String,
    status: Option<String>,
    #[serde(rename = "blockedBy", default)]
    blocked_by: Vec<TaskId>,
    #[serde(rename = "activeForm")]
    active_form: Option<String>,
    description: Option<String>,
}

/// Collects todo items from per-session files in `todos_dir`.
///
/// One record per item; todos carry no dependency structure, so
/// `parent_name` is always `None`.
pub fn collect_todos(todos_dir: &Path, machine: &str, lookback_hours: f64) -> Vec<TaskRecord> {
    let mut records = Vec::new();
    if !todos_dir.is_dir() {
        return records;
    }

    let cutoff = lookback_cutoff(lookback_hours);
    let Ok(entries) = fs_err::read_dir(todos_dir) else {
        return records;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        if !modified_since(&path, cutoff) {
            continue;
        }
        let Ok(content) = fs_err::read_to_string(&path) else {
            continue;
        };
        let items: Vec<TodoItem> = match serde_json::from_str(&content) {
            Ok(items) => items,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Skipping malformed todo file");
                continue;
            }
        };
        if items.is_empty() {
            continue;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let session_id = stem
            .split(AGENT_DELIMITER)
            .next()
            .unwrap_or(&stem)
            .to_string();

        for item in items {
            records.push(TaskRecord {
                name: bounded_name(&item.content),
                status: TaskStatus::from_raw(item.status.as_deref()),
                source: TaskSource::ClaudeTask,
                session_id: session_id.clone(),
                latest_output: truncate_chars(
                    item.active_form.as_deref().unwrap_or(""),
                    MAX_OUTPUT_CHARS,
                ),
                parent_name: None,
                machine: machine.to_string(),
            });
        }
    }

    records
}

/// Collects tasks from per-team directories in `tasks_dir`.
///
/// Each team directory holds one task object per pure-digit-named JSON
/// file. The whole team is loaded into an id map first so that a task's
/// display parent can be resolved from its first `blockedBy` entry; an
/// unresolvable or empty `blockedBy` yields no parent.
pub fn collect_tasks(tasks_dir: &Path, machine: &str, lookback_hours: f64) -> Vec<TaskRecord> {
    let mut records = Vec::new();
    if !tasks_dir.is_dir() {
        return records;
    }

    let cutoff = lookback_cutoff(lookback_hours);
    let Ok(teams) = fs_err::read_dir(tasks_dir) else {
        return records;
    };

    for team in teams.flatten() {
        let team_dir = team.path();
        if !team_dir.is_dir() || !modified_since(&team_dir, cutoff) {
            continue;
        }
        let team_name = team_dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let tasks = load_team_tasks(&team_dir);
        for task in tasks.values() {
            let parent_name = task
                .blocked_by
                .first()
                .and_then(|id| tasks.get(id))
                .map(|parent| parent.subject.clone());

            let output = task
                .active_form
                .as_deref()
                .filter(|s| !s.is_empty())
                .or(task.description.as_deref())
                .unwrap_or("");

            records.push(TaskRecord {
                name: bounded_name(&task.subject),
                status: TaskStatus::from_raw(task.status.as_deref()),
                source: TaskSource::ClaudeTask,
                session_id: team_name.clone(),
                latest_output: truncate_chars(output, MAX_OUTPUT_CHARS),
                parent_name,
                machine: machine.to_string(),
            });
        }
    }

    records
}

fn load_team_tasks(team_dir: &Path) -> HashMap<TaskId, TaskFile> {
    let mut tasks = HashMap::new();
    let Ok(entries) = fs_err::read_dir(team_dir) else {
        return tasks;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let stem = match path.file_stem() {
            Some(stem) => stem.to_string_lossy().to_string(),
            None => continue,
        };
        if stem.is_empty() || !stem.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(content) = fs_err::read_to_string(&path) else {
            continue;
        };
        match serde_json::from_str::<TaskFile>(&content) {
            Ok(task) => {
                tasks.insert(task.id.clone(), task);
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Skipping malformed task file");
            }
        }
    }

    tasks
}

/// Collects live sessions from transcript files under `projects_dir`.
///
/// Only transcripts modified within the lookback window are tailed; a
/// recently-written transcript implies an active session, so status is
/// always `InProgress`. Subagent transcripts (`agent-*.jsonl`) are skipped.
pub fn collect_sessions(
    projects_dir: &Path,
    machine: &str,
    lookback_hours: f64,
    tail_lines: usize,
) -> Vec<TaskRecord> {
    let mut records = Vec::new();
    if !projects_dir.is_dir() {
        return records;
    }

    let cutoff = lookback_cutoff(lookback_hours);
    let Ok(projects) = fs_err::read_dir(projects_dir) else {
        return records;
    };

    for project in projects.flatten() {
        let project_dir = project.path();
        if !project_dir.is_dir() {
            continue;
        }
        let encoded_name = project_dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let Ok(entries) = fs_err::read_dir(&project_dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "jsonl") {
                continue;
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if stem.starts_with("agent-") {
                continue;
            }
            if !modified_since(&path, cutoff) {
                continue;
            }

            let snapshot = read_session_state(&path, tail_lines);
            if snapshot.is_empty() {
                continue;
            }

            let name = if snapshot.cwd.is_empty() {
                decode_project_dir(&encoded_name)
            } else {
                project_label_from_cwd(&snapshot.cwd)
            };

            let session_id = if snapshot.session_id.is_empty() {
                stem
            } else {
                snapshot.session_id.clone()
            };

            let output = if !snapshot.last_text.is_empty() {
                snapshot.last_text.clone()
            } else if !snapshot.last_tool.is_empty() {
                format!("tool: {}", snapshot.last_tool)
            } else {
                snapshot.git_branch.clone()
            };

            records.push(TaskRecord {
                name: bounded_name(&name),
                status: TaskStatus::InProgress,
                source: TaskSource::ClaudeSession,
                session_id: truncate_chars(&session_id, MAX_SESSION_ID_CHARS),
                latest_output: truncate_chars(&output, MAX_OUTPUT_CHARS),
                parent_name: None,
                machine: machine.to_string(),
            });
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn age_file(path: &Path, hours: u64) {
        let stamp = SystemTime::now() - Duration::from_secs(hours * 3600);
        let file = fs::OpenOptions::new()
            .append(true)
            .open(path)
            .expect("open for aging");
        file.set_modified(stamp).expect("set mtime");
    }

    #[test]
    fn todo_file_yields_one_record_per_item() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("sess1-agent-2.json"),
            r#"[{"content":"build","status":"pending"}]"#,
        )
        .unwrap();

        let records = collect_todos(dir.path(), "host-a", 5.0);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "build");
        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.session_id, "sess1");
        assert_eq!(record.source, TaskSource::ClaudeTask);
        assert!(record.parent_name.is_none());
        assert_eq!(record.machine, "host-a");
    }

    #[test]
    fn todo_content_is_truncated_to_name_cap() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            r#"[{{"content":"{}","status":"in_progress"}}]"#,
            "a".repeat(300)
        );
        fs::write(dir.path().join("sess2-agent-1.json"), content).unwrap();

        let records = collect_todos(dir.path(), "m", 5.0);
        assert_eq!(records[0].name.chars().count(), 200);
        assert_eq!(records[0].status, TaskStatus::InProgress);
    }

    #[test]
    fn files_outside_the_lookback_window_are_ignored() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("old-agent-1.json");
        fs::write(&stale, r#"[{"content":"old","status":"pending"}]"#).unwrap();
        age_file(&stale, 10);
        fs::write(
            dir.path().join("new-agent-1.json"),
            r#"[{"content":"new","status":"pending"}]"#,
        )
        .unwrap();

        let records = collect_todos(dir.path(), "m", 5.0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "new");
        assert_eq!(records[0].session_id, "new");
    }

    #[test]
    fn malformed_and_empty_todo_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad-agent-1.json"), "{ not json").unwrap();
        fs::write(dir.path().join("empty-agent-1.json"), "[]").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert!(collect_todos(dir.path(), "m", 5.0).is_empty());
    }

    #[test]
    fn todo_without_status_maps_to_unknown() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("s-agent-1.json"),
            r#"[{"content":"mystery"}]"#,
        )
        .unwrap();

        let records = collect_todos(dir.path(), "m", 5.0);
        assert_eq!(records[0].status, TaskStatus::Unknown);
    }

    #[test]
    fn task_parent_resolves_from_first_blocker() {
        let dir = TempDir::new().unwrap();
        let team = dir.path().join("team-alpha");
        fs::create_dir(&team).unwrap();
        fs::write(
            team.join("1.json"),
            r#"{"id":"1","subject":"design schema","status":"completed"}"#,
        )
        .unwrap();
        fs::write(
            team.join("2.json"),
            r#"{"id":"2","subject":"write migrations","status":"in_progress","blockedBy":["1","999"],"activeForm":"Writing migrations"}"#,
        )
        .unwrap();

        let mut records = collect_tasks(dir.path(), "m", 5.0);
        records.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(records.len(), 2);

        let child = records
            .iter()
            .find(|r| r.name == "write migrations")
            .unwrap();
        assert_eq!(child.parent_name.as_deref(), Some("design schema"));
        assert_eq!(child.latest_output, "Writing migrations");
        assert_eq!(child.session_id, "team-alpha");
    }

    #[test]
    fn unresolvable_blocker_yields_no_parent() {
        let dir = TempDir::new().unwrap();
        let team = dir.path().join("team-b");
        fs::create_dir(&team).unwrap();
        fs::write(
            team.join("7.json"),
            r#"{"id":"7","subject":"deploy","status":"pending","blockedBy":["404"]}"#,
        )
        .unwrap();

        let records = collect_tasks(dir.path(), "m", 5.0);
        assert_eq!(records.len(), 1);
        assert!(records[0].parent_name.is_none());
    }

    #[test]
    fn non_numeric_filenames_are_not_tasks() {
        let dir = TempDir::new().unwrap();
        let team = dir.path().join("team-c");
        fs::create_dir(&team).unwrap();
        fs::write(
            team.join("README.json"),
            r#"{"id":"x","subject":"not a task"}"#,
        )
        .unwrap();
        fs::write(
            team.join("3.json"),
            r#"{"id":"3","subject":"real task","status":"pending"}"#,
        )
        .unwrap();

        let records = collect_tasks(dir.path(), "m", 5.0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "real task");
    }

    #[test]
    fn task_output_falls_back_to_description() {
        let dir = TempDir::new().unwrap();
        let team = dir.path().join("team-d");
        fs::create_dir(&team).unwrap();
        fs::write(
            team.join("4.json"),
            r#"{"id":"4","subject":"docs","status":"pending","description":"write the user guide"}"#,
        )
        .unwrap();

        let records = collect_tasks(dir.path(), "m", 5.0);
        assert_eq!(records[0].latest_output, "write the user guide");
    }

    #[test]
    fn numeric_task_ids_resolve_like_string_ids() {
        let dir = TempDir::new().unwrap();
        let team = dir.path().join("team-e");
        fs::create_dir(&team).unwrap();
        fs::write(
            team.join("1.json"),
            r#"{"id":1,"subject":"parent","status":"completed"}"#,
        )
        .unwrap();
        fs::write(
            team.join("2.json"),
            r#"{"id":2,"subject":"child","status":"pending","blockedBy":[1]}"#,
        )
        .unwrap();

        let records = collect_tasks(dir.path(), "m", 5.0);
        let child = records.iter().find(|r| r.name == "child").unwrap();
        assert_eq!(child.parent_name.as_deref(), Some("parent"));
    }

    #[test]
    fn session_record_is_built_from_a_recent_transcript() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("-Users-pete-Code-capacitor");
        fs::create_dir(&project).unwrap();
        let transcript = concat!(
            r#"{"type":"user","sessionId":"abcd-1234","cwd":"/Users/pete/Code/capacitor","gitBranch":"main","timestamp":"2026-08-29T09:00:00Z"}"#,
            "\n",
            r#"{"type":"assistant","timestamp":"2026-08-29T09:01:00Z","data":{"message":{"content":[{"type":"text","text":"running the test suite"}]}}}"#,
            "\n",
        );
        fs::write(project.join("abcd-1234.jsonl"), transcript).unwrap();

        let records = collect_sessions(dir.path(), "host-b", 5.0, 30);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "Code/capacitor");
        assert_eq!(record.status, TaskStatus::InProgress);
        assert_eq!(record.source, TaskSource::ClaudeSession);
        assert_eq!(record.session_id, "abcd-1234");
        assert_eq!(record.latest_output, "running the test suite");
    }

    #[test]
    fn stale_transcripts_and_agent_transcripts_are_skipped() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("-Users-pete-Code-old");
        fs::create_dir(&project).unwrap();
        let stale = project.join("stale.jsonl");
        fs::write(&stale, r#"{"type":"user","cwd":"/x"}"#).unwrap();
        age_file(&stale, 10);
        fs::write(project.join("agent-xyz.jsonl"), r#"{"type":"user","cwd":"/x"}"#).unwrap();

        assert!(collect_sessions(dir.path(), "m", 5.0, 30).is_empty());
    }

    #[test]
    fn session_name_falls_back_to_decoded_directory() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("-Users-pete-Code-capacitor");
        fs::create_dir(&project).unwrap();
        // No cwd anywhere in the tail.
        fs::write(
            project.join("efgh.jsonl"),
            r#"{"type":"user","sessionId":"efgh","gitBranch":"main"}"#,
        )
        .unwrap();

        let records = collect_sessions(dir.path(), "m", 5.0, 30);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Code/capacitor");
        assert_eq!(records[0].latest_output, "main");
    }
}
