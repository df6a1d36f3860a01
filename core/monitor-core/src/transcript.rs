//! Session-state extraction from transcript tails.
//!
//! A transcript is an append-only JSONL file, one independent JSON object
//! per line, newest last. The extractor scans a bounded tail newest-to-oldest
//! and recovers the most recent value of each field of interest, stopping
//! early once every field is filled. Malformed lines are skipped, never
//! fatal.

use crate::tail::tail_lines;
use crate::types::truncate_chars;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Character cap for the extracted last-text snippet.
const MAX_TEXT_CHARS: usize = 200;

/// The most recent observable state of one session, recovered from its
/// transcript tail. Fields default to empty when never found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub entry_type: String,
    pub last_tool: String,
    pub last_text: String,
    pub cwd: String,
    pub git_branch: String,
    pub session_id: String,
    pub timestamp: String,
}

impl SessionSnapshot {
    /// True when no field was recovered; callers treat this as "no session
    /// detected" and skip the file.
    pub fn is_empty(&self) -> bool {
        self.entry_type.is_empty()
            && self.last_tool.is_empty()
            && self.last_text.is_empty()
            && self.cwd.is_empty()
            && self.git_branch.is_empty()
            && self.session_id.is_empty()
            && self.timestamp.is_empty()
    }

    fn is_complete(&self) -> bool {
        !self.entry_type.is_empty()
            && !self.last_tool.is_empty()
            && !self.last_text.is_empty()
            && !self.cwd.is_empty()
            && !self.git_branch.is_empty()
            && !self.session_id.is_empty()
            && !self.timestamp.is_empty()
    }
}

/// One transcript line. All fields optional; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct TranscriptEntry {
    #[serde(rename = "type")]
    entry_type: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    cwd: Option<String>,
    #[serde(rename = "gitBranch")]
    git_branch: Option<String>,
    timestamp: Option<String>,
    data: Option<Value>,
}

/// Reads the last `n` lines of a transcript and extracts a snapshot.
///
/// A missing or unreadable file yields an empty snapshot, not an error.
pub fn read_session_state(path: &Path, n: usize) -> SessionSnapshot {
    let lines = tail_lines(path, n).unwrap_or_default();
    extract_session_state(&lines)
}

/// Extracts a snapshot from transcript lines (oldest first, as stored).
///
/// Scans in reverse so that the entry closest to the end of the tail wins;
/// first match per field is final. Scanning stops early once every field
/// is non-empty.
pub fn extract_session_state(lines: &[String]) -> SessionSnapshot {
    let mut snapshot = SessionSnapshot::default();

    for line in lines.iter().rev() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<TranscriptEntry>(trimmed) else {
            continue;
        };

        fill(&mut snapshot.entry_type, entry.entry_type);
        fill(&mut snapshot.session_id, entry.session_id);
        fill(&mut snapshot.cwd, entry.cwd);
        fill(&mut snapshot.git_branch, entry.git_branch);
        fill(&mut snapshot.timestamp, entry.timestamp);

        if snapshot.last_tool.is_empty() && snapshot.last_text.is_empty() {
            if let Some(data) = entry.data {
                apply_activity(&mut snapshot, data);
            }
        }

        if snapshot.is_complete() {
            break;
        }
    }

    snapshot
}

fn fill(slot: &mut String, value: Option<String>) {
    if !slot.is_empty() {
        return;
    }
    if let Some(value) = value {
        if !value.trim().is_empty() {
            *slot = value;
        }
    }
}

/// Pulls the last tool use and the last text block out of an entry payload.
///
/// The payload may itself be a JSON-encoded string needing a second parse;
/// a payload that fails the strict parse is skipped outright. The nested
/// `message.content` list is scanned in reverse: the first `tool_use` sets
/// `last_tool`, the first `text` sets `last_text`.
fn apply_activity(snapshot: &mut SessionSnapshot, data: Value) {
    let payload = match data {
        Value::Object(map) => Value::Object(map),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Value::Object(map),
            _ => return,
        },
        _ => return,
    };

    let content = payload
        .get("message")
        .and_then(|message| message.get("content"))
        .or_else(|| payload.get("content"))
        .and_then(Value::as_array);
    let Some(content) = content else {
        return;
    };

    for item in content.iter().rev() {
        match item.get("type").and_then(Value::as_str) {
            Some("tool_use") if snapshot.last_tool.is_empty() => {
                if let Some(name) = item.get("name").and_then(Value::as_str) {
                    snapshot.last_tool = name.to_string();
                }
            }
            Some("text") if snapshot.last_text.is_empty() => {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    snapshot.last_text = truncate_chars(text.trim(), MAX_TEXT_CHARS);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_tail_yields_empty_snapshot() {
        let snapshot = extract_session_state(&[]);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn newest_entry_wins_per_field() {
        let tail = lines(&[
            r#"{"type":"user","cwd":"/old/path","sessionId":"old-session"}"#,
            r#"{"type":"assistant","cwd":"/new/path"}"#,
        ]);
        let snapshot = extract_session_state(&tail);

        assert_eq!(snapshot.entry_type, "assistant");
        assert_eq!(snapshot.cwd, "/new/path");
        // Only the older entry carried a session id; it still fills the gap.
        assert_eq!(snapshot.session_id, "old-session");
    }

    #[test]
    fn first_match_is_final_for_activity_fields() {
        let older = r#"{"data":{"message":{"content":[{"type":"text","text":"older text"}]}}}"#;
        let newer = r#"{"data":{"message":{"content":[{"type":"tool_use","name":"Bash"},{"type":"text","text":"newer text"}]}}}"#;
        let snapshot = extract_session_state(&lines(&[older, newer]));

        assert_eq!(snapshot.last_tool, "Bash");
        assert_eq!(snapshot.last_text, "newer text");
    }

    #[test]
    fn content_list_is_scanned_in_reverse() {
        let entry = r#"{"data":{"message":{"content":[{"type":"tool_use","name":"Read"},{"type":"tool_use","name":"Edit"},{"type":"text","text":"first"},{"type":"text","text":"second"}]}}}"#;
        let snapshot = extract_session_state(&lines(&[entry]));

        assert_eq!(snapshot.last_tool, "Edit");
        assert_eq!(snapshot.last_text, "second");
    }

    #[test]
    fn string_encoded_payload_is_parsed_a_second_time() {
        let entry = r#"{"data":"{\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"embedded\"}]}}"}"#;
        let snapshot = extract_session_state(&lines(&[entry]));
        assert_eq!(snapshot.last_text, "embedded");
    }

    #[test]
    fn malformed_embedded_payload_is_skipped_not_evaluated() {
        // Strict parse or skip; no permissive literal fallback.
        let bad = r#"{"data":"{'message': {'content': [{'type': 'text'}]}}"}"#;
        let good = r#"{"data":{"message":{"content":[{"type":"text","text":"from older entry"}]}},"cwd":"/repo"}"#;
        let snapshot = extract_session_state(&lines(&[good, bad]));

        assert_eq!(snapshot.last_text, "from older entry");
        assert_eq!(snapshot.cwd, "/repo");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let tail = lines(&[
            r#"{"cwd":"/kept/path"}"#,
            "not json at all {{{",
            r#"{"gitBranch":"main"}"#,
        ]);
        let snapshot = extract_session_state(&tail);

        assert_eq!(snapshot.cwd, "/kept/path");
        assert_eq!(snapshot.git_branch, "main");
    }

    #[test]
    fn last_text_is_truncated_to_two_hundred_chars() {
        let long = "z".repeat(400);
        let entry = format!(
            r#"{{"data":{{"message":{{"content":[{{"type":"text","text":"{}"}}]}}}}}}"#,
            long
        );
        let snapshot = extract_session_state(&lines(&[entry.as_str()]));
        assert_eq!(snapshot.last_text.chars().count(), 200);
    }

    #[test]
    fn missing_file_reads_as_empty_snapshot() {
        let snapshot = read_session_state(Path::new("/nope/missing.jsonl"), 30);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn scan_stops_early_once_complete() {
        // The oldest entry would overwrite everything if first-match-wins
        // were not honored; it must not.
        let oldest = r#"{"type":"old","sessionId":"old","cwd":"/old","gitBranch":"old","timestamp":"old","data":{"message":{"content":[{"type":"tool_use","name":"Old"},{"type":"text","text":"old"}]}}}"#;
        let newest = r#"{"type":"assistant","sessionId":"s-1","cwd":"/repo","gitBranch":"main","timestamp":"2026-08-29T10:00:00Z","data":{"message":{"content":[{"type":"tool_use","name":"Bash"},{"type":"text","text":"running tests"}]}}}"#;
        let snapshot = extract_session_state(&lines(&[oldest, newest]));

        assert_eq!(snapshot.session_id, "s-1");
        assert_eq!(snapshot.last_tool, "Bash");
        assert_eq!(snapshot.last_text, "running tests");
        assert_eq!(snapshot.git_branch, "main");
    }
}
