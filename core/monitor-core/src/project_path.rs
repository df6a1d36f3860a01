//! Decoding of encoded project-directory names.
//!
//! Claude encodes a project's working directory as a directory name by
//! replacing `/` with `-`. The encoding is lossy (`-` also appears inside
//! real path segments), so decoding is best-effort and display-only: the
//! `cwd` recovered from a transcript is always preferred when available.

/// Home-directory markers at the start of an encoded path. The segment
/// after the marker is assumed to be a username and is dropped too.
const HOME_MARKERS: &[&str] = &["-Users-", "-home-"];

/// Best-effort reconstruction of a readable path fragment from an encoded
/// directory name.
///
/// `-Users-pete-Code-capacitor` becomes `Code/capacitor`. When the
/// heuristic finds no meaningful remainder, the input is returned
/// unchanged rather than guessing.
pub fn decode_project_dir(encoded: &str) -> String {
    for marker in HOME_MARKERS {
        if let Some(rest) = encoded.strip_prefix(marker) {
            let mut segments = rest.split('-').filter(|s| !s.is_empty());
            let _username = segments.next();
            let remainder: Vec<&str> = segments.collect();
            if !remainder.is_empty() {
                return remainder.join("/");
            }
        }
    }
    encoded.to_string()
}

/// Short display label for a working directory: the last two path segments
/// joined with `/`.
pub fn project_label_from_cwd(cwd: &str) -> String {
    let segments: Vec<&str> = cwd.split('/').filter(|s| !s.is_empty()).collect();
    match segments.len() {
        0 => String::new(),
        1 => segments[0].to_string(),
        n => segments[n - 2..].join("/"),
    }
}
