//! Bounded tail reading for append-only transcript files.
//!
//! Transcripts grow without bound, so the extractor must never read a whole
//! file. [`tail_lines`] seeks to EOF and walks backwards in fixed chunks
//! until it has seen enough newlines to cover the requested line count.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Chunk size for backward reads: 8KB.
const CHUNK_SIZE: u64 = 8 * 1024;

/// Reads the last `n` lines of a file, in file order, touching only a
/// trailing byte window proportional to `n`.
///
/// Edge cases: `n == 0` and an empty file both return an empty vec; a file
/// with fewer than `n` lines returns all of them; a trailing newline does
/// not produce an empty last element; lines longer than one chunk are
/// reassembled across chunk boundaries.
pub fn tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut file = fs_err::File::open(path)?;
    let file_len = file.metadata()?.len();
    if file_len == 0 {
        return Ok(Vec::new());
    }

    // n + 1 newlines guarantee n complete lines regardless of whether the
    // file ends with a newline.
    let target_newlines = n + 1;
    let mut newline_count = 0usize;
    let mut collected: Vec<u8> = Vec::new();
    let mut remaining = file_len;

    while remaining > 0 {
        let chunk_len = remaining.min(CHUNK_SIZE);
        let offset = remaining - chunk_len;

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; chunk_len as usize];
        file.read_exact(&mut buf)?;

        newline_count += buf.iter().filter(|&&byte| byte == b'\n').count();

        buf.append(&mut collected);
        collected = buf;
        remaining = offset;

        if newline_count >= target_newlines {
            break;
        }
    }

    let text = String::from_utf8_lossy(&collected);
    let text = text.strip_suffix('\n').unwrap_or(&text);
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let all_lines: Vec<&str> = text.split('\n').collect();
    let start = all_lines.len().saturating_sub(n);
    Ok(all_lines[start..].iter().map(|s| s.to_string()).collect())
}
