//! Collectors: one per observed source, all converging on [`TaskRecord`].
//!
//! Each collector reads its source fresh every poll cycle and degrades
//! gracefully: a missing directory, unreadable file, or failed capture
//! skips that unit and never fails the batch.
//!
//! [`TaskRecord`]: crate::types::TaskRecord

pub mod claude;
pub mod tmux;

use std::path::Path;
use std::time::{Duration, SystemTime};

/// Cutoff instant for a lookback window of `hours`.
pub(crate) fn lookback_cutoff(hours: f64) -> SystemTime {
    let window = Duration::from_secs_f64(hours.max(0.0) * 3600.0);
    SystemTime::now().checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Whether `path` was modified at or after `cutoff`. Unreadable metadata
/// counts as stale.
pub(crate) fn modified_since(path: &Path, cutoff: SystemTime) -> bool {
    path.metadata()
        .and_then(|meta| meta.modified())
        .map(|mtime| mtime >= cutoff)
        .unwrap_or(false)
}
