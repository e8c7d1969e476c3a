use std::path::PathBuf;
use std::time::SystemTime;

use tracing::{info, warn};

use crate::{PersistConfig, Result, CACHE_FILE_EXTENSION, HOUSEKEEPING_LOW_WATER};

/// Outcome of one housekeeping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub total_bytes_before: u64,
    pub total_bytes_after: u64,
    pub files_removed: usize,
}

/// Prune the cache directory down to the configured cap.
///
/// When the `*.cache` total exceeds `max_total_bytes`, files are deleted
/// oldest-first (by modification time) until the total is at or below 80 %
/// of the cap. Under-cap directories are left untouched.
pub fn run_housekeeping(config: &PersistConfig) -> Result<HousekeepingReport> {
    let mut files: Vec<(PathBuf, u64, SystemTime)> = Vec::new();
    let mut total: u64 = 0;

    for entry in std::fs::read_dir(&config.cache_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(CACHE_FILE_EXTENSION) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unstatable cache file");
                continue;
            }
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        total += meta.len();
        files.push((path, meta.len(), modified));
    }

    let mut report = HousekeepingReport {
        total_bytes_before: total,
        total_bytes_after: total,
        files_removed: 0,
    };

    if total <= config.max_total_bytes {
        return Ok(report);
    }

    let low_water = (config.max_total_bytes as f64 * HOUSEKEEPING_LOW_WATER) as u64;
    files.sort_by_key(|(_, _, modified)| *modified);

    for (path, len, _) in files {
        if report.total_bytes_after <= low_water {
            break;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                report.total_bytes_after -= len;
                report.files_removed += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not remove cache file");
            }
        }
    }

    info!(
        before = report.total_bytes_before,
        after = report.total_bytes_after,
        removed = report.files_removed,
        "housekeeping pass complete"
    );

    Ok(report)
}
