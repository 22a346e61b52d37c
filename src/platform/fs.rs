// AssetLens - platform/fs.rs
//
// Thin synchronous filesystem helpers used by the Info and Thumbnail
// processors: stat with typed errors, modification-time comparison, and the
// human-readable size/date formatting shown in the details column.

use chrono::{DateTime, Local};
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Size and modification time of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl FileStat {
    pub fn modified_local(&self) -> Option<DateTime<Local>> {
        self.modified.map(DateTime::<Local>::from)
    }
}

/// Stat `path`, following symlinks.
pub fn stat(path: &Path) -> io::Result<FileStat> {
    let meta = std::fs::metadata(path)?;
    Ok(FileStat {
        size: meta.len(),
        modified: meta.modified().ok(),
    })
}

/// True if `derived` exists and is at least as new as `source`.
pub fn is_up_to_date(derived: &Path, source: &FileStat) -> bool {
    let Ok(meta) = std::fs::metadata(derived) else {
        return false;
    };
    match (meta.modified().ok(), source.modified) {
        (Some(d), Some(s)) => d >= s,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Format a byte count with binary units, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// `dd/mm/yyyy hh:mm`, or an empty string when the time is unknown.
pub fn format_date(modified: Option<DateTime<Local>>) -> String {
    modified
        .map(|m| m.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_default()
}
