//! Mount status probing against the OS mount table.
//!
//! Status is always read live. Nothing here caches a result, since mounts can
//! appear or vanish underneath us (other processes, dropped connections).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::entry::ResolvedMount;
use crate::error::{IoResultExt, Result};

/// Default mount table source on Linux.
pub const MOUNTINFO_PATH: &str = "/proc/self/mountinfo";

/// A source of currently active mount points.
pub trait MountTable {
    /// Returns true if `mount_point` is an active mount point (exact match).
    fn contains(&self, mount_point: &Path) -> Result<bool>;
}

/// Mount table backed by a `mountinfo(5)` formatted file.
#[derive(Debug, Clone)]
pub struct ProcMountTable {
    source: PathBuf,
}

impl Default for ProcMountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcMountTable {
    /// Uses `/proc/self/mountinfo`.
    pub fn new() -> Self {
        Self::with_source(MOUNTINFO_PATH)
    }

    /// Uses an alternative mountinfo file.
    pub fn with_source(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Reads and parses all mount points in the table.
    pub fn mount_points(&self) -> Result<Vec<PathBuf>> {
        let content = fs::read_to_string(&self.source).probe_context(&self.source)?;
        Ok(parse_mount_points(&content))
    }
}

impl MountTable for ProcMountTable {
    fn contains(&self, mount_point: &Path) -> Result<bool> {
        Ok(self.mount_points()?.iter().any(|mp| mp == mount_point))
    }
}

/// Extracts mount points (field 5) from mountinfo content.
///
/// Malformed lines are skipped.
pub fn parse_mount_points(content: &str) -> Vec<PathBuf> {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape_mount_field(field)))
        .collect()
}

/// Unescapes octal sequences used by the kernel for whitespace and backslashes
/// (`\040`, `\011`, `\012`, `\134`).
fn unescape_mount_field(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..=i + 3].iter().all(|b| (b'0'..=b'7').contains(b))
            && let Ok(byte) = u8::from_str_radix(&input[i + 1..=i + 3], 8)
        {
            out.push(byte);
            i += 4;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Checks whether `path` is currently an active mount point.
///
/// A path that does not exist is reported as not mounted. Only a failure to
/// read the mount table itself is an error.
pub fn is_mounted<T: MountTable + ?Sized>(table: &T, path: &Path) -> Result<bool> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "mount path does not exist");
            return Ok(false);
        }
        // Stale network mounts fail stat with ENOTCONN and friends; the table
        // is still authoritative for those.
        Err(e) => debug!(path = %path.display(), error = %e, "stat failed, consulting mount table"),
        Ok(_) => {}
    }

    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mounted = table.contains(&target)?;
    debug!(path = %target.display(), mounted, "probed mount status");
    Ok(mounted)
}

/// Refreshes `is_mounted` on every entry.
///
/// A failed probe (or an unresolved entry) is logged and the entry is marked
/// unmounted; the refresh itself never fails.
pub fn refresh_all<F>(entries: &mut [ResolvedMount], probe: F)
where
    F: Fn(&Path) -> Result<bool>,
{
    for entry in entries.iter_mut() {
        let status = entry.mount_path().and_then(&probe);

        entry.is_mounted = match status {
            Ok(mounted) => mounted,
            Err(e) => {
                warn!(entry = %entry.name(), error = %e, "failed to check mount status, assuming unmounted");
                false
            }
        };
    }
}
