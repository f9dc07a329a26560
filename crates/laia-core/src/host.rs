//! Read-only host facts that steer the guided setup.

use crate::config::home_dir;
use log::debug;
use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

const MEMINFO_PATH: &str = "/proc/meminfo";
/// Assumed RAM when `/proc/meminfo` is unreadable.
pub const FALLBACK_RAM_GB: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFacts {
    pub ram_gb: u64,
    pub free_disk_gb: Option<u64>,
}

impl HostFacts {
    pub fn new(ram_gb: u64, free_disk_gb: Option<u64>) -> Self {
        Self {
            ram_gb,
            free_disk_gb,
        }
    }

    /// Probe this machine: total RAM and free space under the home directory.
    pub fn detect() -> Self {
        let ram_gb = fs::read_to_string(MEMINFO_PATH)
            .ok()
            .and_then(|contents| parse_meminfo(&contents))
            .unwrap_or(FALLBACK_RAM_GB);
        let free_disk_gb = home_dir().and_then(|home| free_space_gb(&home));
        let facts = Self::new(ram_gb, free_disk_gb);
        debug!("host facts: {facts:?}");
        facts
    }
}

/// Total RAM in whole GiB from `/proc/meminfo` contents.
pub fn parse_meminfo(contents: &str) -> Option<u64> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / (1024 * 1024))
}

/// Free space available to unprivileged users on the filesystem holding `path`.
pub fn free_space_gb(path: &Path) -> Option<u64> {
    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    let bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
    Some(bytes / (1024 * 1024 * 1024))
}
