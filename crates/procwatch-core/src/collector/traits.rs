//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait allows the metric source to work with both the real
//! `/proc` filesystem on Linux and the in-memory `MockFs` in tests.

use std::io;
use std::path::{Path, PathBuf};

/// Space accounting for one mounted filesystem, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    /// Space available to unprivileged users.
    pub available: u64,
}

impl DiskUsage {
    /// Used percentage as reported by `df`: `used / (used + available)`.
    pub fn used_percent(&self) -> f64 {
        let denom = self.used + self.available;
        if denom == 0 {
            return 0.0;
        }
        self.used as f64 / denom as f64 * 100.0
    }
}

/// Abstraction for filesystem operations.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns space usage of the filesystem mounted at `path`.
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage>;

    /// Size of a memory page in bytes, the unit of `rss` in `/proc/[pid]/stat`.
    fn page_size(&self) -> u64;
}

/// Page size assumed when the host does not report one.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Real filesystem implementation that delegates to `std::fs` and `statvfs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    #[cfg(unix)]
    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        // SAFETY: `stat` is a plain C struct that statvfs fully initializes on
        // success, and `c_path` is a valid NUL-terminated string.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        let block_size = stat.f_frsize as u64;
        let total = stat.f_blocks as u64 * block_size;
        let free = stat.f_bfree as u64 * block_size;
        let available = stat.f_bavail as u64 * block_size;

        Ok(DiskUsage {
            total,
            used: total.saturating_sub(free),
            available,
        })
    }

    #[cfg(not(unix))]
    fn disk_usage(&self, _path: &Path) -> io::Result<DiskUsage> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "disk usage requires statvfs",
        ))
    }

    #[cfg(unix)]
    fn page_size(&self) -> u64 {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as u64
        } else {
            DEFAULT_PAGE_SIZE
        }
    }

    #[cfg(not(unix))]
    fn page_size(&self) -> u64 {
        DEFAULT_PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_real_fs_read_to_string() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        let content = fs.read_to_string(&cargo_toml).unwrap();
        assert!(content.contains("[package]"));
    }

    #[test]
    fn test_real_fs_exists() {
        let fs = RealFs::new();
        let cargo_toml = env::current_dir().unwrap().join("Cargo.toml");
        assert!(fs.exists(&cargo_toml));
        assert!(!fs.exists(Path::new("/nonexistent/path/12345")));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_fs_disk_usage() {
        let fs = RealFs::new();
        let usage = fs.disk_usage(Path::new("/")).unwrap();
        assert!(usage.total >= usage.used);
        let pct = usage.used_percent();
        assert!((0.0..=100.0).contains(&pct));
    }

    #[test]
    fn test_real_fs_page_size() {
        let size = RealFs::new().page_size();
        assert!(size >= 4096);
        assert!(size.is_power_of_two());
    }

    #[test]
    fn test_used_percent_matches_df() {
        let usage = DiskUsage {
            total: 1000,
            used: 300,
            available: 600,
        };
        // reserved blocks (100) are excluded from the denominator
        assert!((usage.used_percent() - 33.333).abs() < 0.01);
        assert_eq!(DiskUsage::default().used_percent(), 0.0);
    }
}
