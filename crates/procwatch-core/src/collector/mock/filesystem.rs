//! In-memory mock filesystem.
//!
//! `MockFs` simulates `/proc` in memory so collectors can be tested on any
//! platform. Clones share the same backing store, which lets a test keep a
//! handle and mutate the "host" (spawn or kill processes, reset counters)
//! while a sampler owns another clone.

use crate::collector::traits::{DEFAULT_PAGE_SIZE, DiskUsage, FileSystem};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<PathBuf, String>,
    directories: HashSet<PathBuf>,
    /// Paths that exist but fail with `PermissionDenied` on read.
    denied: HashSet<PathBuf>,
    disks: HashMap<PathBuf, DiskUsage>,
    /// 0 means `DEFAULT_PAGE_SIZE`.
    page_size: u64,
}

impl Inner {
    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }
}

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    inner: Arc<RwLock<Inner>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds (or replaces) a file. Parent directories are created.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        let mut inner = self.write();
        inner.add_parents(&path);
        inner.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut inner = self.write();
        inner.add_parents(&path);
        inner.directories.insert(path);
    }

    /// Removes a file or a whole directory subtree.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut inner = self.write();
        inner.files.retain(|p, _| !p.starts_with(path));
        inner.directories.retain(|p| !p.starts_with(path));
        inner.denied.retain(|p| !p.starts_with(path));
    }

    /// Makes reads of `path` fail with `PermissionDenied`.
    pub fn deny(&self, path: impl AsRef<Path>) {
        self.write().denied.insert(path.as_ref().to_path_buf());
    }

    /// Sets the usage reported for the filesystem mounted at `path`.
    pub fn set_disk_usage(&self, path: impl AsRef<Path>, usage: DiskUsage) {
        self.write().disks.insert(path.as_ref().to_path_buf(), usage);
    }

    /// Sets the page size reported to the metric source.
    pub fn set_page_size(&self, bytes: u64) {
        self.write().page_size = bytes;
    }

    /// Adds a process with its `/proc/[pid]/` files.
    ///
    /// `io` may be empty to simulate an unreadable `/proc/[pid]/io`.
    pub fn add_process(&self, pid: u32, stat: &str, status: &str, io: &str, comm: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&base);
        self.add_file(base.join("stat"), stat);
        self.add_file(base.join("status"), status);
        if !io.is_empty() {
            self.add_file(base.join("io"), io);
        }
        self.add_file(base.join("comm"), comm);
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let inner = self.read();
        if inner.denied.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {:?}", path),
            ));
        }
        inner.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        let inner = self.read();
        inner.files.contains_key(path) || inner.directories.contains(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let inner = self.read();
        if !inner.directories.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let children = inner
            .files
            .keys()
            .chain(inner.directories.iter())
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect::<HashSet<_>>();

        Ok(children.into_iter().collect())
    }

    fn disk_usage(&self, path: &Path) -> io::Result<DiskUsage> {
        self.read().disks.get(path).copied().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no filesystem mounted at {:?}", path),
            )
        })
    }

    fn page_size(&self) -> u64 {
        match self.read().page_size {
            0 => DEFAULT_PAGE_SIZE,
            size => size,
        }
    }
}
