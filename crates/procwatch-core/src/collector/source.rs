//! Point-in-time process and host metrics.
//!
//! `MetricSource` is the capability the samplers and the service depend on;
//! `ProcfsSource` implements it on top of `/proc` through a `FileSystem`.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::collector::procfs::parser::{
    parse_global_stat, parse_meminfo, parse_net_dev, parse_proc_io, parse_proc_stat,
    parse_proc_status,
};
use crate::collector::procfs::{ParseError, UserResolver};
use crate::collector::traits::{DiskUsage, FileSystem};

/// Clock ticks per second (USER_HZ). Standard value for Linux.
const CLK_TCK: u64 = 100;

/// Pids with a cpu baseline at once (the default `pid_max`).
const MAX_CPU_BASELINES: usize = 32_768;

/// Error type for collection failures.
#[derive(Debug)]
pub enum CollectError {
    /// Process does not exist (or exited mid-read).
    ProcessGone(u32),
    /// The current user may not read this process.
    AccessDenied(u32),
    /// I/O error reading host-wide files.
    Io(io::Error),
    /// Malformed `/proc` content.
    Parse(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ProcessGone(pid) => write!(f, "process {} not found", pid),
            CollectError::AccessDenied(pid) => write!(f, "access denied to process {}", pid),
            CollectError::Io(e) => write!(f, "I/O error: {}", e),
            CollectError::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

impl From<io::Error> for CollectError {
    fn from(e: io::Error) -> Self {
        CollectError::Io(e)
    }
}

impl From<ParseError> for CollectError {
    fn from(e: ParseError) -> Self {
        CollectError::Parse(e.message)
    }
}

impl CollectError {
    /// Classifies an error reading `/proc/[pid]/*`.
    fn from_process_io(pid: u32, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => CollectError::ProcessGone(pid),
            io::ErrorKind::PermissionDenied => CollectError::AccessDenied(pid),
            _ if e.raw_os_error() == Some(libc::ESRCH) => CollectError::ProcessGone(pid),
            _ => CollectError::Io(e),
        }
    }
}

/// Why a process was left out of a bulk enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Gone,
    AccessDenied,
    Unreadable(String),
}

/// A process skipped during enumeration. Never surfaced to callers as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub pid: u32,
    pub reason: SkipReason,
}

impl Skip {
    pub fn from_error(pid: u32, error: CollectError) -> Self {
        let reason = match error {
            CollectError::ProcessGone(_) => SkipReason::Gone,
            CollectError::AccessDenied(_) => SkipReason::AccessDenied,
            other => SkipReason::Unreadable(other.to_string()),
        };
        Self { pid, reason }
    }
}

/// Point-in-time metrics of one process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub name: String,
    pub user: Option<String>,
    /// CPU utilization since this source last read the pid (may exceed 100 on SMP).
    pub cpu_pct: f64,
    /// Resident memory as a share of physical memory, rounded to 2 decimals.
    pub mem_pct: f64,
    pub thread_count: u32,
    pub io_read_bytes: u64,
    pub io_write_bytes: u64,
    pub ctx_voluntary: u64,
    pub ctx_involuntary: u64,
    pub start_time: DateTime<Utc>,
    pub uptime_seconds: u64,
}

/// Cumulative host-wide counters; rates are derived by the system sampler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCounters {
    pub cpu_busy_ticks: u64,
    pub cpu_total_ticks: u64,
    pub mem_total_kb: u64,
    pub mem_available_kb: u64,
    /// `None` when the mount could not be inspected.
    pub disk: Option<DiskUsage>,
    pub net_sent_bytes: u64,
    pub net_recv_bytes: u64,
    pub process_count: u64,
}

impl HostCounters {
    pub fn mem_used_percent(&self) -> f64 {
        if self.mem_total_kb == 0 {
            return 0.0;
        }
        let used = self.mem_total_kb.saturating_sub(self.mem_available_kb);
        used as f64 / self.mem_total_kb as f64 * 100.0
    }
}

/// Source of process and host snapshots.
///
/// Per-item failures are returned, never panicked on; `snapshot_all` turns
/// them into `Skip` values the caller filters out.
pub trait MetricSource: Send {
    /// Lists pids currently visible to this user.
    fn list_pids(&mut self) -> Result<Vec<u32>, CollectError>;

    /// Reads one process.
    fn process(&mut self, pid: u32) -> Result<ProcessSnapshot, CollectError>;

    /// Reads host-wide cumulative counters.
    fn host(&mut self) -> Result<HostCounters, CollectError>;

    /// Reads every visible process.
    ///
    /// Fails only when the process list itself cannot be read.
    fn snapshot_all(&mut self) -> Result<Vec<Result<ProcessSnapshot, Skip>>, CollectError> {
        let pids = self.list_pids()?;
        Ok(pids
            .into_iter()
            .map(|pid| self.process(pid).map_err(|e| Skip::from_error(pid, e)))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
struct CpuBaseline {
    ticks: u64,
    at: Instant,
}

/// `MetricSource` backed by the Linux `/proc` filesystem.
///
/// CPU percentages are deltas against the previous read of the same pid by
/// this instance, so each consumer (sampler thread, request path) should own
/// its own source.
pub struct ProcfsSource<F: FileSystem> {
    fs: F,
    proc_path: String,
    disk_path: PathBuf,
    page_size: u64,
    users: UserResolver,
    boot_time: Option<u64>,
    cpu_baselines: HashMap<u32, CpuBaseline>,
    max_baselines: usize,
}

impl<F: FileSystem> ProcfsSource<F> {
    /// Creates a new source.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        let mut users = UserResolver::new();
        if let Ok(passwd) = fs.read_to_string(Path::new("/etc/passwd")) {
            users.load_from_content(&passwd);
        }

        Self {
            page_size: fs.page_size(),
            fs,
            proc_path: proc_path.into(),
            disk_path: PathBuf::from("/"),
            users,
            boot_time: None,
            cpu_baselines: HashMap::new(),
            max_baselines: MAX_CPU_BASELINES,
        }
    }

    /// Sets the mount point whose usage is reported as host disk usage.
    pub fn with_disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = path.into();
        self
    }

    fn read_proc_file(&self, rel: &str) -> io::Result<String> {
        let path = format!("{}/{}", self.proc_path, rel);
        self.fs.read_to_string(Path::new(&path))
    }

    fn boot_time(&mut self) -> Result<u64, CollectError> {
        if let Some(btime) = self.boot_time {
            return Ok(btime);
        }
        let stat = parse_global_stat(&self.read_proc_file("stat")?)?;
        self.boot_time = Some(stat.btime);
        Ok(stat.btime)
    }

    fn mem_total_kb(&self) -> Result<u64, CollectError> {
        Ok(parse_meminfo(&self.read_proc_file("meminfo")?)?.mem_total)
    }

    fn cpu_percent(&mut self, pid: u32, ticks: u64) -> f64 {
        let now = Instant::now();
        let pct = match self.cpu_baselines.get(&pid) {
            // A regression means the pid was reused; start over.
            Some(prev) if ticks >= prev.ticks => {
                let dt = now.duration_since(prev.at).as_secs_f64();
                if dt > 0.0 {
                    (ticks - prev.ticks) as f64 / CLK_TCK as f64 / dt * 100.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        // Single-pid lookups never prune; evict the stalest baseline instead.
        if self.cpu_baselines.len() >= self.max_baselines
            && !self.cpu_baselines.contains_key(&pid)
            && let Some(stalest) = self
                .cpu_baselines
                .iter()
                .min_by_key(|(_, b)| b.at)
                .map(|(pid, _)| *pid)
        {
            self.cpu_baselines.remove(&stalest);
        }
        self.cpu_baselines
            .insert(pid, CpuBaseline { ticks, at: now });
        pct
    }

    fn read_process(&mut self, pid: u32, mem_total_kb: u64) -> Result<ProcessSnapshot, CollectError> {
        let read = |src: &Self, file: &str| {
            src.read_proc_file(&format!("{}/{}", pid, file))
                .map_err(|e| CollectError::from_process_io(pid, e))
        };

        let stat = parse_proc_stat(&read(self, "stat")?)?;
        let status = parse_proc_status(&read(self, "status")?)?;

        // io is root-only for foreign processes; treat unreadable as zero.
        let io = read(self, "io")
            .map(|content| parse_proc_io(&content))
            .unwrap_or_default();

        let name = read(self, "comm")
            .map(|c| c.trim().to_string())
            .ok()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| stat.comm.clone());

        let btime = self.boot_time()?;
        let start_ms = btime * 1000 + stat.starttime * 1000 / CLK_TCK;
        let start_time =
            DateTime::from_timestamp_millis(start_ms as i64).unwrap_or(DateTime::UNIX_EPOCH);
        let uptime_seconds = (Utc::now() - start_time).num_seconds().max(0) as u64;

        let rss_bytes = stat.rss * self.page_size;
        let mem_pct = if mem_total_kb > 0 {
            round2(rss_bytes as f64 / (mem_total_kb * 1024) as f64 * 100.0)
        } else {
            0.0
        };

        let cpu_pct = self.cpu_percent(pid, stat.utime + stat.stime);

        Ok(ProcessSnapshot {
            pid,
            name,
            user: self.users.resolve(status.uid).map(str::to_string),
            cpu_pct,
            mem_pct,
            thread_count: stat.num_threads,
            io_read_bytes: io.read_bytes,
            io_write_bytes: io.write_bytes,
            ctx_voluntary: status.voluntary_ctxt_switches,
            ctx_involuntary: status.nonvoluntary_ctxt_switches,
            start_time,
            uptime_seconds,
        })
    }
}

impl<F: FileSystem> MetricSource for ProcfsSource<F> {
    fn list_pids(&mut self) -> Result<Vec<u32>, CollectError> {
        let entries = self.fs.read_dir(Path::new(&self.proc_path))?;
        let mut pids: Vec<u32> = entries
            .iter()
            .filter_map(|entry| entry.file_name()?.to_str()?.parse().ok())
            .collect();
        pids.sort_unstable();
        Ok(pids)
    }

    fn process(&mut self, pid: u32) -> Result<ProcessSnapshot, CollectError> {
        let mem_total_kb = self.mem_total_kb()?;
        let result = self.read_process(pid, mem_total_kb);
        if matches!(result, Err(CollectError::ProcessGone(_))) {
            self.cpu_baselines.remove(&pid);
        }
        result
    }

    fn host(&mut self) -> Result<HostCounters, CollectError> {
        let stat = parse_global_stat(&self.read_proc_file("stat")?)?;
        self.boot_time = Some(stat.btime);

        let mem = parse_meminfo(&self.read_proc_file("meminfo")?)?;
        let net = self
            .read_proc_file("net/dev")
            .map(|content| parse_net_dev(&content))
            .unwrap_or_default();
        let disk = self.fs.disk_usage(&self.disk_path).ok();
        let process_count = self.list_pids()?.len() as u64;

        Ok(HostCounters {
            cpu_busy_ticks: stat.cpu_busy,
            cpu_total_ticks: stat.cpu_total,
            mem_total_kb: mem.mem_total,
            mem_available_kb: mem.mem_available,
            disk,
            net_sent_bytes: net.tx_bytes,
            net_recv_bytes: net.rx_bytes,
            process_count,
        })
    }

    fn snapshot_all(&mut self) -> Result<Vec<Result<ProcessSnapshot, Skip>>, CollectError> {
        let pids = self.list_pids()?;
        let mem_total_kb = self.mem_total_kb()?;

        let live: HashSet<u32> = pids.iter().copied().collect();
        self.cpu_baselines.retain(|pid, _| live.contains(pid));

        Ok(pids
            .into_iter()
            .map(|pid| {
                self.read_process(pid, mem_total_kb)
                    .map_err(|e| Skip::from_error(pid, e))
            })
            .collect())
    }
}

/// Rounds to two decimal places.
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
