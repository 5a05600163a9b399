//! Service configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::history::{DEFAULT_MAX_TRACKED, DEFAULT_PROCESS_CAPACITY};
use crate::sampler::system::DEFAULT_SERIES_CAPACITY;

/// Configuration of a `Monitor`.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Path to the proc filesystem. Default: "/proc".
    pub proc_path: String,
    /// Mount point reported as host disk usage. Default: "/".
    pub disk_path: PathBuf,
    /// Durable behavior log written by the process sampler.
    pub log_path: PathBuf,
    /// Directory holding `categorizer.json`, `anomaly.json`, `lifetime.json`.
    pub model_dir: PathBuf,
    /// Default: 3 seconds.
    pub process_interval: Duration,
    /// Default: 2 seconds.
    pub system_interval: Duration,
    /// Cpu samples kept per process. Default: 60.
    pub history_capacity: usize,
    /// Length of each system series. Default: 300.
    pub series_capacity: usize,
    /// Pids tracked in per-process history at once. Default: 4096.
    pub max_tracked_pids: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            proc_path: "/proc".to_string(),
            disk_path: PathBuf::from("/"),
            log_path: PathBuf::from("logs/system_data_behavioral.csv"),
            model_dir: PathBuf::from("models"),
            process_interval: Duration::from_secs(3),
            system_interval: Duration::from_secs(2),
            history_capacity: DEFAULT_PROCESS_CAPACITY,
            series_capacity: DEFAULT_SERIES_CAPACITY,
            max_tracked_pids: DEFAULT_MAX_TRACKED,
        }
    }
}

impl MonitorConfig {
    pub fn with_proc_path(mut self, path: impl Into<String>) -> Self {
        self.proc_path = path.into();
        self
    }

    pub fn with_disk_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_path = path.into();
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    pub fn with_process_interval(mut self, interval: Duration) -> Self {
        self.process_interval = interval;
        self
    }

    pub fn with_system_interval(mut self, interval: Duration) -> Self {
        self.system_interval = interval;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_series_capacity(mut self, capacity: usize) -> Self {
        self.series_capacity = capacity;
        self
    }

    pub fn with_max_tracked_pids(mut self, max: usize) -> Self {
        self.max_tracked_pids = max;
        self
    }
}
