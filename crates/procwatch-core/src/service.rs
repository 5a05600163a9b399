//! The `Monitor` service object.
//!
//! Owns the scoring engines, both samplers and the shared histories, and
//! exposes the operations front-ends consume.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::collector::{CollectError, FileSystem, MetricSource, ProcessSnapshot, ProcfsSource};
use crate::config::MonitorConfig;
use crate::history::PerProcessHistory;
use crate::sampler::{BehaviorLog, Metric, ProcessSampler, SystemSampler, SystemSeries, SystemSnapshot};
use crate::scoring::{Category, EngineKind, Engines, Features, Score, ScoreResult, ScoringEngine};

/// Error returned by single-process lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No process with this pid.
    NotFound(u32),
    /// The process exists but may not be read by this user.
    AccessDenied(u32),
    /// The identifier is not a pid.
    InvalidPid(String),
    /// The host could not be read.
    Unavailable(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::NotFound(pid) => write!(f, "no such process: {}", pid),
            LookupError::AccessDenied(pid) => {
                write!(f, "access denied to process {}: elevated permissions required", pid)
            }
            LookupError::InvalidPid(raw) => write!(f, "invalid pid: {:?}", raw),
            LookupError::Unavailable(msg) => write!(f, "process data unavailable: {}", msg),
        }
    }
}

impl std::error::Error for LookupError {}

impl From<CollectError> for LookupError {
    fn from(e: CollectError) -> Self {
        match e {
            CollectError::ProcessGone(pid) => LookupError::NotFound(pid),
            CollectError::AccessDenied(pid) => LookupError::AccessDenied(pid),
            other => LookupError::Unavailable(other.to_string()),
        }
    }
}

/// Validates a pid received at the boundary.
pub fn parse_pid(raw: &str) -> Result<u32, LookupError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| LookupError::InvalidPid(raw.to_string()))
}

/// One row of the process list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredProcess {
    pub pid: u32,
    pub name: String,
    pub user: Option<String>,
    pub cpu: f64,
    pub memory: f64,
    pub threads: u32,
    pub category: Category,
    pub anomaly: u8,
}

/// Everything known about one process.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessDetail {
    pub snapshot: ProcessSnapshot,
    pub scores: ScoreResult,
    /// Recent cpu samples recorded by list requests, oldest first.
    pub history: Vec<f64>,
}

struct Workers {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

/// Process and system monitor.
///
/// Samplers run on their own threads between `start()` and `stop()`; every
/// other operation may be called concurrently from any number of threads.
pub struct Monitor<F: FileSystem> {
    fs: F,
    config: MonitorConfig,
    engines: RwLock<Arc<Engines>>,
    /// Request-time source. Samplers own separate instances so their cpu
    /// baselines stay independent.
    source: Mutex<ProcfsSource<F>>,
    histories: PerProcessHistory,
    series: Arc<RwLock<SystemSeries>>,
    workers: Mutex<Option<Workers>>,
}

impl<F: FileSystem + Clone + 'static> Monitor<F> {
    /// Creates a stopped monitor and loads the scoring engines.
    pub fn new(fs: F, config: MonitorConfig) -> Self {
        let engines = Engines::load(&config.model_dir);
        let source = Self::build_source(&fs, &config);
        Self {
            engines: RwLock::new(Arc::new(engines)),
            source: Mutex::new(source),
            histories: PerProcessHistory::new(config.history_capacity, config.max_tracked_pids),
            series: Arc::new(RwLock::new(SystemSeries::new(config.series_capacity))),
            workers: Mutex::new(None),
            fs,
            config,
        }
    }

    fn build_source(fs: &F, config: &MonitorConfig) -> ProcfsSource<F> {
        ProcfsSource::new(fs.clone(), config.proc_path.clone())
            .with_disk_path(config.disk_path.clone())
    }

    /// Starts both samplers. Does nothing if already running.
    ///
    /// A behavior log that cannot be opened disables the process sampler
    /// only; the system sampler still runs.
    pub fn start(&self) -> io::Result<()> {
        let mut workers = lock(&self.workers);
        if workers.is_some() {
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));

        let mut system_sampler = SystemSampler::new(
            Self::build_source(&self.fs, &self.config),
            Arc::clone(&self.series),
            self.config.system_interval,
        );
        let flag = Arc::clone(&running);
        let system_handle = thread::Builder::new()
            .name("system-sampler".to_string())
            .spawn(move || system_sampler.run(&flag))?;
        let mut handles = vec![system_handle];

        match BehaviorLog::open(&self.config.log_path) {
            Ok(log) => {
                let mut process_sampler = ProcessSampler::new(
                    Self::build_source(&self.fs, &self.config),
                    log,
                    self.config.process_interval,
                );
                let flag = Arc::clone(&running);
                let spawned = thread::Builder::new()
                    .name("process-sampler".to_string())
                    .spawn(move || process_sampler.run(&flag));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        for handle in handles {
                            let _ = handle.join();
                        }
                        return Err(e);
                    }
                }
            }
            Err(e) => error!(
                log = %self.config.log_path.display(),
                error = %e,
                "cannot open behavior log, process sampler disabled"
            ),
        }

        info!(
            log = %self.config.log_path.display(),
            proc = %self.config.proc_path,
            samplers = handles.len(),
            "monitor started"
        );
        *workers = Some(Workers { running, handles });
        Ok(())
    }

    /// Snapshots every visible process.
    ///
    /// Records each pid's cpu in the per-process history and forgets pids
    /// that are gone. Unreadable processes are left out.
    pub fn sample_all_processes(&self) -> Vec<ProcessSnapshot> {
        // Held until pruning is done: an older enumeration must not prune
        // pids a newer one has already recorded.
        let mut source = lock(&self.source);
        let results = match source.snapshot_all() {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "process enumeration failed");
                return Vec::new();
            }
        };

        let mut live = HashSet::with_capacity(results.len());
        let mut snapshots = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(snap) => {
                    live.insert(snap.pid);
                    self.histories.record(snap.pid, snap.cpu_pct);
                    snapshots.push(snap);
                }
                Err(skip) => {
                    live.insert(skip.pid);
                }
            }
        }

        let pruned = self.histories.retain_live(&live);
        drop(source);
        if pruned > 0 {
            debug!(pruned, "dropped history of exited processes");
        }
        snapshots
    }

    /// Snapshots one process.
    pub fn sample_one(&self, pid: u32) -> Result<ProcessSnapshot, LookupError> {
        Ok(lock(&self.source).process(pid)?)
    }

    /// Scored process list, busiest first.
    pub fn scored_processes(&self) -> Vec<ScoredProcess> {
        let engines = self.engines();
        let mut rows: Vec<ScoredProcess> = self
            .sample_all_processes()
            .into_iter()
            .map(|snap| {
                let features = Features::from(&snap);
                ScoredProcess {
                    category: engines.categorizer.evaluate(&features),
                    anomaly: engines.anomaly.evaluate(&features),
                    pid: snap.pid,
                    name: snap.name,
                    user: snap.user,
                    cpu: snap.cpu_pct,
                    memory: snap.mem_pct,
                    threads: snap.thread_count,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
        rows
    }

    /// Snapshot, all three scores and cpu history of one process.
    pub fn process_detail(&self, pid: u32) -> Result<ProcessDetail, LookupError> {
        let snapshot = self.sample_one(pid)?;
        let scores = self.score_all(&Features::from(&snapshot));
        Ok(ProcessDetail {
            snapshot,
            scores,
            history: self.history(pid),
        })
    }
}

impl<F: FileSystem> Monitor<F> {
    /// Stops both samplers and waits for them. Does nothing if not running.
    pub fn stop(&self) {
        let Some(workers) = lock(&self.workers).take() else {
            return;
        };

        workers.running.store(false, Ordering::SeqCst);
        for handle in workers.handles {
            let name = handle.thread().name().unwrap_or("sampler").to_string();
            if handle.join().is_err() {
                warn!(thread = %name, "sampler thread panicked");
            }
        }
        info!("monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.workers).is_some()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Latest host-wide sample, or all zeros before the first one.
    pub fn system_overview(&self) -> SystemSnapshot {
        self.series
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .overview()
    }

    /// One rolling system series, oldest first.
    pub fn system_series(&self, metric: Metric) -> Vec<f64> {
        self.series
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .series(metric)
    }

    /// Sample times of the system series, oldest first.
    pub fn system_timestamps(&self) -> Vec<DateTime<Utc>> {
        self.series
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .timestamps()
    }

    /// Recent cpu samples of `pid`, oldest first.
    pub fn history(&self, pid: u32) -> Vec<f64> {
        self.histories.history(pid)
    }

    /// The engines currently in use.
    pub fn engines(&self) -> Arc<Engines> {
        let engines = self.engines.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*engines)
    }

    pub fn score(&self, kind: EngineKind, features: &Features) -> Score {
        self.engines().evaluate(kind, features)
    }

    pub fn score_all(&self, features: &Features) -> ScoreResult {
        self.engines().score(features)
    }

    /// Reloads all engines from the model directory.
    ///
    /// Evaluations already in flight finish on the previous engines.
    pub fn reload_engines(&self) {
        let engines = Arc::new(Engines::load(&self.config.model_dir));
        *self.engines.write().unwrap_or_else(|e| e.into_inner()) = engines;
        info!(model_dir = %self.config.model_dir.display(), "scoring engines reloaded");
    }
}

impl<F: FileSystem> Drop for Monitor<F> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{MockFs, MockProcess};
    use crate::scoring::{ANOMALY_FILE, Mode};
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn monitor(fs: &MockFs, dir: &TempDir) -> Monitor<MockFs> {
        let config = MonitorConfig::default()
            .with_log_path(dir.path().join("logs/behavior.csv"))
            .with_model_dir(dir.path().join("models"))
            .with_process_interval(Duration::from_millis(50))
            .with_system_interval(Duration::from_millis(50));
        Monitor::new(fs.clone(), config)
    }

    fn python(utime: u64) -> MockProcess {
        MockProcess {
            pid: 1001,
            name: "python3",
            uid: 1000,
            utime,
            stime: 100,
            threads: 5,
            starttime: 200_000,
            rss_pages: 10_000,
            read_bytes: 200,
            write_bytes: 40,
            ctx_vol: 5,
            ctx_invol: 1,
        }
    }

    #[test]
    fn test_unknown_pid_is_not_found() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&MockFs::typical_desktop(), &dir);
        assert_eq!(monitor.sample_one(999_999), Err(LookupError::NotFound(999_999)));
        assert!(matches!(
            monitor.process_detail(999_999),
            Err(LookupError::NotFound(999_999))
        ));
    }

    #[test]
    fn test_denied_pid_is_access_denied() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&MockFs::with_restricted_processes(), &dir);
        assert_eq!(monitor.sample_one(2000), Err(LookupError::AccessDenied(2000)));
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid(" 1000 "), Ok(1000));
        assert!(matches!(parse_pid("-1"), Err(LookupError::InvalidPid(_))));
        assert!(matches!(parse_pid("chrome"), Err(LookupError::InvalidPid(_))));
        assert!(matches!(parse_pid(""), Err(LookupError::InvalidPid(_))));
    }

    #[test]
    fn test_sample_all_records_and_prunes_history() {
        let fs = MockFs::typical_desktop();
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&fs, &dir);

        assert_eq!(monitor.sample_all_processes().len(), 4);
        assert_eq!(monitor.sample_all_processes().len(), 4);
        assert_eq!(monitor.history(1001).len(), 2);

        fs.remove("/proc/1001");
        assert_eq!(monitor.sample_all_processes().len(), 3);
        assert!(monitor.history(1001).is_empty());
        assert_eq!(monitor.history(1000).len(), 3);
    }

    #[test]
    fn test_concurrent_listing_keeps_history_of_new_pids() {
        use std::collections::HashMap;

        let fs = MockFs::typical_desktop();
        let dir = TempDir::new().unwrap();
        let config = MonitorConfig::default()
            .with_log_path(dir.path().join("logs/behavior.csv"))
            .with_model_dir(dir.path().join("models"))
            .with_history_capacity(100_000);
        let monitor = Arc::new(Monitor::new(fs.clone(), config));
        let spawning = Arc::new(AtomicBool::new(true));

        let listers: Vec<_> = (0..4)
            .map(|_| {
                let monitor = Arc::clone(&monitor);
                let spawning = Arc::clone(&spawning);
                std::thread::spawn(move || {
                    let mut seen: HashMap<u32, usize> = HashMap::new();
                    while spawning.load(Ordering::SeqCst) {
                        for snap in monitor.sample_all_processes() {
                            *seen.entry(snap.pid).or_default() += 1;
                        }
                    }
                    seen
                })
            })
            .collect();

        for pid in 5000..5100 {
            fs.put_process(&MockProcess { pid, ..python(1_200) });
        }
        std::thread::sleep(Duration::from_millis(20));
        spawning.store(false, Ordering::SeqCst);

        let mut seen: HashMap<u32, usize> = HashMap::new();
        for lister in listers {
            for (pid, n) in lister.join().unwrap() {
                *seen.entry(pid).or_default() += n;
            }
        }
        for pid in 5000..5100 {
            let returned = seen.get(&pid).copied().unwrap_or(0);
            assert_eq!(monitor.history(pid).len(), returned, "pid {}", pid);
        }
    }

    #[test]
    fn test_unwritable_log_still_samples_system() {
        let fs = MockFs::typical_desktop();
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let config = MonitorConfig::default()
            .with_log_path(blocker.join("behavior.csv"))
            .with_model_dir(dir.path().join("models"))
            .with_system_interval(Duration::from_millis(50));
        let monitor = Monitor::new(fs, config);

        monitor.start().unwrap();
        assert!(monitor.is_running());
        std::thread::sleep(Duration::from_millis(200));
        monitor.stop();

        assert_eq!(monitor.system_overview().process_count, 4);
        assert!(!monitor.system_timestamps().is_empty());
        assert!(!blocker.join("behavior.csv").exists());
    }

    #[test]
    fn test_skipped_process_keeps_history() {
        let fs = MockFs::typical_desktop();
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&fs, &dir);
        monitor.sample_all_processes();

        fs.deny("/proc/1001/stat");
        assert_eq!(monitor.sample_all_processes().len(), 3);
        assert_eq!(monitor.history(1001).len(), 1);
    }

    #[test]
    fn test_scored_processes_sorted_by_cpu() {
        let fs = MockFs::typical_desktop();
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&fs, &dir);
        monitor.sample_all_processes();

        std::thread::sleep(Duration::from_millis(50));
        fs.put_process(&python(1_250));

        let rows = monitor.scored_processes();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].pid, 1001);
        assert_eq!(rows[0].category, Category::Script);
        assert!(rows[0].cpu > 0.0);
        assert!(rows.windows(2).all(|w| w[0].cpu >= w[1].cpu));

        let chrome = rows.iter().find(|r| r.pid == 1000).unwrap();
        assert_eq!(chrome.category, Category::Browser);
        assert_eq!(chrome.memory, 1.22);
    }

    #[test]
    fn test_process_detail() {
        let fs = MockFs::typical_desktop();
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&fs, &dir);
        monitor.scored_processes();

        let detail = monitor.process_detail(1002).unwrap();
        assert_eq!(detail.snapshot.name, "mysqld");
        assert_eq!(detail.scores.category, Category::Database);
        assert!(detail.scores.anomaly_score <= 100);
        assert!(detail.scores.lifetime_seconds >= 60);
        assert_eq!(detail.history, vec![0.0]);
    }

    #[test]
    fn test_score_operations() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&MockFs::typical_desktop(), &dir);
        let features = Features {
            name: "chrome.exe".to_string(),
            cpu: 5.0,
            memory: 1.2,
            threads: 30.0,
            io_read: 1000.0,
            io_write: 500.0,
            uptime: 300.0,
            ..Features::default()
        };

        assert_eq!(
            monitor.score(EngineKind::Categorizer, &features),
            Score::Category(Category::Browser)
        );
        assert_eq!(monitor.score(EngineKind::Anomaly, &features), Score::Anomaly(9));
        assert_eq!(
            monitor.score_all(&features),
            ScoreResult {
                category: Category::Browser,
                anomaly_score: 9,
                lifetime_seconds: 773,
            }
        );
    }

    #[test]
    fn test_reload_engines_picks_up_new_model() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&MockFs::typical_desktop(), &dir);
        let before = monitor.engines();
        assert_eq!(before.mode(EngineKind::Anomaly), Mode::Heuristic);

        let models = dir.path().join("models");
        std::fs::create_dir_all(&models).unwrap();
        std::fs::write(
            models.join(ANOMALY_FILE),
            json!([
                {"kind": "linear", "coefficients": [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], "intercept": 0.0},
                null, 0.0, 0.08
            ])
            .to_string(),
        )
        .unwrap();

        monitor.reload_engines();
        assert_eq!(monitor.engines().mode(EngineKind::Anomaly), Mode::ModelBacked);
        // an evaluation holding the old engines is unaffected
        assert_eq!(before.mode(EngineKind::Anomaly), Mode::Heuristic);
        assert_eq!(
            monitor.score(EngineKind::Anomaly, &Features::default()),
            Score::Anomaly(50)
        );
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let fs = MockFs::typical_desktop();
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&fs, &dir);

        assert_eq!(monitor.system_overview(), SystemSnapshot::default());
        assert!(!monitor.is_running());

        monitor.start().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_running());

        std::thread::sleep(Duration::from_millis(300));
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());

        let overview = monitor.system_overview();
        assert_eq!(overview.process_count, 4);
        assert_eq!(overview.mem_pct, 25.0);
        assert!(monitor.system_series(Metric::Cpu).len() >= 2);

        let log = std::fs::read_to_string(dir.path().join("logs/behavior.csv")).unwrap();
        assert!(log.lines().count() >= 5);
    }

    #[test]
    fn test_drop_stops_samplers() {
        let dir = TempDir::new().unwrap();
        let monitor = monitor(&MockFs::typical_desktop(), &dir);
        monitor.start().unwrap();
        drop(monitor);
    }
}
