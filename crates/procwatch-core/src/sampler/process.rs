//! Process sampler and its durable behavior log.

use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, error, info, trace};

use super::sleep_while_running;
use crate::collector::{CollectError, MetricSource, ProcessSnapshot};

/// First line of every behavior log.
pub const LOG_HEADER: &str = "timestamp,pid,name,user,cpu,memory,threads,io_read_bytes,io_write_bytes,ctx_vol,ctx_invol,create_time";

/// Append-only CSV log with one row per sampled process.
#[derive(Debug, Clone)]
pub struct BehaviorLog {
    path: PathBuf,
}

impl BehaviorLog {
    /// Opens (or creates) the log at `path`, creating parent directories and
    /// stamping the header if the file is absent or empty.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let log = Self { path: path.into() };
        if let Some(parent) = log.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        log.ensure_header()?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_header(&self) -> io::Result<()> {
        let empty = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(e),
        };
        if empty {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            file.write_all(format!("{}\n", LOG_HEADER).as_bytes())?;
        }
        Ok(())
    }

    /// Appends one row per snapshot, all stamped with `at`, in a single write.
    pub fn append(&self, at: DateTime<Utc>, rows: &[ProcessSnapshot]) -> io::Result<()> {
        self.ensure_header()?;
        if rows.is_empty() {
            return Ok(());
        }

        let timestamp = at.to_rfc3339_opts(SecondsFormat::Micros, true);
        let mut buf = String::with_capacity(rows.len() * 96);
        for snap in rows {
            render_row(&mut buf, &timestamp, snap);
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(buf.as_bytes())
    }
}

fn render_row(buf: &mut String, timestamp: &str, snap: &ProcessSnapshot) {
    use std::fmt::Write as _;

    let create_time = snap.start_time.timestamp_millis() as f64 / 1000.0;
    let _ = writeln!(
        buf,
        "{},{},{},{},{:.1},{:.2},{},{},{},{},{},{:.2}",
        timestamp,
        snap.pid,
        csv_field(&snap.name),
        csv_field(snap.user.as_deref().unwrap_or("")),
        snap.cpu_pct,
        snap.mem_pct,
        snap.thread_count,
        snap.io_read_bytes,
        snap.io_write_bytes,
        snap.ctx_voluntary,
        snap.ctx_involuntary,
        create_time,
    );
}

fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// Outcome of one successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub rows: usize,
    pub skipped: usize,
}

/// A tick that produced no log rows.
#[derive(Debug)]
pub enum TickError {
    /// The process list could not be read.
    Collect(CollectError),
    /// The log append failed; the rows of this tick are lost.
    Log(io::Error),
}

impl std::fmt::Display for TickError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickError::Collect(e) => write!(f, "enumeration failed: {}", e),
            TickError::Log(e) => write!(f, "log append failed: {}", e),
        }
    }
}

impl std::error::Error for TickError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TickError::Collect(e) => Some(e),
            TickError::Log(e) => Some(e),
        }
    }
}

/// Snapshots every visible process on a fixed interval into a `BehaviorLog`.
pub struct ProcessSampler<S: MetricSource> {
    source: S,
    log: BehaviorLog,
    interval: Duration,
}

impl<S: MetricSource> ProcessSampler<S> {
    pub fn new(source: S, log: BehaviorLog, interval: Duration) -> Self {
        Self {
            source,
            log,
            interval,
        }
    }

    /// Enumerates once and appends the rows. Vanished or denied processes are
    /// counted as skipped.
    pub fn tick(&mut self) -> Result<TickReport, TickError> {
        let results = self.source.snapshot_all().map_err(TickError::Collect)?;

        let mut rows = Vec::with_capacity(results.len());
        let mut skipped = 0;
        for result in results {
            match result {
                Ok(snap) => rows.push(snap),
                Err(skip) => {
                    trace!(pid = skip.pid, reason = ?skip.reason, "process skipped");
                    skipped += 1;
                }
            }
        }

        self.log.append(Utc::now(), &rows).map_err(TickError::Log)?;
        Ok(TickReport {
            rows: rows.len(),
            skipped,
        })
    }

    /// Ticks until `running` is cleared. Failed ticks are logged and the loop
    /// continues.
    pub fn run(&mut self, running: &AtomicBool) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            log = %self.log.path().display(),
            "process sampler started"
        );

        while running.load(Ordering::SeqCst) {
            let t0 = Instant::now();
            match self.tick() {
                Ok(report) => debug!(
                    rows = report.rows,
                    skipped = report.skipped,
                    duration_ms = t0.elapsed().as_millis() as u64,
                    "process tick completed"
                ),
                Err(e) => error!(error = %e, "process tick failed"),
            }
            sleep_while_running(self.interval, running);
        }

        info!("process sampler stopped");
    }
}
