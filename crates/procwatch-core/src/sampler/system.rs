//! Host-wide load sampler with in-memory rolling series.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::sleep_while_running;
use crate::collector::source::round2;
use crate::collector::{CollectError, HostCounters, MetricSource};
use crate::history::RollingHistory;

/// Default length of each system series.
pub const DEFAULT_SERIES_CAPACITY: usize = 300;

/// One host-wide sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_pct: f64,
    pub mem_pct: f64,
    pub disk_pct: f64,
    pub net_sent_delta_bytes: u64,
    pub net_recv_delta_bytes: u64,
    pub process_count: u64,
}

/// A chartable system series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
    NetSent,
    NetRecv,
}

/// Rolling series written by `SystemSampler` and read by the service.
#[derive(Debug, Clone)]
pub struct SystemSeries {
    timestamps: RollingHistory<DateTime<Utc>>,
    cpu: RollingHistory<f64>,
    mem: RollingHistory<f64>,
    disk: RollingHistory<f64>,
    net_sent: RollingHistory<f64>,
    net_recv: RollingHistory<f64>,
    latest: Option<SystemSnapshot>,
}

impl Default for SystemSeries {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}

impl SystemSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            timestamps: RollingHistory::with_capacity(capacity),
            cpu: RollingHistory::with_capacity(capacity),
            mem: RollingHistory::with_capacity(capacity),
            disk: RollingHistory::with_capacity(capacity),
            net_sent: RollingHistory::with_capacity(capacity),
            net_recv: RollingHistory::with_capacity(capacity),
            latest: None,
        }
    }

    pub fn push(&mut self, snap: SystemSnapshot) {
        self.timestamps.push(snap.timestamp);
        self.cpu.push(snap.cpu_pct);
        self.mem.push(snap.mem_pct);
        self.disk.push(snap.disk_pct);
        self.net_sent.push(snap.net_sent_delta_bytes as f64);
        self.net_recv.push(snap.net_recv_delta_bytes as f64);
        self.latest = Some(snap);
    }

    /// Latest sample with percentages rounded to 2 decimals, or the all-zero
    /// default before the first sample.
    pub fn overview(&self) -> SystemSnapshot {
        match self.latest {
            Some(snap) => SystemSnapshot {
                cpu_pct: round2(snap.cpu_pct),
                mem_pct: round2(snap.mem_pct),
                disk_pct: round2(snap.disk_pct),
                ..snap
            },
            None => SystemSnapshot::default(),
        }
    }

    pub fn series(&self, metric: Metric) -> Vec<f64> {
        match metric {
            Metric::Cpu => self.cpu.to_vec(),
            Metric::Memory => self.mem.to_vec(),
            Metric::Disk => self.disk.to_vec(),
            Metric::NetSent => self.net_sent.to_vec(),
            Metric::NetRecv => self.net_recv.to_vec(),
        }
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.timestamps.to_vec()
    }
}

/// Samples host-wide load on a fixed interval.
///
/// Previous cumulative counters are private to the sampler; readers only
/// see the shared `SystemSeries`.
pub struct SystemSampler<S: MetricSource> {
    source: S,
    series: Arc<RwLock<SystemSeries>>,
    interval: Duration,
    prev: Option<HostCounters>,
}

impl<S: MetricSource> SystemSampler<S> {
    pub fn new(source: S, series: Arc<RwLock<SystemSeries>>, interval: Duration) -> Self {
        Self {
            source,
            series,
            interval,
            prev: None,
        }
    }

    /// Takes one sample and pushes it into the series.
    pub fn sample(&mut self) -> Result<SystemSnapshot, CollectError> {
        let host = self.source.host()?;

        let (cpu_pct, net_sent, net_recv) = match self.prev {
            Some(prev) => {
                let busy = host.cpu_busy_ticks.saturating_sub(prev.cpu_busy_ticks);
                let total = host.cpu_total_ticks.saturating_sub(prev.cpu_total_ticks);
                let cpu = if total > 0 {
                    busy as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                (
                    cpu,
                    host.net_sent_bytes.saturating_sub(prev.net_sent_bytes),
                    host.net_recv_bytes.saturating_sub(prev.net_recv_bytes),
                )
            }
            None => (0.0, 0, 0),
        };
        self.prev = Some(host);

        let snap = SystemSnapshot {
            timestamp: Utc::now(),
            cpu_pct: cpu_pct.min(100.0),
            mem_pct: host.mem_used_percent(),
            disk_pct: host.disk.map(|d| d.used_percent()).unwrap_or(0.0),
            net_sent_delta_bytes: net_sent,
            net_recv_delta_bytes: net_recv,
            process_count: host.process_count,
        };

        self.series
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(snap);
        Ok(snap)
    }

    /// Samples until `running` is cleared. A failed host read skips the tick.
    pub fn run(&mut self, running: &AtomicBool) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "system sampler started"
        );

        while running.load(Ordering::SeqCst) {
            match self.sample() {
                Ok(snap) => debug!(
                    cpu = snap.cpu_pct,
                    mem = snap.mem_pct,
                    procs = snap.process_count,
                    "system tick completed"
                ),
                Err(e) => warn!(error = %e, "system tick skipped"),
            }
            sleep_while_running(self.interval, running);
        }

        info!("system sampler stopped");
    }
}
