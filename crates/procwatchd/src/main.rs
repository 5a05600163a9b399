//! procwatchd - process sampling and scoring daemon.
//!
//! Runs the process and system samplers, appends the behavior log and
//! periodically reports the host overview and the busiest scored processes.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_os = "linux"))]
use procwatch_core::collector::MockFs;
#[cfg(target_os = "linux")]
use procwatch_core::collector::RealFs;
use procwatch_core::collector::FileSystem;
use procwatch_core::scoring::EngineKind;
use procwatch_core::{Monitor, MonitorConfig};

/// Process sampling and scoring daemon.
#[derive(Parser, Debug)]
#[command(
    name = "procwatchd",
    about = "Process sampling and scoring daemon",
    version = procwatch_core::VERSION
)]
struct Args {
    /// Path to /proc filesystem.
    #[arg(long, default_value = "/proc", env = "PROCWATCH_PROC_PATH")]
    proc_path: String,

    /// Mount point reported as host disk usage.
    #[arg(long, default_value = "/", env = "PROCWATCH_DISK_PATH")]
    disk_path: PathBuf,

    /// Behavior log written by the process sampler.
    #[arg(
        long,
        default_value = "logs/system_data_behavioral.csv",
        env = "PROCWATCH_LOG_PATH"
    )]
    log_path: PathBuf,

    /// Directory holding categorizer.json, anomaly.json and lifetime.json.
    #[arg(long, default_value = "models", env = "PROCWATCH_MODEL_DIR")]
    model_dir: PathBuf,

    /// Process sampling interval in seconds.
    #[arg(long, default_value = "3", env = "PROCWATCH_PROCESS_INTERVAL")]
    process_interval: u64,

    /// System sampling interval in seconds.
    #[arg(long, default_value = "2", env = "PROCWATCH_SYSTEM_INTERVAL")]
    system_interval: u64,

    /// Report interval in seconds.
    #[arg(short, long, default_value = "10", env = "PROCWATCH_REPORT_INTERVAL")]
    report_interval: u64,

    /// Number of processes listed in each report.
    #[arg(short, long, default_value = "5", env = "PROCWATCH_TOP")]
    top: usize,

    /// Reload model artifacts every N seconds. Disabled by default.
    #[arg(long, value_name = "SECONDS", env = "PROCWATCH_RELOAD_INTERVAL")]
    reload_interval: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::default()
            .with_proc_path(self.proc_path.clone())
            .with_disk_path(self.disk_path.clone())
            .with_log_path(self.log_path.clone())
            .with_model_dir(self.model_dir.clone())
            .with_process_interval(Duration::from_secs(self.process_interval.max(1)))
            .with_system_interval(Duration::from_secs(self.system_interval.max(1)))
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["procwatchd", "procwatch_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn report<F: FileSystem + Clone + 'static>(monitor: &Monitor<F>, top: usize) {
    let overview = monitor.system_overview();
    let window = monitor.system_timestamps();
    info!(
        cpu = overview.cpu_pct,
        mem = overview.mem_pct,
        disk = overview.disk_pct,
        net_sent = overview.net_sent_delta_bytes,
        net_recv = overview.net_recv_delta_bytes,
        procs = overview.process_count,
        samples = window.len(),
        since = %window.first().map(|t| t.to_rfc3339()).unwrap_or_default(),
        "system"
    );

    for row in monitor.scored_processes().into_iter().take(top) {
        info!(
            pid = row.pid,
            name = %row.name,
            user = row.user.as_deref().unwrap_or("-"),
            cpu = row.cpu,
            mem = row.memory,
            threads = row.threads,
            category = %row.category,
            anomaly = row.anomaly,
            "process"
        );
    }
}

fn run<F: FileSystem + Clone + 'static>(monitor: &Monitor<F>, args: &Args, running: &AtomicBool) {
    let report_interval = Duration::from_secs(args.report_interval.max(1));
    let reload_interval = args.reload_interval.map(|s| Duration::from_secs(s.max(1)));
    let mut last_reload = Instant::now();

    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        report(monitor, args.top);
        debug!(duration_ms = started.elapsed().as_millis() as u64, "report done");

        if let Some(interval) = reload_interval
            && last_reload.elapsed() >= interval
        {
            monitor.reload_engines();
            last_reload = Instant::now();
        }

        let sleep_interval = Duration::from_millis(100);
        let mut remaining = report_interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    info!("procwatchd {} starting", procwatch_core::VERSION);
    info!(
        proc = %args.proc_path,
        log = %args.log_path.display(),
        models = %args.model_dir.display(),
        process_interval_s = args.process_interval,
        system_interval_s = args.system_interval,
        "config"
    );

    #[cfg(target_os = "linux")]
    let fs = RealFs::new();
    #[cfg(not(target_os = "linux"))]
    let fs = MockFs::new();

    let monitor = Monitor::new(fs, args.monitor_config());
    let engines = monitor.engines();
    for kind in [EngineKind::Categorizer, EngineKind::Anomaly, EngineKind::Lifetime] {
        info!(engine = kind.as_str(), mode = %engines.mode(kind), "engine");
    }
    drop(engines);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    if let Err(e) = monitor.start() {
        error!(error = %e, "failed to start samplers");
        std::process::exit(1);
    }

    run(&monitor, &args, &running);

    info!("Shutting down...");
    monitor.stop();
    info!("procwatchd stopped");
}
