//! Background samplers.
//!
//! Each sampler owns its `MetricSource` and runs on a dedicated thread until
//! its running flag is cleared:
//! - `ProcessSampler` appends every visible process to a durable `BehaviorLog`
//! - `SystemSampler` pushes host-wide load into in-memory `SystemSeries`

pub mod process;
pub mod system;

pub use process::{BehaviorLog, LOG_HEADER, ProcessSampler, TickError, TickReport};
pub use system::{Metric, SystemSampler, SystemSeries, SystemSnapshot};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Sleeps for `interval`, waking every 100 ms to check `running`.
///
/// Returns early once `running` is cleared.
pub(crate) fn sleep_while_running(interval: Duration, running: &AtomicBool) {
    let mut remaining = interval;
    while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
        let sleep_time = remaining.min(SLEEP_SLICE);
        std::thread::sleep(sleep_time);
        remaining = remaining.saturating_sub(sleep_time);
    }
}
