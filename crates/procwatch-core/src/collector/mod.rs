//! Metric collection from the Linux `/proc` filesystem.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              MetricSource (trait)            │
//! │  list_pids / process(pid) / host()           │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!               ┌────────▼────────┐
//!               │  ProcfsSource   │  /proc/[pid]/{stat,status,io,comm}
//!               │                 │  /proc/{stat,meminfo,net/dev}
//!               └────────┬────────┘
//!                        │
//!                 ┌──────▼──────┐
//!                 │  FileSystem │ (trait)
//!                 └──────┬──────┘
//!              ┌─────────┴─────────┐
//!       ┌──────▼──────┐     ┌──────▼──────┐
//!       │   RealFs    │     │   MockFs    │
//!       │  (Linux)    │     │  (Testing)  │
//!       └─────────────┘     └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use procwatch_core::collector::{MetricSource, MockFs, ProcfsSource};
//!
//! let fs = MockFs::typical_desktop();
//! let mut source = ProcfsSource::new(fs, "/proc");
//! let snapshot = source.process(1000).unwrap();
//! assert_eq!(snapshot.name, "chrome");
//! ```

pub mod mock;
pub mod procfs;
pub mod source;
pub mod traits;

pub use mock::{MOCK_BTIME, MockFs, MockProcess};
pub use procfs::UserResolver;
pub use source::{
    CollectError, HostCounters, MetricSource, ProcessSnapshot, ProcfsSource, Skip, SkipReason,
};
pub use traits::{DiskUsage, FileSystem, RealFs};
