//! Bounded in-memory histories.
//!
//! `RollingHistory` is a fixed-capacity ring buffer; `PerProcessHistory` keys
//! one of them per pid for cpu sparklines.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Default number of cpu samples kept per process.
pub const DEFAULT_PROCESS_CAPACITY: usize = 60;

/// Default number of distinct pids tracked at once.
pub const DEFAULT_MAX_TRACKED: usize = 4096;

/// Fixed-capacity, insertion-ordered buffer. The oldest element is dropped on
/// overflow.
#[derive(Debug, Clone)]
pub struct RollingHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingHistory<T> {
    /// Creates an empty history. A capacity of 0 is treated as 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed element.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RollingHistory<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[derive(Debug)]
struct Tracked {
    samples: RollingHistory<f64>,
    /// Value of `Inner::clock` when this pid was last recorded.
    last_recorded: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<u32, Tracked>,
    clock: u64,
}

/// Recent cpu utilization per pid, shared by concurrent request handlers.
///
/// All access is serialized through one mutex. The map holds at most
/// `max_tracked` pids; recording a new pid beyond that evicts the pid
/// recorded least recently.
#[derive(Debug)]
pub struct PerProcessHistory {
    inner: Mutex<Inner>,
    capacity: usize,
    max_tracked: usize,
}

impl Default for PerProcessHistory {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_CAPACITY, DEFAULT_MAX_TRACKED)
    }
}

impl PerProcessHistory {
    pub fn new(capacity: usize, max_tracked: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            max_tracked: max_tracked.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends one cpu sample for `pid`.
    pub fn record(&self, pid: u32, cpu: f64) {
        let mut inner = self.lock();
        inner.clock += 1;
        let now = inner.clock;

        if !inner.entries.contains_key(&pid) && inner.entries.len() >= self.max_tracked {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, t)| t.last_recorded)
                .map(|(pid, _)| *pid);
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }

        let capacity = self.capacity;
        let tracked = inner.entries.entry(pid).or_insert_with(|| Tracked {
            samples: RollingHistory::with_capacity(capacity),
            last_recorded: now,
        });
        tracked.samples.push(cpu);
        tracked.last_recorded = now;
    }

    /// Recent samples for `pid`, oldest first. Empty for unknown pids.
    pub fn history(&self, pid: u32) -> Vec<f64> {
        self.lock()
            .entries
            .get(&pid)
            .map(|t| t.samples.to_vec())
            .unwrap_or_default()
    }

    /// Drops every pid not in `live`. Returns the number of pids removed.
    pub fn retain_live(&self, live: &HashSet<u32>) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|pid, _| live.contains(pid));
        before - inner.entries.len()
    }

    /// Number of pids currently tracked.
    pub fn tracked(&self) -> usize {
        self.lock().entries.len()
    }
}
