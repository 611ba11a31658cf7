//! Process-wide command-timing registry.
//!
//! Disabled by default and observably write-only unless explicitly read:
//! when profiling is off, [`record`] is a single relaxed atomic load.
//! The dispatcher records the wall time of every write when enabled.
//!
//! ```
//! use std::time::Duration;
//! use makcu_core::profiler;
//!
//! profiler::enable(true);
//! profiler::record("km.move", Duration::from_micros(180));
//! let stats = profiler::stats();
//! assert_eq!(stats["km.move"].count, 1);
//! profiler::reset();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Accumulated timings for one command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStats {
    /// Number of recorded invocations.
    pub count: u64,
    /// Sum of recorded durations in microseconds.
    pub total_micros: u64,
}

impl CommandStats {
    /// Mean duration per invocation in microseconds, or 0 with no samples.
    pub fn mean_micros(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_micros / self.count
        }
    }
}

fn registry() -> &'static Mutex<HashMap<String, CommandStats>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, CommandStats>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Turn profiling on or off for the whole process.
pub fn enable(on: bool) {
    ENABLED.store(on, Ordering::Relaxed);
}

/// Whether profiling is currently enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Record one command timing. No-op unless profiling is enabled.
pub fn record(command: &str, elapsed: Duration) {
    if !ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let mut map = registry().lock().expect("profiler registry poisoned");
    let entry = map.entry(command.to_string()).or_default();
    entry.count += 1;
    entry.total_micros += elapsed.as_micros() as u64;
}

/// Snapshot all accumulated stats.
pub fn stats() -> HashMap<String, CommandStats> {
    registry().lock().expect("profiler registry poisoned").clone()
}

/// Discard all accumulated stats.
pub fn reset() {
    registry().lock().expect("profiler registry poisoned").clear();
}
