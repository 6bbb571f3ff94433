use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_MAX_IDLE_WORKERS, DEFAULT_MAX_WORKERS};

/// Sizing for the blocking request executor.
///
/// `max_workers` bounds the number of live worker threads; requests that
/// arrive while every worker is busy wait in a backlog. `max_idle_workers`
/// bounds how many finished workers stay parked instead of exiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Maximum number of concurrently running workers.
    pub max_workers: usize,
    /// Maximum number of parked workers.
    pub max_idle_workers: usize,
}

impl ExecutorSettings {
    /// Builds settings, clamping the idle cap to the worker cap.
    #[must_use]
    pub fn new(max_workers: usize, max_idle_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            max_workers,
            max_idle_workers: max_idle_workers.min(max_workers),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_idle_workers: DEFAULT_MAX_IDLE_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_idle_cap_to_worker_cap() {
        let settings = ExecutorSettings::new(4, 16);
        assert_eq!(settings.max_workers, 4);
        assert_eq!(settings.max_idle_workers, 4);
    }

    #[test]
    fn never_allows_zero_workers() {
        assert_eq!(ExecutorSettings::new(0, 0).max_workers, 1);
    }
}
