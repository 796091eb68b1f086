//! Per-executor statistics

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sink for task lifecycle events
pub trait StatsCollector: Send + Sync {
    /// A task started running
    fn task_started(&self);

    /// A task finished, successfully or not
    fn task_finished(&self);
}

/// Point-in-time copy of an executor's counters
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStats {
    /// When the executor was first used on this member
    pub creation_time: DateTime<Utc>,
    /// Tasks started on this member
    pub total_started: u64,
    /// Tasks finished on this member
    pub total_finished: u64,
    /// Tasks started but not yet finished
    pub pending: u64,
}

/// Live counters for one executor on one member
#[derive(Debug)]
pub struct LocalExecutorStats {
    creation_time: DateTime<Utc>,
    started: AtomicU64,
    finished: AtomicU64,
}

impl LocalExecutorStats {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self {
            creation_time: Utc::now(),
            started: AtomicU64::new(0),
            finished: AtomicU64::new(0),
        }
    }

    /// Copy the current counters
    #[must_use]
    pub fn snapshot(&self) -> ExecutorStats {
        let total_finished = self.finished.load(Ordering::Acquire);
        let total_started = self.started.load(Ordering::Acquire);
        ExecutorStats {
            creation_time: self.creation_time,
            total_started,
            total_finished,
            pending: total_started.saturating_sub(total_finished),
        }
    }
}

impl Default for LocalExecutorStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCollector for LocalExecutorStats {
    fn task_started(&self) {
        self.started.fetch_add(1, Ordering::AcqRel);
    }

    fn task_finished(&self) {
        self.finished.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_tracks_unfinished_tasks() {
        let stats = LocalExecutorStats::new();
        stats.task_started();
        stats.task_started();
        stats.task_finished();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_started, 2);
        assert_eq!(snapshot.total_finished, 1);
        assert_eq!(snapshot.pending, 1);
    }
}
