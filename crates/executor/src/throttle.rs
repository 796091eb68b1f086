//! Sync/async decision for blocking-form submissions
//!
//! Bursts of submissions that never wait for a result can grow the number of
//! outstanding invocations without bound. Every `sync_every`-th submission of
//! a burst therefore resolves in-line, which lets the caller feel backpressure.
//! The decision is approximate when several threads share one proxy.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::ExecutorConfig;

const NEVER: u64 = 0;

/// Per-proxy burst tracking
#[derive(Debug)]
pub struct SubmissionThrottle {
    epoch: Instant,
    /// Nanoseconds since `epoch` of the last submission, offset by one
    last_submission: AtomicU64,
    consecutive: AtomicU32,
    quiescence_interval: Duration,
    sync_every: u32,
}

impl SubmissionThrottle {
    /// Create a throttle from executor configuration
    #[must_use]
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            epoch: Instant::now(),
            last_submission: AtomicU64::new(NEVER),
            consecutive: AtomicU32::new(0),
            quiescence_interval: config.quiescence_interval,
            sync_every: config.sync_every.max(1),
        }
    }

    /// Record a submission and decide whether it must resolve synchronously
    #[allow(clippy::cast_possible_truncation)]
    pub fn should_sync(&self) -> bool {
        let now = self.epoch.elapsed().as_nanos() as u64 + 1;
        let last = self.last_submission.swap(now, Ordering::AcqRel);

        let quiet = last == NEVER
            || Duration::from_nanos(now.saturating_sub(last)) > self.quiescence_interval;

        if quiet {
            self.consecutive.store(0, Ordering::Release);
            false
        } else {
            let count = self.consecutive.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
            count % self.sync_every == 0
        }
    }

    /// Number of consecutive burst submissions seen so far
    pub fn consecutive(&self) -> u32 {
        self.consecutive.load(Ordering::Acquire)
    }
}
