//! Executor configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default gap after which a submission no longer counts as part of a burst
pub const DEFAULT_QUIESCENCE_INTERVAL: Duration = Duration::from_millis(10);

/// Default number of consecutive burst submissions between synchronous ones
pub const DEFAULT_SYNC_EVERY: u32 = 100;

/// Default per-member wait for shutdown acknowledgements
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Executor proxy configuration
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Submissions further apart than this reset the burst counter
    pub quiescence_interval: Duration,

    /// Every n-th consecutive burst submission waits for its own result
    pub sync_every: u32,

    /// Upper bound on waiting for each remote member to acknowledge shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            quiescence_interval: DEFAULT_QUIESCENCE_INTERVAL,
            sync_every: DEFAULT_SYNC_EVERY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}
