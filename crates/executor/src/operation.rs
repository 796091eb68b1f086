//! Operations carried by executor invocations

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Operation executed by the [`ExecutorService`](crate::ExecutorService) of the target member
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ExecutorOperation {
    /// Run a serialized task
    Execute {
        /// Executor the task was submitted to
        executor: String,
        /// Registry name of the task type
        task_type: String,
        /// Encoded task
        payload: Bytes,
    },

    /// Stop accepting tasks for an executor
    Shutdown {
        /// Executor to shut down
        executor: String,
    },
}

impl ExecutorOperation {
    /// Name of the executor this operation belongs to
    #[must_use]
    pub fn executor(&self) -> &str {
        match self {
            Self::Execute { executor, .. } | Self::Shutdown { executor } => executor,
        }
    }
}

/// Whether an operation was dispatched by the member executing it
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Origin {
    /// Submitted on this member; results stay in-process
    Local,
    /// Submitted on another member; results are serialized
    Remote,
}
