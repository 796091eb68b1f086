//! Error types for task submission and execution

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::member::{Address, MemberId};
use crate::partition::PartitionId;

/// Result type alias for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Errors surfaced to callers of the executor
#[derive(Clone, Debug, Error)]
pub enum ExecutorError {
    /// The executor has been shut down and accepts no further tasks
    #[error(
        "executor '{name}' is shut down; destroy it and create a new executor named '{name}' to submit more tasks"
    )]
    RejectedSubmission {
        /// Name of the rejecting executor
        name: String,
    },

    /// The task failed while running, or its invocation could not be delivered
    #[error("task execution failed: {0}")]
    ExecutionFailed(TaskFailure),

    /// The local wait for a result exceeded its deadline
    #[error("timed out after {0:?} waiting for task result")]
    Timeout(Duration),

    /// A task, operation or result could not be (de)serialized
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An explicit partition target lies outside the partition table
    #[error("partition {partition} out of range, cluster has {partition_count} partitions")]
    InvalidPartition {
        /// Requested partition
        partition: PartitionId,
        /// Number of partitions in the cluster
        partition_count: u32,
    },

    /// The requested operation is not offered by this executor
    #[error("operation '{0}' is not supported")]
    Unsupported(&'static str),
}

impl ExecutorError {
    /// Whether this error is a rejection of a shut down executor
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::RejectedSubmission { .. })
    }
}

impl From<InvocationError> for ExecutorError {
    fn from(error: InvocationError) -> Self {
        Self::ExecutionFailed(TaskFailure::from(error))
    }
}

/// Failure raised by a task, transferable between members
#[derive(Clone, Debug, Error, Eq, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct TaskFailure {
    message: String,
}

impl TaskFailure {
    /// Create a failure with the given message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<InvocationError> for TaskFailure {
    fn from(error: InvocationError) -> Self {
        Self::new(error.to_string())
    }
}

/// Invocation-level errors raised by an [`InvocationService`](crate::InvocationService)
#[derive(Clone, Debug, Error)]
pub enum InvocationError {
    /// No member currently owns the partition
    #[error("no owner for partition {0}")]
    NoPartitionOwner(PartitionId),

    /// No member is reachable at the address
    #[error("no member at address {0}")]
    UnknownAddress(Address),

    /// The target member left the cluster before responding
    #[error("member {0} left the cluster before responding")]
    MemberLeft(MemberId),

    /// The responding side dropped the response channel
    #[error("response channel closed")]
    ResponseChannelClosed,

    /// Transport layer error
    #[error("transport error: {0}")]
    Transport(String),
}

/// Serialization errors
#[derive(Clone, Debug, Error)]
pub enum CodecError {
    /// A value could not be encoded
    #[error("failed to encode value: {0}")]
    Encode(String),

    /// A payload could not be decoded
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// A locally produced value was not of the requested type
    #[error("local result is not of type {0}")]
    TypeMismatch(&'static str),
}
