//! Distributed task execution for Proven Network clusters.
//!
//! This crate provides:
//! - Submission of tasks to partition owners, single members or member sets
//! - Futures that hide whether a result was produced locally or remotely
//! - Aggregation of per-member callbacks into one multi-member callback
//! - Best-effort, bounded shutdown of an executor across the cluster
//!
//! Membership, partition ownership and the invocation primitive are consumed
//! through the traits in [`cluster`]; see `proven-executor-memory` for an
//! in-process implementation.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cluster;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod fanout;
pub mod future;
pub mod invocation;
pub mod member;
pub mod operation;
pub mod partition;
pub mod proxy;
pub mod service;
pub mod shutdown;
pub mod stats;
pub mod target;
pub mod task;
pub mod throttle;

pub use cluster::{ClusterService, InvocationService, NodeContext, PartitionService};
pub use codec::{CborCodec, Codec, Decode};
pub use config::ExecutorConfig;
pub use error::{CodecError, ExecutorError, ExecutorResult, InvocationError, TaskFailure};
pub use fanout::{CallbackFanout, MemberCallback};
pub use future::ResultFuture;
pub use invocation::{
    Invocation, InvocationResult, InvocationTarget, PendingResponse, Response, ResponseSender,
};
pub use member::{Address, Member, MemberId};
pub use operation::{ExecutorOperation, Origin};
pub use partition::{PartitionId, PartitionKey, PartitionRouter};
pub use proxy::ExecutorProxy;
pub use service::ExecutorService;
pub use stats::{ExecutorStats, LocalExecutorStats, StatsCollector};
pub use target::{Fanout, Target};
pub use task::{ExecutionCallback, MultiExecutionCallback, Task};

/// Service name carried by every executor invocation.
pub const SERVICE_NAME: &str = "proven:executor";
