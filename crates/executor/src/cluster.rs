//! Cluster collaborators consumed by the executor

use std::sync::Arc;

use crate::codec::{CborCodec, Codec};
use crate::invocation::{Invocation, PendingResponse};
use crate::member::{Address, Member};
use crate::partition::{PartitionId, PartitionKey};
use crate::service::ExecutorService;

/// Membership view of the local member
pub trait ClusterService: Send + Sync + 'static {
    /// Current live members, in join order
    fn members(&self) -> Vec<Member>;

    /// The member this process runs as
    fn local_member(&self) -> Member;

    /// Whether `member` is the local member
    fn is_local(&self, member: &Member) -> bool {
        self.local_member().id() == member.id()
    }
}

/// Partition table lookups
pub trait PartitionService: Send + Sync + 'static {
    /// Fixed number of partitions
    fn partition_count(&self) -> u32;

    /// Partition owning `key`
    fn partition_id(&self, key: &PartitionKey) -> PartitionId;

    /// Address of the member currently owning `partition`
    fn partition_owner(&self, partition: PartitionId) -> Option<Address>;
}

/// The invocation primitive
///
/// Delivery failures are reported through the returned [`PendingResponse`],
/// never by panicking or blocking the caller.
pub trait InvocationService: Send + Sync + 'static {
    /// Dispatch an invocation and return its pending response
    fn invoke(&self, invocation: Invocation) -> PendingResponse;
}

/// Everything an executor proxy needs from its hosting member
pub struct NodeContext<C: Codec = CborCodec> {
    cluster: Arc<dyn ClusterService>,
    partitions: Arc<dyn PartitionService>,
    invocations: Arc<dyn InvocationService>,
    executor_service: Arc<ExecutorService<C>>,
}

impl<C: Codec> NodeContext<C> {
    /// Create a node context
    pub fn new(
        cluster: Arc<dyn ClusterService>,
        partitions: Arc<dyn PartitionService>,
        invocations: Arc<dyn InvocationService>,
        executor_service: Arc<ExecutorService<C>>,
    ) -> Self {
        Self {
            cluster,
            partitions,
            invocations,
            executor_service,
        }
    }

    /// Membership view
    #[must_use]
    pub fn cluster(&self) -> &Arc<dyn ClusterService> {
        &self.cluster
    }

    /// Partition table
    #[must_use]
    pub fn partitions(&self) -> &Arc<dyn PartitionService> {
        &self.partitions
    }

    /// Invocation primitive
    #[must_use]
    pub fn invocations(&self) -> &Arc<dyn InvocationService> {
        &self.invocations
    }

    /// The local member's executor service
    #[must_use]
    pub const fn executor_service(&self) -> &Arc<ExecutorService<C>> {
        &self.executor_service
    }

    /// Codec shared with the local executor service
    #[must_use]
    pub fn codec(&self) -> &Arc<C> {
        self.executor_service.codec()
    }
}

impl<C: Codec> Clone for NodeContext<C> {
    fn clone(&self) -> Self {
        Self {
            cluster: Arc::clone(&self.cluster),
            partitions: Arc::clone(&self.partitions),
            invocations: Arc::clone(&self.invocations),
            executor_service: Arc::clone(&self.executor_service),
        }
    }
}
