//! In-memory (single process) cluster for running executors in tests and
//! local development.
//!
//! Every node of a [`MemoryCluster`] hosts its own
//! [`ExecutorService`]; invocations between nodes are delivered
//! in-process on spawned Tokio tasks. Partition `p` is owned by the
//! `p % n`-th node in join order.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use proven_executor::{
    Address, ClusterService, ExecutorConfig, ExecutorProxy, ExecutorService, Invocation,
    InvocationError, InvocationService, InvocationTarget, Member, MemberId, NodeContext, Origin,
    PartitionId, PartitionKey, PartitionService, PendingResponse, ResponseSender, Task,
};
use tracing::{debug, info};
use uuid::Uuid;

const BASE_PORT: u16 = 5701;

type Registrar = Arc<dyn Fn(&ExecutorService) + Send + Sync>;

struct ClusterState {
    partition_count: u32,
    nodes: RwLock<Vec<Arc<NodeState>>>,
    registrars: Mutex<Vec<Registrar>>,
    next_port: AtomicU16,
}

struct NodeState {
    member: Member,
    service: Arc<ExecutorService>,
    reachable: AtomicBool,
    in_flight: DashMap<Uuid, ResponseSender>,
}

impl ClusterState {
    fn members(&self) -> Vec<Member> {
        self.nodes.read().iter().map(|n| n.member.clone()).collect()
    }

    fn node(&self, id: &MemberId) -> Option<Arc<NodeState>> {
        self.nodes
            .read()
            .iter()
            .find(|n| n.member.id() == id)
            .cloned()
    }

    fn owner_of(&self, partition: PartitionId) -> Option<Arc<NodeState>> {
        owner_in(&self.nodes.read(), self.partition_count, partition)
    }
}

fn node_in(nodes: &[Arc<NodeState>], address: Address) -> Option<Arc<NodeState>> {
    nodes.iter().find(|n| n.member.address() == address).cloned()
}

/// Owner of `partition`, or `None` if it lies outside the partition table
#[allow(clippy::cast_possible_truncation)]
fn owner_in(
    nodes: &[Arc<NodeState>],
    partition_count: u32,
    partition: PartitionId,
) -> Option<Arc<NodeState>> {
    if nodes.is_empty() || partition.get() >= partition_count {
        return None;
    }
    let index = partition.get() as usize % nodes.len();
    nodes.get(index).cloned()
}

/// A cluster of in-process nodes
#[derive(Clone)]
pub struct MemoryCluster {
    state: Arc<ClusterState>,
}

impl MemoryCluster {
    /// Create an empty cluster with a fixed number of partitions
    #[must_use]
    pub fn new(partition_count: u32) -> Self {
        Self {
            state: Arc::new(ClusterState {
                partition_count: partition_count.max(1),
                nodes: RwLock::new(Vec::new()),
                registrars: Mutex::new(Vec::new()),
                next_port: AtomicU16::new(BASE_PORT),
            }),
        }
    }

    /// Number of partitions
    #[must_use]
    pub fn partition_count(&self) -> u32 {
        self.state.partition_count
    }

    /// Start a new node and add it to the membership
    ///
    /// Task types registered through [`register_task`](Self::register_task)
    /// are registered on the new node too.
    #[must_use]
    pub fn add_node(&self) -> MemoryNode {
        let port = self.state.next_port.fetch_add(1, Ordering::Relaxed);
        let address = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let member = Member::new(MemberId::new(), address);

        let service = Arc::new(ExecutorService::default());
        for registrar in self.state.registrars.lock().iter() {
            registrar(&service);
        }

        let node = Arc::new(NodeState {
            member,
            service,
            reachable: AtomicBool::new(true),
            in_flight: DashMap::new(),
        });
        self.state.nodes.write().push(Arc::clone(&node));

        info!("Node {} joined the cluster", node.member);

        MemoryNode {
            cluster: Arc::clone(&self.state),
            node,
        }
    }

    /// Remove a node from the membership
    ///
    /// Invocations the node has not answered yet fail with
    /// [`InvocationError::MemberLeft`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownNode`] if no such node is part of the cluster.
    pub fn remove_node(&self, id: &MemberId) -> Result<(), Error> {
        let node = {
            let mut nodes = self.state.nodes.write();
            let index = nodes
                .iter()
                .position(|n| n.member.id() == id)
                .ok_or(Error::UnknownNode(*id))?;
            nodes.remove(index)
        };

        let correlation_ids: Vec<Uuid> = node.in_flight.iter().map(|e| *e.key()).collect();
        for correlation_id in correlation_ids {
            if let Some((_, sender)) = node.in_flight.remove(&correlation_id) {
                sender.send(Err(InvocationError::MemberLeft(*id)));
            }
        }

        info!("Node {} left the cluster", node.member);
        Ok(())
    }

    /// Make a node stop or resume answering invocations
    ///
    /// An unreachable node accepts invocations but never responds to them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownNode`] if no such node is part of the cluster.
    pub fn set_reachable(&self, id: &MemberId, reachable: bool) -> Result<(), Error> {
        let node = self.state.node(id).ok_or(Error::UnknownNode(*id))?;
        node.reachable.store(reachable, Ordering::Release);
        debug!(member = %node.member, reachable, "changed node reachability");
        Ok(())
    }

    /// Register a task type on every current and future node
    pub fn register_task<T: Task>(&self) {
        let registrar: Registrar = Arc::new(|service: &ExecutorService| service.register::<T>());
        for node in self.state.nodes.read().iter() {
            registrar(&node.service);
        }
        self.state.registrars.lock().push(registrar);
    }

    /// Current members in join order
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        self.state.members()
    }
}

/// One node of a [`MemoryCluster`]
#[derive(Clone)]
pub struct MemoryNode {
    cluster: Arc<ClusterState>,
    node: Arc<NodeState>,
}

impl MemoryNode {
    /// This node's member identity
    #[must_use]
    pub fn member(&self) -> Member {
        self.node.member.clone()
    }

    /// This node's member ID
    #[must_use]
    pub fn id(&self) -> MemberId {
        *self.node.member.id()
    }

    /// This node's executor service
    #[must_use]
    pub fn executor_service(&self) -> &Arc<ExecutorService> {
        &self.node.service
    }

    /// Register a task type on this node only
    pub fn register_task<T: Task>(&self) {
        self.node.service.register::<T>();
    }

    /// Collaborators as seen from this node
    #[must_use]
    pub fn context(&self) -> NodeContext {
        let view = Arc::new(NodeView {
            cluster: Arc::clone(&self.cluster),
            local: Arc::clone(&self.node),
        });
        NodeContext::new(
            Arc::clone(&view) as Arc<dyn ClusterService>,
            Arc::clone(&view) as Arc<dyn PartitionService>,
            view,
            Arc::clone(&self.node.service),
        )
    }

    /// Executor proxy named `name` with default configuration
    #[must_use]
    pub fn executor(&self, name: impl Into<String>) -> ExecutorProxy {
        self.executor_with_config(name, ExecutorConfig::default())
    }

    /// Executor proxy named `name`
    #[must_use]
    pub fn executor_with_config(
        &self,
        name: impl Into<String>,
        config: ExecutorConfig,
    ) -> ExecutorProxy {
        ExecutorProxy::new(name, self.context(), config)
    }
}

/// Cluster collaborators bound to the node they run on
struct NodeView {
    cluster: Arc<ClusterState>,
    local: Arc<NodeState>,
}

impl ClusterService for NodeView {
    fn members(&self) -> Vec<Member> {
        self.cluster.members()
    }

    fn local_member(&self) -> Member {
        self.local.member.clone()
    }
}

impl PartitionService for NodeView {
    fn partition_count(&self) -> u32 {
        self.cluster.partition_count
    }

    fn partition_id(&self, key: &PartitionKey) -> PartitionId {
        key.partition_for(self.cluster.partition_count)
    }

    fn partition_owner(&self, partition: PartitionId) -> Option<Address> {
        self.cluster.owner_of(partition).map(|n| n.member.address())
    }
}

impl InvocationService for NodeView {
    fn invoke(&self, invocation: Invocation) -> PendingResponse {
        let correlation_id = invocation.correlation_id();

        // Resolve and register under one read lock so `remove_node` drains
        // every sender registered on the node it removes.
        let (target, pending) = {
            let nodes = self.cluster.nodes.read();
            let target = match invocation.target() {
                InvocationTarget::Partition(partition) => {
                    owner_in(&nodes, self.cluster.partition_count, partition)
                        .ok_or(InvocationError::NoPartitionOwner(partition))
                }
                InvocationTarget::Address(address) => {
                    node_in(&nodes, address).ok_or(InvocationError::UnknownAddress(address))
                }
            };
            let target = match target {
                Ok(target) => target,
                Err(e) => return PendingResponse::failed(correlation_id, e),
            };

            let (sender, pending) = PendingResponse::channel(correlation_id);
            target.in_flight.insert(correlation_id, sender);
            (target, pending)
        };

        if !target.reachable.load(Ordering::Acquire) {
            debug!(member = %target.member, %correlation_id, "target unreachable, holding invocation");
            return pending;
        }

        let origin = if target.member.id() == self.local.member.id() {
            Origin::Local
        } else {
            Origin::Remote
        };
        let payload = invocation.payload().clone();

        tokio::spawn(async move {
            let response = target.service.handle_operation(&payload, origin).await;
            if let Some((_, sender)) = target.in_flight.remove(&correlation_id) {
                sender.send(Ok(response));
            }
        });

        pending
    }
}
