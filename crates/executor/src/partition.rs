//! Partition identifiers, affinity keys and task routing

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;
use uuid::Uuid;

use tracing::warn;

use crate::cluster::PartitionService;
use crate::error::{ExecutorError, ExecutorResult};
use crate::task::Task;

/// Identifier of a partition, always in `[0, partition_count)`
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct PartitionId(u32);

impl PartitionId {
    /// Create a partition ID
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw partition number
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Affinity key used to co-locate related tasks on one partition
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct PartitionKey(Bytes);

impl PartitionKey {
    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Get the key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Canonical partition of this key for a table of `partition_count` partitions
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn partition_for(&self, partition_count: u32) -> PartitionId {
        let count = u64::from(partition_count.max(1));
        PartitionId((XxHash64::oneshot(0, &self.0) % count) as u32)
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self(Bytes::copy_from_slice(key.as_bytes()))
    }
}

impl From<String> for PartitionKey {
    fn from(key: String) -> Self {
        Self(Bytes::from(key))
    }
}

impl From<&[u8]> for PartitionKey {
    fn from(key: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(key))
    }
}

impl From<Vec<u8>> for PartitionKey {
    fn from(key: Vec<u8>) -> Self {
        Self(Bytes::from(key))
    }
}

impl From<Bytes> for PartitionKey {
    fn from(key: Bytes) -> Self {
        Self(key)
    }
}

impl From<u64> for PartitionKey {
    fn from(key: u64) -> Self {
        Self(Bytes::copy_from_slice(&key.to_be_bytes()))
    }
}

impl From<Uuid> for PartitionKey {
    fn from(key: Uuid) -> Self {
        Self(Bytes::copy_from_slice(key.as_bytes()))
    }
}

/// Computes the target partition of a task
///
/// Tasks declaring an affinity key go to the partition owning that key.
/// Tasks without one are spread uniformly over all partitions.
#[derive(Clone)]
pub struct PartitionRouter {
    partitions: Arc<dyn PartitionService>,
    partition_count: u32,
}

impl PartitionRouter {
    /// Create a router over the given partition service
    pub fn new(partitions: Arc<dyn PartitionService>) -> Self {
        let partition_count = partitions.partition_count().max(1);
        Self {
            partitions,
            partition_count,
        }
    }

    /// Number of partitions routed over
    #[must_use]
    pub const fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Route a task to its partition
    pub fn route<T: Task>(&self, task: &T) -> PartitionId {
        task.affinity_key().map_or_else(
            || PartitionId(rand::thread_rng().gen_range(0..self.partition_count)),
            |key| self.route_key(&key),
        )
    }

    /// Route an explicit key to its owning partition
    ///
    /// A partition service answering outside `[0, partition_count)` is
    /// overridden by the key's canonical partition.
    #[must_use]
    pub fn route_key(&self, key: &PartitionKey) -> PartitionId {
        let partition = self.partitions.partition_id(key);
        if partition.get() < self.partition_count {
            return partition;
        }
        warn!(
            %partition,
            partition_count = self.partition_count,
            "partition service answered out of range"
        );
        key.partition_for(self.partition_count)
    }

    /// Validate an explicit partition target
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::InvalidPartition`] if `partition` is not below
    /// the partition count.
    pub const fn check(&self, partition: PartitionId) -> ExecutorResult<PartitionId> {
        if partition.get() < self.partition_count {
            Ok(partition)
        } else {
            Err(ExecutorError::InvalidPartition {
                partition,
                partition_count: self.partition_count,
            })
        }
    }
}
