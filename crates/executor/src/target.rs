//! Submission targets

use crate::member::Member;
use crate::partition::{PartitionId, PartitionKey};

/// Where a single-target submission runs
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Target {
    /// The partition chosen by the task's affinity key, or a random one
    Routed,
    /// The owner of an explicit partition
    Partition(PartitionId),
    /// The owner of the partition of a key
    KeyOwner(PartitionKey),
    /// A specific member
    Member(Member),
}

/// Which members a multi-member submission runs on
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Fanout {
    /// An explicit member set
    Members(Vec<Member>),
    /// Every member in the current membership snapshot
    All,
}

impl From<Member> for Target {
    fn from(member: Member) -> Self {
        Self::Member(member)
    }
}

impl From<PartitionKey> for Target {
    fn from(key: PartitionKey) -> Self {
        Self::KeyOwner(key)
    }
}

impl From<Vec<Member>> for Fanout {
    fn from(members: Vec<Member>) -> Self {
        Self::Members(members)
    }
}
