//! Cluster member identity

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Network address of a member
pub type Address = SocketAddr;

/// Unique identifier of a cluster member
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct MemberId(Uuid);

impl MemberId {
    /// Generate a fresh random member ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for MemberId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A member of the cluster
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct Member {
    id: MemberId,
    address: Address,
}

impl Member {
    /// Create a new member
    #[must_use]
    pub const fn new(id: MemberId, address: Address) -> Self {
        Self { id, address }
    }

    /// Get the member ID
    #[must_use]
    pub const fn id(&self) -> &MemberId {
        &self.id
    }

    /// Get the member's address
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Member[{}]:{}", self.address, self.id)
    }
}
