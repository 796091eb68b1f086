use proven_executor::MemberId;
use thiserror::Error;

/// Errors from managing an in-memory cluster
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// No node with this ID is part of the cluster
    #[error("no node with ID {0}")]
    UnknownNode(MemberId),
}
