//! Invocations and their pending responses

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{InvocationError, TaskFailure};
use crate::member::Address;
use crate::partition::PartitionId;

/// Outcome of one invocation, as delivered by the invocation service
pub type InvocationResult = Result<Response, InvocationError>;

/// Where an invocation is sent
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvocationTarget {
    /// The current owner of a partition
    Partition(PartitionId),
    /// A member at an explicit address
    Address(Address),
}

impl fmt::Display for InvocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partition(partition) => write!(f, "partition {partition}"),
            Self::Address(address) => write!(f, "address {address}"),
        }
    }
}

/// One outstanding request/response exchange
#[derive(Clone, Debug)]
pub struct Invocation {
    correlation_id: Uuid,
    service: &'static str,
    target: InvocationTarget,
    payload: Bytes,
}

impl Invocation {
    /// Create an invocation with a fresh correlation ID
    #[must_use]
    pub fn new(service: &'static str, target: InvocationTarget, payload: Bytes) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            service,
            target,
            payload,
        }
    }

    /// Correlation ID of this invocation
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Name of the service the payload is addressed to
    #[must_use]
    pub const fn service(&self) -> &'static str {
        self.service
    }

    /// Target of this invocation
    #[must_use]
    pub const fn target(&self) -> InvocationTarget {
        self.target
    }

    /// Encoded operation payload
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// Raw, not yet decoded response of an invocation
#[derive(Clone)]
pub enum Response {
    /// Serialized result produced by a remote member
    Payload(Bytes),
    /// Result produced in-process, never serialized
    Value(Arc<dyn Any + Send + Sync>),
    /// The task raised a failure while running
    Failure(TaskFailure),
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payload(bytes) => f.debug_tuple("Payload").field(&bytes.len()).finish(),
            Self::Value(_) => f.debug_tuple("Value").finish_non_exhaustive(),
            Self::Failure(failure) => f.debug_tuple("Failure").field(failure).finish(),
        }
    }
}

/// Responding half of a [`PendingResponse`]
#[derive(Debug)]
pub struct ResponseSender {
    tx: oneshot::Sender<InvocationResult>,
    completed: Arc<AtomicBool>,
}

impl ResponseSender {
    /// Deliver the outcome of the invocation
    pub fn send(self, result: InvocationResult) {
        self.completed.store(true, Ordering::Release);
        let _ = self.tx.send(result);
    }
}

/// The eventual response of an invocation
///
/// Resolves once the invocation service delivers an outcome. A sender that is
/// dropped without responding resolves it with
/// [`InvocationError::ResponseChannelClosed`].
#[derive(Debug)]
pub struct PendingResponse {
    correlation_id: Uuid,
    rx: oneshot::Receiver<InvocationResult>,
    completed: Arc<AtomicBool>,
}

impl PendingResponse {
    /// Create a pending response and the sender that completes it
    #[must_use]
    pub fn channel(correlation_id: Uuid) -> (ResponseSender, Self) {
        let (tx, rx) = oneshot::channel();
        let completed = Arc::new(AtomicBool::new(false));
        (
            ResponseSender {
                tx,
                completed: Arc::clone(&completed),
            },
            Self {
                correlation_id,
                rx,
                completed,
            },
        )
    }

    /// Create a pending response that is already resolved with an error
    #[must_use]
    pub fn failed(correlation_id: Uuid, error: InvocationError) -> Self {
        let (sender, pending) = Self::channel(correlation_id);
        sender.send(Err(error));
        pending
    }

    /// Correlation ID of the invocation this response belongs to
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Whether an outcome has been delivered
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn completion(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.completed)
    }
}

impl Future for PendingResponse {
    type Output = InvocationResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(InvocationError::ResponseChannelClosed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_pending_response_resolves_with_sent_value() {
        let (sender, pending) = PendingResponse::channel(Uuid::new_v4());
        assert!(!pending.is_complete());

        sender.send(Ok(Response::Payload(Bytes::from_static(b"ok"))));
        assert!(pending.is_complete());

        assert_matches!(pending.await, Ok(Response::Payload(bytes)) if bytes == Bytes::from_static(b"ok"));
    }

    #[tokio::test]
    async fn test_dropped_sender_closes_response() {
        let (sender, pending) = PendingResponse::channel(Uuid::new_v4());
        drop(sender);

        assert_matches!(pending.await, Err(InvocationError::ResponseChannelClosed));
    }

    #[tokio::test]
    async fn test_failed_response_is_complete() {
        let pending = PendingResponse::failed(
            Uuid::new_v4(),
            InvocationError::Transport("refused".to_string()),
        );
        assert!(pending.is_complete());
        assert_matches!(pending.await, Err(InvocationError::Transport(_)));
    }
}
