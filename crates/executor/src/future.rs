//! Uniform handle over local and remote task results

use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

use crate::codec::Decode;
use crate::error::{CodecError, ExecutorError, ExecutorResult};
use crate::invocation::{InvocationResult, PendingResponse, Response};

/// Handle to the result of a submitted task
///
/// Results are decoded when read, not when they arrive, and the raw outcome
/// is kept so every read yields the same value or error. Whether the task ran
/// on this member or a remote one is not observable through the handle.
pub struct ResultFuture<T> {
    resolution: Resolution,
    extract: Extract<T>,
    cancelled: AtomicBool,
}

enum Resolution {
    /// Outcome known at construction
    Immediate(InvocationResult),
    /// Outcome of an in-flight invocation
    Pending(PendingHandle),
}

struct PendingHandle {
    correlation_id: Uuid,
    response: Mutex<PendingResponse>,
    completed: Arc<AtomicBool>,
    outcome: OnceCell<InvocationResult>,
}

enum Extract<T> {
    Decode(Arc<dyn Decode<T>>),
    Fixed(T),
}

impl<T> ResultFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a future over an in-flight invocation
    pub fn pending(response: PendingResponse, decoder: Arc<dyn Decode<T>>) -> Self {
        let completed = response.completion();
        Self {
            resolution: Resolution::Pending(PendingHandle {
                correlation_id: response.correlation_id(),
                response: Mutex::new(response),
                completed,
                outcome: OnceCell::new(),
            }),
            extract: Extract::Decode(decoder),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Create a future whose outcome is already known
    pub fn immediate(outcome: InvocationResult, decoder: Arc<dyn Decode<T>>) -> Self {
        Self {
            resolution: Resolution::Immediate(outcome),
            extract: Extract::Decode(decoder),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Replace the task's result with a fixed value
    ///
    /// The returned future still waits for the task and still surfaces its
    /// failure, but a successful completion always yields `value` verbatim.
    pub fn with_value<R>(self, value: R) -> ResultFuture<R>
    where
        R: Clone + Send + Sync + 'static,
    {
        ResultFuture {
            resolution: self.resolution,
            extract: Extract::Fixed(value),
            cancelled: self.cancelled,
        }
    }

    /// Wait for the task and return its result
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ExecutionFailed`] if the task failed or its
    /// invocation could not be delivered, or [`ExecutorError::Codec`] if the
    /// result cannot be decoded as `T`.
    pub async fn get(&self) -> ExecutorResult<T> {
        let outcome = match &self.resolution {
            Resolution::Immediate(outcome) => outcome,
            Resolution::Pending(handle) => {
                handle
                    .outcome
                    .get_or_init(|| async {
                        let mut response = handle.response.lock().await;
                        (&mut *response).await
                    })
                    .await
            }
        };
        self.extract(outcome)
    }

    /// Wait at most `timeout` for the task's result
    ///
    /// Timing out leaves the task running; a later call may still succeed.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Timeout`] if no outcome arrived in time, and
    /// otherwise the errors of [`get`](Self::get).
    pub async fn get_timeout(&self, timeout: Duration) -> ExecutorResult<T> {
        tokio::time::timeout(timeout, self.get())
            .await
            .map_err(|_| ExecutorError::Timeout(timeout))?
    }

    /// Mark the future done without interrupting the task
    ///
    /// Remote execution cannot be stopped, so this always returns `false`.
    /// Reads after cancelling still return the task's eventual outcome.
    pub fn cancel(&self, _may_interrupt: bool) -> bool {
        self.cancelled.store(true, Ordering::Release);
        false
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether the outcome is available or the future was cancelled
    pub fn is_done(&self) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match &self.resolution {
            Resolution::Immediate(_) => true,
            Resolution::Pending(handle) => {
                handle.outcome.initialized() || handle.completed.load(Ordering::Acquire)
            }
        }
    }

    /// Correlation ID of the underlying invocation, if still tracked
    pub const fn correlation_id(&self) -> Option<Uuid> {
        match &self.resolution {
            Resolution::Immediate(_) => None,
            Resolution::Pending(handle) => Some(handle.correlation_id),
        }
    }

    fn extract(&self, outcome: &InvocationResult) -> ExecutorResult<T> {
        let response = outcome.as_ref().map_err(|e| ExecutorError::from(e.clone()))?;

        match (response, &self.extract) {
            (Response::Failure(failure), _) => Err(ExecutorError::ExecutionFailed(failure.clone())),
            (_, Extract::Fixed(value)) => Ok(value.clone()),
            (Response::Payload(payload), Extract::Decode(decoder)) => {
                Ok(decoder.decode_payload(payload)?)
            }
            (Response::Value(value), Extract::Decode(_)) => value
                .downcast_ref::<T>()
                .cloned()
                .ok_or(ExecutorError::Codec(CodecError::TypeMismatch(type_name::<T>()))),
        }
    }
}

impl<T> fmt::Debug for ResultFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ResultFuture");
        match &self.resolution {
            Resolution::Immediate(outcome) => debug.field("outcome", outcome),
            Resolution::Pending(handle) => debug
                .field("correlation_id", &handle.correlation_id)
                .field("outcome", &handle.outcome.get()),
        };
        debug
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use bytes::Bytes;

    use crate::codec::{CborCodec, Codec};
    use crate::error::{InvocationError, TaskFailure};

    fn decoder<T: serde::de::DeserializeOwned>() -> Arc<dyn Decode<T>> {
        Arc::new(CborCodec)
    }

    fn payload<V: serde::Serialize>(value: &V) -> Response {
        Response::Payload(CborCodec.encode(value).unwrap())
    }

    #[tokio::test]
    async fn test_remote_and_local_results_decode_identically() {
        let remote = ResultFuture::immediate(Ok(payload(&42u64)), decoder::<u64>());
        let local = ResultFuture::immediate(Ok(Response::Value(Arc::new(42u64))), decoder::<u64>());

        assert_eq!(remote.get().await.unwrap(), 42);
        assert_eq!(local.get().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let (sender, pending) = PendingResponse::channel(Uuid::new_v4());
        let future = ResultFuture::pending(pending, decoder::<String>());
        assert!(!future.is_done());

        sender.send(Ok(payload(&"done".to_string())));

        assert_eq!(future.get().await.unwrap(), "done");
        assert_eq!(future.get().await.unwrap(), "done");
        assert!(future.is_done());
    }

    #[tokio::test]
    async fn test_repeated_reads_of_failure_are_identical() {
        let (sender, pending) = PendingResponse::channel(Uuid::new_v4());
        let future = ResultFuture::pending(pending, decoder::<u64>());

        sender.send(Ok(Response::Failure(TaskFailure::new("boom"))));

        let first = future.get().await.unwrap_err();
        let second = future.get().await.unwrap_err();
        assert_matches!(&first, ExecutorError::ExecutionFailed(f) if f.message() == "boom");
        assert_eq!(first.to_string(), second.to_string());
    }

    #[tokio::test]
    async fn test_transport_failure_surfaces_as_execution_failure() {
        let pending = PendingResponse::failed(
            Uuid::new_v4(),
            InvocationError::Transport("connection reset".to_string()),
        );
        let future = ResultFuture::pending(pending, decoder::<u64>());

        assert_matches!(future.get().await, Err(ExecutorError::ExecutionFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_result_retrievable() {
        let (sender, pending) = PendingResponse::channel(Uuid::new_v4());
        let future = ResultFuture::pending(pending, decoder::<u64>());

        assert_matches!(
            future.get_timeout(Duration::from_millis(50)).await,
            Err(ExecutorError::Timeout(_))
        );
        assert!(!future.is_done());

        sender.send(Ok(payload(&9u64)));
        assert_eq!(future.get_timeout(Duration::from_millis(50)).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_fixed_value_bypasses_decode() {
        let (sender, pending) = PendingResponse::channel(Uuid::new_v4());
        let future = ResultFuture::pending(pending, decoder::<()>()).with_value("sentinel");

        sender.send(Ok(Response::Payload(Bytes::from_static(b"\xff\xff"))));
        assert_eq!(future.get().await.unwrap(), "sentinel");
    }

    #[tokio::test]
    async fn test_fixed_value_still_surfaces_failure() {
        let future = ResultFuture::immediate(
            Ok(Response::Failure(TaskFailure::new("void task failed"))),
            decoder::<()>(),
        )
        .with_value(7u32);

        assert_matches!(future.get().await, Err(ExecutorError::ExecutionFailed(_)));
    }

    #[tokio::test]
    async fn test_local_value_of_wrong_type() {
        let future = ResultFuture::immediate(Ok(Response::Value(Arc::new("text"))), decoder::<u64>());
        assert_matches!(
            future.get().await,
            Err(ExecutorError::Codec(CodecError::TypeMismatch(_)))
        );
    }

    #[tokio::test]
    async fn test_cancel_is_not_authoritative() {
        let (sender, pending) = PendingResponse::channel(Uuid::new_v4());
        let future = ResultFuture::pending(pending, decoder::<u64>());

        assert!(!future.cancel(true));
        assert!(future.is_cancelled());
        assert!(future.is_done());

        sender.send(Ok(payload(&3u64)));
        assert_eq!(future.get().await.unwrap(), 3);
    }
}
