//! Member-side execution of submitted tasks

use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::codec::{CborCodec, Codec};
use crate::error::TaskFailure;
use crate::invocation::Response;
use crate::operation::{ExecutorOperation, Origin};
use crate::stats::{ExecutorStats, LocalExecutorStats, StatsCollector};
use crate::task::Task;

/// Type-erased runner for one registered task type
trait TaskHandler: Send + Sync {
    fn run(&self, payload: Bytes, origin: Origin) -> BoxFuture<'static, Response>;
}

struct TypedHandler<T, C> {
    codec: Arc<C>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T, C> TaskHandler for TypedHandler<T, C>
where
    T: Task,
    C: Codec,
{
    fn run(&self, payload: Bytes, origin: Origin) -> BoxFuture<'static, Response> {
        let codec = Arc::clone(&self.codec);

        Box::pin(async move {
            let task: T = match codec.decode(&payload) {
                Ok(task) => task,
                Err(e) => return Response::Failure(TaskFailure::new(e.to_string())),
            };

            let output = match AssertUnwindSafe(task.call()).catch_unwind().await {
                Ok(Ok(output)) => output,
                Ok(Err(failure)) => return Response::Failure(failure),
                Err(panic) => return Response::Failure(TaskFailure::new(panic_message(&*panic))),
            };

            match origin {
                Origin::Local => Response::Value(Arc::new(output)),
                Origin::Remote => match codec.encode(&output) {
                    Ok(bytes) => Response::Payload(bytes),
                    Err(e) => Response::Failure(TaskFailure::new(e.to_string())),
                },
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .map_or_else(|| "task panicked".to_string(), |s| format!("task panicked: {s}"))
}

/// Executes tasks delivered to this member
///
/// One instance runs on every member. Task types must be registered before
/// tasks of that type can run here.
pub struct ExecutorService<C: Codec = CborCodec> {
    codec: Arc<C>,
    handlers: DashMap<&'static str, Arc<dyn TaskHandler>>,
    shut_down: DashSet<String>,
    stats: DashMap<String, Arc<LocalExecutorStats>>,
}

impl<C: Codec> ExecutorService<C> {
    /// Create an executor service using `codec` for tasks and results
    pub fn new(codec: Arc<C>) -> Self {
        Self {
            codec,
            handlers: DashMap::new(),
            shut_down: DashSet::new(),
            stats: DashMap::new(),
        }
    }

    /// Codec used for tasks and results
    #[must_use]
    pub const fn codec(&self) -> &Arc<C> {
        &self.codec
    }

    /// Register a task type so it can run on this member
    pub fn register<T: Task>(&self) {
        let handler: Arc<dyn TaskHandler> = Arc::new(TypedHandler::<T, C> {
            codec: Arc::clone(&self.codec),
            _phantom: PhantomData,
        });

        let task_type = T::task_type();
        self.handlers.insert(task_type, handler);

        info!("Registered task type: {task_type}");
    }

    /// Whether a task type is registered
    #[must_use]
    pub fn is_registered(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Execute an encoded [`ExecutorOperation`]
    ///
    /// Every outcome, including malformed operations, is reported as a
    /// [`Response`]; the caller never sees a transport-level error from here.
    pub async fn handle_operation(&self, payload: &[u8], origin: Origin) -> Response {
        let operation: ExecutorOperation = match self.codec.decode(payload) {
            Ok(operation) => operation,
            Err(e) => {
                warn!("Dropping undecodable executor operation: {e}");
                return Response::Failure(TaskFailure::new(e.to_string()));
            }
        };

        match operation {
            ExecutorOperation::Execute {
                executor,
                task_type,
                payload,
            } => self.execute(&executor, &task_type, payload, origin).await,
            ExecutorOperation::Shutdown { executor } => {
                self.shutdown_executor(&executor);
                match origin {
                    Origin::Local => Response::Value(Arc::new(())),
                    Origin::Remote => self.codec.encode(&()).map_or_else(
                        |e| Response::Failure(TaskFailure::new(e.to_string())),
                        Response::Payload,
                    ),
                }
            }
        }
    }

    async fn execute(
        &self,
        executor: &str,
        task_type: &str,
        payload: Bytes,
        origin: Origin,
    ) -> Response {
        if self.is_shutdown(executor) {
            debug!(executor, task_type, "rejecting task for shut down executor");
            return Response::Failure(TaskFailure::new(format!(
                "executor '{executor}' is shut down on this member"
            )));
        }

        let Some(handler) = self.handlers.get(task_type).map(|h| Arc::clone(h.value())) else {
            warn!(executor, task_type, "no handler registered for task type");
            return Response::Failure(TaskFailure::new(format!(
                "task type '{task_type}' is not registered on this member"
            )));
        };

        let stats = self.stats_for(executor);
        stats.task_started();
        debug!(executor, task_type, ?origin, "running task");

        let response = handler.run(payload, origin).await;

        stats.task_finished();
        response
    }

    /// Stop accepting tasks for `executor` on this member
    pub fn shutdown_executor(&self, executor: &str) {
        if self.shut_down.insert(executor.to_string()) {
            info!("Executor '{executor}' shut down");
        }
    }

    /// Whether `executor` has been shut down on this member
    #[must_use]
    pub fn is_shutdown(&self, executor: &str) -> bool {
        self.shut_down.contains(executor)
    }

    /// Snapshot of the counters of `executor` on this member
    ///
    /// Executors that never ran a task here report zeroed counters.
    #[must_use]
    pub fn stats(&self, executor: &str) -> ExecutorStats {
        self.stats.get(executor).map_or_else(
            || LocalExecutorStats::new().snapshot(),
            |stats| stats.value().snapshot(),
        )
    }

    fn stats_for(&self, executor: &str) -> Arc<LocalExecutorStats> {
        if let Some(stats) = self.stats.get(executor) {
            return Arc::clone(stats.value());
        }
        Arc::clone(
            self.stats
                .entry(executor.to_string())
                .or_insert_with(|| Arc::new(LocalExecutorStats::new()))
                .value(),
        )
    }
}

impl Default for ExecutorService<CborCodec> {
    fn default() -> Self {
        Self::new(Arc::new(CborCodec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Square(u64);

    #[async_trait]
    impl Task for Square {
        type Output = u64;

        async fn call(self) -> Result<u64, TaskFailure> {
            Ok(self.0 * self.0)
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Fail;

    #[async_trait]
    impl Task for Fail {
        type Output = ();

        async fn call(self) -> Result<(), TaskFailure> {
            Err(TaskFailure::new("refused"))
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Panic;

    #[async_trait]
    impl Task for Panic {
        type Output = ();

        async fn call(self) -> Result<(), TaskFailure> {
            panic!("kaboom")
        }
    }

    fn execute_op<T: Task>(executor: &str, task: &T) -> Bytes {
        let codec = CborCodec;
        codec
            .encode(&ExecutorOperation::Execute {
                executor: executor.to_string(),
                task_type: T::task_type().to_string(),
                payload: codec.encode(task).unwrap(),
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_local_result_is_not_serialized() {
        let service: ExecutorService = ExecutorService::default();
        service.register::<Square>();

        let response = service
            .handle_operation(&execute_op("calc", &Square(7)), Origin::Local)
            .await;

        assert_matches!(response, Response::Value(v) if v.downcast_ref::<u64>() == Some(&49));
    }

    #[tokio::test]
    async fn test_remote_result_is_serialized() {
        let service: ExecutorService = ExecutorService::default();
        service.register::<Square>();

        let response = service
            .handle_operation(&execute_op("calc", &Square(3)), Origin::Remote)
            .await;

        let Response::Payload(bytes) = response else {
            panic!("expected payload, got {response:?}");
        };
        assert_eq!(CborCodec.decode::<u64>(&bytes).unwrap(), 9);
    }

    #[tokio::test]
    async fn test_task_failure_and_panic_become_failures() {
        let service: ExecutorService = ExecutorService::default();
        service.register::<Fail>();
        service.register::<Panic>();

        let failed = service.handle_operation(&execute_op("e", &Fail), Origin::Remote).await;
        assert_matches!(failed, Response::Failure(f) if f.message() == "refused");

        let panicked = service.handle_operation(&execute_op("e", &Panic), Origin::Remote).await;
        assert_matches!(panicked, Response::Failure(f) if f.message().contains("kaboom"));

        let stats = service.stats("e");
        assert_eq!(stats.total_started, 2);
        assert_eq!(stats.total_finished, 2);
    }

    #[tokio::test]
    async fn test_unregistered_task_type() {
        let service: ExecutorService = ExecutorService::default();

        let response = service
            .handle_operation(&execute_op("calc", &Square(2)), Origin::Local)
            .await;

        assert_matches!(response, Response::Failure(f) if f.message().contains("not registered"));
    }

    #[tokio::test]
    async fn test_shutdown_operation_rejects_later_tasks() {
        let service: ExecutorService = ExecutorService::default();
        service.register::<Square>();

        let shutdown = CborCodec
            .encode(&ExecutorOperation::Shutdown {
                executor: "calc".to_string(),
            })
            .unwrap();
        service.handle_operation(&shutdown, Origin::Remote).await;
        assert!(service.is_shutdown("calc"));
        assert!(!service.is_shutdown("other"));

        let response = service
            .handle_operation(&execute_op("calc", &Square(2)), Origin::Local)
            .await;
        assert_matches!(response, Response::Failure(_));
        assert_eq!(service.stats("calc").total_started, 0);
    }

    #[tokio::test]
    async fn test_reading_stats_does_not_track_executor() {
        let service: ExecutorService = ExecutorService::default();
        service.register::<Square>();

        for name in ["a", "b", "c"] {
            assert_eq!(service.stats(name).total_started, 0);
        }
        assert!(service.stats.is_empty());

        service
            .handle_operation(&execute_op("a", &Square(2)), Origin::Local)
            .await;
        assert_eq!(service.stats("a").total_finished, 1);
        assert_eq!(service.stats.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_operation() {
        let service: ExecutorService = ExecutorService::default();
        let response = service.handle_operation(b"\xff\x00", Origin::Remote).await;
        assert_matches!(response, Response::Failure(_));
    }
}
