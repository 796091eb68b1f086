//! Task and callback definitions

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ExecutorError, ExecutorResult, TaskFailure};
use crate::member::Member;
use crate::partition::PartitionKey;

/// A unit of work executed on a cluster member
///
/// Tasks travel to their target member serialized, so every member that may
/// run a task must have registered its type with its
/// [`ExecutorService`](crate::ExecutorService). Fire-and-forget tasks use
/// `Output = ()`.
#[async_trait]
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Value produced by the task
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Registry name of this task type, identical on every member
    fn task_type() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Key whose partition this task should run on, if any
    fn affinity_key(&self) -> Option<PartitionKey> {
        None
    }

    /// Run the task
    async fn call(self) -> Result<Self::Output, TaskFailure>;
}

/// Callback for the result of a single-target submission
pub trait ExecutionCallback<T>: Send + Sync + 'static {
    /// Called with the task's result
    fn on_response(&self, response: T);

    /// Called when the task or its invocation failed
    fn on_failure(&self, error: ExecutorError);
}

/// Callback for the results of a multi-member submission
pub trait MultiExecutionCallback<T>: Send + Sync + 'static {
    /// Called as each member reports, in arrival order
    fn on_response(&self, _member: &Member, _result: &ExecutorResult<T>) {}

    /// Called exactly once, after every member has reported
    fn on_complete(&self, results: HashMap<Member, ExecutorResult<T>>);
}
