//! Caller-facing executor handle

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::SERVICE_NAME;
use crate::cluster::NodeContext;
use crate::codec::{CborCodec, Codec, Decode};
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};
use crate::fanout::CallbackFanout;
use crate::future::ResultFuture;
use crate::invocation::{Invocation, InvocationTarget, PendingResponse};
use crate::member::Member;
use crate::operation::ExecutorOperation;
use crate::partition::{PartitionKey, PartitionRouter};
use crate::shutdown::ShutdownCoordinator;
use crate::stats::ExecutorStats;
use crate::target::{Fanout, Target};
use crate::task::{ExecutionCallback, MultiExecutionCallback, Task};
use crate::throttle::SubmissionThrottle;

/// Named executor running tasks on cluster members
///
/// Two submission forms are offered. The blocking form (`submit*`) returns a
/// [`ResultFuture`] and, during bursts, periodically waits for its own result
/// before returning. The callback form (`*_with_callback`) returns as soon as
/// the invocation is dispatched and reports through the callback later; it
/// spawns one Tokio task per invocation and must run inside a Tokio runtime.
///
/// Once the executor is shut down, every submission fails with
/// [`ExecutorError::RejectedSubmission`].
pub struct ExecutorProxy<C: Codec = CborCodec> {
    name: String,
    context: NodeContext<C>,
    router: PartitionRouter,
    throttle: SubmissionThrottle,
    config: ExecutorConfig,
}

impl<C: Codec> ExecutorProxy<C> {
    /// Create a proxy for the executor `name`
    pub fn new(name: impl Into<String>, context: NodeContext<C>, config: ExecutorConfig) -> Self {
        let router = PartitionRouter::new(Arc::clone(context.partitions()));
        let throttle = SubmissionThrottle::new(&config);
        Self {
            name: name.into(),
            context,
            router,
            throttle,
            config,
        }
    }

    /// Name of this executor
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration of this proxy
    #[must_use]
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    // Blocking form

    /// Submit a task to the partition chosen by its affinity key, or a random one
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn submit<T: Task>(&self, task: T) -> ExecutorResult<ResultFuture<T::Output>> {
        self.submit_to(task, Target::Routed).await
    }

    /// Submit a task to an explicit target
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down, the task cannot be encoded, or an
    /// explicit partition lies outside the partition table.
    pub async fn submit_to<T: Task>(
        &self,
        task: T,
        target: Target,
    ) -> ExecutorResult<ResultFuture<T::Output>> {
        self.ensure_running()?;
        let destination = self.resolve(&task, &target)?;
        let payload = self.encode_task(&task)?;
        Ok(self.invoke(destination, payload).await)
    }

    /// Submit a task to the owner of `key`'s partition
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn submit_to_key_owner<T: Task>(
        &self,
        task: T,
        key: impl Into<PartitionKey>,
    ) -> ExecutorResult<ResultFuture<T::Output>> {
        self.submit_to(task, Target::KeyOwner(key.into())).await
    }

    /// Submit a task to a specific member
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn submit_to_member<T: Task>(
        &self,
        task: T,
        member: &Member,
    ) -> ExecutorResult<ResultFuture<T::Output>> {
        self.submit_to(task, Target::Member(member.clone())).await
    }

    /// Submit a task without a result, yielding `result` once it succeeds
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn submit_with_result<T, R>(&self, task: T, result: R) -> ExecutorResult<ResultFuture<R>>
    where
        T: Task<Output = ()>,
        R: Clone + Send + Sync + 'static,
    {
        Ok(self.submit(task).await?.with_value(result))
    }

    /// Submit a task to each of `members`
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn submit_to_members<T: Task>(
        &self,
        task: T,
        members: Vec<Member>,
    ) -> ExecutorResult<HashMap<Member, ResultFuture<T::Output>>> {
        self.submit_fanout(task, Fanout::Members(members)).await
    }

    /// Submit a task to every current member
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn submit_to_all_members<T: Task>(
        &self,
        task: T,
    ) -> ExecutorResult<HashMap<Member, ResultFuture<T::Output>>> {
        self.submit_fanout(task, Fanout::All).await
    }

    /// Submit a task to a member set, one invocation per member
    ///
    /// A failing member only fails its own entry.
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn submit_fanout<T: Task>(
        &self,
        task: T,
        fanout: Fanout,
    ) -> ExecutorResult<HashMap<Member, ResultFuture<T::Output>>> {
        self.ensure_running()?;
        let payload = self.encode_task(&task)?;
        let members = self.members_of(fanout);

        let mut futures = HashMap::with_capacity(members.len());
        for member in members {
            let future = self
                .invoke(InvocationTarget::Address(member.address()), payload.clone())
                .await;
            futures.insert(member, future);
        }
        Ok(futures)
    }

    // Callback form

    /// Submit a task to its routed partition and report through `callback`
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub fn submit_with_callback<T, CB>(&self, task: T, callback: CB) -> ExecutorResult<()>
    where
        T: Task,
        CB: ExecutionCallback<T::Output>,
    {
        self.submit_to_with_callback(task, Target::Routed, callback)
    }

    /// Submit a task to an explicit target and report through `callback`
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down, the task cannot be encoded, or an
    /// explicit partition lies outside the partition table.
    pub fn submit_to_with_callback<T, CB>(
        &self,
        task: T,
        target: Target,
        callback: CB,
    ) -> ExecutorResult<()>
    where
        T: Task,
        CB: ExecutionCallback<T::Output>,
    {
        self.ensure_running()?;
        let destination = self.resolve(&task, &target)?;
        let payload = self.encode_task(&task)?;
        let pending = self.dispatch(destination, payload);
        self.spawn_callback(pending, callback);
        Ok(())
    }

    /// Submit a task to the owner of `key`'s partition and report through `callback`
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub fn submit_to_key_owner_with_callback<T, CB>(
        &self,
        task: T,
        key: impl Into<PartitionKey>,
        callback: CB,
    ) -> ExecutorResult<()>
    where
        T: Task,
        CB: ExecutionCallback<T::Output>,
    {
        self.submit_to_with_callback(task, Target::KeyOwner(key.into()), callback)
    }

    /// Submit a task to a specific member and report through `callback`
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub fn submit_to_member_with_callback<T, CB>(
        &self,
        task: T,
        member: &Member,
        callback: CB,
    ) -> ExecutorResult<()>
    where
        T: Task,
        CB: ExecutionCallback<T::Output>,
    {
        self.submit_to_with_callback(task, Target::Member(member.clone()), callback)
    }

    /// Submit a task to each of `members` and report once all have answered
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub fn submit_to_members_with_callback<T, CB>(
        &self,
        task: T,
        members: Vec<Member>,
        callback: CB,
    ) -> ExecutorResult<()>
    where
        T: Task,
        CB: MultiExecutionCallback<T::Output>,
    {
        self.submit_fanout_with_callback(task, Fanout::Members(members), callback)
    }

    /// Submit a task to every current member and report once all have answered
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub fn submit_to_all_members_with_callback<T, CB>(
        &self,
        task: T,
        callback: CB,
    ) -> ExecutorResult<()>
    where
        T: Task,
        CB: MultiExecutionCallback<T::Output>,
    {
        self.submit_fanout_with_callback(task, Fanout::All, callback)
    }

    /// Submit a task to a member set and report once all have answered
    ///
    /// `callback` sees each member's result as it arrives and the complete
    /// mapping exactly once.
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub fn submit_fanout_with_callback<T, CB>(
        &self,
        task: T,
        fanout: Fanout,
        callback: CB,
    ) -> ExecutorResult<()>
    where
        T: Task,
        CB: MultiExecutionCallback<T::Output>,
    {
        self.ensure_running()?;
        let payload = self.encode_task(&task)?;
        let members = self.members_of(fanout);

        let aggregate = CallbackFanout::<T::Output>::new(members.clone(), Arc::new(callback));
        for member in &members {
            let pending = self.dispatch(InvocationTarget::Address(member.address()), payload.clone());
            self.spawn_callback(pending, aggregate.callback_for(member));
        }
        Ok(())
    }

    // Fire-and-forget

    /// Run a task on its routed partition, discarding the result
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn execute<T: Task>(&self, task: T) -> ExecutorResult<()> {
        self.submit(task).await.map(drop)
    }

    /// Run a task on the owner of `key`'s partition, discarding the result
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn execute_on_key_owner<T: Task>(
        &self,
        task: T,
        key: impl Into<PartitionKey>,
    ) -> ExecutorResult<()> {
        self.submit_to_key_owner(task, key).await.map(drop)
    }

    /// Run a task on a specific member, discarding the result
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn execute_on_member<T: Task>(&self, task: T, member: &Member) -> ExecutorResult<()> {
        self.submit_to_member(task, member).await.map(drop)
    }

    /// Run a task on each of `members`, discarding the results
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn execute_on_members<T: Task>(
        &self,
        task: T,
        members: Vec<Member>,
    ) -> ExecutorResult<()> {
        self.submit_to_members(task, members).await.map(drop)
    }

    /// Run a task on every current member, discarding the results
    ///
    /// # Errors
    ///
    /// Fails if the executor is shut down or the task cannot be encoded.
    pub async fn execute_on_all_members<T: Task>(&self, task: T) -> ExecutorResult<()> {
        self.submit_to_all_members(task).await.map(drop)
    }

    // Bulk composition

    /// Not offered by this executor
    ///
    /// # Errors
    ///
    /// Always returns [`ExecutorError::Unsupported`].
    #[allow(clippy::unused_self, clippy::needless_pass_by_value)]
    pub fn invoke_all<T: Task>(&self, _tasks: Vec<T>) -> ExecutorResult<Vec<ResultFuture<T::Output>>> {
        Err(ExecutorError::Unsupported("invoke_all"))
    }

    /// Not offered by this executor
    ///
    /// # Errors
    ///
    /// Always returns [`ExecutorError::Unsupported`].
    #[allow(clippy::unused_self, clippy::needless_pass_by_value)]
    pub fn invoke_any<T: Task>(&self, _tasks: Vec<T>) -> ExecutorResult<T::Output> {
        Err(ExecutorError::Unsupported("invoke_any"))
    }

    // Lifecycle

    /// Whether the executor is shut down on the local member
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.context.executor_service().is_shutdown(&self.name)
    }

    /// Same as [`is_shutdown`](Self::is_shutdown); in-flight tasks are not tracked
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.is_shutdown()
    }

    /// Shut the executor down on every current member
    ///
    /// Waits at most the configured shutdown timeout for remote members.
    pub async fn shutdown(&self) {
        ShutdownCoordinator::new(
            self.name.clone(),
            self.context.clone(),
            self.config.shutdown_timeout,
        )
        .run()
        .await;
    }

    /// Shut the executor down; tasks already running are not interrupted
    pub async fn shutdown_now(&self) {
        self.shutdown().await;
    }

    /// Termination of in-flight tasks is not tracked, so this never reports it
    #[must_use]
    #[allow(clippy::unused_self)]
    pub const fn await_termination(&self, _timeout: Duration) -> bool {
        false
    }

    /// Counters of this executor on the local member
    #[must_use]
    pub fn local_executor_stats(&self) -> ExecutorStats {
        self.context.executor_service().stats(&self.name)
    }

    fn ensure_running(&self) -> ExecutorResult<()> {
        if self.is_shutdown() {
            return Err(ExecutorError::RejectedSubmission {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn resolve<T: Task>(&self, task: &T, target: &Target) -> ExecutorResult<InvocationTarget> {
        Ok(match target {
            Target::Routed => InvocationTarget::Partition(self.router.route(task)),
            Target::Partition(partition) => {
                InvocationTarget::Partition(self.router.check(*partition)?)
            }
            Target::KeyOwner(key) => InvocationTarget::Partition(self.router.route_key(key)),
            Target::Member(member) => InvocationTarget::Address(member.address()),
        })
    }

    fn members_of(&self, fanout: Fanout) -> Vec<Member> {
        match fanout {
            Fanout::Members(members) => members,
            Fanout::All => self.context.cluster().members(),
        }
    }

    fn encode_task<T: Task>(&self, task: &T) -> ExecutorResult<Bytes> {
        let codec = self.context.codec();
        let operation = ExecutorOperation::Execute {
            executor: self.name.clone(),
            task_type: T::task_type().to_string(),
            payload: codec.encode(task)?,
        };
        Ok(codec.encode(&operation)?)
    }

    fn decoder<R: DeserializeOwned>(&self) -> Arc<dyn Decode<R>> {
        Arc::<C>::clone(self.context.codec())
    }

    fn dispatch(&self, target: InvocationTarget, payload: Bytes) -> PendingResponse {
        let invocation = Invocation::new(SERVICE_NAME, target, payload);
        trace!(
            executor = %self.name,
            correlation_id = %invocation.correlation_id(),
            %target,
            "dispatching invocation"
        );
        self.context.invocations().invoke(invocation)
    }

    async fn invoke<R>(&self, target: InvocationTarget, payload: Bytes) -> ResultFuture<R>
    where
        R: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let sync = self.throttle.should_sync();
        let pending = self.dispatch(target, payload);

        if sync {
            debug!(
                executor = %self.name,
                consecutive = self.throttle.consecutive(),
                "resolving burst submission synchronously"
            );
            let outcome = pending.await;
            ResultFuture::immediate(outcome, self.decoder())
        } else {
            ResultFuture::pending(pending, self.decoder())
        }
    }

    fn spawn_callback<R, CB>(&self, pending: PendingResponse, callback: CB)
    where
        R: DeserializeOwned + Clone + Send + Sync + 'static,
        CB: ExecutionCallback<R>,
    {
        let future = ResultFuture::pending(pending, self.decoder::<R>());
        tokio::spawn(async move {
            match future.get().await {
                Ok(response) => callback.on_response(response),
                Err(error) => callback.on_failure(error),
            }
        });
    }
}
