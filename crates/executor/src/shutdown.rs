//! Best-effort, bounded shutdown of an executor across the cluster

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::SERVICE_NAME;
use crate::cluster::NodeContext;
use crate::codec::Codec;
use crate::invocation::{Invocation, InvocationTarget};
use crate::operation::ExecutorOperation;

/// Issues one stop operation per member and waits a bounded time for each
pub struct ShutdownCoordinator<C: Codec> {
    name: String,
    context: NodeContext<C>,
    timeout: Duration,
}

impl<C: Codec> ShutdownCoordinator<C> {
    /// Create a coordinator for the executor `name`
    pub fn new(name: impl Into<String>, context: NodeContext<C>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            context,
            timeout,
        }
    }

    /// Stop the executor on every current member
    ///
    /// The local member is stopped in-process before any remote member is
    /// contacted, so local submissions are rejected from the start. Remote
    /// acknowledgements are awaited concurrently, each for at most the
    /// configured timeout; unreachable or failing members are logged and
    /// skipped. Returning does not mean remote members finished their
    /// in-flight tasks.
    pub async fn run(&self) {
        let cluster = self.context.cluster();
        let members = cluster.members();
        info!(executor = %self.name, members = members.len(), "shutting down executor");

        let operation = ExecutorOperation::Shutdown {
            executor: self.name.clone(),
        };
        let payload = match self.context.codec().encode(&operation) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(executor = %self.name, "cannot encode shutdown operation: {e}");
                None
            }
        };

        self.context.executor_service().shutdown_executor(&self.name);

        let mut acknowledgements = Vec::with_capacity(members.len());
        for member in members.iter().filter(|m| !cluster.is_local(m)) {
            let Some(payload) = payload.clone() else {
                continue;
            };

            let invocation = Invocation::new(
                SERVICE_NAME,
                InvocationTarget::Address(member.address()),
                payload,
            );
            let pending = self.context.invocations().invoke(invocation);
            let member = member.clone();
            let timeout = self.timeout;

            acknowledgements.push(async move {
                match tokio::time::timeout(timeout, pending).await {
                    Ok(Ok(_)) => debug!(%member, "member acknowledged shutdown"),
                    Ok(Err(e)) => warn!(%member, "shutdown not acknowledged: {e}"),
                    Err(_) => warn!(%member, ?timeout, "shutdown acknowledgement timed out"),
                }
            });
        }

        join_all(acknowledgements).await;
        debug!(executor = %self.name, "shutdown complete");
    }
}
