//! Aggregation of per-member results into one multi-member callback

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ExecutorError, ExecutorResult, InvocationError, TaskFailure};
use crate::member::{Member, MemberId};
use crate::task::{ExecutionCallback, MultiExecutionCallback};

/// Collects one result per expected member and completes exactly once
///
/// Reports may arrive concurrently and in any order. Reports from members
/// outside the expected set, and repeated reports for a member that already
/// reported, are ignored.
pub struct CallbackFanout<T> {
    state: Arc<FanoutState<T>>,
}

struct FanoutState<T> {
    expected: HashMap<MemberId, Member>,
    reported: Mutex<HashSet<MemberId>>,
    results: Mutex<Option<HashMap<Member, ExecutorResult<T>>>>,
    callback: Arc<dyn MultiExecutionCallback<T>>,
}

impl<T: Send + 'static> CallbackFanout<T> {
    /// Create a fan-out expecting one report from each of `members`
    ///
    /// An empty member set completes immediately with an empty result map.
    pub fn new(members: Vec<Member>, callback: Arc<dyn MultiExecutionCallback<T>>) -> Self {
        let expected: HashMap<MemberId, Member> = members
            .into_iter()
            .map(|member| (*member.id(), member))
            .collect();
        let empty = expected.is_empty();
        let capacity = expected.len();

        let fanout = Self {
            state: Arc::new(FanoutState {
                expected,
                reported: Mutex::new(HashSet::with_capacity(capacity)),
                results: Mutex::new(Some(HashMap::with_capacity(capacity))),
                callback,
            }),
        };

        if empty {
            debug!("fan-out over no members, completing immediately");
            fanout.complete_if_ready();
        }

        fanout
    }

    /// Number of members expected to report
    #[must_use]
    pub fn expected(&self) -> usize {
        self.state.expected.len()
    }

    /// Whether the aggregate callback has fired
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.results.lock().is_none()
    }

    /// Per-member callback that reports into this fan-out
    #[must_use]
    pub fn callback_for(&self, member: &Member) -> MemberCallback<T> {
        MemberCallback {
            member: member.clone(),
            state: Arc::clone(&self.state),
        }
    }

    /// Record the result of one member
    pub fn report(&self, member: &Member, result: ExecutorResult<T>) {
        self.state.report(member, result);
    }

    /// Record a failure for a member that left before responding
    pub fn member_removed(&self, member: &Member) {
        self.state.report(
            member,
            Err(ExecutorError::ExecutionFailed(TaskFailure::from(
                InvocationError::MemberLeft(*member.id()),
            ))),
        );
    }

    fn complete_if_ready(&self) {
        self.state.complete_if_ready();
    }
}

impl<T> Clone for CallbackFanout<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Send + 'static> FanoutState<T> {
    fn report(&self, member: &Member, result: ExecutorResult<T>) {
        let Some(member) = self.expected.get(member.id()) else {
            trace!(%member, "ignoring report from member outside the fan-out");
            return;
        };

        if !self.reported.lock().insert(*member.id()) {
            trace!(%member, "ignoring repeated report");
            return;
        }

        self.callback.on_response(member, &result);

        let completed = {
            let mut results = self.results.lock();
            let Some(collected) = results.as_mut() else {
                return;
            };
            collected.insert(member.clone(), result);
            if collected.len() == self.expected.len() {
                results.take()
            } else {
                None
            }
        };

        if let Some(results) = completed {
            debug!(members = results.len(), "all members reported");
            self.callback.on_complete(results);
        }
    }

    fn complete_if_ready(&self) {
        let completed = {
            let mut results = self.results.lock();
            match results.as_ref() {
                Some(collected) if collected.len() == self.expected.len() => results.take(),
                _ => None,
            }
        };

        if let Some(results) = completed {
            self.callback.on_complete(results);
        }
    }
}

/// Per-member callback bound to a [`CallbackFanout`]
pub struct MemberCallback<T> {
    member: Member,
    state: Arc<FanoutState<T>>,
}

impl<T> MemberCallback<T> {
    /// Member this callback reports for
    #[must_use]
    pub const fn member(&self) -> &Member {
        &self.member
    }
}

impl<T: Send + 'static> ExecutionCallback<T> for MemberCallback<T> {
    fn on_response(&self, response: T) {
        self.state.report(&self.member, Ok(response));
    }

    fn on_failure(&self, error: ExecutorError) {
        self.state.report(&self.member, Err(error));
    }
}
