//! One-way forwarding of replicated-map entry events

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tracing::trace;
use uuid::Uuid;

use crate::member::MemberId;
use crate::partition::PartitionKey;

/// Kind of change to a single entry
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EntryEventKind {
    /// Entry was created
    Added,
    /// Entry was deleted
    Removed,
    /// Entry value was replaced
    Updated,
    /// Entry was evicted
    Evicted,
}

/// Change to a single entry of a replicated map
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryEvent {
    /// What happened to the entry
    pub kind: EntryEventKind,
    /// Encoded entry key
    pub key: Bytes,
    /// Value before the change, if any
    pub old_value: Option<Bytes>,
    /// Value after the change, if any
    pub value: Option<Bytes>,
    /// Value being merged in, if the change came from a merge
    pub merging_value: Option<Bytes>,
    /// Member on which the change happened
    pub member: MemberId,
}

/// Change affecting a whole map
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MapEventKind {
    /// Every entry was removed
    Cleared,
    /// Every entry was evicted
    EvictedAll,
}

/// Receiver of entry and map events
pub trait EntryListener: Send + Sync {
    /// Handle a change to one entry
    fn on_entry_event(&self, event: EntryEvent);

    /// Handle a change to the whole map
    fn on_map_event(&self, kind: MapEventKind, member: MemberId, affected: usize);
}

/// Entry event tagged with the registration and partition key it belongs to
#[derive(Clone, Debug)]
pub struct ForwardedEvent {
    /// Listener registration this event was produced for
    pub registration_id: Uuid,
    /// Partition key of the entry, so ordering per key can be preserved
    pub partition_key: PartitionKey,
    /// The event itself
    pub event: EntryEvent,
}

/// Forwards entry events to a remote endpoint while it stays alive
///
/// Map-wide events are dropped.
#[derive(Clone, Debug)]
pub struct EventForwarder {
    registration_id: Uuid,
    sender: flume::Sender<ForwardedEvent>,
    alive: Arc<AtomicBool>,
}

impl EventForwarder {
    /// Create a forwarder and the receiving half of its channel
    #[must_use]
    pub fn new() -> (Self, flume::Receiver<ForwardedEvent>) {
        let (sender, receiver) = flume::unbounded();
        (
            Self {
                registration_id: Uuid::new_v4(),
                sender,
                alive: Arc::new(AtomicBool::new(true)),
            },
            receiver,
        )
    }

    /// Registration ID of this forwarder
    #[must_use]
    pub const fn registration_id(&self) -> Uuid {
        self.registration_id
    }

    /// Whether events are still being forwarded
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.sender.is_disconnected()
    }

    /// Stop forwarding
    pub fn close(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl EntryListener for EventForwarder {
    fn on_entry_event(&self, event: EntryEvent) {
        if !self.is_alive() {
            trace!(registration_id = %self.registration_id, "endpoint gone, dropping entry event");
            return;
        }

        let forwarded = ForwardedEvent {
            registration_id: self.registration_id,
            partition_key: PartitionKey::from(event.key.clone()),
            event,
        };
        if self.sender.send(forwarded).is_err() {
            self.close();
        }
    }

    fn on_map_event(&self, _kind: MapEventKind, _member: MemberId, _affected: usize) {}
}
