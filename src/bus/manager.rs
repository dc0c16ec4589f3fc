//! Fan-out of record snapshots to live subscribers.

use crate::types::RecordSet;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::types::{BusConfig, BusSubscription, SlotState, SubscriptionId};

/// Internal subscriber slot.
struct Subscriber {
    sender: Sender<RecordSet>,
    /// Second receiver on the same channel, used to evict the oldest entry.
    evict: Receiver<RecordSet>,
    state: Arc<SlotState>,
}

impl Subscriber {
    fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }

    /// Enqueue a snapshot, discarding the oldest pending one while full.
    /// Returns false if the slot is gone.
    fn deliver(&self, snapshot: RecordSet) -> bool {
        let mut pending = snapshot;
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return true,
                Err(TrySendError::Full(returned)) => {
                    if self.evict.try_recv().is_ok() {
                        self.state.lagged.fetch_add(1, Ordering::AcqRel);
                    }
                    pending = returned;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}

/// Broadcast point for store changes.
///
/// Every emission goes to every subscriber registered at the time of the
/// emission; nothing is replayed to later subscribers. Each subscriber has
/// its own bounded buffer, and a full buffer drops its oldest snapshot, so
/// a slow consumer never holds up the others and always ends on the newest
/// contents.
pub struct ChangeBus {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscriber>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber. It receives emissions from now on.
    pub fn subscribe(&self, config: BusConfig) -> BusSubscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));
        let state = Arc::new(SlotState::new());

        let subscriber = Subscriber {
            sender,
            evict: receiver.clone(),
            state: Arc::clone(&state),
        };
        self.subscriptions.write().insert(id, subscriber);
        debug!(subscription = id.0, "bus subscriber added");

        BusSubscription {
            id,
            receiver,
            state,
        }
    }

    /// Release a subscriber slot. Safe to call more than once; returns
    /// whether a slot was actually removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().remove(&id).is_some();
        if removed {
            debug!(subscription = id.0, "bus subscriber removed");
        }
        removed
    }

    /// Number of live subscriber slots.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Send `snapshot` to every current subscriber.
    pub fn publish(&self, snapshot: &RecordSet) {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if !sub.is_open() || !sub.deliver(snapshot.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                subs.remove(&id);
                debug!(subscription = id.0, "pruned closed bus subscriber");
            }
        }
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
