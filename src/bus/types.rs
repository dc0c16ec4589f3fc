//! Subscription types for the change bus.

use crate::types::RecordSet;
use crossbeam_channel::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a bus subscription.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Max pending snapshots before the oldest one is discarded.
    /// Default: 64
    pub buffer_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { buffer_size: 64 }
    }
}

/// Unique identifier for a bus subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// State shared between a subscriber slot and its handle.
#[derive(Debug)]
pub(crate) struct SlotState {
    /// Snapshots discarded because the buffer was full.
    pub(crate) lagged: AtomicU64,
    /// Cleared when the handle goes away; the slot is pruned on next publish.
    pub(crate) open: AtomicBool,
}

impl SlotState {
    pub(crate) fn new() -> Self {
        Self {
            lagged: AtomicU64::new(0),
            open: AtomicBool::new(true),
        }
    }
}

/// Receiving end of a bus subscription.
///
/// Dropping the handle closes the slot; the bus forgets it on its next
/// emission.
pub struct BusSubscription {
    pub id: SubscriptionId,
    pub(crate) receiver: Receiver<RecordSet>,
    pub(crate) state: Arc<SlotState>,
}

impl BusSubscription {
    /// Receive the next snapshot (blocking).
    pub fn recv(&self) -> Result<RecordSet, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a snapshot (non-blocking).
    pub fn try_recv(&self) -> Result<RecordSet, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<RecordSet, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Raw channel, for callers multiplexing with `crossbeam_channel::select!`.
    pub fn receiver(&self) -> &Receiver<RecordSet> {
        &self.receiver
    }

    /// Number of snapshots this subscriber lost to buffer overflow.
    pub fn lagged(&self) -> u64 {
        self.state.lagged.load(Ordering::Acquire)
    }
}

impl Drop for BusSubscription {
    fn drop(&mut self) {
        self.state.open.store(false, Ordering::Release);
    }
}
