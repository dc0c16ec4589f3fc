//! Live view: current contents followed by every later change.

use crate::bus::{BusSubscription, ChangeBus, SubscriptionId};
use crate::types::RecordSet;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cancels a [`LiveView`], possibly from another thread.
///
/// Cancelling more than once is a no-op. Cancellation releases the bus slot
/// and wakes a consumer blocked in `recv`; it never reaches a refresh that
/// was already started.
#[derive(Clone)]
pub struct LiveViewCanceller {
    bus: Arc<ChangeBus>,
    id: SubscriptionId,
    cancelled: Arc<AtomicBool>,
}

impl LiveViewCanceller {
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.bus.unsubscribe(self.id);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// One observer's session on a store.
///
/// The first item is the store contents at subscription time, after that
/// every change bus emission in order. The sequence only ends when the view
/// is cancelled or dropped.
pub struct LiveView {
    owner: String,
    initial: Option<RecordSet>,
    subscription: BusSubscription,
    canceller: LiveViewCanceller,
}

impl LiveView {
    pub(crate) fn new(
        owner: String,
        initial: RecordSet,
        subscription: BusSubscription,
        bus: Arc<ChangeBus>,
    ) -> Self {
        let canceller = LiveViewCanceller {
            bus,
            id: subscription.id,
            cancelled: Arc::new(AtomicBool::new(false)),
        };
        Self {
            owner,
            initial: Some(initial),
            subscription,
            canceller,
        }
    }

    /// Owner this view was opened for.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Block for the next snapshot. `None` once cancelled.
    pub fn recv(&mut self) -> Option<RecordSet> {
        if self.is_cancelled() {
            return None;
        }
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }
        self.subscription.recv().ok()
    }

    pub fn try_recv(&mut self) -> Result<RecordSet, TryRecvError> {
        if self.is_cancelled() {
            return Err(TryRecvError::Disconnected);
        }
        if let Some(initial) = self.initial.take() {
            return Ok(initial);
        }
        self.subscription.try_recv()
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<RecordSet, RecvTimeoutError> {
        if self.is_cancelled() {
            return Err(RecvTimeoutError::Disconnected);
        }
        if let Some(initial) = self.initial.take() {
            return Ok(initial);
        }
        self.subscription.recv_timeout(timeout)
    }

    /// Channel carrying the updates after the initial snapshot, for use with
    /// `crossbeam_channel::select!`. Take the initial snapshot with one of
    /// the `recv` methods first.
    pub fn updates(&self) -> &Receiver<RecordSet> {
        self.subscription.receiver()
    }

    /// Snapshots this view lost because it fell behind.
    pub fn lagged(&self) -> u64 {
        self.subscription.lagged()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.canceller.is_cancelled()
    }

    pub fn canceller(&self) -> LiveViewCanceller {
        self.canceller.clone()
    }
}

impl Iterator for LiveView {
    type Item = RecordSet;

    fn next(&mut self) -> Option<RecordSet> {
        self.recv()
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}
