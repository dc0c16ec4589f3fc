//! Refresh outcomes and the handle a caller waits on.

use crate::error::SyncError;
use crate::fetch::RemoteFetcher;
use crate::store::RecordStore;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Final result of one refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Upstream was fetched and the store now holds the result.
    Completed(String),
    /// The refresh failed; the store was left as it was.
    Failed(SyncError),
}

impl RefreshOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RefreshOutcome::Completed(_))
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            RefreshOutcome::Completed(_) => None,
            RefreshOutcome::Failed(e) => Some(e),
        }
    }
}

/// Handle on a refresh running in the background.
///
/// Yields its outcome once. The outcome is delivered on whatever thread
/// calls into the handle; an event loop can also `select!` on
/// [`RefreshHandle::receiver`].
pub struct RefreshHandle {
    owner: String,
    receiver: Receiver<RefreshOutcome>,
}

impl RefreshHandle {
    pub(crate) fn new(owner: String, receiver: Receiver<RefreshOutcome>) -> Self {
        Self { owner, receiver }
    }

    /// Owner this refresh was started for.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Block until the refresh finishes.
    pub fn wait(self) -> RefreshOutcome {
        self.receiver
            .recv()
            .unwrap_or(RefreshOutcome::Failed(SyncError::WorkerUnavailable))
    }

    /// Block for at most `timeout`. `None` means still running.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RefreshOutcome> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                Some(RefreshOutcome::Failed(SyncError::WorkerUnavailable))
            }
        }
    }

    /// Outcome if already available.
    pub fn try_outcome(&self) -> Option<RefreshOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(RefreshOutcome::Failed(SyncError::WorkerUnavailable))
            }
        }
    }

    pub fn receiver(&self) -> &Receiver<RefreshOutcome> {
        &self.receiver
    }
}

/// Fetch `owner` from upstream and install the result in `store`.
///
/// Fetch failures never touch the store. No retry is attempted.
pub(crate) fn run_refresh(
    store: &RecordStore,
    fetcher: &dyn RemoteFetcher,
    owner: &str,
) -> RefreshOutcome {
    debug!(owner, "refresh started");

    let records = match fetcher.fetch(owner) {
        Ok(records) => records,
        Err(e) => {
            warn!(owner, error = %e, "refresh fetch failed");
            return RefreshOutcome::Failed(e.into());
        }
    };

    let count = records.len();
    match store.replace_all(records) {
        Ok(()) => {
            info!(owner, count, "refresh completed");
            RefreshOutcome::Completed(owner.to_string())
        }
        Err(e) => {
            warn!(owner, error = %e, "refresh could not write store");
            RefreshOutcome::Failed(e.into())
        }
    }
}
