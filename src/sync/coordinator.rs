//! Sync coordinator tying the store, the fetcher and the live views together.

use crate::bus::BusConfig;
use crate::fetch::RemoteFetcher;
use crate::store::RecordStore;
use crossbeam_channel::bounded;
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

use super::live_view::LiveView;
use super::refresh::RefreshHandle;
use super::staleness::{AlwaysStale, Staleness};
use super::worker::WorkerPool;

/// Coordinator configuration.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Number of background refresh threads.
    /// Default: 2
    pub workers: usize,

    /// Buffering for each live view.
    pub bus: BusConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            bus: BusConfig::default(),
        }
    }
}

/// Keeps a store in step with upstream and hands out live views of it.
///
/// Refreshes run on background workers. Results reach callers only through
/// the channels they hold (a [`RefreshHandle`] or a [`LiveView`]), so the
/// caller decides which thread consumes them.
pub struct SyncCoordinator {
    store: Arc<RecordStore>,
    staleness: Box<dyn Staleness>,
    config: CoordinatorConfig,
    workers: WorkerPool,
}

impl SyncCoordinator {
    /// Start a coordinator with the default "always stale" policy.
    pub fn new(
        store: Arc<RecordStore>,
        fetcher: Arc<dyn RemoteFetcher>,
        config: CoordinatorConfig,
    ) -> io::Result<Self> {
        let workers = WorkerPool::start(config.workers, Arc::clone(&store), fetcher)?;
        Ok(Self {
            store,
            staleness: Box::new(AlwaysStale),
            config,
            workers,
        })
    }

    /// Replace the staleness policy.
    pub fn with_staleness(mut self, policy: impl Staleness + 'static) -> Self {
        self.staleness = Box::new(policy);
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn is_stale(&self, owner: &str) -> bool {
        self.staleness.is_stale(owner)
    }

    /// Fetch `owner` from upstream and replace the store contents with the
    /// result. The returned handle is the only place the outcome shows up;
    /// on failure the store is untouched and nothing is retried.
    pub fn refresh_now(&self, owner: &str) -> RefreshHandle {
        let (respond, receiver) = bounded(1);
        self.workers.submit(owner.to_string(), respond);
        RefreshHandle::new(owner.to_string(), receiver)
    }

    /// Refresh only if the staleness policy asks for it.
    pub fn refresh_if_stale(&self, owner: &str) -> Option<RefreshHandle> {
        if self.is_stale(owner) {
            Some(self.refresh_now(owner))
        } else {
            debug!(owner, "cached records are fresh, skipping refresh");
            None
        }
    }

    /// Open a live view of the store for `owner`.
    ///
    /// If the data is stale a refresh is started in the background and not
    /// waited for; its failure never shows on the view, which keeps
    /// delivering the last good contents. Never fails: if the store cannot
    /// be read the initial snapshot is empty.
    pub fn subscribe_live_view(&self, owner: &str) -> LiveView {
        // Subscribed and read under the store's write lock, so the first
        // emission is exactly the first mutation after `initial`.
        let (subscription, snapshot) = self.store.subscribe_with_snapshot(self.config.bus.clone());

        if self.is_stale(owner) {
            let (respond, _) = bounded(1);
            self.workers.submit(owner.to_string(), respond);
        }

        let initial = match snapshot {
            Ok(records) => records,
            Err(e) => {
                warn!(owner, error = %e, "live view could not read store");
                Vec::new()
            }
        };

        LiveView::new(
            owner.to_string(),
            initial,
            subscription,
            Arc::clone(self.store.bus()),
        )
    }
}
