//! Background threads running refreshes.
//!
//! Refreshes block on the network and on the disk, so they run on a small
//! fixed pool of named threads fed through a channel. Each request carries
//! its own response channel; a requester that does not care about the
//! outcome simply drops the receiving end.

use crate::error::SyncError;
use crate::fetch::RemoteFetcher;
use crate::store::RecordStore;
use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

use super::refresh::{run_refresh, RefreshOutcome};

/// Operations sent to the worker threads.
pub(crate) enum RefreshOp {
    /// Fetch and store one owner, reporting on `respond`.
    Refresh {
        owner: String,
        respond: Sender<RefreshOutcome>,
    },

    /// Stop one worker thread.
    Shutdown,
}

pub(crate) struct WorkerPool {
    sender: Sender<RefreshOp>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn start(
        workers: usize,
        store: Arc<RecordStore>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> io::Result<Self> {
        let (sender, receiver) = unbounded();
        let mut pool = Self {
            sender,
            threads: Vec::new(),
        };

        for n in 0..workers.max(1) {
            let receiver = receiver.clone();
            let store = Arc::clone(&store);
            let fetcher = Arc::clone(&fetcher);
            // On error the pool is dropped and the threads already started
            // are shut down.
            let handle = thread::Builder::new()
                .name(format!("repo-cache-refresh-{}", n))
                .spawn(move || worker_loop(receiver, store, fetcher))?;
            pool.threads.push(handle);
        }

        debug!(workers = pool.threads.len(), "refresh workers started");
        Ok(pool)
    }

    /// Queue a refresh. If no worker is left to run it, the failure is
    /// reported on `respond` straight away.
    pub(crate) fn submit(&self, owner: String, respond: Sender<RefreshOutcome>) {
        if let Err(SendError(op)) = self.sender.send(RefreshOp::Refresh { owner, respond }) {
            if let RefreshOp::Refresh { respond, .. } = op {
                let _ = respond.send(RefreshOutcome::Failed(SyncError::WorkerUnavailable));
            }
        }
    }

    /// Stop all workers after the work already queued.
    pub(crate) fn shutdown(&mut self) {
        for _ in 0..self.threads.len() {
            let _ = self.sender.send(RefreshOp::Shutdown);
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    receiver: Receiver<RefreshOp>,
    store: Arc<RecordStore>,
    fetcher: Arc<dyn RemoteFetcher>,
) {
    while let Ok(op) = receiver.recv() {
        match op {
            RefreshOp::Refresh { owner, respond } => {
                let outcome = run_refresh(&store, fetcher.as_ref(), &owner);
                // Fire-and-forget requesters have dropped their receiver.
                let _ = respond.send(outcome);
            }
            RefreshOp::Shutdown => break,
        }
    }
    debug!("refresh worker stopped");
}
