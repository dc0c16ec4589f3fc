//! Synchronization of the local store with upstream.
//!
//! [`SyncCoordinator`] decides when to refresh (via a [`Staleness`] policy),
//! runs refreshes on background workers and composes live views: the store
//! contents at subscription time, then every later change.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = SyncCoordinator::new(store, fetcher, CoordinatorConfig::default())?;
//!
//! // Drive a loading indicator from an explicit refresh.
//! let handle = coordinator.refresh_now("alice");
//!
//! for records in coordinator.subscribe_live_view("alice") {
//!     render(&records);
//! }
//! ```

mod coordinator;
mod live_view;
mod refresh;
mod staleness;
mod worker;

pub use coordinator::{CoordinatorConfig, SyncCoordinator};
pub use live_view::{LiveView, LiveViewCanceller};
pub use refresh::{RefreshHandle, RefreshOutcome};
pub use staleness::{AlwaysStale, NeverStale, Staleness};
