//! # Repository Cache
//!
//! A locally persisted snapshot of an owner's upstream repositories that
//! stays in step with upstream and streams every change to live observers.
//!
//! ## Core Concepts
//!
//! - **Record store**: durable table of records, rewritten atomically
//! - **Change bus**: fan-out of the full contents after every mutation
//! - **Remote fetcher**: pluggable source of an owner's repositories
//! - **Sync coordinator**: staleness checks, background refreshes, live views
//!
//! ## Example
//!
//! ```ignore
//! use repo_cache::{CoordinatorConfig, RecordStore, StoreConfig, SyncCoordinator};
//!
//! let store = Arc::new(RecordStore::open_or_create(StoreConfig {
//!     path: "./cache".into(),
//!     ..Default::default()
//! })?);
//!
//! let coordinator = SyncCoordinator::new(store, Arc::new(my_fetcher), CoordinatorConfig::default())?;
//!
//! let mut view = coordinator.subscribe_live_view("alice");
//! while let Some(records) = view.recv() {
//!     println!("{} repositories", records.len());
//! }
//! ```

pub mod bus;
pub mod error;
pub mod fetch;
pub mod store;
pub mod sync;
pub mod table;
pub mod types;

// Re-exports
pub use bus::{BusConfig, BusSubscription, ChangeBus, SubscriptionId};
pub use error::{FetchError, Result, StoreError, SyncError};
pub use fetch::{parse_records, RemoteFetcher};
pub use store::{RecordStore, StoreConfig};
pub use sync::{
    AlwaysStale, CoordinatorConfig, LiveView, LiveViewCanceller, NeverStale, RefreshHandle,
    RefreshOutcome, Staleness, SyncCoordinator,
};
pub use types::*;
