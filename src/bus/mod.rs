//! Change bus for live store updates.
//!
//! The store publishes its full contents after every successful mutation.
//! Subscribers receive every emission made after they subscribed, in
//! emission order:
//! - no replay of earlier emissions
//! - one bounded buffer per subscriber
//! - drop-oldest when a buffer is full (see [`BusSubscription::lagged`])
//!
//! # Example
//!
//! ```ignore
//! let bus = ChangeBus::new();
//! let handle = bus.subscribe(BusConfig::default());
//!
//! bus.publish(&records);
//! let latest = handle.recv()?;
//! ```

mod manager;
mod types;

pub use manager::ChangeBus;
pub use types::{BusConfig, BusSubscription, SubscriptionId};
