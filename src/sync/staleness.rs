//! Staleness policies deciding when cached records must be refreshed.

/// Predicate deciding whether the cached records for an owner must be
/// refreshed from upstream before they are trusted.
pub trait Staleness: Send + Sync {
    fn is_stale(&self, owner: &str) -> bool;
}

/// Every check reports stale, so every live view triggers a refresh.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysStale;

impl Staleness for AlwaysStale {
    fn is_stale(&self, _owner: &str) -> bool {
        true
    }
}

/// Never refresh implicitly; only explicit refreshes reach upstream.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverStale;

impl Staleness for NeverStale {
    fn is_stale(&self, _owner: &str) -> bool {
        false
    }
}

impl<F> Staleness for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_stale(&self, owner: &str) -> bool {
        self(owner)
    }
}
