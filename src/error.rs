//! Error types for the repository cache.

use thiserror::Error;

/// Errors raised by the persisted record table.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Errors raised while producing records from upstream.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure or timeout reaching upstream.
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream answered with a payload we could not understand.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Parse(e.to_string())
    }
}

/// Errors surfaced to callers of an explicit refresh.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Refresh worker is no longer running")]
    WorkerUnavailable,
}

impl SyncError {
    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, SyncError::Parse(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, SyncError::Storage(_))
    }
}

impl From<FetchError> for SyncError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Network(msg) => SyncError::Network(msg),
            FetchError::Parse(msg) => SyncError::Parse(msg),
        }
    }
}

// Outcomes travel through channels by value, so the storage cause is rendered.
impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Storage(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
