//! Core types for the repository cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream-assigned identifier of a record. Stable across fetches.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

/// Owner of a record. Only the login is persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

impl Owner {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

/// One cached upstream repository.
///
/// Identity is the `id`: two records with the same id are the same entity
/// even when their other fields differ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub full_name: String,
    pub owner: Owner,
}

impl Record {
    /// Build a record from its persisted fields.
    pub fn new(
        id: impl Into<RecordId>,
        name: impl Into<String>,
        full_name: impl Into<String>,
        owner_login: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            full_name: full_name.into(),
            owner: Owner::new(owner_login),
        }
    }

    /// Whether `other` names the same upstream entity.
    pub fn same_entity(&self, other: &Record) -> bool {
        self.id == other.id
    }
}

/// Ordered collection of records, in storage order.
pub type RecordSet = Vec<Record>;
