//! Upstream fetching interface.
//!
//! The transport (HTTP client, auth, retries) lives outside this crate. A
//! fetcher turns an owner login into the owner's complete, current list of
//! repositories or fails with a [`FetchError`].

use crate::error::FetchError;
use crate::types::{Owner, Record, RecordId, RecordSet};
use serde::Deserialize;

/// Source of truth for an owner's repositories.
pub trait RemoteFetcher: Send + Sync {
    fn fetch(&self, owner: &str) -> Result<RecordSet, FetchError>;
}

impl<F> RemoteFetcher for F
where
    F: Fn(&str) -> Result<RecordSet, FetchError> + Send + Sync,
{
    fn fetch(&self, owner: &str) -> Result<RecordSet, FetchError> {
        self(owner)
    }
}

/// Upstream ids arrive as numbers; older payloads used strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct WireOwner {
    login: String,
}

#[derive(Deserialize)]
struct WireRepo {
    id: WireId,
    name: String,
    full_name: String,
    owner: WireOwner,
}

impl From<WireRepo> for Record {
    fn from(repo: WireRepo) -> Self {
        let id = match repo.id {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        };
        Record {
            id: RecordId(id),
            name: repo.name,
            full_name: repo.full_name,
            owner: Owner {
                login: repo.owner.login,
            },
        }
    }
}

/// Parse an upstream repository listing.
///
/// Expects a JSON array of repository objects. Fields other than `id`,
/// `name`, `full_name` and `owner.login` are ignored. Order is preserved.
pub fn parse_records(body: &[u8]) -> Result<RecordSet, FetchError> {
    let repos: Vec<WireRepo> = serde_json::from_slice(body)?;
    Ok(repos.into_iter().map(Record::from).collect())
}
