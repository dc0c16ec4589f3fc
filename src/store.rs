//! The record store: sole owner of the persisted repository table.

use crate::bus::{BusConfig, BusSubscription, ChangeBus};
use crate::error::{Result, StoreError};
use crate::table::TableFile;
use crate::types::{Record, RecordSet};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// fsync every table rewrite before it is swapped in.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./repo-cache"),
            create_if_missing: true,
            sync_writes: true,
        }
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"RPC\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Durable keyed table of records.
///
/// Mutations are serialized on one lock and each successful mutation is
/// followed by exactly one emission of the full contents on the change bus,
/// made while the lock is still held so emission order matches mutation
/// order. Reads do not take the lock: the table file is replaced by an
/// atomic rename, so a scan sees either the previous or the next contents.
pub struct RecordStore {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Persisted table.
    table: TableFile,

    /// Change notifications.
    bus: Arc<ChangeBus>,

    /// Lock for write operations.
    write_lock: Mutex<()>,
}

impl RecordStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    /// Create a new, empty store.
    ///
    /// A table left in `config.path` by an earlier store is discarded.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;
        Self::write_manifest(&config.path)?;

        let store = Self::assemble(config, lock_file);
        store.table.discard()?;

        info!(path = %store.path().display(), "created record store");
        Ok(store)
    }

    /// Open an existing store.
    ///
    /// The table is decoded once up front so a corrupt store is refused at
    /// open rather than on first read. A write staged by an interrupted
    /// rewrite is removed.
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let store = Self::assemble(config, lock_file);
        store.table.discard_staged()?;
        let count = store.table.read()?.len();

        debug!(path = %store.path().display(), records = count, "opened record store");
        Ok(store)
    }

    fn assemble(config: StoreConfig, lock_file: File) -> Self {
        let table = TableFile::new(&config.path, config.sync_writes);
        Self {
            config,
            _lock_file: lock_file,
            table,
            bus: Arc::new(ChangeBus::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Change bus this store publishes on.
    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    /// Subscribe to the store's change bus.
    pub fn subscribe(&self, config: BusConfig) -> BusSubscription {
        self.bus.subscribe(config)
    }

    /// Subscribe to the change bus and read the current contents as one
    /// step.
    ///
    /// Taken under the write lock, so no mutation lands between the two: the
    /// first emission the subscription sees is the first mutation after the
    /// returned contents. A failed read still yields a live subscription.
    pub fn subscribe_with_snapshot(
        &self,
        config: BusConfig,
    ) -> (BusSubscription, Result<RecordSet>) {
        let _lock = self.write_lock.lock();
        let subscription = self.bus.subscribe(config);
        let snapshot = self.table.read();
        (subscription, snapshot)
    }

    // --- Reads ---

    /// All persisted records in storage order.
    pub fn scan_all(&self) -> Result<RecordSet> {
        self.table.read()
    }

    /// Number of persisted records.
    pub fn len(&self) -> Result<usize> {
        Ok(self.scan_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // --- Mutations ---

    /// Discard all records and install `records` as the sole contents.
    ///
    /// Records sharing an identifier collapse into one: the last occurrence
    /// wins, at the position of the first. On failure the previous contents
    /// stay in place and nothing is published.
    pub fn replace_all(&self, records: RecordSet) -> Result<()> {
        let records = dedup_by_id(records);

        let _lock = self.write_lock.lock();
        self.table.write(&records)?;
        debug!(count = records.len(), "replaced record table");

        self.bus.publish(&records);
        Ok(())
    }

    /// Insert `record`, or overwrite the record with the same identifier in
    /// place. Publishes the full resulting contents, not just the record.
    pub fn insert_one(&self, record: Record) -> Result<()> {
        let _lock = self.write_lock.lock();

        let mut records = self.table.read()?;
        match records.iter_mut().find(|r| r.same_entity(&record)) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.table.write(&records)?;
        debug!(count = records.len(), "upserted record");

        self.bus.publish(&records);
        Ok(())
    }

    /// Remove every record and publish the empty set.
    pub fn clear(&self) -> Result<()> {
        let _lock = self.write_lock.lock();

        let empty = RecordSet::new();
        self.table.write(&empty)?;
        debug!("cleared record table");

        self.bus.publish(&empty);
        Ok(())
    }

    // --- Internal Helpers ---

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;

        Ok(lock_file)
    }
}

/// Collapse duplicate identifiers: last value wins, first position kept.
fn dedup_by_id(records: RecordSet) -> RecordSet {
    let mut positions: HashMap<_, usize> = HashMap::with_capacity(records.len());
    let mut out: RecordSet = Vec::with_capacity(records.len());

    for record in records {
        let seen = positions.get(&record.id).copied();
        match seen {
            Some(pos) => out[pos] = record,
            None => {
                positions.insert(record.id.clone(), out.len());
                out.push(record);
            }
        }
    }

    out
}
