//! Single-file record table with atomic swap on write.

use crate::error::{Result, StoreError};
use crate::types::{Owner, Record, RecordId, RecordSet};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// File name of the live table inside the store directory.
pub const TABLE_FILE_NAME: &str = "records.tbl";

/// Magic bytes for the table file.
const TABLE_MAGIC: &[u8; 4] = b"RTB\0";

/// Current table format version.
const TABLE_VERSION: u8 = 1;

/// magic + version + payload length
const TABLE_HEADER_SIZE: usize = 4 + 1 + 8;

/// Upper bound on a payload we are willing to allocate for.
const MAX_PAYLOAD_LEN: u64 = 256 * 1024 * 1024;

/// One persisted row. Extended owner attributes are not kept.
#[derive(Serialize, Deserialize)]
struct Row {
    id: String,
    name: String,
    full_name: String,
    owner_login: String,
}

impl From<&Record> for Row {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.0.clone(),
            name: record.name.clone(),
            full_name: record.full_name.clone(),
            owner_login: record.owner.login.clone(),
        }
    }
}

impl From<Row> for Record {
    fn from(row: Row) -> Self {
        Record {
            id: RecordId(row.id),
            name: row.name,
            full_name: row.full_name,
            owner: Owner { login: row.owner_login },
        }
    }
}

/// Handle to the table file. Holds only paths; every operation opens the
/// file, does its work and closes it again.
#[derive(Clone, Debug)]
pub struct TableFile {
    path: PathBuf,
    tmp_path: PathBuf,
    sync_writes: bool,
}

impl TableFile {
    /// Table living in `dir`.
    pub fn new(dir: impl AsRef<Path>, sync_writes: bool) -> Self {
        let path = dir.as_ref().join(TABLE_FILE_NAME);
        let tmp_path = dir.as_ref().join(format!("{}.tmp", TABLE_FILE_NAME));
        Self {
            path,
            tmp_path,
            sync_writes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the next write is staged at before being swapped in.
    pub fn staging_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Read every row in storage order. A missing file is an empty table.
    pub fn read(&self) -> Result<RecordSet> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        decode(&bytes)
    }

    /// Replace the whole table with `records`.
    ///
    /// On error the staged file is discarded and the live table is untouched.
    pub fn write(&self, records: &[Record]) -> Result<()> {
        let bytes = encode(records)?;

        if let Err(e) = self.stage(&bytes) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&self.tmp_path, &self.path) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(e.into());
        }

        Ok(())
    }

    /// Remove the table and any staged write, leaving an empty table.
    pub fn discard(&self) -> Result<()> {
        self.discard_staged()?;
        remove_if_present(&self.path)
    }

    /// Remove a staged write left behind by an interrupted rewrite.
    pub fn discard_staged(&self) -> Result<()> {
        remove_if_present(&self.tmp_path)
    }

    fn stage(&self, bytes: &[u8]) -> Result<()> {
        let mut file = File::create(&self.tmp_path)?;
        file.write_all(bytes)?;
        if self.sync_writes {
            file.sync_all()?;
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn encode(records: &[Record]) -> Result<Vec<u8>> {
    let rows: Vec<Row> = records.iter().map(Row::from).collect();
    let payload = rmp_serde::to_vec(&rows)?;

    let mut bytes = Vec::with_capacity(TABLE_HEADER_SIZE + payload.len() + 4);
    bytes.extend_from_slice(TABLE_MAGIC);
    bytes.push(TABLE_VERSION);
    bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<RecordSet> {
    if bytes.len() < TABLE_HEADER_SIZE {
        return Err(StoreError::Corruption("Table header truncated".into()));
    }

    if &bytes[0..4] != TABLE_MAGIC {
        return Err(StoreError::InvalidFormat("Invalid table magic".into()));
    }

    if bytes[4] != TABLE_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported table version: {}",
            bytes[4]
        )));
    }

    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&bytes[5..TABLE_HEADER_SIZE]);
    let len = u64::from_le_bytes(len_bytes);
    if len > MAX_PAYLOAD_LEN {
        return Err(StoreError::Corruption("Table payload too large".into()));
    }

    let len = len as usize;
    let end = TABLE_HEADER_SIZE + len;
    if bytes.len() != end + 4 {
        return Err(StoreError::Corruption(format!(
            "Table length mismatch: header says {} payload bytes, file has {}",
            len,
            bytes.len().saturating_sub(TABLE_HEADER_SIZE + 4)
        )));
    }

    let payload = &bytes[TABLE_HEADER_SIZE..end];
    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(&bytes[end..]);
    let stored = u32::from_le_bytes(checksum_bytes);
    let computed = crc32fast::hash(payload);
    if stored != computed {
        return Err(StoreError::ChecksumMismatch {
            expected: stored,
            got: computed,
        });
    }

    let rows: Vec<Row> = rmp_serde::from_slice(payload)?;
    Ok(rows.into_iter().map(Record::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> RecordSet {
        vec![
            Record::new("1", "r1", "alice/r1", "alice"),
            Record::new("2", "r2", "alice/r2", "alice"),
        ]
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let table = TableFile::new(dir.path(), true);

        assert!(table.read().unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read_preserves_order() {
        let dir = TempDir::new().unwrap();
        let table = TableFile::new(dir.path(), true);

        let mut records = sample();
        records.reverse();
        table.write(&records).unwrap();

        assert_eq!(table.read().unwrap(), records);
        assert!(!table.staging_path().exists());
    }

    #[test]
    fn test_failed_stage_keeps_old_contents() {
        let dir = TempDir::new().unwrap();
        let table = TableFile::new(dir.path(), false);
        table.write(&sample()).unwrap();

        // A directory in the staging slot makes File::create fail.
        fs::create_dir(table.staging_path()).unwrap();

        let result = table.write(&[Record::new("9", "r9", "bob/r9", "bob")]);
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(table.read().unwrap(), sample());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = TempDir::new().unwrap();
        let table = TableFile::new(dir.path(), false);
        table.write(&sample()).unwrap();

        let mut bytes = fs::read(table.path()).unwrap();
        let last = bytes.len() - 5;
        bytes[last] ^= 0xff;
        fs::write(table.path(), &bytes).unwrap();

        assert!(matches!(
            table.read(),
            Err(StoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_file_is_corruption() {
        let dir = TempDir::new().unwrap();
        let table = TableFile::new(dir.path(), false);
        table.write(&sample()).unwrap();

        let bytes = fs::read(table.path()).unwrap();
        fs::write(table.path(), &bytes[..bytes.len() - 3]).unwrap();

        assert!(matches!(table.read(), Err(StoreError::Corruption(_))));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = TempDir::new().unwrap();
        let table = TableFile::new(dir.path(), false);
        fs::write(table.path(), b"NOPE\x01\0\0\0\0\0\0\0\0\0\0\0\0").unwrap();

        assert!(matches!(table.read(), Err(StoreError::InvalidFormat(_))));
    }

    #[test]
    fn test_discard_leaves_empty_table() {
        let dir = TempDir::new().unwrap();
        let table = TableFile::new(dir.path(), false);
        table.write(&sample()).unwrap();
        fs::write(table.staging_path(), b"partial").unwrap();

        table.discard().unwrap();

        assert!(!table.path().exists());
        assert!(!table.staging_path().exists());
        assert!(table.read().unwrap().is_empty());

        // Nothing left to remove is not an error.
        table.discard().unwrap();
    }
}
