//! Persisted record table.
//!
//! The table is a single file holding every row. Writes never modify the
//! live file: a complete new table is written beside it and renamed over
//! it, so a reader always sees either the old or the new contents.

mod file;

pub use file::{TableFile, TABLE_FILE_NAME};
