//! File-backed store for persistent storage.
//!
//! Layout of a store directory:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK               # Advisory lock for single-process access
//! └─ entries.json       # The whole table, rewritten on every mutation
//! ```

use crate::clock;
use crate::entry::Entry;
use crate::error::{StorageError, StorageResult};
use crate::store::LocalStore;
use fs2::FileExt;
use kvsync_protocol::Bucket;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TABLE_FILE: &str = "entries.json";
/// Temporary file for atomic table writes.
const TABLE_TEMP: &str = "entries.json.tmp";

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct TableFile {
    format_version: u16,
    entries: Vec<Entry>,
}

/// A durable local store kept in a directory.
///
/// The full table lives in memory and is rewritten to disk on every
/// mutation using write-then-rename, so a crash leaves either the old or the
/// new table, never a torn one. A failed write rolls the in-memory table
/// back and surfaces the error.
///
/// # Thread Safety
///
/// The `FileStore` holds an exclusive lock on its directory. Only one
/// instance can exist per directory at a time, across processes.
///
/// # Example
///
/// ```no_run
/// use kvsync_storage::{FileStore, LocalStore};
/// use kvsync_protocol::Bucket;
/// use serde_json::json;
/// use std::path::Path;
///
/// let mut store = FileStore::open_with_create_dirs(Path::new("kv")).unwrap();
/// store.put("theme", json!("dark"), Bucket::global(), None).unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, Entry>,
    _lock_file: File,
}

impl FileStore {
    /// Opens the store in an existing directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist or is not a directory
    /// - Another process holds the lock (returns `Locked`)
    /// - The table file cannot be decoded (returns `Corrupted`)
    pub fn open(path: &Path) -> StorageResult<Self> {
        if !path.is_dir() {
            return Err(StorageError::InvalidPath {
                path: path.to_path_buf(),
                reason: "not a directory".into(),
            });
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        let entries = load_table(&path.join(TABLE_FILE))?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "opened file store");

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            _lock_file: lock_file,
        })
    }

    /// Opens the store, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;
        Self::open(path)
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the table to disk atomically.
    fn persist(&self) -> StorageResult<()> {
        let table = TableFile {
            format_version: FORMAT_VERSION,
            entries: self.entries.values().cloned().collect(),
        };
        let data = serde_json::to_vec(&table)?;

        let temp_path = self.path.join(TABLE_TEMP);
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.path.join(TABLE_FILE))?;
        self.sync_directory()
    }

    #[cfg(unix)]
    fn sync_directory(&self) -> StorageResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StorageResult<()> {
        // NTFS journals the rename
        Ok(())
    }
}

fn load_table(path: &Path) -> StorageResult<BTreeMap<String, Entry>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    if data.is_empty() {
        return Ok(BTreeMap::new());
    }

    let table: TableFile =
        serde_json::from_slice(&data).map_err(|e| StorageError::Corrupted(e.to_string()))?;
    if table.format_version > FORMAT_VERSION {
        return Err(StorageError::Corrupted(format!(
            "unsupported format version: {}",
            table.format_version
        )));
    }

    Ok(table
        .entries
        .into_iter()
        .map(|entry| (entry.key.clone(), entry))
        .collect())
}

impl LocalStore for FileStore {
    fn put(
        &mut self,
        key: &str,
        value: Value,
        bucket: Bucket,
        timestamp: Option<i64>,
    ) -> StorageResult<Entry> {
        let timestamp = timestamp.unwrap_or_else(clock::next_timestamp);
        let entry = Entry::new(key, value, timestamp, bucket);
        let previous = self.entries.insert(key.to_owned(), entry.clone());

        if let Err(err) = self.persist() {
            match previous {
                Some(previous) => self.entries.insert(key.to_owned(), previous),
                None => self.entries.remove(key),
            };
            return Err(err);
        }
        Ok(entry)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Entry>> {
        Ok(self.entries.get(key).cloned())
    }

    fn remove(&mut self, key: &str) -> StorageResult<Option<Entry>> {
        let Some(removed) = self.entries.remove(key) else {
            return Ok(None);
        };

        if let Err(err) = self.persist() {
            self.entries.insert(key.to_owned(), removed);
            return Err(err);
        }
        Ok(Some(removed))
    }

    fn all_entries(&self) -> StorageResult<Vec<Entry>> {
        Ok(self.entries.values().cloned().collect())
    }

    fn clear(&mut self) -> StorageResult<()> {
        let previous = std::mem::take(&mut self.entries);
        if let Err(err) = self.persist() {
            self.entries = previous;
            return Err(err);
        }
        Ok(())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.entries.len())
    }
}
