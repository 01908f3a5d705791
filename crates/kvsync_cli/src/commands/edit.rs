//! Commands editing the local store.
//!
//! These act on the local table only. Nothing reaches the remote until the
//! next `sync`.

use super::bucket_arg;
use kvsync_storage::{FileStore, LocalStore};
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Prints the value stored under `key`.
pub fn get(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    match store.get(key)? {
        Some(entry) => println!("{}", serde_json::to_string_pretty(&entry.value)?),
        None => return Err(format!("Key not found: {key}").into()),
    }
    Ok(())
}

/// Stores `raw` under `key`, creating the store if needed.
pub fn set(
    path: &Path,
    key: &str,
    raw: &str,
    bucket: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = FileStore::open_with_create_dirs(path)?;
    let entry = store.put(key, parse_value(raw), bucket_arg(bucket), None)?;
    info!(key, bucket = %entry.bucket, timestamp = entry.timestamp, "entry written");
    Ok(())
}

/// Removes `key`.
pub fn remove(path: &Path, key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = FileStore::open(path)?;
    match store.remove(key)? {
        Some(entry) => info!(key, bucket = %entry.bucket, "entry removed"),
        None => println!("Key not found: {key}"),
    }
    Ok(())
}

/// Removes every entry.
pub fn clear(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = FileStore::open(path)?;
    let count = store.len()?;
    store.clear()?;
    println!("Removed {count} entries");
    Ok(())
}

/// Parses a command-line value as JSON, falling back to a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
