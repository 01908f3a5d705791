//! Snapshot command implementation.

use super::bucket_arg;
use kvsync_protocol::PushBody;
use kvsync_storage::{FileStore, LocalStore};
use std::path::Path;

/// Prints the body a push of `bucket` would carry.
pub fn run(path: &Path, bucket: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    let bucket = bucket_arg(bucket);
    let body = PushBody::new(&bucket, store.entries_for_bucket(&bucket)?);

    let value: serde_json::Value = serde_json::from_slice(&body.encode()?)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
