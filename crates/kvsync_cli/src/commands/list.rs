//! Listing commands.

use super::bucket_arg;
use kvsync_storage::{Entry, FileStore, LocalStore};
use std::path::Path;

/// Runs the list command.
pub fn entries(
    path: &Path,
    bucket: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    let mut entries = store.all_entries()?;
    if bucket.is_some() {
        let wanted = bucket_arg(bucket);
        entries.retain(|entry| entry.bucket == wanted);
    }
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => print_text(&entries),
    }
    Ok(())
}

/// Runs the buckets command.
pub fn buckets(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = FileStore::open(path)?;
    let entries = store.all_entries()?;

    for bucket in store.buckets()? {
        let count = entries.iter().filter(|entry| entry.bucket == bucket).count();
        println!("{:<24} {count} entries", bucket.to_string());
    }
    Ok(())
}

fn print_text(entries: &[Entry]) {
    if entries.is_empty() {
        println!("(no entries)");
        return;
    }
    for line in format_rows(entries) {
        println!("{line}");
    }
}

fn format_rows(entries: &[Entry]) -> Vec<String> {
    let width = entries.iter().map(|entry| entry.key.len()).max().unwrap_or(0);
    entries
        .iter()
        .map(|entry| {
            format!(
                "{:<width$}  {:<16}  {:>13}  {}",
                entry.key,
                entry.bucket.to_string(),
                entry.timestamp,
                entry.value,
            )
        })
        .collect()
}
