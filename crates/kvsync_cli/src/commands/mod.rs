//! CLI command implementations.

pub mod edit;
pub mod list;
pub mod snapshot;
pub mod sync;

use kvsync_protocol::Bucket;

/// Maps an optional `--bucket` argument onto a bucket.
pub fn bucket_arg(name: Option<&str>) -> Bucket {
    match name {
        Some(name) if !name.is_empty() => Bucket::named(name),
        _ => Bucket::global(),
    }
}
