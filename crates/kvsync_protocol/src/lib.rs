//! # kvsync Protocol
//!
//! Wire types and JSON codecs shared by the kvsync storage and sync crates.
//!
//! This crate provides:
//! - [`Bucket`], the named group of keys transferred as one unit
//! - [`RemoteEntry`] and [`BucketSnapshot`], the `{value, timestamp}` map
//!   exchanged with the remote store
//! - [`PushBody`] and the pull body decoder used by the HTTP gateway
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire format
//!
//! A bucket is exchanged as a JSON object keyed by entry key:
//!
//! ```json
//! { "theme": { "value": "dark", "timestamp": 1718000000000 } }
//! ```
//!
//! A push always carries the complete snapshot of one bucket, never a diff.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod error;
mod messages;
mod snapshot;

pub use bucket::Bucket;
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{decode_pull_body, encode_pull_body, parse_pull_url, pull_url, PushBody};
pub use snapshot::{BucketSnapshot, RemoteEntry};
