//! # kvsync Storage
//!
//! The local half of kvsync: a persistent table mapping a string key to
//! `(value, timestamp, bucket)`.
//!
//! Stores are pure CRUD. They know nothing about the network; the sync
//! engine decides when their contents travel to the remote store.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - Durable JSON table in a locked directory
//!
//! ## Example
//!
//! ```rust
//! use kvsync_storage::{InMemoryStore, LocalStore};
//! use kvsync_protocol::Bucket;
//! use serde_json::json;
//!
//! let mut store = InMemoryStore::new();
//! store.put("theme", json!("dark"), Bucket::named("settings"), None).unwrap();
//! let entry = store.get("theme").unwrap().unwrap();
//! assert_eq!(entry.value, json!("dark"));
//! assert_eq!(store.entries_for_bucket(&Bucket::named("settings")).unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
mod entry;
mod error;
mod file;
mod memory;
mod store;

pub use entry::Entry;
pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::LocalStore;
