//! # kvsync Engine
//!
//! Offline-first synchronization between a local key-value store and a
//! remote bucket store.
//!
//! This crate provides:
//! - The [`SyncedStore`] facade used by applications
//! - One-time startup reconciliation with last-write-wins merging
//! - Debounced, per-bucket pushes of local changes
//! - The [`RemoteGateway`] abstraction plus HTTP and in-memory gateways
//! - Pluggable credential providers
//!
//! ## Architecture
//!
//! The engine follows a **reconcile-then-publish** model:
//! 1. On startup, every known bucket is pulled and merged into the local
//!    store (newer timestamp wins)
//! 2. Buckets where the local side knew more are pushed once
//! 3. From then on, each write arms a debounce timer for its bucket; when
//!    the bucket goes quiet, its whole snapshot replaces the remote copy
//!
//! ## Key Invariants
//!
//! - Reads and writes never wait on the network
//! - No push happens before reconciliation finishes
//! - Adopting a remote entry never triggers a push
//! - At most one timer is armed per bucket
//! - Remote failures are logged, never surfaced to writers

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod credentials;
mod error;
mod gateway;
mod http;
mod publisher;
mod reconcile;
mod state;
mod store;

pub use config::{
    SyncConfig, DEFAULT_CREDENTIAL_HEADER, DEFAULT_DEBOUNCE_WINDOW, DEFAULT_SYNC_PATH,
};
pub use credentials::{Anonymous, CredentialProvider, SharedCredential, StaticCredential};
pub use error::{SyncError, SyncResult};
pub use gateway::{MemoryGateway, MemoryRemote, RemoteGateway};
pub use http::{
    HttpClient, HttpGateway, HttpMethod, HttpRequest, HttpResponse, LoopbackClient,
    LoopbackServer,
};
pub use publisher::DebouncedPublisher;
pub use reconcile::{plan_merge, MergePlan};
pub use state::{FlushReport, ReconcileState, SyncStats, SyncStatus};
pub use store::SyncedStore;
