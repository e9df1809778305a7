//! Durable storage contracts
//!
//! Two stores back a session:
//! - a blob store holding the raw bytes of every added file, keyed by item id
//! - a key-value text store holding playlist metadata and the cursor
//!
//! Both come with an in-memory implementation (tests, ephemeral sessions) and
//! a filesystem implementation.

pub mod blob;
pub mod kv;

pub use blob::{BlobRecord, BlobStore, DirBlobStore, MemoryBlobStore};
pub use kv::{JsonFileKeyValueStore, KeyValueStore, MemoryKeyValueStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed stored data: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
