//! Session-local content handles
//!
//! A `ContentRef` is an opaque, ephemeral name for bytes held in memory
//! (`blob:memoreel/<n>`). Handles are never persisted: every session mints
//! fresh ones from the blob store, and releases them when the owning item
//! goes away.

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const SCHEME_PREFIX: &str = "blob:memoreel/";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bytes plus the declared media type they were minted with
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub data: Bytes,
    pub mime: String,
}

#[derive(Debug, Default)]
pub struct ContentRegistry {
    next: AtomicU64,
    live: Mutex<HashMap<ContentRef, Resource>>,
}

impl ContentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, data: Bytes, mime: &str) -> ContentRef {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let handle = ContentRef(format!("{}{}", SCHEME_PREFIX, n));
        self.live.lock().insert(
            handle.clone(),
            Resource {
                data,
                mime: mime.to_string(),
            },
        );
        handle
    }

    pub fn resolve(&self, handle: &ContentRef) -> Option<Resource> {
        self.live.lock().get(handle).cloned()
    }

    /// Returns false if the handle was already released
    pub fn release(&self, handle: &ContentRef) -> bool {
        self.live.lock().remove(handle).is_some()
    }

    pub fn is_live(&self, handle: &ContentRef) -> bool {
        self.live.lock().contains_key(handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}
