//! Blob store: id -> bytes

use super::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One stored file body
#[derive(Debug, Clone, PartialEq)]
pub struct BlobRecord {
    pub id: u64,
    pub blob: Bytes,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, id: u64) -> Result<Option<Bytes>, StoreError>;

    async fn put(&self, id: u64, blob: Bytes) -> Result<(), StoreError>;

    async fn bulk_put(&self, records: Vec<BlobRecord>) -> Result<(), StoreError> {
        for record in records {
            self.put(record.id, record.blob).await?;
        }
        Ok(())
    }

    /// Delete every record
    async fn clear(&self) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    records: Mutex<BTreeMap<u64, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.lock().contains_key(&id)
    }

    /// Drop a single record, as an external cleanup would
    pub fn remove(&self, id: u64) -> Option<Bytes> {
        self.records.lock().remove(&id)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, id: u64) -> Result<Option<Bytes>, StoreError> {
        Ok(self.records.lock().get(&id).cloned())
    }

    async fn put(&self, id: u64, blob: Bytes) -> Result<(), StoreError> {
        self.records.lock().insert(id, blob);
        Ok(())
    }

    async fn bulk_put(&self, records: Vec<BlobRecord>) -> Result<(), StoreError> {
        let mut map = self.records.lock();
        for record in records {
            map.insert(record.id, record.blob);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.lock().clear();
        Ok(())
    }
}

// ============================================================================
// Directory-backed
// ============================================================================

const BLOB_EXTENSION: &str = "bin";

/// One file per record under `<root>/<id>.bin`
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: u64) -> PathBuf {
        self.root.join(format!("{}.{}", id, BLOB_EXTENSION))
    }
}

#[async_trait]
impl BlobStore for DirBlobStore {
    async fn get(&self, id: u64) -> Result<Option<Bytes>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, id: u64, blob: Bytes) -> Result<(), StoreError> {
        // Stage into a sibling file, then rename into place
        let target = self.path_for(id);
        let partial = target.with_extension("part");
        tokio::fs::write(&partial, &blob).await?;
        tokio::fs::rename(&partial, &target).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(BLOB_EXTENSION) {
                tokio::fs::remove_file(&path).await?;
            }
        }
        tracing::debug!("Cleared blob directory {:?}", self.root);
        Ok(())
    }
}
