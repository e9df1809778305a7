//! Session persistence
//!
//! Features:
//! - Save playlist metadata and cursor on every change
//! - Restore on startup, rehydrating content handles from the blob store
//! - Drop entries whose blob is gone
//! - Reset corrupt stored state instead of failing startup
//!
//! Saves are ignored until `restore` has run, so a half-restored session can
//! never overwrite the stored one.

use crate::content::ContentRegistry;
use crate::media::{guess_mime, ItemMeta, PlaylistItem};
use crate::storage::{BlobStore, KeyValueStore, StoreError};
use std::path::Path;
use std::sync::Arc;

pub const PLAYLIST_KEY: &str = "memoreel.playlist";
pub const CURSOR_KEY: &str = "memoreel.cursor";

/// What a restore produced
#[derive(Debug, Default)]
pub struct Restored {
    pub items: Vec<PlaylistItem>,
    pub cursor: usize,
    /// Entries whose blob no longer exists
    pub dropped: usize,
}

pub struct PersistenceSync {
    kv: Arc<dyn KeyValueStore>,
    blobs: Arc<dyn BlobStore>,
    content: Arc<ContentRegistry>,
    restored: bool,
}

impl PersistenceSync {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        blobs: Arc<dyn BlobStore>,
        content: Arc<ContentRegistry>,
    ) -> Self {
        Self {
            kv,
            blobs,
            content,
            restored: false,
        }
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Load the previous session. Never fails: corrupt state is cleared and
    /// an empty session returned.
    pub async fn restore(&mut self) -> Restored {
        let restored = match self.try_restore().await {
            Ok(restored) => {
                if restored.dropped > 0 {
                    tracing::info!(
                        "Restored {} item(s), {} dropped (blob missing)",
                        restored.items.len(),
                        restored.dropped
                    );
                } else {
                    tracing::info!("Restored {} item(s)", restored.items.len());
                }
                restored
            }
            Err(e) => {
                tracing::error!("Failed to restore session, starting empty: {}", e);
                self.clear_keys();
                Restored::default()
            }
        };
        self.restored = true;
        restored
    }

    async fn try_restore(&self) -> Result<Restored, StoreError> {
        let Some(raw) = self.kv.get(PLAYLIST_KEY)? else {
            return Ok(Restored::default());
        };
        let metas: Vec<ItemMeta> = serde_json::from_str(&raw)?;

        let stored_cursor = match self.kv.get(CURSOR_KEY)? {
            Some(value) => value.trim().parse::<usize>().unwrap_or_else(|_| {
                tracing::warn!("Ignoring unparseable stored cursor {:?}", value);
                0
            }),
            None => 0,
        };

        // Fetch everything before minting handles so a failed read leaks none
        let mut fetched = Vec::with_capacity(metas.len());
        for meta in metas {
            let data = self.blobs.get(meta.id).await?;
            fetched.push((meta, data));
        }

        let mut restored = Restored::default();
        for (meta, data) in fetched {
            match data {
                Some(data) => {
                    let content = self.content.create(data, guess_mime(Path::new(&meta.title)));
                    restored.items.push(PlaylistItem {
                        id: meta.id,
                        title: meta.title,
                        kind: meta.kind,
                        content,
                    });
                }
                None => {
                    tracing::debug!("Blob {} missing, dropping {:?}", meta.id, meta.title);
                    restored.dropped += 1;
                }
            }
        }

        restored.cursor = if stored_cursor < restored.items.len() {
            stored_cursor
        } else {
            0
        };
        Ok(restored)
    }

    /// Overwrite the stored session. Failures are logged, never returned.
    pub fn save(&self, items: &[PlaylistItem], cursor: usize) {
        if !self.restored {
            tracing::debug!("Skipping save before restore completed");
            return;
        }
        if let Err(e) = self.try_save(items, cursor) {
            tracing::warn!("Failed to save session: {}", e);
        }
    }

    fn try_save(&self, items: &[PlaylistItem], cursor: usize) -> Result<(), StoreError> {
        let metas: Vec<ItemMeta> = items.iter().map(PlaylistItem::meta).collect();
        self.kv.set(PLAYLIST_KEY, &serde_json::to_string(&metas)?)?;
        self.kv.set(CURSOR_KEY, &cursor.to_string())?;
        Ok(())
    }

    /// Remove both stored keys
    pub fn clear_keys(&self) {
        for key in [PLAYLIST_KEY, CURSOR_KEY] {
            if let Err(e) = self.kv.remove(key) {
                tracing::warn!("Failed to remove {}: {}", key, e);
            }
        }
    }
}
