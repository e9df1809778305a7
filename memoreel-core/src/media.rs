//! Media items & file intake
//!
//! Features:
//! - Video/image classification from a declared media type
//! - Playlist item model (runtime) and its persisted metadata form
//! - File intake from local paths with extension-based type detection

use crate::content::ContentRef;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Media Kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Classify a declared media type; anything not `video/*` or `image/*` is rejected
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("video/") {
            Some(Self::Video)
        } else if mime.starts_with("image/") {
            Some(Self::Image)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

// ============================================================================
// Playlist Item
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    pub id: u64,
    pub title: String,
    pub kind: MediaKind,
    /// Session-local handle; never serialized
    pub content: ContentRef,
}

impl PlaylistItem {
    pub fn meta(&self) -> ItemMeta {
        ItemMeta {
            id: self.id,
            title: self.title.clone(),
            kind: self.kind,
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// The persisted shape of a playlist item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    pub id: u64,
    pub title: String,
    pub kind: MediaKind,
}

// ============================================================================
// File Intake
// ============================================================================

/// A candidate file handed to the player: name, declared type, body
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub mime: String,
    pub data: Bytes,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data: data.into(),
        }
    }

    /// Read a local file, declaring its type from the extension
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self {
            name,
            mime: guess_mime(path).to_string(),
            data: Bytes::from(data),
        })
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::from_mime(&self.mime)
    }
}

const MIME_TABLE: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("ogv", "video/ogg"),
    ("3gp", "video/3gpp"),
    ("ts", "video/mp2t"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("avif", "image/avif"),
    ("svg", "image/svg+xml"),
];

/// Declared type for a path, by extension
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    MIME_TABLE
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}
