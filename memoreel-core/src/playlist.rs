//! Ordered playlist with a wrapping cursor

use crate::media::PlaylistItem;

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    items: Vec<PlaylistItem>,
    cursor: usize,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from restored parts; an out-of-range cursor falls back to 0
    pub fn from_parts(items: Vec<PlaylistItem>, cursor: usize) -> Self {
        let cursor = if cursor < items.len() { cursor } else { 0 };
        Self { items, cursor }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[PlaylistItem] {
        &self.items
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&PlaylistItem> {
        self.items.get(self.cursor)
    }

    pub fn push(&mut self, item: PlaylistItem) {
        self.items.push(item);
    }

    /// Returns false (and leaves the cursor alone) when `index` is out of range
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.items.len() {
            self.cursor = index;
            true
        } else {
            false
        }
    }

    pub fn advance(&mut self) -> bool {
        if self.items.is_empty() {
            return false;
        }
        self.cursor = (self.cursor + 1) % self.items.len();
        true
    }

    pub fn retreat(&mut self) -> bool {
        if self.items.is_empty() {
            return false;
        }
        let len = self.items.len();
        self.cursor = (self.cursor + len - 1) % len;
        true
    }

    /// Empty the playlist, handing back the removed items
    pub fn take_all(&mut self) -> Vec<PlaylistItem> {
        self.cursor = 0;
        std::mem::take(&mut self.items)
    }

    /// Snapshot of the video entries, in playlist order
    pub fn videos(&self) -> Vec<PlaylistItem> {
        self.items.iter().filter(|i| i.is_video()).cloned().collect()
    }
}
