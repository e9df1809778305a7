//! # MemoReel Core
//!
//! Media slideshow engine: a persistent playlist of videos and images with
//! sequential playback, ambient color extraction, and highlight montages
//! cut and stitched by an external transcoder.

// ============================================================================
// Storage
// ============================================================================
pub mod storage;
pub mod content;
pub mod persistence;
pub mod config;

// ============================================================================
// Playlist & Playback
// ============================================================================
pub mod ids;
pub mod media;
pub mod playlist;
pub mod transport;
pub mod sync;
pub mod autoplay;
pub mod player;

// ============================================================================
// Ambient Light
// ============================================================================
pub mod ambient;

// ============================================================================
// Montage
// ============================================================================
pub mod engine;
pub mod montage;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
