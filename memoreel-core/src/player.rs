//! # Player - Playlist, Playback & Session Wiring
//!
//! Owns the playlist and its cursor and drives everything that hangs off
//! "which item is current":
//!
//! - file intake with write-behind blob storage
//! - save-on-change persistence (after the startup restore)
//! - auto-advance: natural end for videos, a 5 s timer for images
//! - main/backdrop session sync and ambient color sampling
//! - montage jobs over a snapshot of the playlist's videos
//!
//! ```text
//!            add / select / next / previous / clear
//!                          │
//!                          ▼
//!   ┌───────────┐   ┌─────────────┐   save   ┌──────────────────┐
//!   │ BlobStore │◄──│   Player    │─────────►│ PersistenceSync  │
//!   └───────────┘   └─────────────┘          └──────────────────┘
//!         ▲           │    │    │
//!         │  snapshot │    │    └──► AdvanceTimer (images)
//!   ┌─────┴─────────┐ │    └───────► AmbientLight / BackdropSync
//!   │MontagePipeline│◄┘
//!   └───────────────┘
//! ```

use crate::ambient::{AmbientLight, FrameSource, Rgb};
use crate::autoplay::{AdvanceSignal, AdvanceTimer, IMAGE_DISPLAY};
use crate::config::PlayerConfig;
use crate::content::ContentRegistry;
use crate::engine::{EngineLoader, FfmpegLoader};
use crate::ids::IdAllocator;
use crate::media::{IncomingFile, MediaKind, PlaylistItem};
use crate::montage::{MontagePipeline, MontageState};
use crate::persistence::PersistenceSync;
use crate::playlist::Playlist;
use crate::storage::{
    BlobRecord, BlobStore, DirBlobStore, JsonFileKeyValueStore, KeyValueStore,
    MemoryBlobStore, MemoryKeyValueStore, StoreError,
};
use crate::sync::{BackdropSync, SyncAction};
use crate::transport::{PlaybackEvent, PlaybackObserver, Session};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

// ============================================================================
// Dependencies
// ============================================================================

/// Everything a player needs from the outside world
pub struct PlayerDeps {
    pub blobs: Arc<dyn BlobStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub loader: Arc<dyn EngineLoader>,
    pub content: Arc<ContentRegistry>,
    pub ids: IdAllocator,
}

impl PlayerDeps {
    /// Ephemeral stores; nothing survives the process
    pub fn in_memory(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            blobs: Arc::new(MemoryBlobStore::new()),
            kv: Arc::new(MemoryKeyValueStore::new()),
            loader,
            content: Arc::new(ContentRegistry::new()),
            ids: IdAllocator::new(),
        }
    }

    /// Directory-backed stores and the ffmpeg engine, as configured
    pub fn from_config(config: &PlayerConfig) -> Result<Self, StoreError> {
        let blobs = DirBlobStore::open(config.blob_dir())?;

        let metadata_path = config.metadata_path();
        let kv = match JsonFileKeyValueStore::open(&metadata_path) {
            Ok(kv) => kv,
            Err(StoreError::Malformed(e)) => {
                tracing::error!("Session file {:?} is corrupt, discarding: {}", metadata_path, e);
                std::fs::remove_file(&metadata_path)?;
                JsonFileKeyValueStore::open(&metadata_path)?
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            blobs: Arc::new(blobs),
            kv: Arc::new(kv),
            loader: Arc::new(FfmpegLoader::new(&config.ffmpeg_program)),
            content: Arc::new(ContentRegistry::new()),
            ids: IdAllocator::new(),
        })
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn with_kv(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = kv;
        self
    }

    pub fn with_content(mut self, content: Arc<ContentRegistry>) -> Self {
        self.content = content;
        self
    }

    pub fn with_ids(mut self, ids: IdAllocator) -> Self {
        self.ids = ids;
        self
    }
}

// ============================================================================
// Advisories
// ============================================================================

/// Non-fatal notices for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    NoValidFiles,
    PartiallyAccepted { accepted: usize, total: usize },
    FullscreenFailed { name: String, message: String },
}

impl Advisory {
    pub fn message(&self) -> String {
        match self {
            Self::NoValidFiles => "Please select valid video or image files.".to_string(),
            Self::PartiallyAccepted { accepted, total } => format!(
                "Added {} of {} files. Only video and image files are supported.",
                accepted, total
            ),
            Self::FullscreenFailed { name, message } => format!(
                "Error attempting to enable full-screen mode: {} ({})",
                message, name
            ),
        }
    }
}

// ============================================================================
// Status snapshot
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub id: u64,
    pub title: String,
    pub kind: MediaKind,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerStatus {
    pub items: Vec<ItemView>,
    pub cursor: usize,
    pub current: Option<ItemView>,
    pub can_step: bool,
    pub session: Session,
    pub position: String,
    pub duration: String,
    pub image_timer_armed: bool,
    pub ambient: String,
}

impl From<&PlaylistItem> for ItemView {
    fn from(item: &PlaylistItem) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            kind: item.kind,
            content: item.content.to_string(),
        }
    }
}

// ============================================================================
// Player
// ============================================================================

pub struct Player {
    playlist: Playlist,
    ids: IdAllocator,
    blobs: Arc<dyn BlobStore>,
    content: Arc<ContentRegistry>,
    persistence: PersistenceSync,

    main: Session,
    backdrop: Session,
    sync: BackdropSync,
    ambient: AmbientLight,

    timer: AdvanceTimer,
    timer_rx: mpsc::UnboundedReceiver<AdvanceSignal>,

    montage: Arc<MontagePipeline>,
    pending_writes: Vec<JoinHandle<()>>,
    /// Bumped every time an item (re)becomes current
    activation: u64,
}

impl Player {
    /// Build a player and restore the previous session before returning
    pub async fn open(deps: PlayerDeps, config: &PlayerConfig) -> Self {
        let PlayerDeps {
            blobs,
            kv,
            loader,
            content,
            mut ids,
        } = deps;

        let mut persistence = PersistenceSync::new(kv, blobs.clone(), content.clone());
        let restored = persistence.restore().await;
        if let Some(max_id) = restored.items.iter().map(|i| i.id).max() {
            ids.observe(max_id);
        }

        let (timer, timer_rx) = AdvanceTimer::new();
        let montage = Arc::new(MontagePipeline::new(loader, blobs.clone(), content.clone()));

        let mut player = Self {
            playlist: Playlist::from_parts(restored.items, restored.cursor),
            ids,
            blobs,
            content,
            persistence,
            main: Session::default(),
            backdrop: Session::muted(),
            sync: BackdropSync::new(config.backdrop_drift_secs),
            ambient: AmbientLight::new(config.repaint_hz),
            timer,
            timer_rx,
            montage,
            pending_writes: Vec::new(),
            activation: 0,
        };
        if !player.playlist.is_empty() {
            player.activate();
        }
        player
    }

    // ---- Playlist ---------------------------------------------------------

    pub fn items(&self) -> &[PlaylistItem] {
        self.playlist.items()
    }

    pub fn cursor(&self) -> usize {
        self.playlist.cursor()
    }

    pub fn current(&self) -> Option<&PlaylistItem> {
        self.playlist.current()
    }

    pub fn activation(&self) -> u64 {
        self.activation
    }

    /// Previous/next are only offered with more than one item
    pub fn can_step(&self) -> bool {
        self.playlist.len() > 1
    }

    /// Append every video/image in `files`, in order. Blob writes happen in
    /// the background; the playlist is updated immediately.
    pub fn add_files(&mut self, files: Vec<IncomingFile>) -> Option<Advisory> {
        let total = files.len();
        if total == 0 {
            return None;
        }

        let was_empty = self.playlist.is_empty();
        let mut records = Vec::new();
        for file in files {
            let Some(kind) = file.kind() else {
                tracing::debug!("Rejecting {:?} ({})", file.name, file.mime);
                continue;
            };
            let id = self.ids.next_id();
            let content = self.content.create(file.data.clone(), &file.mime);
            self.playlist.push(PlaylistItem {
                id,
                title: file.name,
                kind,
                content,
            });
            records.push(BlobRecord {
                id,
                blob: file.data,
            });
        }

        let accepted = records.len();
        if accepted == 0 {
            return Some(Advisory::NoValidFiles);
        }
        tracing::info!("Added {} of {} file(s)", accepted, total);

        self.write_behind(records);
        if was_empty {
            self.activate();
        }
        self.persist();

        (accepted < total).then_some(Advisory::PartiallyAccepted { accepted, total })
    }

    /// Make `index` current. Out of range or already current: no-op.
    pub fn select(&mut self, index: usize) -> bool {
        if index == self.playlist.cursor() || !self.playlist.select(index) {
            return false;
        }
        self.activate();
        self.persist();
        true
    }

    pub fn next(&mut self) -> bool {
        if !self.playlist.advance() {
            return false;
        }
        self.activate();
        self.persist();
        true
    }

    pub fn previous(&mut self) -> bool {
        if !self.playlist.retreat() {
            return false;
        }
        self.activate();
        self.persist();
        true
    }

    /// Irreversible: drops every item, blob and stored key.
    /// The caller is responsible for confirming with the user first.
    ///
    /// Blobs go first: if that fails nothing else is touched and the clear
    /// can simply be retried.
    pub async fn clear(&mut self) -> Result<(), StoreError> {
        // Let queued puts land first so they cannot resurrect cleared blobs
        self.flush_writes().await;

        if let Err(e) = self.blobs.clear().await {
            tracing::error!("Failed to clear blob store, playlist kept: {}", e);
            return Err(e);
        }

        self.timer.cancel();
        self.ambient.detach();
        self.main.load();
        self.backdrop.load();

        for item in self.playlist.take_all() {
            self.content.release(&item.content);
        }
        self.persistence.clear_keys();
        tracing::info!("Playlist cleared");
        Ok(())
    }

    /// Wait for every background blob write issued so far
    pub async fn flush_writes(&mut self) {
        for handle in self.pending_writes.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!("Blob write task ended abnormally: {}", e);
            }
        }
    }

    fn write_behind(&mut self, records: Vec<BlobRecord>) {
        self.pending_writes.retain(|h| !h.is_finished());
        let blobs = self.blobs.clone();
        self.pending_writes.push(tokio::spawn(async move {
            let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
            if let Err(e) = blobs.bulk_put(records).await {
                tracing::warn!("Failed to store blobs {:?}: {}", ids, e);
            }
        }));
    }

    fn persist(&self) {
        self.persistence
            .save(self.playlist.items(), self.playlist.cursor());
    }

    /// A (possibly identical) item just became current
    fn activate(&mut self) {
        self.activation += 1;
        self.main.load();
        self.backdrop.load();
        self.ambient.stop();

        match self.playlist.current().map(|i| i.kind) {
            Some(MediaKind::Image) => {
                self.timer.arm(IMAGE_DISPLAY);
            }
            Some(MediaKind::Video) | None => self.timer.cancel(),
        }
    }

    fn current_is_video(&self) -> bool {
        self.playlist.current().is_some_and(PlaylistItem::is_video)
    }

    // ---- Auto-advance -----------------------------------------------------

    /// Resolves when the image timer advances the playlist.
    /// Stale signals (item changed before they were handled) are skipped.
    pub async fn next_auto_advance(&mut self) -> bool {
        loop {
            let Some(signal) = self.timer_rx.recv().await else {
                return false;
            };
            if !self.timer.is_current(signal) {
                continue;
            }
            self.timer.disarm();
            if self.playlist.current().map(|i| i.kind) == Some(MediaKind::Image) {
                return self.next();
            }
        }
    }

    pub fn is_image_timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    // ---- Transport --------------------------------------------------------

    pub fn session(&self) -> &Session {
        &self.main
    }

    pub fn backdrop(&self) -> &Session {
        &self.backdrop
    }

    /// Feed an event from the visible element; returns backdrop corrections
    pub fn handle_playback_event(&mut self, event: PlaybackEvent) -> Vec<SyncAction> {
        if !self.current_is_video() {
            tracing::debug!("Ignoring {:?}: current item is not a video", event);
            return Vec::new();
        }

        self.main.on_event(event);
        self.ambient.on_event(event);

        if event == PlaybackEvent::EndedNaturally {
            self.next();
            return Vec::new();
        }
        self.sync.reconcile(&self.main, &mut self.backdrop)
    }

    /// Feed an event from the muted backdrop element
    pub fn handle_backdrop_event(&mut self, event: PlaybackEvent) -> Vec<SyncAction> {
        if !self.current_is_video() {
            return Vec::new();
        }
        self.backdrop.on_event(event);
        self.sync.reconcile(&self.main, &mut self.backdrop)
    }

    /// The element refused to start playing (autoplay policy)
    pub fn playback_refused(&mut self) {
        self.main.start_refused();
        self.ambient.stop();
    }

    pub fn seek(&mut self, position: f64) -> Vec<SyncAction> {
        self.main.seek(position);
        self.sync.reconcile(&self.main, &mut self.backdrop)
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.main.set_volume(volume);
    }

    pub fn toggle_mute(&mut self) {
        self.main.toggle_mute();
    }

    pub fn sync_corrections(&self) -> u64 {
        self.sync.corrections()
    }

    /// A fullscreen request failed; this one is shown verbatim
    pub fn fullscreen_failed(&self, name: &str, message: &str) -> Advisory {
        tracing::warn!("Fullscreen request failed: {} ({})", message, name);
        Advisory::FullscreenFailed {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    // ---- Ambient ----------------------------------------------------------

    pub fn attach_frame_source(&mut self, source: Arc<dyn FrameSource>) {
        self.ambient.attach(source);
    }

    pub fn ambient_color(&self) -> Rgb {
        self.ambient.color()
    }

    pub fn subscribe_ambient(&self) -> watch::Receiver<Rgb> {
        self.ambient.subscribe()
    }

    // ---- Montage ----------------------------------------------------------

    pub fn montage(&self) -> &Arc<MontagePipeline> {
        &self.montage
    }

    /// Run a montage job in the background over the current videos
    pub fn start_montage(&self) -> JoinHandle<MontageState> {
        let snapshot = self.playlist.videos();
        let montage = self.montage.clone();
        tokio::spawn(async move { montage.create(&snapshot).await })
    }

    /// Dialog closed: drop any result, ignore whatever is still in flight
    pub fn close_montage(&self) {
        self.montage.reset();
    }

    // ---- Status -----------------------------------------------------------

    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            items: self.playlist.items().iter().map(ItemView::from).collect(),
            cursor: self.playlist.cursor(),
            current: self.playlist.current().map(ItemView::from),
            can_step: self.can_step(),
            session: self.main,
            position: crate::transport::format_time(self.main.position),
            duration: crate::transport::format_time(self.main.duration),
            image_timer_armed: self.timer.is_armed(),
            ambient: self.ambient.color().to_css(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::montage::MontageStatus;
    use crate::persistence::PLAYLIST_KEY;
    use crate::testing::{FakeEngineState, FakeLoader, FlakyBlobStore};
    use std::time::Duration;
    use tokio::time::Instant;

    struct Fixture {
        blobs: Arc<MemoryBlobStore>,
        kv: Arc<MemoryKeyValueStore>,
        content: Arc<ContentRegistry>,
        engine: Arc<FakeEngineState>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                blobs: Arc::new(MemoryBlobStore::new()),
                kv: Arc::new(MemoryKeyValueStore::new()),
                content: Arc::new(ContentRegistry::new()),
                engine: Arc::new(FakeEngineState::default()),
            }
        }

        fn deps(&self) -> PlayerDeps {
            // Frozen clock: every id comes from the bump path
            let ids = IdAllocator::with_clock(Box::new(|| 1_000));
            PlayerDeps::in_memory(Arc::new(FakeLoader::new(self.engine.clone())))
                .with_blobs(self.blobs.clone())
                .with_kv(self.kv.clone())
                .with_content(self.content.clone())
                .with_ids(ids)
        }

        async fn open(&self) -> Player {
            Player::open(self.deps(), &PlayerConfig::default()).await
        }
    }

    fn video(name: &str) -> IncomingFile {
        IncomingFile::new(name, "video/mp4", format!("bytes of {}", name).into_bytes())
    }

    fn image(name: &str) -> IncomingFile {
        IncomingFile::new(name, "image/png", format!("bytes of {}", name).into_bytes())
    }

    fn text(name: &str) -> IncomingFile {
        IncomingFile::new(name, "text/plain", b"hello".to_vec())
    }

    fn titles(player: &Player) -> Vec<&str> {
        player.items().iter().map(|i| i.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_add_appends_in_order() {
        let fx = Fixture::new();
        let mut player = fx.open().await;

        assert_eq!(player.add_files(vec![video("a.mp4"), image("b.png")]), None);
        assert_eq!(player.add_files(vec![video("c.mp4")]), None);

        assert_eq!(titles(&player), vec!["a.mp4", "b.png", "c.mp4"]);
        assert_eq!(player.cursor(), 0);

        let ids: Vec<u64> = player.items().iter().map(|i| i.id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        player.flush_writes().await;
        assert!(ids.iter().all(|id| fx.blobs.contains(*id)));
    }

    #[tokio::test]
    async fn test_add_advisories() {
        let fx = Fixture::new();
        let mut player = fx.open().await;

        assert_eq!(player.add_files(Vec::new()), None);

        let advisory = player.add_files(vec![text("notes.txt")]);
        assert_eq!(advisory, Some(Advisory::NoValidFiles));
        assert!(player.items().is_empty());

        let advisory = player.add_files(vec![video("a.mp4"), text("x.txt"), image("b.png")]);
        assert_eq!(
            advisory,
            Some(Advisory::PartiallyAccepted {
                accepted: 2,
                total: 3
            })
        );
        assert_eq!(titles(&player), vec!["a.mp4", "b.png"]);
        assert_eq!(
            advisory.unwrap().message(),
            "Added 2 of 3 files. Only video and image files are supported."
        );
    }

    #[tokio::test]
    async fn test_failed_blob_write_keeps_item() {
        let fx = Fixture::new();
        let flaky = Arc::new(FlakyBlobStore::new());
        flaky.fail_writes(true);
        let mut player = Player::open(fx.deps().with_blobs(flaky.clone()), &PlayerConfig::default()).await;

        player.add_files(vec![video("a.mp4")]);
        player.flush_writes().await;

        assert_eq!(titles(&player), vec!["a.mp4"]);
        assert!(!flaky.contains(player.items()[0].id));
        assert!(fx.content.is_live(&player.items()[0].content));
    }

    #[tokio::test]
    async fn test_session_survives_reopen() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4"), image("b.png"), video("c.mp4")]);
        player.select(1);
        player.flush_writes().await;
        let before: Vec<_> = player.items().iter().map(PlaylistItem::meta).collect();
        drop(player);

        let reopened = fx.open().await;
        let after: Vec<_> = reopened.items().iter().map(PlaylistItem::meta).collect();
        assert_eq!(after, before);
        assert_eq!(reopened.cursor(), 1);
    }

    #[tokio::test]
    async fn test_new_ids_exceed_restored_ones() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4"), video("b.mp4")]);
        player.flush_writes().await;
        let last = player.items()[1].id;
        drop(player);

        let mut reopened = fx.open().await;
        reopened.add_files(vec![video("c.mp4")]);
        assert!(reopened.items()[2].id > last);
    }

    #[tokio::test]
    async fn test_clear_then_reopen_is_empty() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4"), image("b.png")]);
        player.next();
        let live_before_clear = fx.content.live_count();

        player.clear().await.unwrap();

        assert!(player.items().is_empty());
        assert_eq!(player.cursor(), 0);
        assert!(player.current().is_none());
        assert!(fx.blobs.is_empty());
        assert_eq!(fx.content.live_count(), live_before_clear - 2);
        assert!(!player.is_image_timer_armed());
        drop(player);

        let reopened = fx.open().await;
        assert!(reopened.items().is_empty());
    }

    #[tokio::test]
    async fn test_failed_blob_clear_keeps_playlist() {
        let fx = Fixture::new();
        let flaky = Arc::new(FlakyBlobStore::new());
        let mut player = Player::open(fx.deps().with_blobs(flaky.clone()), &PlayerConfig::default()).await;
        player.add_files(vec![video("a.mp4"), image("b.png")]);
        player.flush_writes().await;

        flaky.fail_clear(true);
        assert!(player.clear().await.is_err());
        assert_eq!(titles(&player), vec!["a.mp4", "b.png"]);
        assert_eq!(flaky.len(), 2);
        assert!(fx.kv.get(PLAYLIST_KEY).unwrap().is_some());

        flaky.fail_clear(false);
        player.clear().await.unwrap();
        assert!(player.items().is_empty());
        assert_eq!(flaky.len(), 0);
        assert_eq!(fx.kv.get(PLAYLIST_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_session_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlayerConfig {
            storage_dir: dir.path().to_path_buf(),
            ..PlayerConfig::default()
        };
        std::fs::write(config.metadata_path(), "{ not json").unwrap();

        let deps = PlayerDeps::from_config(&config).unwrap();
        assert_eq!(deps.kv.get(PLAYLIST_KEY).unwrap(), None);
        assert!(!config.metadata_path().exists());

        let player = Player::open(deps, &config).await;
        assert!(player.items().is_empty());
    }

    #[tokio::test]
    async fn test_select_and_step() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        assert!(!player.next());
        assert!(!player.previous());

        player.add_files(vec![video("a.mp4")]);
        assert!(!player.can_step());

        player.add_files(vec![video("b.mp4"), video("c.mp4")]);
        assert!(player.can_step());

        assert!(!player.select(7));
        assert!(!player.select(0));
        assert!(player.select(2));
        assert!(player.next());
        assert_eq!(player.cursor(), 0);
        assert!(player.previous());
        assert_eq!(player.cursor(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_advances_after_display_time() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        let start = Instant::now();
        player.add_files(vec![image("a.png"), video("b.mp4")]);

        assert!(player.next_auto_advance().await);
        assert_eq!(start.elapsed(), IMAGE_DISPLAY);
        assert_eq!(player.cursor(), 1);
        assert!(!player.is_image_timer_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_changing_item_restarts_timer() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![image("a.png"), image("b.png"), image("c.png")]);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        player.select(1);
        let reselected = Instant::now();

        assert!(player.next_auto_advance().await);
        assert_eq!(reselected.elapsed(), IMAGE_DISPLAY);
        assert_eq!(player.cursor(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_current_has_no_timer() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4"), image("b.png")]);
        assert!(!player.is_image_timer_armed());

        let advanced = tokio::time::timeout(IMAGE_DISPLAY * 2, player.next_auto_advance()).await;
        assert!(advanced.is_err());
        assert_eq!(player.cursor(), 0);
    }

    #[tokio::test]
    async fn test_video_end_advances_and_wraps() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4"), video("b.mp4")]);

        player.handle_playback_event(PlaybackEvent::Started);
        player.handle_playback_event(PlaybackEvent::EndedNaturally);
        assert_eq!(player.cursor(), 1);

        player.handle_playback_event(PlaybackEvent::EndedNaturally);
        assert_eq!(player.cursor(), 0);
    }

    #[tokio::test]
    async fn test_single_video_loops() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4")]);
        let activation = player.activation();

        player.handle_playback_event(PlaybackEvent::EndedNaturally);
        assert_eq!(player.cursor(), 0);
        assert_eq!(player.activation(), activation + 1);
    }

    #[tokio::test]
    async fn test_backdrop_follows_main() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4")]);

        assert_eq!(
            player.handle_playback_event(PlaybackEvent::Started),
            vec![SyncAction::Play]
        );
        player.handle_backdrop_event(PlaybackEvent::Started);
        player.handle_backdrop_event(PlaybackEvent::PositionChanged(0.2));
        assert!(player
            .handle_playback_event(PlaybackEvent::PositionChanged(0.4))
            .is_empty());

        assert_eq!(
            player.handle_playback_event(PlaybackEvent::PositionChanged(2.0)),
            vec![SyncAction::Seek(2.0)]
        );
        assert_eq!(player.backdrop().position, 2.0);
        assert!(player.backdrop().muted);
    }

    #[tokio::test]
    async fn test_fullscreen_message() {
        let fx = Fixture::new();
        let player = fx.open().await;
        let advisory = player.fullscreen_failed("NotAllowedError", "Permissions check failed");
        assert_eq!(
            advisory.message(),
            "Error attempting to enable full-screen mode: Permissions check failed (NotAllowedError)"
        );
    }

    #[tokio::test]
    async fn test_montage_uses_videos_only() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4"), image("b.png"), video("c.mp4")]);
        player.flush_writes().await;

        let state = player.start_montage().await.unwrap();
        assert_eq!(state.status, MontageStatus::Complete);
        assert_eq!(fx.engine.trim_runs(), 2);

        player.close_montage();
        assert_eq!(player.montage().state().status, MontageStatus::Idle);
    }

    #[tokio::test]
    async fn test_montage_needs_two_videos() {
        let fx = Fixture::new();
        let mut player = fx.open().await;
        player.add_files(vec![video("a.mp4"), image("b.png")]);
        player.flush_writes().await;

        let state = player.start_montage().await.unwrap();
        assert_eq!(state.status, MontageStatus::Failed);
        assert!(!player.montage().is_engine_loaded());
    }
}
