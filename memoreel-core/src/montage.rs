//! # Montage - Highlight Reel From Playlist Clips
//!
//! One fixed recipe, no options:
//!
//! 1. Load the transcoding engine (once per process, reused afterwards)
//! 2. Take the first 5 clips of the snapshot
//! 3. Stage each clip's bytes from the blob store into the engine
//! 4. Cut a 3 s window starting 3 s in, stream copy
//! 5. Concatenate the cuts with the concat demuxer, stream copy
//! 6. Read the result back and mint a content handle for it
//! 7. Remove every intermediate file (best effort)
//!
//! Progress is published on a `watch` channel as a `MontageState`.
//!
//! ```text
//! Idle ──► LoadingEngine ──► Processing ──► Complete
//!   ▲                            │
//!   │          retry             ▼
//!   └──────── reset ◄──────── Failed
//! ```

use crate::content::{ContentRef, ContentRegistry, Resource};
use crate::engine::{EngineError, EngineLoader, TranscodeEngine};
use crate::media::PlaylistItem;
use crate::storage::{BlobStore, StoreError};
use bytes::Bytes;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, OnceCell};

pub const MIN_CLIPS: usize = 2;
pub const MAX_CLIPS: usize = 5;
pub const CLIP_OFFSET_SECS: u32 = 3;
pub const CLIP_DURATION_SECS: u32 = 3;

pub const DOWNLOAD_NAME: &str = "memory-video.mp4";
pub const OUTPUT_MIME: &str = "video/mp4";

const MANIFEST_FILE: &str = "filelist.txt";
const OUTPUT_FILE: &str = "output.mp4";

const MSG_LOADING: &str = "Loading video engine...";
const MSG_STITCHING: &str = "Stitching video...";
const MSG_FINALIZING: &str = "Finalizing...";
const MSG_READY: &str = "Your memory is ready!";
const MSG_NOT_ENOUGH: &str = "Not enough videos to create a memory.";
const MSG_FAILED: &str = "An unexpected error occurred.";

#[derive(Debug, Error)]
pub enum MontageError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("None of the selected clips could be staged")]
    NothingStaged,
    #[error("Every trimmed clip came out empty")]
    NoUsableClips,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MontageStatus {
    Idle,
    LoadingEngine,
    Processing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MontageResult {
    pub content: ContentRef,
    pub file_name: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MontageState {
    pub status: MontageStatus,
    pub message: String,
    pub result: Option<MontageResult>,
}

impl Default for MontageState {
    fn default() -> Self {
        Self {
            status: MontageStatus::Idle,
            message: String::new(),
            result: None,
        }
    }
}

fn input_name(index: usize) -> String {
    format!("input_{}.mp4", index)
}

fn clip_name(index: usize) -> String {
    format!("clip_{}.mp4", index)
}

fn trim_args(input: &str, output: &str) -> Vec<String> {
    vec![
        "-i".into(),
        input.into(),
        "-ss".into(),
        CLIP_OFFSET_SECS.to_string(),
        "-t".into(),
        CLIP_DURATION_SECS.to_string(),
        "-c".into(),
        "copy".into(),
        output.into(),
    ]
}

fn concat_args() -> Vec<String> {
    ["-f", "concat", "-safe", "0", "-i", MANIFEST_FILE, "-c", "copy", OUTPUT_FILE]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn concat_manifest(clips: &[String]) -> String {
    clips
        .iter()
        .map(|c| format!("file '{}'", c))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Clears the running flag however a job ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct MontagePipeline {
    loader: Arc<dyn EngineLoader>,
    engine: OnceCell<Box<dyn TranscodeEngine>>,
    blobs: Arc<dyn BlobStore>,
    content: Arc<ContentRegistry>,
    state: watch::Sender<MontageState>,
    /// Bumped by `reset`; a job only publishes while its session is current
    session: AtomicU64,
    running: AtomicBool,
}

impl MontagePipeline {
    pub fn new(
        loader: Arc<dyn EngineLoader>,
        blobs: Arc<dyn BlobStore>,
        content: Arc<ContentRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(MontageState::default());
        Self {
            loader,
            engine: OnceCell::new(),
            blobs,
            content,
            state,
            session: AtomicU64::new(0),
            running: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MontageState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> MontageState {
        self.state.borrow().clone()
    }

    pub fn is_engine_loaded(&self) -> bool {
        self.engine.initialized()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bytes of the finished montage, while its handle is live
    pub fn result_resource(&self) -> Option<Resource> {
        let state = self.state.borrow();
        state
            .result
            .as_ref()
            .and_then(|r| self.content.resolve(&r.content))
    }

    /// Build a montage from `items` (playlist order). Returns the final state.
    pub async fn create(&self, items: &[PlaylistItem]) -> MontageState {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Montage already in progress");
            return self.state();
        }
        let _running = RunningGuard(&self.running);

        if self.state.borrow().status == MontageStatus::Complete {
            tracing::warn!("Previous montage still open; reset before creating another");
            return self.state();
        }

        let session = self.session.load(Ordering::SeqCst);

        if items.len() < MIN_CLIPS {
            self.publish(session, MontageStatus::Failed, MSG_NOT_ENOUGH, None);
            return self.state();
        }

        match self.run_job(session, items).await {
            Ok(result) => {
                let content = result.content.clone();
                if self.publish(session, MontageStatus::Complete, MSG_READY, Some(result)) {
                    tracing::info!("Montage ready ({})", content);
                } else {
                    tracing::info!("Montage finished after its dialog closed, discarding");
                    self.content.release(&content);
                }
            }
            Err(e) => {
                tracing::error!("Error creating montage: {}", e);
                self.publish(session, MontageStatus::Failed, MSG_FAILED, None);
            }
        }
        self.state()
    }

    /// Release any result and go back to `Idle`, whatever the current state
    pub fn reset(&self) {
        self.session.fetch_add(1, Ordering::SeqCst);
        let previous = self.state.send_replace(MontageState::default());
        if let Some(result) = previous.result {
            self.content.release(&result.content);
        }
    }

    fn publish(
        &self,
        session: u64,
        status: MontageStatus,
        message: &str,
        result: Option<MontageResult>,
    ) -> bool {
        if self.session.load(Ordering::SeqCst) != session {
            return false;
        }
        self.state.send_replace(MontageState {
            status,
            message: message.to_string(),
            result,
        });
        true
    }

    fn progress(&self, session: u64, message: &str) {
        self.publish(session, MontageStatus::Processing, message, None);
    }

    async fn engine(&self, session: u64) -> Result<&dyn TranscodeEngine, EngineError> {
        if let Some(engine) = self.engine.get() {
            return Ok(engine.as_ref());
        }
        self.publish(session, MontageStatus::LoadingEngine, MSG_LOADING, None);
        let engine = self.engine.get_or_try_init(|| self.loader.load()).await?;
        Ok(engine.as_ref())
    }

    async fn run_job(&self, session: u64, items: &[PlaylistItem]) -> Result<MontageResult, MontageError> {
        let engine = self.engine(session).await?;

        let selected = &items[..items.len().min(MAX_CLIPS)];
        if items.len() > selected.len() {
            tracing::debug!("Using the first {} of {} clips", selected.len(), items.len());
        }

        let mut written = Vec::new();
        let outcome = self.process(session, engine, selected, &mut written).await;
        cleanup(engine, &written).await;
        outcome
    }

    async fn process(
        &self,
        session: u64,
        engine: &dyn TranscodeEngine,
        selected: &[PlaylistItem],
        written: &mut Vec<String>,
    ) -> Result<MontageResult, MontageError> {
        let total = selected.len();

        let mut staged = Vec::new();
        for (i, item) in selected.iter().enumerate() {
            self.progress(session, &format!("Fetching video data ({}/{})", i + 1, total));
            match self.blobs.get(item.id).await? {
                Some(data) => {
                    let name = input_name(i);
                    engine.write_file(&name, data).await?;
                    written.push(name.clone());
                    staged.push((i, name));
                }
                None => {
                    tracing::warn!("Blob {} for {:?} is gone, skipping", item.id, item.title);
                }
            }
        }
        if staged.is_empty() {
            return Err(MontageError::NothingStaged);
        }

        let mut clips = Vec::new();
        for (n, (i, input)) in staged.iter().enumerate() {
            self.progress(session, &format!("Preparing clips ({}/{})", n + 1, staged.len()));
            let clip = clip_name(*i);
            written.push(clip.clone());
            engine.run(&trim_args(input, &clip)).await?;

            match engine.file_size(&clip).await {
                Ok(size) if size > 0 => clips.push(clip),
                Ok(_) | Err(EngineError::NotFound(_)) => {
                    tracing::warn!("{} produced no output (shorter than the trim window), skipping", input);
                }
                Err(e) => return Err(e.into()),
            }
        }
        if clips.is_empty() {
            return Err(MontageError::NoUsableClips);
        }

        self.progress(session, MSG_STITCHING);
        engine
            .write_file(MANIFEST_FILE, Bytes::from(concat_manifest(&clips)))
            .await?;
        written.push(MANIFEST_FILE.to_string());
        written.push(OUTPUT_FILE.to_string());
        engine.run(&concat_args()).await?;

        self.progress(session, MSG_FINALIZING);
        let data = engine.read_file(OUTPUT_FILE).await?;
        let size = data.len();
        let content = self.content.create(data, OUTPUT_MIME);

        Ok(MontageResult {
            content,
            file_name: DOWNLOAD_NAME.to_string(),
            size,
        })
    }
}

async fn cleanup(engine: &dyn TranscodeEngine, written: &[String]) {
    for name in written {
        match engine.unlink(name).await {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) => tracing::debug!("{} already gone", name),
            Err(e) => tracing::warn!("Could not clean up engine file {}: {}", name, e),
        }
    }
}
