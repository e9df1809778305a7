//! # Ambient Light - Dominant Color From Video Frames
//!
//! While a video plays, the current frame is sampled once per repaint,
//! shrunk to a 20x20 thumbnail and averaged into a single color the
//! presentation layer paints behind the player.
//!
//! - Near-black pixels (every channel <= 15) are ignored so letterbox bars
//!   do not drag the average to black
//! - A frame with no qualifying pixels keeps the previous color
//! - Pause, end and error stop sampling and reset to black
//! - A blocked pixel readback stops the loop for good
//!
//! ```text
//! ┌────────────┐ grab_frame ┌────────────┐ watch ┌──────────────┐
//! │ FrameSource│───────────►│ sample loop│──────►│ presentation │
//! └────────────┘  per tick  └────────────┘  Rgb  └──────────────┘
//! ```

use crate::transport::{PlaybackEvent, PlaybackObserver};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Thumbnail edge, pixels
pub const SAMPLE_SIZE: u32 = 20;
/// Channel value at or below which a pixel counts as black
pub const BLACK_THRESHOLD: u8 = 15;
/// Only every Nth thumbnail pixel is read
const PIXEL_STRIDE: usize = 2;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Pixel readback blocked: {0}")]
    ReadbackBlocked(String),
    #[error("Frame source failed: {0}")]
    Source(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_css(&self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Something that can hand over the frame currently on screen
pub trait FrameSource: Send + Sync {
    /// `Ok(None)` while no frame has been decoded yet
    fn grab_frame(&self) -> Result<Option<RgbaImage>, SampleError>;
}

/// Mean color of a frame's non-black pixels, or `previous` if there are none
pub fn dominant_color(frame: &RgbaImage, previous: Rgb) -> Rgb {
    let resized;
    let thumb = if frame.dimensions() == (SAMPLE_SIZE, SAMPLE_SIZE) {
        frame
    } else {
        resized = imageops::resize(frame, SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle);
        &resized
    };

    let (mut r, mut g, mut b, mut count) = (0u64, 0u64, 0u64, 0u64);
    for pixel in thumb.pixels().step_by(PIXEL_STRIDE) {
        let [pr, pg, pb, _] = pixel.0;
        if pr > BLACK_THRESHOLD || pg > BLACK_THRESHOLD || pb > BLACK_THRESHOLD {
            r += pr as u64;
            g += pg as u64;
            b += pb as u64;
            count += 1;
        }
    }

    if count == 0 {
        return previous;
    }
    Rgb::new((r / count) as u8, (g / count) as u8, (b / count) as u8)
}

// ============================================================================
// Sampling loop
// ============================================================================

pub struct AmbientLight {
    interval: Duration,
    source: Option<Arc<dyn FrameSource>>,
    color: Arc<watch::Sender<Rgb>>,
    task: Option<JoinHandle<()>>,
}

impl AmbientLight {
    pub fn new(repaint_hz: u32) -> Self {
        let (tx, _) = watch::channel(Rgb::BLACK);
        Self {
            interval: Duration::from_secs_f64(1.0 / repaint_hz.max(1) as f64),
            source: None,
            color: Arc::new(tx),
            task: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Rgb> {
        self.color.subscribe()
    }

    pub fn color(&self) -> Rgb {
        *self.color.borrow()
    }

    /// Point the extractor at a new video element; sampling stays stopped
    /// until the next `Started`
    pub fn attach(&mut self, source: Arc<dyn FrameSource>) {
        self.stop();
        self.source = Some(source);
    }

    pub fn detach(&mut self) {
        self.stop();
        self.source = None;
    }

    pub fn start(&mut self) {
        let Some(source) = self.source.clone() else {
            tracing::debug!("Ambient start ignored: no frame source attached");
            return;
        };
        self.abort_task();
        self.task = Some(tokio::spawn(sample_loop(
            source,
            self.interval,
            self.color.clone(),
        )));
    }

    pub fn stop(&mut self) {
        self.abort_task();
        self.color.send_replace(Rgb::BLACK);
    }

    pub fn is_sampling(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl PlaybackObserver for AmbientLight {
    fn on_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started => self.start(),
            PlaybackEvent::Paused | PlaybackEvent::EndedNaturally | PlaybackEvent::Errored => {
                self.stop()
            }
            PlaybackEvent::PositionChanged(_) | PlaybackEvent::DurationKnown(_) => {}
        }
    }
}

impl Drop for AmbientLight {
    fn drop(&mut self) {
        self.abort_task();
    }
}

async fn sample_loop(source: Arc<dyn FrameSource>, interval: Duration, color: Arc<watch::Sender<Rgb>>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match source.grab_frame() {
            Ok(Some(frame)) => {
                let previous = *color.borrow();
                let next = dominant_color(&frame, previous);
                if next != previous {
                    color.send_replace(next);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Stopping ambient sampling: {}", e);
                return;
            }
        }
    }
}
