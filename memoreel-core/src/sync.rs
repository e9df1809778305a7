//! Backdrop Synchronization
//!
//! The visible player is master. A muted backdrop session plays the same
//! content behind it and follows: play state is mirrored immediately,
//! position only when it drifts past a threshold.

use crate::transport::Session;
use serde::Serialize;

/// Default drift tolerance, seconds
pub const DRIFT_THRESHOLD_SECS: f64 = 0.5;

/// Correction the surface must apply to the backdrop element
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", content = "position", rename_all = "snake_case")]
pub enum SyncAction {
    Play,
    Pause,
    Seek(f64),
}

#[derive(Debug, Clone)]
pub struct BackdropSync {
    threshold_secs: f64,
    corrections: u64,
}

impl Default for BackdropSync {
    fn default() -> Self {
        Self::new(DRIFT_THRESHOLD_SECS)
    }
}

impl BackdropSync {
    pub fn new(threshold_secs: f64) -> Self {
        Self {
            threshold_secs: threshold_secs.max(0.0),
            corrections: 0,
        }
    }

    /// Drift in seconds. Positive = backdrop ahead.
    pub fn drift(main: &Session, backdrop: &Session) -> f64 {
        backdrop.position - main.position
    }

    /// Bring `backdrop` in line with `main`, returning what changed
    pub fn reconcile(&mut self, main: &Session, backdrop: &mut Session) -> Vec<SyncAction> {
        let mut actions = Vec::new();

        if main.playing != backdrop.playing {
            backdrop.playing = main.playing;
            actions.push(if main.playing {
                SyncAction::Play
            } else {
                SyncAction::Pause
            });
        }

        if Self::drift(main, backdrop).abs() > self.threshold_secs {
            backdrop.position = main.position;
            self.corrections += 1;
            actions.push(SyncAction::Seek(main.position));
        }

        actions
    }

    pub fn corrections(&self) -> u64 {
        self.corrections
    }
}
