//! Playback sessions & transport state
//!
//! A media surface reports what its element is doing through
//! `PlaybackEvent`s; anything that reacts to playback implements
//! `PlaybackObserver`. `Session` is the transport state one element exposes
//! to the controls: play/pause, position, duration, volume.

use serde::Serialize;

/// Notifications pushed by a playing media element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Paused,
    EndedNaturally,
    PositionChanged(f64),
    DurationKnown(f64),
    /// The element reported a decode/load error
    Errored,
}

pub trait PlaybackObserver {
    fn on_event(&mut self, event: PlaybackEvent);
}

/// Volume restored when unmuting a session whose volume was zero
pub const UNMUTE_VOLUME: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Session {
    pub playing: bool,
    pub position: f64,
    pub duration: f64,
    pub volume: f32,
    pub muted: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            playing: false,
            position: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
        }
    }
}

impl Session {
    /// A session that never produces sound (the blurred backdrop)
    pub fn muted() -> Self {
        Self {
            muted: true,
            ..Self::default()
        }
    }

    /// New media loaded: playback position resets, audio settings survive
    pub fn load(&mut self) {
        self.playing = false;
        self.position = 0.0;
        self.duration = 0.0;
    }

    /// Playback could not start (e.g. autoplay refused)
    pub fn start_refused(&mut self) {
        tracing::warn!("Playback start was refused");
        self.playing = false;
    }

    pub fn seek(&mut self, position: f64) {
        let upper = if self.duration > 0.0 { self.duration } else { f64::MAX };
        self.position = position.clamp(0.0, upper);
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.muted = self.volume == 0.0;
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        if !self.muted && self.volume <= 0.0 {
            self.volume = UNMUTE_VOLUME;
        }
    }

    /// Effective output level
    pub fn level(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }
}

impl PlaybackObserver for Session {
    fn on_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started => self.playing = true,
            PlaybackEvent::Paused | PlaybackEvent::EndedNaturally | PlaybackEvent::Errored => {
                self.playing = false
            }
            PlaybackEvent::PositionChanged(t) => self.position = t,
            PlaybackEvent::DurationKnown(d) => self.duration = d,
        }
    }
}

/// `MM:SS`, or `00:00` for non-finite input
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "00:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}
