//! Image display timer
//!
//! Images have no natural end, so the player arms a one-shot timer when an
//! image becomes current. Re-arming or cancelling aborts the pending timer,
//! and every signal carries the generation it was armed for so a signal that
//! raced a cancel can still be recognised as stale.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long an image stays on screen before advancing
pub const IMAGE_DISPLAY: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceSignal {
    pub generation: u64,
}

#[derive(Debug)]
pub struct AdvanceTimer {
    tx: mpsc::UnboundedSender<AdvanceSignal>,
    pending: Option<JoinHandle<()>>,
    generation: u64,
}

impl AdvanceTimer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AdvanceSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                pending: None,
                generation: 0,
            },
            rx,
        )
    }

    /// Start (or restart) the countdown
    pub fn arm(&mut self, delay: Duration) -> u64 {
        self.cancel();
        let generation = self.generation;
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(AdvanceSignal { generation });
        }));
        generation
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn is_current(&self, signal: AdvanceSignal) -> bool {
        signal.generation == self.generation && self.pending.is_some()
    }

    /// Mark the pending timer as consumed
    pub fn disarm(&mut self) {
        self.pending = None;
    }
}

impl Drop for AdvanceTimer {
    fn drop(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}
