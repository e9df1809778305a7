//! Playlist item id allocation
//!
//! Ids are wall-clock milliseconds, bumped past the last issued id so two
//! files added in the same millisecond still get distinct, increasing ids.

/// Millisecond clock used to seed ids
pub type ClockFn = Box<dyn Fn() -> u64 + Send + Sync>;

pub struct IdAllocator {
    clock: ClockFn,
    last: u64,
}

impl IdAllocator {
    /// Allocator seeded from the system clock
    pub fn new() -> Self {
        Self::with_clock(Box::new(|| chrono::Utc::now().timestamp_millis().max(0) as u64))
    }

    pub fn with_clock(clock: ClockFn) -> Self {
        Self { clock, last: 0 }
    }

    /// Next id, strictly greater than every id issued or observed so far
    pub fn next_id(&mut self) -> u64 {
        let now = (self.clock)();
        let id = if now > self.last { now } else { self.last + 1 };
        self.last = id;
        id
    }

    /// Record an id that came from elsewhere (a restored session)
    pub fn observe(&mut self, id: u64) {
        self.last = self.last.max(id);
    }

    pub fn last_issued(&self) -> u64 {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdAllocator").field("last", &self.last).finish()
    }
}
