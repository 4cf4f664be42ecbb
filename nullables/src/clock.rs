//! Nullable clock: deterministic ledger time for testing.

use agora_types::{BlockHeight, Timestamp};
use std::cell::Cell;

/// A deterministic clock for testing.
///
/// Tracks both ledger height (ballot deadlines) and wall-clock seconds
/// (deliberation windows). Neither advances unless you tell it to.
pub struct NullClock {
    height: Cell<u64>,
    secs: Cell<u64>,
}

impl NullClock {
    pub fn new(initial_height: u64, initial_secs: u64) -> Self {
        Self {
            height: Cell::new(initial_height),
            secs: Cell::new(initial_secs),
        }
    }

    /// Current ledger height.
    pub fn height(&self) -> BlockHeight {
        BlockHeight::new(self.height.get())
    }

    /// Current time.
    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.secs.get())
    }

    /// Mine `blocks` blocks.
    pub fn advance_blocks(&self, blocks: u64) {
        self.height.set(self.height.get() + blocks);
    }

    /// Advance time by a number of seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.secs.set(self.secs.get() + secs);
    }

    pub fn set_height(&self, height: u64) {
        self.height.set(height);
    }

    pub fn set_secs(&self, secs: u64) {
        self.secs.set(secs);
    }
}

impl Default for NullClock {
    fn default() -> Self {
        Self::new(0, 0)
    }
}
