//! Ledger block height: the clock that drives commit and reveal deadlines.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A ledger block height.
///
/// Commit and reveal deadlines are expressed in heights and compared lazily
/// against the height at which an action settles.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockHeight(u64);

impl BlockHeight {
    pub const GENESIS: Self = Self(0);

    pub fn new(height: u64) -> Self {
        Self(height)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Height `blocks` after this one, saturating at `u64::MAX`.
    pub fn plus(&self, blocks: u64) -> Self {
        Self(self.0.saturating_add(blocks))
    }

    /// Whether a deadline at this height has elapsed at `now` (strictly past it).
    pub fn has_elapsed(&self, now: BlockHeight) -> bool {
        now.0 > self.0
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
