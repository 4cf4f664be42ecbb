//! Durable sync cursors, one per ledger event stream.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypeError;

/// Name of a ledger event stream (e.g. `"votes"`, `"delegations"`).
///
/// Events are totally ordered within a stream and unordered across streams.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamName(String);

impl StreamName {
    pub fn new(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(TypeError::EmptyStreamName);
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Highest fully-applied sequence number for a stream.
///
/// Never decreases. An event whose sequence is at or below the cursor has
/// already been applied and is skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub stream: StreamName,
    pub sequence: u64,
}

impl SyncCursor {
    /// Whether an event with `sequence` was already applied.
    pub fn covers(&self, sequence: u64) -> bool {
        sequence <= self.sequence
    }
}
