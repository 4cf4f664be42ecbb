//! Sync cursor storage trait.

use crate::StoreError;
use agora_types::{StreamName, SyncCursor};

/// Per-stream high-water marks of fully applied ledger events.
pub trait CursorStore {
    fn get_cursor(&self, stream: &StreamName) -> Result<Option<SyncCursor>, StoreError>;

    /// All known cursors, ordered by stream name.
    fn list_cursors(&self) -> Result<Vec<SyncCursor>, StoreError>;
}
