//! LMDB implementation of CursorStore.

use agora_store::{CursorStore, StoreError};
use agora_types::{StreamName, SyncCursor};

use crate::environment::LmdbGovernanceStore;
use crate::keys::read_u64;
use crate::LmdbError;

fn stream_from_key(key: &[u8]) -> Result<StreamName, LmdbError> {
    let name = std::str::from_utf8(key).map_err(|e| LmdbError::MalformedKey {
        db: "cursors",
        reason: e.to_string(),
    })?;
    StreamName::new(name).map_err(|e| LmdbError::MalformedKey {
        db: "cursors",
        reason: e.to_string(),
    })
}

impl CursorStore for LmdbGovernanceStore {
    fn get_cursor(&self, stream: &StreamName) -> Result<Option<SyncCursor>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        match env
            .cursors_db
            .get(&rtxn, stream.as_str().as_bytes())
            .map_err(LmdbError::from)?
        {
            Some(bytes) => Ok(Some(SyncCursor {
                stream: stream.clone(),
                sequence: read_u64("cursors", bytes)?,
            })),
            None => Ok(None),
        }
    }

    fn list_cursors(&self) -> Result<Vec<SyncCursor>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let mut cursors = Vec::new();
        for entry in env.cursors_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, value) = entry.map_err(LmdbError::from)?;
            cursors.push(SyncCursor {
                stream: stream_from_key(key)?,
                sequence: read_u64("cursors", value)?,
            });
        }
        Ok(cursors)
    }
}
