//! Store metadata: schema version and the delegation edge counter.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};

use crate::environment::LmdbEnvironment;
use crate::LmdbError;

pub const SCHEMA_VERSION: u32 = 2;

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
const EDGE_COUNTER_KEY: &[u8] = b"edge_counter";

/// Stamp the schema version on a fresh environment, or verify it on reopen.
pub(crate) fn ensure_schema_version(
    meta_db: &Database<Bytes, Bytes>,
    wtxn: &mut RwTxn<'_>,
) -> Result<(), LmdbError> {
    match read_schema_version(meta_db, &*wtxn)? {
        None => {
            meta_db.put(wtxn, SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_le_bytes())?;
            Ok(())
        }
        Some(SCHEMA_VERSION) => Ok(()),
        Some(other) => Err(LmdbError::Serialization(format!(
            "unsupported schema version {} (expected {})",
            other, SCHEMA_VERSION
        ))),
    }
}

fn read_schema_version(
    meta_db: &Database<Bytes, Bytes>,
    txn: &RoTxn<'_>,
) -> Result<Option<u32>, LmdbError> {
    match meta_db.get(txn, SCHEMA_VERSION_KEY)? {
        None => Ok(None),
        Some(bytes) => {
            let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                LmdbError::Serialization(format!(
                    "invalid schema_version length: {}",
                    bytes.len()
                ))
            })?;
            Ok(Some(u32::from_le_bytes(arr)))
        }
    }
}

/// Read the schema version recorded in the environment.
pub fn schema_version(env: &LmdbEnvironment) -> Result<Option<u32>, LmdbError> {
    let rtxn = env.env.read_txn()?;
    read_schema_version(&env.meta_db, &rtxn)
}

/// Allocate the next delegation edge number inside an open write
/// transaction. The counter rolls back together with an aborted batch.
pub(crate) fn next_edge_number(
    meta_db: &Database<Bytes, Bytes>,
    wtxn: &mut RwTxn<'_>,
) -> Result<u64, LmdbError> {
    let current = match meta_db.get(&*wtxn, EDGE_COUNTER_KEY)? {
        Some(bytes) => crate::keys::read_u64("meta", bytes)?,
        None => 0,
    };
    let next = current + 1;
    meta_db.put(wtxn, EDGE_COUNTER_KEY, &next.to_be_bytes())?;
    Ok(next)
}
