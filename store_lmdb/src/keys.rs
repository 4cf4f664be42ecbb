//! Composite key layouts and value encoding.
//!
//! Every key is fixed-width big-endian so that LMDB's lexicographic order
//! matches numeric order and prefix scans select exactly one parent:
//!
//! | database        | key                                    | value              |
//! |-----------------|----------------------------------------|--------------------|
//! | `proposals`     | `id(8)`                                | `Proposal`         |
//! | `options`       | `id(8) ‖ index(4)`                     | `ProposalOption`   |
//! | `commitments`   | `id(8) ‖ voter(20)`                    | `VoteCommitment`   |
//! | `reveals`       | `id(8) ‖ voter(20)`                    | `VoteReveal`       |
//! | `edges`         | `from(20) ‖ edge_no(8)`                | `DelegationEdge`   |
//! | `active_edges`  | `from(20) ‖ scope(8)`                  | edges key          |
//! | `edges_to`      | `to(20) ‖ from(20) ‖ edge_no(8)`       | edges key          |
//! | `deliberations` | `id(8)`                                | `Deliberation`     |
//! | `amendments`    | `id(8) ‖ index(4)`                     | `Amendment`        |
//! | `cursors`       | stream name (utf-8)                    | `sequence(8)`      |

use agora_types::{DelegationScope, ProposalId, VoterAddress};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::LmdbError;

pub const ID_LEN: usize = 8;
pub const ADDR_LEN: usize = VoterAddress::LEN;
pub const EDGE_KEY_LEN: usize = ADDR_LEN + 8;

pub fn proposal_key(id: ProposalId) -> [u8; ID_LEN] {
    id.to_be_bytes()
}

pub fn indexed_key(id: ProposalId, index: u32) -> [u8; ID_LEN + 4] {
    let mut key = [0u8; ID_LEN + 4];
    key[..ID_LEN].copy_from_slice(&id.to_be_bytes());
    key[ID_LEN..].copy_from_slice(&index.to_be_bytes());
    key
}

pub fn ballot_key(id: ProposalId, voter: &VoterAddress) -> [u8; ID_LEN + ADDR_LEN] {
    let mut key = [0u8; ID_LEN + ADDR_LEN];
    key[..ID_LEN].copy_from_slice(&id.to_be_bytes());
    key[ID_LEN..].copy_from_slice(voter.as_bytes());
    key
}

pub fn edge_key(from: &VoterAddress, edge_no: u64) -> [u8; EDGE_KEY_LEN] {
    let mut key = [0u8; EDGE_KEY_LEN];
    key[..ADDR_LEN].copy_from_slice(from.as_bytes());
    key[ADDR_LEN..].copy_from_slice(&edge_no.to_be_bytes());
    key
}

pub fn active_edge_key(from: &VoterAddress, scope: DelegationScope) -> [u8; ADDR_LEN + 8] {
    let mut key = [0u8; ADDR_LEN + 8];
    key[..ADDR_LEN].copy_from_slice(from.as_bytes());
    key[ADDR_LEN..].copy_from_slice(&scope.token().to_be_bytes());
    key
}

/// Reverse index entry: `to` followed by the edge's own key, so every
/// edge ever pointing at `to` keeps its entry after revocation.
pub fn edge_to_key(to: &VoterAddress, edge_key: &[u8; EDGE_KEY_LEN]) -> [u8; ADDR_LEN + EDGE_KEY_LEN] {
    let mut key = [0u8; ADDR_LEN + EDGE_KEY_LEN];
    key[..ADDR_LEN].copy_from_slice(to.as_bytes());
    key[ADDR_LEN..].copy_from_slice(edge_key);
    key
}

/// Decode a big-endian `u64` stored as a value or key component.
pub fn read_u64(db: &'static str, bytes: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| LmdbError::MalformedKey {
        db,
        reason: format!("expected 8 bytes, found {}", bytes.len()),
    })?;
    Ok(u64::from_be_bytes(arr))
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, LmdbError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}
