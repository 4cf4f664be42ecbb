//! LMDB implementation of DelegationStore.
//!
//! Edges are append-only in `edges`. Two index databases point into it:
//! `active_edges` (one entry per active `(from, scope)`) and `edges_to`
//! (reverse lookup for voting power, one entry per edge ever created).
//! Revocation removes the `active_edges` entry and stamps `revoked_at` on
//! the edge, never deleting it.

use agora_store::{DelegationStore, StoreError};
use agora_types::{DelegationEdge, DelegationScope, VoterAddress};
use heed::RoTxn;

use crate::environment::{LmdbEnvironment, LmdbGovernanceStore};
use crate::keys::{active_edge_key, decode};
use crate::LmdbError;

impl LmdbEnvironment {
    /// Follow an index value to the edge it names.
    pub(crate) fn edge_at(
        &self,
        txn: &RoTxn<'_>,
        edge_key: &[u8],
    ) -> Result<(DelegationEdge, Vec<u8>), LmdbError> {
        let value = self
            .edges_db
            .get(txn, edge_key)?
            .ok_or_else(|| LmdbError::MalformedKey {
                db: "edges",
                reason: "index points at a missing edge".to_string(),
            })?;
        Ok((decode(value)?, edge_key.to_vec()))
    }

    /// The active edge for `(from, scope)` and its key in `edges`.
    pub(crate) fn active_edge(
        &self,
        txn: &RoTxn<'_>,
        from: &VoterAddress,
        scope: DelegationScope,
    ) -> Result<Option<(DelegationEdge, Vec<u8>)>, LmdbError> {
        let key = match self.active_edges_db.get(txn, &active_edge_key(from, scope))? {
            Some(key) => key.to_vec(),
            None => return Ok(None),
        };
        self.edge_at(txn, &key).map(Some)
    }
}

impl DelegationStore for LmdbGovernanceStore {
    fn active_delegation(
        &self,
        from: &VoterAddress,
        scope: DelegationScope,
    ) -> Result<Option<DelegationEdge>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        Ok(env.active_edge(&rtxn, from, scope)?.map(|(edge, _)| edge))
    }

    fn active_delegations_to(&self, to: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError> {
        let mut edges = self.delegations_to(to)?;
        edges.retain(DelegationEdge::is_active);
        Ok(edges)
    }

    fn delegations_to(&self, to: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let mut edges = Vec::new();
        for entry in env
            .edges_to_db
            .prefix_iter(&rtxn, to.as_bytes())
            .map_err(LmdbError::from)?
        {
            let (_, edge_key) = entry.map_err(LmdbError::from)?;
            edges.push(env.edge_at(&rtxn, edge_key)?.0);
        }
        Ok(edges)
    }

    fn delegation_history(&self, from: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let mut edges = Vec::new();
        for entry in env
            .edges_db
            .prefix_iter(&rtxn, from.as_bytes())
            .map_err(LmdbError::from)?
        {
            let (_, value) = entry.map_err(LmdbError::from)?;
            edges.push(decode(value)?);
        }
        Ok(edges)
    }
}
