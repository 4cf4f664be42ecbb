//! LMDB implementation of BallotStore.

use agora_store::{BallotStore, StoreError};
use agora_types::{ProposalId, VoteCommitment, VoteReveal, VoterAddress};
use heed::types::Bytes;
use heed::Database;
use serde::de::DeserializeOwned;

use crate::environment::LmdbGovernanceStore;
use crate::keys::{ballot_key, decode, proposal_key};
use crate::LmdbError;

impl LmdbGovernanceStore {
    fn scan_proposal<T: DeserializeOwned>(
        &self,
        db: &Database<Bytes, Bytes>,
        id: ProposalId,
    ) -> Result<Vec<T>, StoreError> {
        let rtxn = self.environment().env.read_txn().map_err(LmdbError::from)?;
        let mut out = Vec::new();
        for entry in db
            .prefix_iter(&rtxn, &proposal_key(id))
            .map_err(LmdbError::from)?
        {
            let (_, value) = entry.map_err(LmdbError::from)?;
            out.push(decode(value)?);
        }
        Ok(out)
    }
}

impl BallotStore for LmdbGovernanceStore {
    fn get_commitment(
        &self,
        id: ProposalId,
        voter: &VoterAddress,
    ) -> Result<Option<VoteCommitment>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let value = env
            .commitments_db
            .get(&rtxn, &ballot_key(id, voter))
            .map_err(LmdbError::from)?;
        Ok(value.map(decode).transpose()?)
    }

    fn get_reveal(
        &self,
        id: ProposalId,
        voter: &VoterAddress,
    ) -> Result<Option<VoteReveal>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let value = env
            .reveals_db
            .get(&rtxn, &ballot_key(id, voter))
            .map_err(LmdbError::from)?;
        Ok(value.map(decode).transpose()?)
    }

    fn list_commitments(&self, id: ProposalId) -> Result<Vec<VoteCommitment>, StoreError> {
        self.scan_proposal(&self.environment().commitments_db, id)
    }

    fn list_reveals(&self, id: ProposalId) -> Result<Vec<VoteReveal>, StoreError> {
        self.scan_proposal(&self.environment().reveals_db, id)
    }
}
