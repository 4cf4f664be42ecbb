//! LMDB implementation of DeliberationStore.

use agora_store::{DeliberationStore, StoreError};
use agora_types::{Amendment, Deliberation, ProposalId};

use crate::environment::LmdbGovernanceStore;
use crate::keys::{decode, proposal_key};
use crate::LmdbError;

impl DeliberationStore for LmdbGovernanceStore {
    fn get_deliberation(&self, id: ProposalId) -> Result<Option<Deliberation>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let value = env
            .deliberations_db
            .get(&rtxn, &proposal_key(id))
            .map_err(LmdbError::from)?;
        Ok(value.map(decode).transpose()?)
    }

    fn get_amendments(&self, id: ProposalId) -> Result<Vec<Amendment>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let mut amendments = Vec::new();
        for entry in env
            .amendments_db
            .prefix_iter(&rtxn, &proposal_key(id))
            .map_err(LmdbError::from)?
        {
            let (_, value) = entry.map_err(LmdbError::from)?;
            amendments.push(decode(value)?);
        }
        Ok(amendments)
    }
}
