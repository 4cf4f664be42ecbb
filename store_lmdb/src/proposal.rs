//! LMDB implementation of ProposalStore.

use agora_store::{ProposalStore, StoreError};
use agora_types::{Proposal, ProposalId, ProposalOption};

use crate::environment::LmdbGovernanceStore;
use crate::keys::{decode, indexed_key, proposal_key, read_u64};
use crate::LmdbError;

impl ProposalStore for LmdbGovernanceStore {
    fn get_proposal(&self, id: ProposalId) -> Result<Option<Proposal>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let value = env
            .proposals_db
            .get(&rtxn, &proposal_key(id))
            .map_err(LmdbError::from)?;
        Ok(value.map(decode).transpose()?)
    }

    fn get_option(
        &self,
        id: ProposalId,
        index: u32,
    ) -> Result<Option<ProposalOption>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let value = env
            .options_db
            .get(&rtxn, &indexed_key(id, index))
            .map_err(LmdbError::from)?;
        Ok(value.map(decode).transpose()?)
    }

    fn get_options(&self, id: ProposalId) -> Result<Vec<ProposalOption>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let mut options = Vec::new();
        for entry in env
            .options_db
            .prefix_iter(&rtxn, &proposal_key(id))
            .map_err(LmdbError::from)?
        {
            let (_, value) = entry.map_err(LmdbError::from)?;
            options.push(decode(value)?);
        }
        Ok(options)
    }

    fn list_proposals(&self) -> Result<Vec<ProposalId>, StoreError> {
        let env = self.environment();
        let rtxn = env.env.read_txn().map_err(LmdbError::from)?;
        let mut ids = Vec::new();
        for entry in env.proposals_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (key, _) = entry.map_err(LmdbError::from)?;
            ids.push(ProposalId::new(read_u64("proposals", key)?));
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::test_support::temp_store;
    use agora_store::{BatchStore, StoreOp, WriteBatch};
    use agora_types::{BallotPhase, BlockHeight, ContentId, VoterAddress};

    fn insert(id: u64, options: u32) -> StoreOp {
        let id = ProposalId::new(id);
        StoreOp::InsertProposal {
            proposal: Proposal {
                id,
                title: format!("Proposal {}", id),
                content: ContentId::new("QmCid").unwrap(),
                proposer: VoterAddress::new([1; 20]),
                phase: BallotPhase::Commit,
                option_count: options,
                commit_deadline: BlockHeight::new(10),
                reveal_deadline: BlockHeight::new(20),
                total_votes: 0,
                created_at: BlockHeight::new(0),
                deliberation: None,
            },
            options: (0..options)
                .map(|index| ProposalOption {
                    proposal_id: id,
                    index,
                    label: format!("Option {}", index),
                    votes: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn options_are_scoped_to_their_proposal() {
        let (_dir, store) = temp_store();
        store
            .commit_batch(WriteBatch::from(vec![insert(1, 3), insert(2, 2)]))
            .unwrap();

        let options = store.get_options(ProposalId::new(1)).unwrap();
        assert_eq!(options.len(), 3);
        assert_eq!(options[2].label, "Option 2");
        assert_eq!(store.get_options(ProposalId::new(2)).unwrap().len(), 2);
        assert!(store.get_option(ProposalId::new(2), 2).unwrap().is_none());
    }

    #[test]
    fn list_proposals_ascending() {
        let (_dir, store) = temp_store();
        store
            .commit_batch(WriteBatch::from(vec![insert(300, 2), insert(7, 2)]))
            .unwrap();
        assert_eq!(
            store.list_proposals().unwrap(),
            vec![ProposalId::new(7), ProposalId::new(300)]
        );
    }

    #[test]
    fn missing_proposal_is_none() {
        let (_dir, store) = temp_store();
        assert!(store.get_proposal(ProposalId::new(42)).unwrap().is_none());
    }
}
