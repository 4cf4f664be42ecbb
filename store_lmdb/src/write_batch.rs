//! Write batching: applies a [`WriteBatch`] inside a single LMDB write
//! transaction.
//!
//! Each [`StoreOp`] checks its own precondition against the transaction's
//! view, which already includes earlier ops of the same batch. The first
//! failing op returns early; dropping the uncommitted `RwTxn` aborts it, so
//! none of the batch becomes visible.

use agora_store::{BatchStore, StoreError, StoreOp, WriteBatch};
use agora_types::{Proposal, ProposalId, ProposalOption, VoteCommitment, VoteReveal};
use heed::RwTxn;

use crate::environment::{LmdbEnvironment, LmdbGovernanceStore};
use crate::keys::{
    active_edge_key, ballot_key, decode, edge_key, edge_to_key, encode, indexed_key,
    proposal_key, read_u64,
};
use crate::meta::next_edge_number;
use crate::LmdbError;

impl LmdbEnvironment {
    fn load_proposal(&self, wtxn: &RwTxn<'_>, id: ProposalId) -> Result<Proposal, StoreError> {
        let value = self
            .proposals_db
            .get(wtxn, &proposal_key(id))
            .map_err(LmdbError::from)?
            .ok_or_else(|| StoreError::NotFound(format!("proposal {}", id)))?;
        Ok(decode(value)?)
    }

    fn store_proposal(&self, wtxn: &mut RwTxn<'_>, proposal: &Proposal) -> Result<(), StoreError> {
        self.proposals_db
            .put(wtxn, &proposal_key(proposal.id), &encode(proposal)?)
            .map_err(LmdbError::from)?;
        Ok(())
    }

    fn apply_op(&self, wtxn: &mut RwTxn<'_>, op: StoreOp) -> Result<(), StoreError> {
        match op {
            StoreOp::InsertProposal { proposal, options } => {
                let key = proposal_key(proposal.id);
                if self.proposals_db.get(wtxn, &key).map_err(LmdbError::from)?.is_some() {
                    return Err(StoreError::Duplicate(format!("proposal {}", proposal.id)));
                }
                self.store_proposal(wtxn, &proposal)?;
                for option in &options {
                    self.options_db
                        .put(wtxn, &indexed_key(option.proposal_id, option.index), &encode(option)?)
                        .map_err(LmdbError::from)?;
                }
            }
            StoreOp::SetProposalPhase { id, phase } => {
                let mut proposal = self.load_proposal(wtxn, id)?;
                proposal.phase = phase;
                self.store_proposal(wtxn, &proposal)?;
            }
            StoreOp::AddVotes { id, option, power } => {
                let mut proposal = self.load_proposal(wtxn, id)?;
                let key = indexed_key(id, option);
                let mut entry: ProposalOption = match self
                    .options_db
                    .get(wtxn, &key)
                    .map_err(LmdbError::from)?
                {
                    Some(value) => decode(value)?,
                    None => return Err(StoreError::NotFound(format!("option {}/{}", id, option))),
                };
                entry.votes += power;
                proposal.total_votes += power;
                self.options_db
                    .put(wtxn, &key, &encode(&entry)?)
                    .map_err(LmdbError::from)?;
                self.store_proposal(wtxn, &proposal)?;
            }
            StoreOp::AdjustRevealPower { id, voter, delta } => {
                let key = ballot_key(id, &voter);
                let mut reveal: VoteReveal = match self
                    .reveals_db
                    .get(wtxn, &key)
                    .map_err(LmdbError::from)?
                {
                    Some(value) => decode(value)?,
                    None => return Err(StoreError::NotFound(format!("reveal {}/{}", id, voter))),
                };
                let option_key = indexed_key(id, reveal.option);
                let mut option: ProposalOption = match self
                    .options_db
                    .get(wtxn, &option_key)
                    .map_err(LmdbError::from)?
                {
                    Some(value) => decode(value)?,
                    None => {
                        return Err(StoreError::NotFound(format!("option {}/{}", id, reveal.option)))
                    }
                };
                let mut proposal = self.load_proposal(wtxn, id)?;
                reveal.power = shift(reveal.power, delta, 1, "reveal power")?;
                option.votes = shift(option.votes, delta, 0, "option votes")?;
                proposal.total_votes = shift(proposal.total_votes, delta, 0, "total votes")?;
                self.reveals_db
                    .put(wtxn, &key, &encode(&reveal)?)
                    .map_err(LmdbError::from)?;
                self.options_db
                    .put(wtxn, &option_key, &encode(&option)?)
                    .map_err(LmdbError::from)?;
                self.store_proposal(wtxn, &proposal)?;
            }
            StoreOp::InsertCommitment(commitment) => {
                let key = ballot_key(commitment.proposal_id, &commitment.voter);
                if self.commitments_db.get(wtxn, &key).map_err(LmdbError::from)?.is_some() {
                    return Err(StoreError::Duplicate(format!(
                        "commitment {}/{}",
                        commitment.proposal_id, commitment.voter
                    )));
                }
                self.commitments_db
                    .put(wtxn, &key, &encode(&commitment)?)
                    .map_err(LmdbError::from)?;
            }
            StoreOp::RecordReveal(reveal) => {
                let key = ballot_key(reveal.proposal_id, &reveal.voter);
                let mut commitment: VoteCommitment = match self
                    .commitments_db
                    .get(wtxn, &key)
                    .map_err(LmdbError::from)?
                {
                    Some(value) => decode(value)?,
                    None => {
                        return Err(StoreError::NotFound(format!(
                            "commitment {}/{}",
                            reveal.proposal_id, reveal.voter
                        )))
                    }
                };
                let already = self.reveals_db.get(wtxn, &key).map_err(LmdbError::from)?.is_some();
                if commitment.revealed || already {
                    return Err(StoreError::Duplicate(format!(
                        "reveal {}/{}",
                        reveal.proposal_id, reveal.voter
                    )));
                }
                commitment.revealed = true;
                self.commitments_db
                    .put(wtxn, &key, &encode(&commitment)?)
                    .map_err(LmdbError::from)?;
                self.reveals_db
                    .put(wtxn, &key, &encode(&reveal)?)
                    .map_err(LmdbError::from)?;
            }
            StoreOp::PutDelegation(edge) => {
                let active_key = active_edge_key(&edge.from, edge.scope);
                if self.active_edges_db.get(wtxn, &active_key).map_err(LmdbError::from)?.is_some() {
                    return Err(StoreError::Duplicate(format!(
                        "active delegation {}/{}",
                        edge.from, edge.scope
                    )));
                }
                let edge_no = next_edge_number(&self.meta_db, wtxn)?;
                let key = edge_key(&edge.from, edge_no);
                self.edges_db
                    .put(wtxn, &key, &encode(&edge)?)
                    .map_err(LmdbError::from)?;
                self.active_edges_db
                    .put(wtxn, &active_key, &key)
                    .map_err(LmdbError::from)?;
                self.edges_to_db
                    .put(wtxn, &edge_to_key(&edge.to, &key), &key)
                    .map_err(LmdbError::from)?;
            }
            StoreOp::RevokeDelegation { from, scope, at } => {
                let (mut edge, key) = self.active_edge(wtxn, &from, scope)?.ok_or_else(|| {
                    StoreError::NotFound(format!("active delegation {}/{}", from, scope))
                })?;
                edge.revoked_at = Some(at);
                self.edges_db
                    .put(wtxn, &key, &encode(&edge)?)
                    .map_err(LmdbError::from)?;
                self.active_edges_db
                    .delete(wtxn, &active_edge_key(&from, scope))
                    .map_err(LmdbError::from)?;
            }
            StoreOp::InsertDeliberation(deliberation) => {
                let key = proposal_key(deliberation.id);
                if self.deliberations_db.get(wtxn, &key).map_err(LmdbError::from)?.is_some() {
                    return Err(StoreError::Duplicate(format!(
                        "deliberation {}",
                        deliberation.id
                    )));
                }
                self.deliberations_db
                    .put(wtxn, &key, &encode(&deliberation)?)
                    .map_err(LmdbError::from)?;
            }
            StoreOp::UpdateDeliberation(deliberation) => {
                let key = proposal_key(deliberation.id);
                if self.deliberations_db.get(wtxn, &key).map_err(LmdbError::from)?.is_none() {
                    return Err(StoreError::NotFound(format!(
                        "deliberation {}",
                        deliberation.id
                    )));
                }
                self.deliberations_db
                    .put(wtxn, &key, &encode(&deliberation)?)
                    .map_err(LmdbError::from)?;
            }
            StoreOp::InsertAmendment(amendment) => {
                let key = indexed_key(amendment.deliberation_id, amendment.index);
                if self.amendments_db.get(wtxn, &key).map_err(LmdbError::from)?.is_some() {
                    return Err(StoreError::Duplicate(format!(
                        "amendment {}/{}",
                        amendment.deliberation_id, amendment.index
                    )));
                }
                self.amendments_db
                    .put(wtxn, &key, &encode(&amendment)?)
                    .map_err(LmdbError::from)?;
            }
            StoreOp::AdvanceCursor(cursor) => {
                let key = cursor.stream.as_str().as_bytes();
                if let Some(bytes) = self.cursors_db.get(wtxn, key).map_err(LmdbError::from)? {
                    let current = read_u64("cursors", bytes)?;
                    if cursor.sequence < current {
                        return Err(StoreError::CursorRegression {
                            stream: cursor.stream.to_string(),
                            current,
                            requested: cursor.sequence,
                        });
                    }
                }
                self.cursors_db
                    .put(wtxn, key, &cursor.sequence.to_be_bytes())
                    .map_err(LmdbError::from)?;
            }
        }
        Ok(())
    }
}

/// `value + delta`, refusing to go below `floor`.
fn shift(value: u64, delta: i64, floor: u64, what: &str) -> Result<u64, StoreError> {
    value
        .checked_add_signed(delta)
        .filter(|v| *v >= floor)
        .ok_or_else(|| StoreError::Corruption(format!("{what} {value} cannot move by {delta}")))
}

impl BatchStore for LmdbGovernanceStore {
    fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let env = self.environment();
        let mut wtxn = env.env.write_txn().map_err(LmdbError::from)?;
        let ops = batch.len();
        for op in batch.into_ops() {
            env.apply_op(&mut wtxn, op)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        tracing::trace!(ops, "write batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::test_support::temp_store;
    use agora_store::{BallotStore, CursorStore, DelegationStore, DeliberationStore, ProposalStore};
    use agora_types::{
        Amendment, BallotPhase, BlockHeight, CommitmentHash, ContentId, DelegationEdge, DelegationScope,
        Deliberation, DeliberationPhase, StreamName, SyncCursor, Timestamp, VoteReveal,
        VoterAddress,
    };

    fn voter(n: u8) -> VoterAddress {
        VoterAddress::new([n; 20])
    }

    fn insert_proposal(id: u64) -> StoreOp {
        let id = ProposalId::new(id);
        StoreOp::InsertProposal {
            proposal: Proposal {
                id,
                title: "Treasury".into(),
                content: ContentId::new("QmTreasury").unwrap(),
                proposer: voter(1),
                phase: BallotPhase::Commit,
                option_count: 2,
                commit_deadline: BlockHeight::new(10),
                reveal_deadline: BlockHeight::new(20),
                total_votes: 0,
                created_at: BlockHeight::new(0),
                deliberation: None,
            },
            options: vec![
                ProposalOption { proposal_id: id, index: 0, label: "Yes".into(), votes: 0 },
                ProposalOption { proposal_id: id, index: 1, label: "No".into(), votes: 0 },
            ],
        }
    }

    fn commit(id: u64, v: u8) -> StoreOp {
        StoreOp::InsertCommitment(VoteCommitment {
            proposal_id: ProposalId::new(id),
            voter: voter(v),
            commitment: CommitmentHash::new([v; 32]),
            revealed: false,
            committed_at: BlockHeight::new(2),
        })
    }

    fn reveal(id: u64, v: u8, option: u32, power: u64) -> StoreOp {
        StoreOp::RecordReveal(VoteReveal {
            proposal_id: ProposalId::new(id),
            voter: voter(v),
            option,
            power,
            revealed_at: BlockHeight::new(12),
        })
    }

    fn edge(from: u8, to: u8, scope: DelegationScope) -> DelegationEdge {
        DelegationEdge {
            from: voter(from),
            to: voter(to),
            scope,
            created_at: BlockHeight::new(1),
            sequence: 1,
            revoked_at: None,
        }
    }

    fn cursor(seq: u64) -> StoreOp {
        StoreOp::AdvanceCursor(SyncCursor {
            stream: StreamName::new("mainnet").unwrap(),
            sequence: seq,
        })
    }

    #[test]
    fn reveal_flow_updates_counts() {
        let (_dir, store) = temp_store();
        store
            .commit_batch(WriteBatch::from(vec![insert_proposal(1), commit(1, 2), commit(1, 3)]))
            .unwrap();
        store
            .commit_batch(WriteBatch::from(vec![
                reveal(1, 2, 0, 2),
                StoreOp::AddVotes { id: ProposalId::new(1), option: 0, power: 2 },
            ]))
            .unwrap();

        let proposal = store.get_proposal(ProposalId::new(1)).unwrap().unwrap();
        assert_eq!(proposal.total_votes, 2);
        assert_eq!(store.get_option(ProposalId::new(1), 0).unwrap().unwrap().votes, 2);
        assert!(store.get_commitment(ProposalId::new(1), &voter(2)).unwrap().unwrap().revealed);
        assert!(!store.get_commitment(ProposalId::new(1), &voter(3)).unwrap().unwrap().revealed);
        assert_eq!(store.list_reveals(ProposalId::new(1)).unwrap().len(), 1);
        assert_eq!(store.list_commitments(ProposalId::new(1)).unwrap().len(), 2);
    }

    #[test]
    fn reveal_power_adjustment_moves_counts() {
        let (_dir, store) = temp_store();
        let id = ProposalId::new(1);
        store
            .commit_batch(WriteBatch::from(vec![
                insert_proposal(1),
                commit(1, 2),
                reveal(1, 2, 1, 1),
                StoreOp::AddVotes { id, option: 1, power: 1 },
            ]))
            .unwrap();

        store
            .commit_batch(WriteBatch::from(vec![StoreOp::AdjustRevealPower {
                id,
                voter: voter(2),
                delta: 2,
            }]))
            .unwrap();
        assert_eq!(store.get_reveal(id, &voter(2)).unwrap().unwrap().power, 3);
        assert_eq!(store.get_option(id, 1).unwrap().unwrap().votes, 3);
        assert_eq!(store.get_proposal(id).unwrap().unwrap().total_votes, 3);

        // Power never drops below the voter's own vote.
        let err = store
            .commit_batch(WriteBatch::from(vec![StoreOp::AdjustRevealPower {
                id,
                voter: voter(2),
                delta: -3,
            }]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Corruption(_)));
        assert_eq!(store.get_reveal(id, &voter(2)).unwrap().unwrap().power, 3);

        let err = store
            .commit_batch(WriteBatch::from(vec![StoreOp::AdjustRevealPower {
                id,
                voter: voter(9),
                delta: 1,
            }]))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn duplicate_aborts_entire_batch() {
        let (_dir, store) = temp_store();
        store
            .commit_batch(WriteBatch::from(vec![insert_proposal(1), commit(1, 2)]))
            .unwrap();

        let err = store
            .commit_batch(WriteBatch::from(vec![commit(1, 4), commit(1, 2), cursor(9)]))
            .unwrap_err();
        assert!(err.is_duplicate());
        assert!(store.get_commitment(ProposalId::new(1), &voter(4)).unwrap().is_none());
        assert!(store.list_cursors().unwrap().is_empty());
    }

    #[test]
    fn reveal_without_commitment_is_not_found() {
        let (_dir, store) = temp_store();
        store.commit_batch(WriteBatch::from(vec![insert_proposal(1)])).unwrap();
        let err = store
            .commit_batch(WriteBatch::from(vec![reveal(1, 5, 0, 1)]))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn double_reveal_is_duplicate() {
        let (_dir, store) = temp_store();
        store
            .commit_batch(WriteBatch::from(vec![insert_proposal(1), commit(1, 2), reveal(1, 2, 1, 1)]))
            .unwrap();
        let err = store
            .commit_batch(WriteBatch::from(vec![reveal(1, 2, 1, 1)]))
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    #[test]
    fn delegation_replace_and_history() {
        let (_dir, store) = temp_store();
        let global = DelegationScope::Global;
        store
            .commit_batch(WriteBatch::from(vec![StoreOp::PutDelegation(edge(1, 2, global))]))
            .unwrap();
        assert!(store
            .commit_batch(WriteBatch::from(vec![StoreOp::PutDelegation(edge(1, 3, global))]))
            .unwrap_err()
            .is_duplicate());

        store
            .commit_batch(WriteBatch::from(vec![
                StoreOp::RevokeDelegation { from: voter(1), scope: global, at: BlockHeight::new(4) },
                StoreOp::PutDelegation(edge(1, 3, global)),
            ]))
            .unwrap();

        let active = store.active_delegation(&voter(1), global).unwrap().unwrap();
        assert_eq!(active.to, voter(3));
        assert!(store.active_delegations_to(&voter(2)).unwrap().is_empty());
        assert_eq!(store.active_delegations_to(&voter(3)).unwrap().len(), 1);

        let to_two = store.delegations_to(&voter(2)).unwrap();
        assert_eq!(to_two.len(), 1);
        assert_eq!(to_two[0].revoked_at, Some(BlockHeight::new(4)));

        let history = store.delegation_history(&voter(1)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].to, voter(2));
        assert_eq!(history[0].revoked_at, Some(BlockHeight::new(4)));
        assert!(history[1].is_active());
    }

    #[test]
    fn scoped_and_global_edges_coexist() {
        let (_dir, store) = temp_store();
        let scoped = DelegationScope::Proposal(ProposalId::new(5));
        store
            .commit_batch(WriteBatch::from(vec![
                StoreOp::PutDelegation(edge(1, 2, DelegationScope::Global)),
                StoreOp::PutDelegation(edge(1, 3, scoped)),
            ]))
            .unwrap();
        assert_eq!(
            store.active_delegation(&voter(1), scoped).unwrap().unwrap().to,
            voter(3)
        );
        assert_eq!(
            store
                .active_delegation(&voter(1), DelegationScope::Global)
                .unwrap()
                .unwrap()
                .to,
            voter(2)
        );
    }

    #[test]
    fn revoke_without_active_edge_is_not_found() {
        let (_dir, store) = temp_store();
        let err = store
            .commit_batch(WriteBatch::from(vec![StoreOp::RevokeDelegation {
                from: voter(1),
                scope: DelegationScope::Global,
                at: BlockHeight::new(1),
            }]))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn cursor_regression_rejected() {
        let (_dir, store) = temp_store();
        store.commit_batch(WriteBatch::from(vec![cursor(10)])).unwrap();
        let err = store.commit_batch(WriteBatch::from(vec![cursor(3)])).unwrap_err();
        assert!(matches!(
            err,
            StoreError::CursorRegression { current: 10, requested: 3, .. }
        ));
        let stream = StreamName::new("mainnet").unwrap();
        assert_eq!(store.get_cursor(&stream).unwrap().unwrap().sequence, 10);
    }

    #[test]
    fn deliberation_and_amendments() {
        let (_dir, store) = temp_store();
        let id = ProposalId::new(3);
        let mut deliberation = Deliberation {
            id,
            title: "Charter".into(),
            content: ContentId::new("QmCharter").unwrap(),
            proposer: voter(1),
            phase: DeliberationPhase::Discussion,
            created_at: Timestamp::new(100),
            discussion_ends_at: Some(Timestamp::new(100 + 259_200)),
            amendment_count: 0,
        };
        store
            .commit_batch(WriteBatch::from(vec![StoreOp::InsertDeliberation(deliberation.clone())]))
            .unwrap();

        deliberation.amendment_count = 1;
        store
            .commit_batch(WriteBatch::from(vec![
                StoreOp::InsertAmendment(Amendment {
                    deliberation_id: id,
                    index: 0,
                    author: voter(2),
                    content: ContentId::new("QmAmend").unwrap(),
                    added_at: Timestamp::new(200),
                }),
                StoreOp::UpdateDeliberation(deliberation.clone()),
            ]))
            .unwrap();

        assert_eq!(store.get_deliberation(id).unwrap().unwrap(), deliberation);
        assert_eq!(store.get_amendments(id).unwrap().len(), 1);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LmdbGovernanceStore::open(dir.path(), 16, 10 * 1024 * 1024).unwrap();
            store
                .commit_batch(WriteBatch::from(vec![insert_proposal(1), cursor(4)]))
                .unwrap();
        }
        let store = LmdbGovernanceStore::open(dir.path(), 16, 10 * 1024 * 1024).unwrap();
        assert!(store.get_proposal(ProposalId::new(1)).unwrap().is_some());
        assert_eq!(store.list_cursors().unwrap()[0].sequence, 4);
    }
}
