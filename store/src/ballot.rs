//! Commitment and reveal storage trait.

use crate::StoreError;
use agora_types::{ProposalId, VoteCommitment, VoteReveal, VoterAddress};

/// Read access to per-voter ballots.
///
/// Keys are `(proposal, voter)` pairs; both tables hold at most one record
/// per key.
pub trait BallotStore {
    fn get_commitment(
        &self,
        id: ProposalId,
        voter: &VoterAddress,
    ) -> Result<Option<VoteCommitment>, StoreError>;

    fn get_reveal(
        &self,
        id: ProposalId,
        voter: &VoterAddress,
    ) -> Result<Option<VoteReveal>, StoreError>;

    /// All commitments on a proposal, ordered by voter address.
    fn list_commitments(&self, id: ProposalId) -> Result<Vec<VoteCommitment>, StoreError>;

    /// All reveals on a proposal, ordered by voter address.
    fn list_reveals(&self, id: ProposalId) -> Result<Vec<VoteReveal>, StoreError>;
}
