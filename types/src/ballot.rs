//! Commit-reveal ballot records.

use serde::{Deserialize, Serialize};

use crate::{BlockHeight, CommitmentHash, ProposalId, VoterAddress};

/// A voter's hiding commitment. Unique per (proposal, voter); created once and
/// mutated once (marked revealed).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCommitment {
    pub proposal_id: ProposalId,
    pub voter: VoterAddress,
    pub commitment: CommitmentHash,
    pub revealed: bool,
    pub committed_at: BlockHeight,
}

/// A verified reveal. Unique per (proposal, voter).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReveal {
    pub proposal_id: ProposalId,
    pub voter: VoterAddress,
    pub option: u32,
    /// Voting power credited to `option` at reveal time.
    pub power: u64,
    pub revealed_at: BlockHeight,
}
