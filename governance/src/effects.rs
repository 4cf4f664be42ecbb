//! Facts produced by successful governance actions.
//!
//! Effects describe what changed; they are published to projection
//! listeners only after the accompanying [`WriteBatch`] has committed.

use agora_store::WriteBatch;
use agora_types::{BlockHeight, DelegationScope, ProposalId, Timestamp, VoterAddress};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum GovernanceEffect {
    ProposalCreated {
        id: ProposalId,
        option_count: u32,
        commit_deadline: BlockHeight,
        reveal_deadline: BlockHeight,
    },
    VoteCommitted {
        id: ProposalId,
        voter: VoterAddress,
    },
    VoteRevealed {
        id: ProposalId,
        voter: VoterAddress,
        option: u32,
        power: u64,
    },
    /// A later-applied delegation change moved power into or out of a
    /// stored reveal. `power` is the reveal's new power.
    RevealPowerAdjusted {
        id: ProposalId,
        voter: VoterAddress,
        power: u64,
    },
    ProposalTallied {
        id: ProposalId,
        total_votes: u64,
    },
    ProposalCancelled {
        id: ProposalId,
    },
    Delegated {
        from: VoterAddress,
        to: VoterAddress,
        scope: DelegationScope,
    },
    DelegationRevoked {
        from: VoterAddress,
        to: VoterAddress,
        scope: DelegationScope,
    },
    DeliberationDrafted {
        id: ProposalId,
    },
    DiscussionOpened {
        id: ProposalId,
        ends_at: Timestamp,
    },
    AmendmentAdded {
        id: ProposalId,
        index: u32,
    },
    AdvancedToVoting {
        id: ProposalId,
    },
    DeliberationClosed {
        id: ProposalId,
    },
}

impl GovernanceEffect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProposalCreated { .. } => "proposal_created",
            Self::VoteCommitted { .. } => "vote_committed",
            Self::VoteRevealed { .. } => "vote_revealed",
            Self::RevealPowerAdjusted { .. } => "reveal_power_adjusted",
            Self::ProposalTallied { .. } => "proposal_tallied",
            Self::ProposalCancelled { .. } => "proposal_cancelled",
            Self::Delegated { .. } => "delegated",
            Self::DelegationRevoked { .. } => "delegation_revoked",
            Self::DeliberationDrafted { .. } => "deliberation_drafted",
            Self::DiscussionOpened { .. } => "discussion_opened",
            Self::AmendmentAdded { .. } => "amendment_added",
            Self::AdvancedToVoting { .. } => "advanced_to_voting",
            Self::DeliberationClosed { .. } => "deliberation_closed",
        }
    }
}

/// The result of a validated governance action: the writes to commit and
/// the facts to publish once they are durable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub batch: WriteBatch,
    pub effects: Vec<GovernanceEffect>,
}

impl Transition {
    pub fn new(batch: WriteBatch, effects: Vec<GovernanceEffect>) -> Self {
        Self { batch, effects }
    }
}
