//! Ballot proposals and their options.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BlockHeight, ContentId, VoterAddress};

/// Ledger-assigned proposal identifier.
///
/// `0` is the global delegation scope token and never names a proposal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ProposalId(u64);

impl ProposalId {
    /// Scope token used by global delegations.
    pub const GLOBAL_SCOPE: Self = Self(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_global_scope(&self) -> bool {
        self.0 == 0
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ballot lifecycle: `Commit -> Reveal -> Tallied`, with `Cancelled` reachable
/// from `Commit` or `Reveal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BallotPhase {
    /// Voters submit hiding commitments.
    Commit,
    /// Commit deadline passed; voters disclose option and secret.
    Reveal,
    /// Results confirmed. Terminal.
    Tallied,
    /// Cancelled by an administrator. Terminal.
    Cancelled,
}

impl BallotPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Tallied | Self::Cancelled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Reveal => "reveal",
            Self::Tallied => "tallied",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BallotPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A ballot proposal as persisted by the reconciler.
///
/// Deadlines and option count are fixed at creation. `phase` only ever
/// records explicit transitions (`Tallied`, `Cancelled`); the time-gated
/// `Commit -> Reveal` step is derived from the current height by [`Proposal::phase_at`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub content: ContentId,
    pub proposer: VoterAddress,
    pub phase: BallotPhase,
    pub option_count: u32,
    /// Last height at which commitments are accepted.
    pub commit_deadline: BlockHeight,
    /// Last height at which reveals are accepted.
    pub reveal_deadline: BlockHeight,
    /// Sum of voting power over all successful reveals.
    pub total_votes: u64,
    pub created_at: BlockHeight,
    /// Deliberation this ballot was opened for, if any.
    pub deliberation: Option<ProposalId>,
}

impl Proposal {
    /// Effective phase at ledger height `now`.
    pub fn phase_at(&self, now: BlockHeight) -> BallotPhase {
        match self.phase {
            BallotPhase::Tallied | BallotPhase::Cancelled => self.phase,
            BallotPhase::Commit | BallotPhase::Reveal => {
                if self.commit_deadline.has_elapsed(now) {
                    BallotPhase::Reveal
                } else {
                    BallotPhase::Commit
                }
            }
        }
    }

    /// Whether reveals are accepted at `now`.
    pub fn reveal_window_open(&self, now: BlockHeight) -> bool {
        self.phase_at(now) == BallotPhase::Reveal && !self.reveal_deadline.has_elapsed(now)
    }

    pub fn has_option(&self, index: u32) -> bool {
        index < self.option_count
    }
}

/// One selectable option of a proposal with its cached vote count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalOption {
    pub proposal_id: ProposalId,
    pub index: u32,
    pub label: String,
    pub votes: u64,
}
