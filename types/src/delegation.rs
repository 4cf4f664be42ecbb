//! Delegation edges and their scope.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BlockHeight, ProposalId, VoterAddress};

/// Which proposals a delegation applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DelegationScope {
    /// Applies to every proposal (ledger scope token `0`).
    Global,
    /// Applies only to one proposal; takes precedence over a global edge.
    Proposal(ProposalId),
}

impl DelegationScope {
    /// Decode a ledger scope token.
    pub fn from_token(token: u64) -> Self {
        if token == 0 {
            Self::Global
        } else {
            Self::Proposal(ProposalId::new(token))
        }
    }

    /// The ledger scope token (`0` for global).
    pub fn token(&self) -> u64 {
        match self {
            Self::Global => 0,
            Self::Proposal(id) => id.as_u64(),
        }
    }

    /// Whether an edge with this scope is relevant when resolving `proposal`.
    pub fn applies_to(&self, proposal: ProposalId) -> bool {
        match self {
            Self::Global => true,
            Self::Proposal(id) => *id == proposal,
        }
    }
}

impl fmt::Display for DelegationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Proposal(id) => write!(f, "proposal:{}", id),
        }
    }
}

/// A delegation edge `from -> to` within a scope.
///
/// Edges are never deleted. Superseding or revoking an edge sets `revoked_at`;
/// the full history stays queryable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationEdge {
    pub from: VoterAddress,
    pub to: VoterAddress,
    pub scope: DelegationScope,
    pub created_at: BlockHeight,
    /// Ledger sequence number of the event that created the edge.
    pub sequence: u64,
    pub revoked_at: Option<BlockHeight>,
}

impl DelegationEdge {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    /// Whether the edge was in force at `height`. An edge revoked at `h` no
    /// longer applies at `h`; one created at `h` already does.
    pub fn is_active_at(&self, height: BlockHeight) -> bool {
        self.created_at <= height && self.revoked_at.map_or(true, |revoked| revoked > height)
    }
}
