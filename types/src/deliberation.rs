//! Deliberation records: the discussion lifecycle that precedes a ballot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ContentId, ProposalId, Timestamp, VoterAddress};

/// `Draft -> Discussion -> Voting -> Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliberationPhase {
    Draft,
    /// Amendments accepted; lasts at least the minimum discussion period.
    Discussion,
    /// Discussion finished; a ballot may be opened.
    Voting,
    /// Terminal.
    Closed,
}

impl DeliberationPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Discussion => "discussion",
            Self::Voting => "voting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for DeliberationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliberation {
    pub id: ProposalId,
    pub title: String,
    pub content: ContentId,
    pub proposer: VoterAddress,
    pub phase: DeliberationPhase,
    pub created_at: Timestamp,
    /// Set when discussion opens; fixed afterwards.
    pub discussion_ends_at: Option<Timestamp>,
    pub amendment_count: u32,
}

/// A content attachment added during discussion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub deliberation_id: ProposalId,
    pub index: u32,
    pub author: VoterAddress,
    pub content: ContentId,
    pub added_at: Timestamp,
}
