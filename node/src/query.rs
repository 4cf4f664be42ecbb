//! Read-only projection queries.
//!
//! Every call reads through the store traits, each in its own short read
//! transaction on LMDB, so queries never block event application.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use agora_governance::{DelegationResolver, GovernanceError, GovernanceParams, TallySnapshot};
use agora_store::GovernanceStore;
use agora_types::{
    Amendment, BallotPhase, BlockHeight, DelegationEdge, Deliberation, Proposal, ProposalId,
    ProposalOption, SyncCursor, VoteCommitment, VoterAddress,
};

use crate::NodeError;

/// Default page size when `count` is not specified.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Pagination parameters accepted by list queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
    /// Number of items per page (default 100, max 1000).
    pub count: Option<u32>,
}

impl PageRequest {
    pub fn first(count: u32) -> Self {
        Self {
            cursor: None,
            count: Some(count),
        }
    }

    /// Effective page size, clamped to `[1, MAX_PAGE_SIZE]`.
    pub fn effective_count(&self) -> u32 {
        self.count.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// Offset encoded in the cursor. Absent or invalid cursors start at 0.
    pub fn decode_offset(&self) -> u64 {
        self.cursor.as_deref().and_then(decode_cursor).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page, or `None` on the last one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Encode an offset into an opaque cursor string.
pub fn encode_cursor(offset: u64) -> String {
    hex::encode(offset.to_string())
}

pub fn decode_cursor(cursor: &str) -> Option<u64> {
    let bytes = hex::decode(cursor).ok()?;
    std::str::from_utf8(&bytes).ok()?.parse().ok()
}

/// `None` once fewer than `page_size` items came back.
pub fn next_cursor(current_offset: u64, returned: usize, page_size: u32) -> Option<String> {
    if (returned as u64) < u64::from(page_size) {
        None
    } else {
        Some(encode_cursor(current_offset + returned as u64))
    }
}

/// Counts for one ballot at a given height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BallotStatus {
    pub proposal_id: ProposalId,
    pub phase: BallotPhase,
    pub commits: u64,
    pub reveals: u64,
    pub total_votes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliberationView {
    pub deliberation: Deliberation,
    pub amendments: Vec<Amendment>,
}

pub struct GovernanceQuery<S> {
    store: Arc<S>,
    params: GovernanceParams,
}

impl<S: GovernanceStore> GovernanceQuery<S> {
    pub fn new(store: Arc<S>, params: GovernanceParams) -> Self {
        Self { store, params }
    }

    fn resolver(&self) -> DelegationResolver<'_, S> {
        DelegationResolver::new(self.store.as_ref(), self.params.max_chain_depth)
    }

    fn load(&self, id: ProposalId) -> Result<Proposal, NodeError> {
        self.store
            .get_proposal(id)?
            .ok_or_else(|| GovernanceError::ProposalNotFound(id).into())
    }

    pub fn proposal(&self, id: ProposalId) -> Result<Option<Proposal>, NodeError> {
        Ok(self.store.get_proposal(id)?)
    }

    pub fn proposals(&self) -> Result<Vec<ProposalId>, NodeError> {
        Ok(self.store.list_proposals()?)
    }

    pub fn options(&self, id: ProposalId) -> Result<Vec<ProposalOption>, NodeError> {
        self.load(id)?;
        Ok(self.store.get_options(id)?)
    }

    /// Cached vote count of one option.
    pub fn result(&self, id: ProposalId, option: u32) -> Result<u64, NodeError> {
        let proposal = self.load(id)?;
        if !proposal.has_option(option) {
            return Err(GovernanceError::OptionOutOfRange {
                option,
                count: proposal.option_count,
            }
            .into());
        }
        Ok(self
            .store
            .get_option(id, option)?
            .map(|o| o.votes)
            .unwrap_or(0))
    }

    /// Result snapshot with the stored phase.
    pub fn tally(&self, id: ProposalId) -> Result<TallySnapshot, NodeError> {
        let proposal = self.load(id)?;
        let options = self.store.get_options(id)?;
        Ok(TallySnapshot::new(&proposal, &options))
    }

    /// Result snapshot with the phase evaluated at `height`.
    pub fn tally_at(&self, id: ProposalId, height: BlockHeight) -> Result<TallySnapshot, NodeError> {
        let proposal = self.load(id)?;
        let options = self.store.get_options(id)?;
        Ok(TallySnapshot::new(&proposal, &options).with_phase(proposal.phase_at(height)))
    }

    pub fn status(&self, id: ProposalId, height: BlockHeight) -> Result<BallotStatus, NodeError> {
        let proposal = self.load(id)?;
        let commits = self.store.list_commitments(id)?.len() as u64;
        let reveals = self.store.list_reveals(id)?.len() as u64;
        Ok(BallotStatus {
            proposal_id: id,
            phase: proposal.phase_at(height),
            commits,
            reveals,
            total_votes: proposal.total_votes,
        })
    }

    /// Commitments on a ballot, ordered by voter.
    pub fn voters(
        &self,
        id: ProposalId,
        page: &PageRequest,
    ) -> Result<Page<VoteCommitment>, NodeError> {
        self.load(id)?;
        let offset = page.decode_offset();
        let count = page.effective_count();
        let items: Vec<VoteCommitment> = self
            .store
            .list_commitments(id)?
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(count as usize)
            .collect();
        let cursor = next_cursor(offset, items.len(), count);
        Ok(Page { items, cursor })
    }

    pub fn has_voted(&self, id: ProposalId, voter: &VoterAddress) -> Result<bool, NodeError> {
        Ok(self.store.get_commitment(id, voter)?.is_some())
    }

    pub fn effective_delegate(
        &self,
        voter: &VoterAddress,
        proposal: ProposalId,
    ) -> Result<Option<VoterAddress>, NodeError> {
        Ok(self.resolver().effective_delegate(voter, proposal)?)
    }

    pub fn voting_power(&self, voter: &VoterAddress, proposal: ProposalId) -> Result<u64, NodeError> {
        Ok(self.resolver().voting_power(voter, proposal)?)
    }

    pub fn global_voting_power(&self, voter: &VoterAddress) -> Result<u64, NodeError> {
        Ok(self.resolver().global_voting_power(voter)?)
    }

    /// Who currently delegates to `delegate` for `proposal`.
    pub fn delegators(
        &self,
        delegate: &VoterAddress,
        proposal: ProposalId,
    ) -> Result<Vec<VoterAddress>, NodeError> {
        Ok(self.resolver().delegators_of(delegate, proposal)?)
    }

    /// Every edge `voter` ever created, oldest first.
    pub fn delegation_history(&self, voter: &VoterAddress) -> Result<Vec<DelegationEdge>, NodeError> {
        Ok(self.store.delegation_history(voter)?)
    }

    pub fn deliberation(&self, id: ProposalId) -> Result<Option<DeliberationView>, NodeError> {
        let Some(deliberation) = self.store.get_deliberation(id)? else {
            return Ok(None);
        };
        let amendments = self.store.get_amendments(id)?;
        Ok(Some(DeliberationView {
            deliberation,
            amendments,
        }))
    }

    pub fn cursors(&self) -> Result<Vec<SyncCursor>, NodeError> {
        Ok(self.store.list_cursors()?)
    }
}
