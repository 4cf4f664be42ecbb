//! Proposal storage trait.

use crate::StoreError;
use agora_types::{Proposal, ProposalId, ProposalOption};

/// Read access to ballot proposals and their options.
pub trait ProposalStore {
    /// Get a proposal by id, `None` if it was never created.
    fn get_proposal(&self, id: ProposalId) -> Result<Option<Proposal>, StoreError>;

    /// Get a single option of a proposal.
    fn get_option(
        &self,
        id: ProposalId,
        index: u32,
    ) -> Result<Option<ProposalOption>, StoreError>;

    /// All options of a proposal, ordered by index.
    fn get_options(&self, id: ProposalId) -> Result<Vec<ProposalOption>, StoreError>;

    /// Every known proposal id, ascending.
    fn list_proposals(&self) -> Result<Vec<ProposalId>, StoreError>;
}
