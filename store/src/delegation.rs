//! Delegation edge storage trait.

use crate::StoreError;
use agora_types::{DelegationEdge, DelegationScope, VoterAddress};

/// Read access to the append-only delegation edge table.
///
/// Revoked edges stay in the history; only the active-edge lookups skip them.
pub trait DelegationStore {
    /// The active edge for exactly `(from, scope)`, if any.
    fn active_delegation(
        &self,
        from: &VoterAddress,
        scope: DelegationScope,
    ) -> Result<Option<DelegationEdge>, StoreError>;

    /// Active edges pointing at `to`, in every scope.
    fn active_delegations_to(&self, to: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError>;

    /// Every edge ever pointing at `to`, revoked ones included.
    fn delegations_to(&self, to: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError>;

    /// Every edge ever created by `from`, oldest first.
    fn delegation_history(&self, from: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError>;
}
