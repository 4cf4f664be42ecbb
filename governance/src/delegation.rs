//! Vote delegation: entrust voting power to a representative.
//!
//! Delegation edges live in the store as an append-only table; the resolver
//! holds no graph of its own and answers every question from the current
//! table contents.
//!
//! Resolution is a single hop:
//! - a **proposal-scoped** edge for the voter wins for that proposal,
//! - otherwise the voter's **global** edge applies,
//! - otherwise the voter votes directly.
//!
//! Chains are still walked when an edge is created so that cycles
//! (A→B→…→A) are rejected before they are stored.
//!
//! The `*_at` queries read the whole edge history and answer for a past
//! height, so a ballot action is judged by the delegations in force when
//! it settled on the ledger, not by what happens to be applied locally.

use std::collections::{BTreeSet, HashSet};

use agora_store::{DelegationStore, StoreOp, WriteBatch};
use agora_types::{BlockHeight, DelegationEdge, DelegationScope, ProposalId, VoterAddress};

use crate::effects::{GovernanceEffect, Transition};
use crate::error::GovernanceError;

/// Read view over the delegation edge table.
pub struct DelegationResolver<'a, S: DelegationStore + ?Sized> {
    store: &'a S,
    max_depth: usize,
}

impl<'a, S: DelegationStore + ?Sized> DelegationResolver<'a, S> {
    pub fn new(store: &'a S, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    /// The address that casts `voter`'s vote on `proposal`, if not `voter`.
    ///
    /// `ProposalId::GLOBAL_SCOPE` considers global edges only.
    pub fn effective_delegate(
        &self,
        voter: &VoterAddress,
        proposal: ProposalId,
    ) -> Result<Option<VoterAddress>, GovernanceError> {
        let scope = if proposal.is_global_scope() {
            DelegationScope::Global
        } else {
            DelegationScope::Proposal(proposal)
        };
        self.effective_delegate_in(voter, scope)
    }

    fn effective_delegate_in(
        &self,
        voter: &VoterAddress,
        scope: DelegationScope,
    ) -> Result<Option<VoterAddress>, GovernanceError> {
        if let DelegationScope::Proposal(_) = scope {
            if let Some(edge) = self.store.active_delegation(voter, scope)? {
                return Ok(Some(edge.to));
            }
        }
        Ok(self
            .store
            .active_delegation(voter, DelegationScope::Global)?
            .map(|edge| edge.to))
    }

    /// Voters whose effective delegate on `proposal` is `delegate`, sorted.
    pub fn delegators_of(
        &self,
        delegate: &VoterAddress,
        proposal: ProposalId,
    ) -> Result<Vec<VoterAddress>, GovernanceError> {
        let candidates: BTreeSet<VoterAddress> = self
            .store
            .active_delegations_to(delegate)?
            .into_iter()
            .filter(|edge| edge.scope.applies_to(proposal))
            .map(|edge| edge.from)
            .collect();

        let mut delegators = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.effective_delegate(&candidate, proposal)?.as_ref() == Some(delegate) {
                delegators.push(candidate);
            }
        }
        Ok(delegators)
    }

    /// The delegate of `voter` on `proposal` as of `height`.
    pub fn effective_delegate_at(
        &self,
        voter: &VoterAddress,
        proposal: ProposalId,
        height: BlockHeight,
    ) -> Result<Option<VoterAddress>, GovernanceError> {
        let history = self.store.delegation_history(voter)?;
        let in_force = |scope: DelegationScope| {
            history
                .iter()
                .find(|edge| edge.scope == scope && edge.is_active_at(height))
                .map(|edge| edge.to)
        };
        if !proposal.is_global_scope() {
            if let Some(to) = in_force(DelegationScope::Proposal(proposal)) {
                return Ok(Some(to));
            }
        }
        Ok(in_force(DelegationScope::Global))
    }

    /// Voters whose delegate on `proposal` was `delegate` at `height`, sorted.
    pub fn delegators_of_at(
        &self,
        delegate: &VoterAddress,
        proposal: ProposalId,
        height: BlockHeight,
    ) -> Result<Vec<VoterAddress>, GovernanceError> {
        let candidates: BTreeSet<VoterAddress> = self
            .store
            .delegations_to(delegate)?
            .into_iter()
            .filter(|edge| edge.scope.applies_to(proposal) && edge.is_active_at(height))
            .map(|edge| edge.from)
            .collect();

        let mut delegators = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if self.effective_delegate_at(&candidate, proposal, height)?.as_ref() == Some(delegate) {
                delegators.push(candidate);
            }
        }
        Ok(delegators)
    }

    pub fn voting_power_at(
        &self,
        voter: &VoterAddress,
        proposal: ProposalId,
        height: BlockHeight,
    ) -> Result<u64, GovernanceError> {
        Ok(1 + self.delegators_of_at(voter, proposal, height)?.len() as u64)
    }

    /// Own vote plus one per delegator on `proposal`. Always at least 1.
    pub fn voting_power(
        &self,
        voter: &VoterAddress,
        proposal: ProposalId,
    ) -> Result<u64, GovernanceError> {
        Ok(1 + self.delegators_of(voter, proposal)?.len() as u64)
    }

    /// Voting power counting global delegations only.
    pub fn global_voting_power(&self, voter: &VoterAddress) -> Result<u64, GovernanceError> {
        self.voting_power(voter, ProposalId::GLOBAL_SCOPE)
    }

    pub fn has_delegated(
        &self,
        voter: &VoterAddress,
        proposal: ProposalId,
    ) -> Result<bool, GovernanceError> {
        Ok(self.effective_delegate(voter, proposal)?.is_some())
    }

    /// Create or replace the delegation of `from` in `scope`.
    ///
    /// Replacing an active edge revokes it first, so the effects are
    /// `DelegationRevoked` followed by `Delegated`.
    pub fn delegate(
        &self,
        from: &VoterAddress,
        to: &VoterAddress,
        scope: DelegationScope,
        height: BlockHeight,
        sequence: u64,
    ) -> Result<Transition, GovernanceError> {
        if to.is_zero() {
            return Err(GovernanceError::ZeroAddressDelegate(*from));
        }
        if from == to {
            return Err(GovernanceError::SelfDelegation(*from));
        }

        let existing = self.store.active_delegation(from, scope)?;
        if let Some(edge) = &existing {
            if edge.to == *to {
                return Err(GovernanceError::AlreadyDelegated {
                    from: *from,
                    to: *to,
                    scope,
                });
            }
        }

        self.check_chain(from, to, scope)?;

        let mut batch = WriteBatch::new();
        let mut effects = Vec::with_capacity(2);
        if let Some(old) = existing {
            batch.push(StoreOp::RevokeDelegation {
                from: *from,
                scope,
                at: height,
            });
            effects.push(GovernanceEffect::DelegationRevoked {
                from: *from,
                to: old.to,
                scope,
            });
        }
        batch.push(StoreOp::PutDelegation(DelegationEdge {
            from: *from,
            to: *to,
            scope,
            created_at: height,
            sequence,
            revoked_at: None,
        }));
        effects.push(GovernanceEffect::Delegated {
            from: *from,
            to: *to,
            scope,
        });

        tracing::debug!(from = %from, to = %to, scope = %scope, "delegation planned");
        Ok(Transition::new(batch, effects))
    }

    /// Revoke the active delegation of `from` in exactly `scope`.
    pub fn revoke(
        &self,
        from: &VoterAddress,
        scope: DelegationScope,
        height: BlockHeight,
    ) -> Result<Transition, GovernanceError> {
        let edge = self
            .store
            .active_delegation(from, scope)?
            .ok_or(GovernanceError::NoActiveDelegation { from: *from, scope })?;

        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::RevokeDelegation {
                from: *from,
                scope,
                at: height,
            }]),
            vec![GovernanceEffect::DelegationRevoked {
                from: *from,
                to: edge.to,
                scope,
            }],
        ))
    }

    /// Walk `to → effective_delegate(to) → …` in `scope` and reject if the
    /// chain comes back to `from` or runs longer than `max_depth`.
    fn check_chain(
        &self,
        from: &VoterAddress,
        to: &VoterAddress,
        scope: DelegationScope,
    ) -> Result<(), GovernanceError> {
        let mut visited = HashSet::new();
        visited.insert(*to);
        let mut current = *to;
        let mut hops = 0usize;
        while let Some(next) = self.effective_delegate_in(&current, scope)? {
            if next == *from {
                return Err(GovernanceError::DelegationCycle {
                    from: *from,
                    to: *to,
                    scope,
                });
            }
            hops += 1;
            if hops >= self.max_depth {
                return Err(GovernanceError::ChainTooDeep {
                    max: self.max_depth,
                });
            }
            if !visited.insert(next) {
                // An older loop that does not involve `from`.
                break;
            }
            current = next;
        }
        Ok(())
    }
}
