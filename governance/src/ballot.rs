//! Commit-reveal ballot state machine.
//!
//! ```text
//! Commit ──(height > commit_deadline)──▶ Reveal ──tally──▶ Tallied
//!    └──────────────cancel─────────────────┴──▶ Cancelled
//! ```
//!
//! `Commit → Reveal` is never stored as an action: it is evaluated lazily
//! from the ledger height every time an action is attempted. Reveals add the
//! voter's power to the chosen option immediately; `tally` only finalizes.

use agora_crypto::verify_reveal;
use agora_store::{BallotStore, DelegationStore, DeliberationStore, ProposalStore, StoreOp, WriteBatch};
use agora_types::{
    BallotPhase, BlockHeight, CommitmentHash, ContentId, DelegationScope, DeliberationPhase,
    Proposal, ProposalId, ProposalOption, RevealSecret, VoteCommitment, VoteReveal, VoterAddress,
};

use crate::delegation::DelegationResolver;
use crate::effects::{GovernanceEffect, Transition};
use crate::error::GovernanceError;
use crate::params::GovernanceParams;

/// Input of [`BallotMachine::create_proposal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProposal {
    pub id: ProposalId,
    pub title: String,
    pub content: String,
    pub proposer: VoterAddress,
    pub option_count: u32,
    /// Either empty (labels default to `Option N`) or one per option.
    pub labels: Vec<String>,
    pub commit_duration: u64,
    pub reveal_duration: u64,
    /// Deliberation this ballot was opened for, if any.
    pub deliberation: Option<ProposalId>,
}

pub struct BallotMachine<'a, S: ?Sized> {
    store: &'a S,
    params: &'a GovernanceParams,
}

impl<'a, S> BallotMachine<'a, S>
where
    S: ProposalStore + BallotStore + DelegationStore + DeliberationStore + ?Sized,
{
    pub fn new(store: &'a S, params: &'a GovernanceParams) -> Self {
        Self { store, params }
    }

    fn resolver(&self) -> DelegationResolver<'a, S> {
        DelegationResolver::new(self.store, self.params.max_chain_depth)
    }

    fn load(&self, id: ProposalId) -> Result<Proposal, GovernanceError> {
        self.store
            .get_proposal(id)?
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    pub fn create_proposal(
        &self,
        new: NewProposal,
        now: BlockHeight,
    ) -> Result<Transition, GovernanceError> {
        if new.id.is_global_scope() {
            return Err(GovernanceError::ReservedProposalId);
        }
        if new.option_count < 2 {
            return Err(GovernanceError::TooFewOptions(new.option_count));
        }
        if !new.labels.is_empty() && new.labels.len() != new.option_count as usize {
            return Err(GovernanceError::LabelCountMismatch {
                labels: new.labels.len(),
                options: new.option_count,
            });
        }
        if new.commit_duration == 0 || new.reveal_duration == 0 {
            return Err(GovernanceError::ZeroDuration);
        }
        let content = ContentId::new(new.content).map_err(|_| GovernanceError::EmptyContent)?;

        if self.store.get_proposal(new.id)?.is_some() {
            return Err(GovernanceError::ProposalExists(new.id));
        }
        if let Some(deliberation_id) = new.deliberation {
            let deliberation = self
                .store
                .get_deliberation(deliberation_id)?
                .ok_or(GovernanceError::DeliberationNotFound(deliberation_id))?;
            if deliberation.phase != DeliberationPhase::Voting {
                return Err(GovernanceError::WrongDeliberationPhase {
                    id: deliberation_id,
                    expected: DeliberationPhase::Voting,
                    actual: deliberation.phase,
                });
            }
        }

        let commit_deadline = now.plus(new.commit_duration);
        let reveal_deadline = commit_deadline.plus(new.reveal_duration);
        let options = (0..new.option_count)
            .map(|index| ProposalOption {
                proposal_id: new.id,
                index,
                label: new
                    .labels
                    .get(index as usize)
                    .cloned()
                    .unwrap_or_else(|| format!("Option {}", index)),
                votes: 0,
            })
            .collect();
        let proposal = Proposal {
            id: new.id,
            title: new.title,
            content,
            proposer: new.proposer,
            phase: BallotPhase::Commit,
            option_count: new.option_count,
            commit_deadline,
            reveal_deadline,
            total_votes: 0,
            created_at: now,
            deliberation: new.deliberation,
        };

        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::InsertProposal { proposal, options }]),
            vec![GovernanceEffect::ProposalCreated {
                id: new.id,
                option_count: new.option_count,
                commit_deadline,
                reveal_deadline,
            }],
        ))
    }

    pub fn commit_vote(
        &self,
        id: ProposalId,
        voter: &VoterAddress,
        commitment: CommitmentHash,
        now: BlockHeight,
    ) -> Result<Transition, GovernanceError> {
        let proposal = self.load(id)?;
        let phase = proposal.phase_at(now);
        if phase != BallotPhase::Commit {
            return Err(GovernanceError::NotInCommitPhase { id, phase });
        }
        if !self.params.may_vote(voter) {
            return Err(GovernanceError::NotEligible(*voter));
        }
        if self.store.get_commitment(id, voter)?.is_some() {
            return Err(GovernanceError::AlreadyCommitted { id, voter: *voter });
        }
        if let Some(delegate) = self.resolver().effective_delegate_at(voter, id, now)? {
            return Err(GovernanceError::VoteDelegated {
                voter: *voter,
                delegate,
            });
        }

        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::InsertCommitment(VoteCommitment {
                proposal_id: id,
                voter: *voter,
                commitment,
                revealed: false,
                committed_at: now,
            })]),
            vec![GovernanceEffect::VoteCommitted { id, voter: *voter }],
        ))
    }

    pub fn reveal_vote(
        &self,
        id: ProposalId,
        voter: &VoterAddress,
        option: u32,
        secret: &RevealSecret,
        now: BlockHeight,
    ) -> Result<Transition, GovernanceError> {
        let proposal = self.load(id)?;
        if !proposal.reveal_window_open(now) {
            return Err(GovernanceError::NotInRevealPhase {
                id,
                phase: proposal.phase_at(now),
            });
        }
        let commitment = self
            .store
            .get_commitment(id, voter)?
            .ok_or(GovernanceError::NoCommitment { id, voter: *voter })?;
        if commitment.revealed {
            return Err(GovernanceError::AlreadyRevealed { id, voter: *voter });
        }
        if !verify_reveal(&commitment.commitment, id, option, secret) {
            return Err(GovernanceError::CommitmentMismatch { id, voter: *voter });
        }
        if !proposal.has_option(option) {
            return Err(GovernanceError::OptionOutOfRange {
                option,
                count: proposal.option_count,
            });
        }

        let power = self.resolver().voting_power_at(voter, id, now)?;
        tracing::debug!(proposal = %id, voter = %voter, option, power, "reveal accepted");

        Ok(Transition::new(
            WriteBatch::from(vec![
                StoreOp::RecordReveal(VoteReveal {
                    proposal_id: id,
                    voter: *voter,
                    option,
                    power,
                    revealed_at: now,
                }),
                StoreOp::AddVotes { id, option, power },
            ]),
            vec![GovernanceEffect::VoteRevealed {
                id,
                voter: *voter,
                option,
                power,
            }],
        ))
    }

    /// Create, replace (`to` is `Some`) or revoke (`to` is `None`) the
    /// delegation of `from` in `scope`, settled at `now`.
    ///
    /// Reveals at or after `now` already counted the old delegate's power
    /// when the delegation stream lags behind the reveals. Each such reveal
    /// of the old delegate loses one and each of the new delegate gains one,
    /// so the counts end up as if the change had been applied first.
    pub fn change_delegation(
        &self,
        from: &VoterAddress,
        to: Option<&VoterAddress>,
        scope: DelegationScope,
        now: BlockHeight,
        sequence: u64,
    ) -> Result<Transition, GovernanceError> {
        let resolver = self.resolver();
        let mut transition = match to {
            Some(to) => resolver.delegate(from, to, scope, now, sequence)?,
            None => resolver.revoke(from, scope, now)?,
        };

        let (proposals, global_after) = match scope {
            DelegationScope::Global => (self.store.list_proposals()?, to.copied()),
            DelegationScope::Proposal(id) => (
                vec![id],
                self.store
                    .active_delegation(from, DelegationScope::Global)?
                    .map(|edge| edge.to),
            ),
        };
        for id in proposals {
            let before = resolver.effective_delegate(from, id)?;
            let scoped_after = match scope {
                DelegationScope::Proposal(_) => to.copied(),
                DelegationScope::Global => self
                    .store
                    .active_delegation(from, DelegationScope::Proposal(id))?
                    .map(|edge| edge.to),
            };
            let after = scoped_after.or(global_after);
            if before == after {
                continue;
            }

            let moves = before.map(|d| (d, -1)).into_iter().chain(after.map(|d| (d, 1)));
            for (delegate, delta) in moves {
                let Some(reveal) = self.store.get_reveal(id, &delegate)? else {
                    continue;
                };
                if reveal.revealed_at < now {
                    continue;
                }
                let power = reveal.power.saturating_add_signed(delta);
                tracing::debug!(proposal = %id, voter = %delegate, delta, power, "reveal power adjusted");
                transition.batch.push(StoreOp::AdjustRevealPower {
                    id,
                    voter: delegate,
                    delta,
                });
                transition.effects.push(GovernanceEffect::RevealPowerAdjusted {
                    id,
                    voter: delegate,
                    power,
                });
            }
        }
        Ok(transition)
    }

    /// Finalize a ballot. Tallying twice is rejected as a duplicate.
    pub fn tally(&self, id: ProposalId, now: BlockHeight) -> Result<Transition, GovernanceError> {
        let proposal = self.load(id)?;
        match proposal.phase {
            BallotPhase::Tallied => return Err(GovernanceError::AlreadyTallied(id)),
            BallotPhase::Cancelled => return Err(GovernanceError::ProposalCancelled(id)),
            BallotPhase::Commit | BallotPhase::Reveal => {}
        }
        if !proposal.reveal_deadline.has_elapsed(now) {
            return Err(GovernanceError::RevealPhaseNotEnded(id));
        }

        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::SetProposalPhase {
                id,
                phase: BallotPhase::Tallied,
            }]),
            vec![GovernanceEffect::ProposalTallied {
                id,
                total_votes: proposal.total_votes,
            }],
        ))
    }

    pub fn cancel(
        &self,
        id: ProposalId,
        actor: &VoterAddress,
        now: BlockHeight,
    ) -> Result<Transition, GovernanceError> {
        let proposal = self.load(id)?;
        if !self.params.may_administer(actor) {
            return Err(GovernanceError::NotAdmin(*actor));
        }
        match proposal.phase {
            BallotPhase::Tallied => return Err(GovernanceError::CannotCancel(id)),
            BallotPhase::Cancelled => return Err(GovernanceError::AlreadyCancelled(id)),
            BallotPhase::Commit | BallotPhase::Reveal => {}
        }
        tracing::debug!(proposal = %id, actor = %actor, height = %now, "cancel accepted");

        Ok(Transition::new(
            WriteBatch::from(vec![StoreOp::SetProposalPhase {
                id,
                phase: BallotPhase::Cancelled,
            }]),
            vec![GovernanceEffect::ProposalCancelled { id }],
        ))
    }
}
