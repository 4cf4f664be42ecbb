//! Nullable store: thread-safe in-memory storage for testing.

use agora_store::{
    BallotStore, BatchStore, CursorStore, DelegationStore, DeliberationStore, ProposalStore,
    StoreError, StoreOp, WriteBatch,
};
use agora_types::{
    Amendment, DelegationEdge, DelegationScope, Deliberation, Proposal, ProposalId,
    ProposalOption, StreamName, SyncCursor, VoteCommitment, VoteReveal, VoterAddress,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Clone, Default)]
struct State {
    proposals: BTreeMap<ProposalId, Proposal>,
    options: BTreeMap<(ProposalId, u32), ProposalOption>,
    commitments: BTreeMap<(ProposalId, VoterAddress), VoteCommitment>,
    reveals: BTreeMap<(ProposalId, VoterAddress), VoteReveal>,
    /// Append-only edge history in insertion order.
    edges: Vec<DelegationEdge>,
    deliberations: BTreeMap<ProposalId, Deliberation>,
    amendments: BTreeMap<(ProposalId, u32), Amendment>,
    cursors: BTreeMap<StreamName, u64>,
}

impl State {
    fn active_edge_mut(
        &mut self,
        from: &VoterAddress,
        scope: DelegationScope,
    ) -> Option<&mut DelegationEdge> {
        self.edges
            .iter_mut()
            .find(|e| e.from == *from && e.scope == scope && e.is_active())
    }

    fn apply(&mut self, op: StoreOp) -> Result<(), StoreError> {
        match op {
            StoreOp::InsertProposal { proposal, options } => {
                if self.proposals.contains_key(&proposal.id) {
                    return Err(StoreError::Duplicate(format!("proposal {}", proposal.id)));
                }
                for option in options {
                    self.options
                        .insert((option.proposal_id, option.index), option);
                }
                self.proposals.insert(proposal.id, proposal);
            }
            StoreOp::SetProposalPhase { id, phase } => {
                let proposal = self
                    .proposals
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("proposal {}", id)))?;
                proposal.phase = phase;
            }
            StoreOp::AddVotes { id, option, power } => {
                let proposal = self
                    .proposals
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("proposal {}", id)))?;
                let entry = self
                    .options
                    .get_mut(&(id, option))
                    .ok_or_else(|| StoreError::NotFound(format!("option {}/{}", id, option)))?;
                entry.votes += power;
                proposal.total_votes += power;
            }
            StoreOp::AdjustRevealPower { id, voter, delta } => {
                let reveal = self.reveals.get_mut(&(id, voter)).ok_or_else(|| {
                    StoreError::NotFound(format!("reveal {}/{}", id, voter))
                })?;
                let option = self
                    .options
                    .get_mut(&(id, reveal.option))
                    .ok_or_else(|| StoreError::NotFound(format!("option {}/{}", id, reveal.option)))?;
                let proposal = self
                    .proposals
                    .get_mut(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("proposal {}", id)))?;
                reveal.power = shift(reveal.power, delta, 1, "reveal power")?;
                option.votes = shift(option.votes, delta, 0, "option votes")?;
                proposal.total_votes = shift(proposal.total_votes, delta, 0, "total votes")?;
            }
            StoreOp::InsertCommitment(commitment) => {
                let key = (commitment.proposal_id, commitment.voter);
                if self.commitments.contains_key(&key) {
                    return Err(StoreError::Duplicate(format!(
                        "commitment {}/{}",
                        key.0, key.1
                    )));
                }
                self.commitments.insert(key, commitment);
            }
            StoreOp::RecordReveal(reveal) => {
                let key = (reveal.proposal_id, reveal.voter);
                let commitment = self.commitments.get_mut(&key).ok_or_else(|| {
                    StoreError::NotFound(format!("commitment {}/{}", key.0, key.1))
                })?;
                if commitment.revealed || self.reveals.contains_key(&key) {
                    return Err(StoreError::Duplicate(format!("reveal {}/{}", key.0, key.1)));
                }
                commitment.revealed = true;
                self.reveals.insert(key, reveal);
            }
            StoreOp::PutDelegation(edge) => {
                if self.active_edge_mut(&edge.from, edge.scope).is_some() {
                    return Err(StoreError::Duplicate(format!(
                        "active delegation {}/{}",
                        edge.from, edge.scope
                    )));
                }
                self.edges.push(edge);
            }
            StoreOp::RevokeDelegation { from, scope, at } => {
                let edge = self.active_edge_mut(&from, scope).ok_or_else(|| {
                    StoreError::NotFound(format!("active delegation {}/{}", from, scope))
                })?;
                edge.revoked_at = Some(at);
            }
            StoreOp::InsertDeliberation(deliberation) => {
                if self.deliberations.contains_key(&deliberation.id) {
                    return Err(StoreError::Duplicate(format!(
                        "deliberation {}",
                        deliberation.id
                    )));
                }
                self.deliberations.insert(deliberation.id, deliberation);
            }
            StoreOp::UpdateDeliberation(deliberation) => {
                let slot = self.deliberations.get_mut(&deliberation.id).ok_or_else(|| {
                    StoreError::NotFound(format!("deliberation {}", deliberation.id))
                })?;
                *slot = deliberation;
            }
            StoreOp::InsertAmendment(amendment) => {
                let key = (amendment.deliberation_id, amendment.index);
                if self.amendments.contains_key(&key) {
                    return Err(StoreError::Duplicate(format!("amendment {}/{}", key.0, key.1)));
                }
                self.amendments.insert(key, amendment);
            }
            StoreOp::AdvanceCursor(cursor) => {
                let current = self.cursors.get(&cursor.stream).copied();
                if let Some(current) = current {
                    if cursor.sequence < current {
                        return Err(StoreError::CursorRegression {
                            stream: cursor.stream.to_string(),
                            current,
                            requested: cursor.sequence,
                        });
                    }
                }
                self.cursors.insert(cursor.stream, cursor.sequence);
            }
        }
        Ok(())
    }
}

fn shift(value: u64, delta: i64, floor: u64, what: &str) -> Result<u64, StoreError> {
    value
        .checked_add_signed(delta)
        .filter(|v| *v >= floor)
        .ok_or_else(|| StoreError::Corruption(format!("{what} {value} cannot move by {delta}")))
}

/// An in-memory governance store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
///
/// Batches are applied to a scratch copy of the state and swapped in only
/// when every op succeeds, so a failing batch leaves nothing behind.
pub struct NullGovernanceStore {
    state: Mutex<State>,
    fail_commits: Mutex<Option<String>>,
    commits: AtomicU64,
}

impl NullGovernanceStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            fail_commits: Mutex::new(None),
            commits: AtomicU64::new(0),
        }
    }

    /// Make every following `commit_batch` fail with a backend error.
    /// Pass `None` to heal the store.
    pub fn fail_commits_with(&self, message: Option<&str>) {
        *self.fail_commits.lock().unwrap() = message.map(str::to_owned);
    }

    /// Number of batches committed successfully.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

impl Default for NullGovernanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalStore for NullGovernanceStore {
    fn get_proposal(&self, id: ProposalId) -> Result<Option<Proposal>, StoreError> {
        Ok(self.state.lock().unwrap().proposals.get(&id).cloned())
    }

    fn get_option(
        &self,
        id: ProposalId,
        index: u32,
    ) -> Result<Option<ProposalOption>, StoreError> {
        Ok(self.state.lock().unwrap().options.get(&(id, index)).cloned())
    }

    fn get_options(&self, id: ProposalId) -> Result<Vec<ProposalOption>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .options
            .range((id, 0)..=(id, u32::MAX))
            .map(|(_, o)| o.clone())
            .collect())
    }

    fn list_proposals(&self) -> Result<Vec<ProposalId>, StoreError> {
        Ok(self.state.lock().unwrap().proposals.keys().copied().collect())
    }
}

impl BallotStore for NullGovernanceStore {
    fn get_commitment(
        &self,
        id: ProposalId,
        voter: &VoterAddress,
    ) -> Result<Option<VoteCommitment>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .commitments
            .get(&(id, *voter))
            .cloned())
    }

    fn get_reveal(
        &self,
        id: ProposalId,
        voter: &VoterAddress,
    ) -> Result<Option<VoteReveal>, StoreError> {
        Ok(self.state.lock().unwrap().reveals.get(&(id, *voter)).cloned())
    }

    fn list_commitments(&self, id: ProposalId) -> Result<Vec<VoteCommitment>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .commitments
            .range((id, VoterAddress::ZERO)..=(id, VoterAddress::new([0xff; 20])))
            .map(|(_, c)| c.clone())
            .collect())
    }

    fn list_reveals(&self, id: ProposalId) -> Result<Vec<VoteReveal>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .reveals
            .range((id, VoterAddress::ZERO)..=(id, VoterAddress::new([0xff; 20])))
            .map(|(_, r)| r.clone())
            .collect())
    }
}

impl DelegationStore for NullGovernanceStore {
    fn active_delegation(
        &self,
        from: &VoterAddress,
        scope: DelegationScope,
    ) -> Result<Option<DelegationEdge>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .edges
            .iter()
            .find(|e| e.from == *from && e.scope == scope && e.is_active())
            .cloned())
    }

    fn active_delegations_to(&self, to: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError> {
        let mut edges: Vec<DelegationEdge> = self
            .state
            .lock()
            .unwrap()
            .edges
            .iter()
            .filter(|e| e.to == *to && e.is_active())
            .cloned()
            .collect();
        edges.sort_by_key(|e| (e.from, e.scope));
        Ok(edges)
    }

    fn delegations_to(&self, to: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError> {
        let mut edges: Vec<DelegationEdge> = self
            .state
            .lock()
            .unwrap()
            .edges
            .iter()
            .filter(|e| e.to == *to)
            .cloned()
            .collect();
        edges.sort_by_key(|e| (e.from, e.sequence));
        Ok(edges)
    }

    fn delegation_history(&self, from: &VoterAddress) -> Result<Vec<DelegationEdge>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .edges
            .iter()
            .filter(|e| e.from == *from)
            .cloned()
            .collect())
    }
}

impl DeliberationStore for NullGovernanceStore {
    fn get_deliberation(&self, id: ProposalId) -> Result<Option<Deliberation>, StoreError> {
        Ok(self.state.lock().unwrap().deliberations.get(&id).cloned())
    }

    fn get_amendments(&self, id: ProposalId) -> Result<Vec<Amendment>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .amendments
            .range((id, 0)..=(id, u32::MAX))
            .map(|(_, a)| a.clone())
            .collect())
    }
}

impl CursorStore for NullGovernanceStore {
    fn get_cursor(&self, stream: &StreamName) -> Result<Option<SyncCursor>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .cursors
            .get(stream)
            .map(|&sequence| SyncCursor {
                stream: stream.clone(),
                sequence,
            }))
    }

    fn list_cursors(&self) -> Result<Vec<SyncCursor>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .cursors
            .iter()
            .map(|(stream, &sequence)| SyncCursor {
                stream: stream.clone(),
                sequence,
            })
            .collect())
    }
}

impl BatchStore for NullGovernanceStore {
    fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if let Some(message) = self.fail_commits.lock().unwrap().clone() {
            return Err(StoreError::Backend(message));
        }
        let mut state = self.state.lock().unwrap();
        let mut scratch = state.clone();
        for op in batch.into_ops() {
            scratch.apply(op)?;
        }
        *state = scratch;
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
