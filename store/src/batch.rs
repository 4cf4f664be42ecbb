//! Atomic write batches.
//!
//! Governance logic never writes directly. It validates against the read
//! traits, then describes its writes as a list of [`StoreOp`]s. The backend
//! applies a whole [`WriteBatch`] in one transaction: either every op lands
//! or none does.
//!
//! Ops carry their own preconditions (uniqueness, existence, cursor
//! monotonicity). A violated precondition aborts the batch with the matching
//! [`StoreError`], so a race that slipped past validation cannot leave a
//! half-applied event behind.

use agora_types::{
    Amendment, BallotPhase, BlockHeight, DelegationEdge, DelegationScope, Deliberation, Proposal,
    ProposalId, ProposalOption, SyncCursor, VoteCommitment, VoteReveal, VoterAddress,
};

use crate::StoreError;

/// A single write, applied in batch order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// Create a proposal with its options. `Duplicate` if the id exists.
    InsertProposal {
        proposal: Proposal,
        options: Vec<ProposalOption>,
    },
    /// Persist a phase change. `NotFound` if the proposal is unknown.
    SetProposalPhase { id: ProposalId, phase: BallotPhase },
    /// Add `power` to one option and to the proposal's total.
    AddVotes {
        id: ProposalId,
        option: u32,
        power: u64,
    },
    /// Change the power of a stored reveal by `delta` and move its option
    /// count and the proposal total with it. `NotFound` without a reveal,
    /// `Corruption` if the power would drop below 1.
    AdjustRevealPower {
        id: ProposalId,
        voter: VoterAddress,
        delta: i64,
    },
    /// Store a commitment. `Duplicate` if the voter already committed.
    InsertCommitment(VoteCommitment),
    /// Store a reveal and flag the matching commitment as revealed.
    /// `NotFound` without a commitment, `Duplicate` if already revealed.
    RecordReveal(VoteReveal),
    /// Append a delegation edge. `Duplicate` if `(from, scope)` already has
    /// an active edge.
    PutDelegation(DelegationEdge),
    /// Mark the active edge of `(from, scope)` revoked. `NotFound` if none.
    RevokeDelegation {
        from: VoterAddress,
        scope: DelegationScope,
        at: BlockHeight,
    },
    /// Create a deliberation record. `Duplicate` if the id exists.
    InsertDeliberation(Deliberation),
    /// Overwrite an existing deliberation record. `NotFound` if unknown.
    UpdateDeliberation(Deliberation),
    /// Store an amendment. `Duplicate` if its index is taken.
    InsertAmendment(Amendment),
    /// Move a stream's cursor. `CursorRegression` if it would go backwards.
    AdvanceCursor(SyncCursor),
}

impl StoreOp {
    /// Short name for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InsertProposal { .. } => "insert_proposal",
            Self::SetProposalPhase { .. } => "set_proposal_phase",
            Self::AddVotes { .. } => "add_votes",
            Self::AdjustRevealPower { .. } => "adjust_reveal_power",
            Self::InsertCommitment(_) => "insert_commitment",
            Self::RecordReveal(_) => "record_reveal",
            Self::PutDelegation(_) => "put_delegation",
            Self::RevokeDelegation { .. } => "revoke_delegation",
            Self::InsertDeliberation(_) => "insert_deliberation",
            Self::UpdateDeliberation(_) => "update_deliberation",
            Self::InsertAmendment(_) => "insert_amendment",
            Self::AdvanceCursor(_) => "advance_cursor",
        }
    }
}

/// An ordered group of writes committed atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<StoreOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: StoreOp) {
        self.ops.push(op);
    }

    /// Append every op of `other`, keeping its order.
    pub fn append(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<StoreOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<StoreOp>> for WriteBatch {
    fn from(ops: Vec<StoreOp>) -> Self {
        Self { ops }
    }
}

impl Extend<StoreOp> for WriteBatch {
    fn extend<I: IntoIterator<Item = StoreOp>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

/// Atomic application of a [`WriteBatch`].
pub trait BatchStore {
    /// Apply every op of `batch` in order inside one transaction.
    ///
    /// On error nothing from the batch is visible to later reads.
    fn commit_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::StreamName;

    fn cursor(seq: u64) -> StoreOp {
        StoreOp::AdvanceCursor(SyncCursor {
            stream: StreamName::new("chain").unwrap(),
            sequence: seq,
        })
    }

    #[test]
    fn append_keeps_order() {
        let mut a = WriteBatch::new();
        a.push(StoreOp::SetProposalPhase {
            id: ProposalId::new(1),
            phase: BallotPhase::Tallied,
        });
        let b = WriteBatch::from(vec![cursor(4)]);
        a.append(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.ops()[0].name(), "set_proposal_phase");
        assert_eq!(a.ops()[1].name(), "advance_cursor");
    }

    #[test]
    fn empty_batch() {
        let batch = WriteBatch::new();
        assert!(batch.is_empty());
        assert!(batch.into_ops().is_empty());
    }

    #[test]
    fn duplicate_classification() {
        assert!(StoreError::Duplicate("x".into()).is_duplicate());
        assert!(!StoreError::Backend("x".into()).is_duplicate());
    }
}
