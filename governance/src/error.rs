use agora_store::StoreError;
use agora_types::{BallotPhase, DelegationScope, DeliberationPhase, ProposalId, VoterAddress};
use thiserror::Error;

/// Coarse classification of a rejection.
///
/// Everything except `Storage` is a local, recoverable rejection of one
/// action; `Storage` means the backend itself failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Validation,
    PhaseViolation,
    DuplicateAction,
    Integrity,
    NotAuthorized,
    NotFound,
    Storage,
}

impl ErrorClass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::PhaseViolation => "phase_violation",
            Self::DuplicateAction => "duplicate_action",
            Self::Integrity => "integrity",
            Self::NotAuthorized => "not_authorized",
            Self::NotFound => "not_found",
            Self::Storage => "storage",
        }
    }
}

#[derive(Debug, Error)]
pub enum GovernanceError {
    // ── Validation ──────────────────────────────────────────────────────
    #[error("proposal id 0 is reserved for the global delegation scope")]
    ReservedProposalId,

    #[error("need at least 2 options, got {0}")]
    TooFewOptions(u32),

    #[error("{labels} labels supplied for {options} options")]
    LabelCountMismatch { labels: usize, options: u32 },

    #[error("durations must be > 0")]
    ZeroDuration,

    #[error("content id must not be empty")]
    EmptyContent,

    #[error("title must not be empty")]
    EmptyTitle,

    #[error("option {option} out of range (proposal has {count})")]
    OptionOutOfRange { option: u32, count: u32 },

    #[error("discussion period too short: {secs}s < {min}s")]
    DiscussionTooShort { secs: u64, min: u64 },

    // ── Phase ───────────────────────────────────────────────────────────
    #[error("proposal {id} not in commit phase (phase: {phase})")]
    NotInCommitPhase { id: ProposalId, phase: BallotPhase },

    #[error("proposal {id} not in reveal phase (phase: {phase})")]
    NotInRevealPhase { id: ProposalId, phase: BallotPhase },

    #[error("reveal phase of proposal {0} not ended")]
    RevealPhaseNotEnded(ProposalId),

    #[error("proposal {0} was cancelled")]
    ProposalCancelled(ProposalId),

    #[error("cannot cancel proposal {0}: already tallied")]
    CannotCancel(ProposalId),

    #[error("deliberation {id} is {actual}, expected {expected}")]
    WrongDeliberationPhase {
        id: ProposalId,
        expected: DeliberationPhase,
        actual: DeliberationPhase,
    },

    #[error("discussion period of deliberation {0} not ended")]
    DiscussionNotEnded(ProposalId),

    // ── Duplicate ───────────────────────────────────────────────────────
    #[error("proposal {0} already exists")]
    ProposalExists(ProposalId),

    #[error("{voter} already committed on proposal {id}")]
    AlreadyCommitted { id: ProposalId, voter: VoterAddress },

    #[error("{voter} already revealed on proposal {id}")]
    AlreadyRevealed { id: ProposalId, voter: VoterAddress },

    #[error("proposal {0} already tallied")]
    AlreadyTallied(ProposalId),

    #[error("proposal {0} already cancelled")]
    AlreadyCancelled(ProposalId),

    #[error("{from} already delegates to {to} ({scope})")]
    AlreadyDelegated {
        from: VoterAddress,
        to: VoterAddress,
        scope: DelegationScope,
    },

    #[error("deliberation {0} already exists")]
    DeliberationExists(ProposalId),

    #[error("deliberation {0} already closed")]
    AlreadyClosed(ProposalId),

    // ── Integrity ───────────────────────────────────────────────────────
    #[error("no commitment found for {voter} on proposal {id}")]
    NoCommitment { id: ProposalId, voter: VoterAddress },

    #[error("commitment mismatch for {voter} on proposal {id}")]
    CommitmentMismatch { id: ProposalId, voter: VoterAddress },

    #[error("cannot delegate to the zero address (from {0})")]
    ZeroAddressDelegate(VoterAddress),

    #[error("cannot delegate to self ({0})")]
    SelfDelegation(VoterAddress),

    #[error("circular delegation: {to} already resolves back to {from} ({scope})")]
    DelegationCycle {
        from: VoterAddress,
        to: VoterAddress,
        scope: DelegationScope,
    },

    #[error("delegation chain exceeds {max} hops")]
    ChainTooDeep { max: usize },

    #[error("no active delegation for {from} ({scope})")]
    NoActiveDelegation {
        from: VoterAddress,
        scope: DelegationScope,
    },

    // ── Authorization ───────────────────────────────────────────────────
    #[error("vote of {voter} is delegated to {delegate}")]
    VoteDelegated {
        voter: VoterAddress,
        delegate: VoterAddress,
    },

    #[error("{0} is not an eligible voter")]
    NotEligible(VoterAddress),

    #[error("{0} is not an administrator")]
    NotAdmin(VoterAddress),

    #[error("only the proposer may do this, not {0}")]
    NotProposer(VoterAddress),

    #[error("{0} is not a member")]
    NotMember(VoterAddress),

    #[error("{0} is not authorized to close this deliberation")]
    NotAuthorizedToClose(VoterAddress),

    // ── Lookup ──────────────────────────────────────────────────────────
    #[error("proposal {0} not found")]
    ProposalNotFound(ProposalId),

    #[error("deliberation {0} not found")]
    DeliberationNotFound(ProposalId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl GovernanceError {
    pub fn class(&self) -> ErrorClass {
        use GovernanceError::*;
        match self {
            ReservedProposalId
            | TooFewOptions(_)
            | LabelCountMismatch { .. }
            | ZeroDuration
            | EmptyContent
            | EmptyTitle
            | OptionOutOfRange { .. }
            | DiscussionTooShort { .. } => ErrorClass::Validation,

            NotInCommitPhase { .. }
            | NotInRevealPhase { .. }
            | RevealPhaseNotEnded(_)
            | ProposalCancelled(_)
            | CannotCancel(_)
            | WrongDeliberationPhase { .. }
            | DiscussionNotEnded(_) => ErrorClass::PhaseViolation,

            ProposalExists(_)
            | AlreadyCommitted { .. }
            | AlreadyRevealed { .. }
            | AlreadyTallied(_)
            | AlreadyCancelled(_)
            | AlreadyDelegated { .. }
            | DeliberationExists(_)
            | AlreadyClosed(_) => ErrorClass::DuplicateAction,

            NoCommitment { .. }
            | CommitmentMismatch { .. }
            | ZeroAddressDelegate(_)
            | SelfDelegation(_)
            | DelegationCycle { .. }
            | ChainTooDeep { .. }
            | NoActiveDelegation { .. } => ErrorClass::Integrity,

            VoteDelegated { .. }
            | NotEligible(_)
            | NotAdmin(_)
            | NotProposer(_)
            | NotMember(_)
            | NotAuthorizedToClose(_) => ErrorClass::NotAuthorized,

            ProposalNotFound(_) | DeliberationNotFound(_) => ErrorClass::NotFound,

            Store(_) => ErrorClass::Storage,
        }
    }

    /// The action refers to a commitment, proposal or deliberation that is
    /// not known locally yet. Its predecessor may still be in flight on
    /// another stream.
    pub fn is_missing_predecessor(&self) -> bool {
        matches!(
            self,
            Self::NoCommitment { .. } | Self::ProposalNotFound(_) | Self::DeliberationNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        let v = VoterAddress::new([1; 20]);
        let id = ProposalId::new(1);
        assert_eq!(GovernanceError::TooFewOptions(1).class(), ErrorClass::Validation);
        assert_eq!(
            GovernanceError::CommitmentMismatch { id, voter: v }.class(),
            ErrorClass::Integrity
        );
        assert_eq!(GovernanceError::AlreadyTallied(id).class(), ErrorClass::DuplicateAction);
        assert_eq!(
            GovernanceError::VoteDelegated { voter: v, delegate: v }.class(),
            ErrorClass::NotAuthorized
        );
        assert_eq!(
            GovernanceError::Store(StoreError::Backend("io".into())).class(),
            ErrorClass::Storage
        );
    }

    #[test]
    fn missing_commitment_is_integrity_but_flagged() {
        let err = GovernanceError::NoCommitment {
            id: ProposalId::new(2),
            voter: VoterAddress::new([2; 20]),
        };
        assert_eq!(err.class(), ErrorClass::Integrity);
        assert!(err.is_missing_predecessor());
        assert!(err.to_string().contains("no commitment found"));
    }

    #[test]
    fn missing_proposal_or_deliberation_is_a_predecessor_gap() {
        let id = ProposalId::new(3);
        assert!(GovernanceError::ProposalNotFound(id).is_missing_predecessor());
        assert!(GovernanceError::DeliberationNotFound(id).is_missing_predecessor());
        assert_eq!(GovernanceError::ProposalNotFound(id).class(), ErrorClass::NotFound);

        assert!(!GovernanceError::CommitmentMismatch {
            id,
            voter: VoterAddress::new([3; 20]),
        }
        .is_missing_predecessor());
        assert!(!GovernanceError::AlreadyTallied(id).is_missing_predecessor());
    }

    #[test]
    fn zero_address_delegate_is_integrity() {
        let err = GovernanceError::ZeroAddressDelegate(VoterAddress::new([4; 20]));
        assert_eq!(err.class(), ErrorClass::Integrity);
        assert!(!err.is_missing_predecessor());
    }
}
