//! Ledger events consumed by the reconciler, and the projection bus that
//! fans out the effects of applied events.
//!
//! Events arrive as JSON objects (one per line on the NDJSON feed):
//!
//! ```text
//! {"stream":"votes","sequence":7,"height":120,"timestamp":1700000000,
//!  "proposal_id":3,"actor":"0x…","kind":{"type":"vote_committed","commitment":"0x…"}}
//! ```
//!
//! Payloads are immutable once emitted by the ledger; hashes and secrets are
//! carried as hex strings.

use agora_governance::GovernanceEffect;
use agora_types::{
    BlockHeight, CommitmentHash, DelegationScope, ProposalId, RevealSecret, StreamName, Timestamp,
    VoterAddress,
};
use serde::{Deserialize, Serialize};

/// One ledger occurrence, totally ordered within its `stream`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub stream: StreamName,
    pub sequence: u64,
    pub height: BlockHeight,
    pub timestamp: Timestamp,
    /// Target proposal or deliberation. `0` on delegation events means the
    /// global scope.
    pub proposal_id: ProposalId,
    pub actor: VoterAddress,
    pub kind: LedgerEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEventKind {
    ProposalCreated {
        title: String,
        content: String,
        option_count: u32,
        #[serde(default)]
        labels: Vec<String>,
        commit_duration: u64,
        reveal_duration: u64,
        #[serde(default)]
        deliberation: Option<ProposalId>,
    },
    VoteCommitted {
        #[serde(with = "commitment_hex")]
        commitment: CommitmentHash,
    },
    VoteRevealed {
        option: u32,
        #[serde(with = "secret_hex")]
        secret: RevealSecret,
    },
    ProposalTallied,
    ProposalCancelled,
    /// `to: Some` creates or replaces the actor's delegation, `None` revokes it.
    DelegationChanged {
        to: Option<VoterAddress>,
    },
    ProposalSubmitted {
        title: String,
        content: String,
        discussion_secs: u64,
    },
    AmendmentAdded {
        content: String,
    },
    AdvancedToVoting,
    DeliberationClosed,
}

impl LedgerEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProposalCreated { .. } => "proposal_created",
            Self::VoteCommitted { .. } => "vote_committed",
            Self::VoteRevealed { .. } => "vote_revealed",
            Self::ProposalTallied => "proposal_tallied",
            Self::ProposalCancelled => "proposal_cancelled",
            Self::DelegationChanged { .. } => "delegation_changed",
            Self::ProposalSubmitted { .. } => "proposal_submitted",
            Self::AmendmentAdded { .. } => "amendment_added",
            Self::AdvancedToVoting => "advanced_to_voting",
            Self::DeliberationClosed => "deliberation_closed",
        }
    }
}

impl LedgerEvent {
    /// Delegation scope addressed by this event's `proposal_id`.
    pub fn scope(&self) -> DelegationScope {
        DelegationScope::from_token(self.proposal_id.as_u64())
    }
}

mod commitment_hex {
    use agora_types::CommitmentHash;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &CommitmentHash, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(hash)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<CommitmentHash, D::Error> {
        let raw = String::deserialize(d)?;
        CommitmentHash::from_hex(&raw).map_err(D::Error::custom)
    }
}

mod secret_hex {
    use agora_types::RevealSecret;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(secret: &RevealSecret, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("0x{}", hex::encode(secret.as_bytes())))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<RevealSecret, D::Error> {
        let raw = String::deserialize(d)?;
        RevealSecret::from_hex(&raw).map_err(D::Error::custom)
    }
}

type Listener = Box<dyn Fn(&LedgerEvent, &GovernanceEffect) + Send + Sync>;

/// Synchronous fan-out of governance effects.
///
/// Effects are emitted only after the batch that produced them committed.
/// Listeners run inline on the applying thread; keep handlers fast to avoid
/// stalling reconciliation.
pub struct ProjectionBus {
    listeners: Vec<Listener>,
}

impl ProjectionBus {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    pub fn emit(&self, source: &LedgerEvent, effect: &GovernanceEffect) {
        for listener in &self.listeners {
            listener(source, effect);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for ProjectionBus {
    fn default() -> Self {
        Self::new()
    }
}
