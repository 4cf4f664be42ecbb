//! Fundamental types for the Agora governance service.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! voter addresses, proposal identifiers, ledger heights, timestamps, commitment
//! hashes, and the persisted data model (proposals, ballots, delegation edges,
//! deliberations, sync cursors).

pub mod address;
pub mod ballot;
pub mod block;
pub mod content;
pub mod cursor;
pub mod delegation;
pub mod deliberation;
pub mod error;
pub mod hash;
pub mod proposal;
pub mod time;

pub use address::VoterAddress;
pub use ballot::{VoteCommitment, VoteReveal};
pub use block::BlockHeight;
pub use content::ContentId;
pub use cursor::{StreamName, SyncCursor};
pub use delegation::{DelegationEdge, DelegationScope};
pub use deliberation::{Amendment, Deliberation, DeliberationPhase};
pub use error::TypeError;
pub use hash::{CommitmentHash, RevealSecret};
pub use proposal::{BallotPhase, Proposal, ProposalId, ProposalOption};
pub use time::Timestamp;
