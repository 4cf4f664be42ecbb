//! Commit-reveal commitments.
//!
//! A commitment is `Blake2b-256(proposal_id_be ‖ option_be ‖ secret)`. The
//! fixed-width encoding makes the preimage unambiguous, so no two distinct
//! `(proposal, option, secret)` triples share a preimage.

use agora_types::{CommitmentHash, ProposalId, RevealSecret};

use crate::hash::blake2b_256_multi;

/// Compute the commitment a voter submits during the commit phase.
pub fn commitment_hash(proposal: ProposalId, option: u32, secret: &RevealSecret) -> CommitmentHash {
    CommitmentHash::new(blake2b_256_multi(&[
        &proposal.to_be_bytes(),
        &option.to_be_bytes(),
        secret.as_bytes(),
    ]))
}

/// Check a reveal against the stored commitment.
///
/// A wrong option and a wrong secret are indistinguishable to the caller.
pub fn verify_reveal(
    stored: &CommitmentHash,
    proposal: ProposalId,
    option: u32,
    secret: &RevealSecret,
) -> bool {
    commitment_hash(proposal, option, secret) == *stored
}
