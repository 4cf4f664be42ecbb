//! Hashing primitives for the Agora governance service.
//!
//! - **Blake2b-256** for all hashing
//! - Commit-reveal commitments over `(proposal, option, secret)`

pub mod commitment;
pub mod hash;

pub use commitment::{commitment_hash, verify_reveal};
pub use hash::{blake2b_256, blake2b_256_multi};
