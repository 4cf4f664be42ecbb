//! Commit-reveal hash types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypeError;

/// A 32-byte hiding commitment over `(proposal, option, secret)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitmentHash([u8; 32]);

impl CommitmentHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-digit hex string, with or without a `0x` prefix.
    pub fn from_hex(raw: &str) -> Result<Self, TypeError> {
        decode_32(raw).map(Self)
    }
}

impl fmt::Debug for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommitmentHash({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// The 32-byte secret a voter mixes into a commitment and discloses on reveal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevealSecret([u8; 32]);

impl RevealSecret {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(raw: &str) -> Result<Self, TypeError> {
        decode_32(raw).map(Self)
    }
}

// Secrets stay out of logs.
impl fmt::Debug for RevealSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevealSecret(..)")
    }
}

fn decode_32(raw: &str) -> Result<[u8; 32], TypeError> {
    let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_part, &mut out).map_err(|_| TypeError::InvalidHex(raw.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_hex_round_trip() {
        let hash = CommitmentHash::new([0xab; 32]);
        let parsed = CommitmentHash::from_hex(&hash.to_string()).unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn secret_accepts_unprefixed_hex() {
        let raw = "11".repeat(32);
        assert_eq!(RevealSecret::from_hex(&raw).unwrap(), RevealSecret::new([0x11; 32]));
    }

    #[test]
    fn short_hex_is_rejected() {
        assert!(CommitmentHash::from_hex("0x1234").is_err());
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = RevealSecret::new([7; 32]);
        assert_eq!(format!("{:?}", secret), "RevealSecret(..)");
    }
}
