use proptest::prelude::*;

use agora_types::{
    BlockHeight, CommitmentHash, DelegationScope, ProposalId, Timestamp, VoterAddress,
};

proptest! {
    /// VoterAddress display -> parse produces the identical address.
    #[test]
    fn voter_address_display_parse_roundtrip(bytes in prop::array::uniform20(0u8..)) {
        let addr = VoterAddress::new(bytes);
        let parsed = VoterAddress::parse(&addr.to_string()).unwrap();
        prop_assert_eq!(parsed, addr);
    }

    /// VoterAddress bincode serialization roundtrip.
    #[test]
    fn voter_address_bincode_roundtrip(bytes in prop::array::uniform20(0u8..)) {
        let addr = VoterAddress::new(bytes);
        let encoded = bincode::serialize(&addr).unwrap();
        let decoded: VoterAddress = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, addr);
    }

    /// CommitmentHash hex roundtrip.
    #[test]
    fn commitment_hex_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = CommitmentHash::new(bytes);
        prop_assert_eq!(CommitmentHash::from_hex(&hash.to_string()).unwrap(), hash);
    }

    /// Scope tokens map 0 to Global and everything else to a proposal scope.
    #[test]
    fn scope_token_roundtrip(token in 0u64..u64::MAX) {
        let scope = DelegationScope::from_token(token);
        prop_assert_eq!(scope.token(), token);
        prop_assert_eq!(scope == DelegationScope::Global, token == 0);
    }

    /// A deadline has elapsed iff the current height is strictly past it.
    #[test]
    fn height_deadline_semantics(deadline in 0u64..u64::MAX, now in 0u64..u64::MAX) {
        prop_assert_eq!(
            BlockHeight::new(deadline).has_elapsed(BlockHeight::new(now)),
            now > deadline
        );
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
    }

    /// Proposal ids encode big-endian so store keys sort numerically.
    #[test]
    fn proposal_id_key_order(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ka = ProposalId::new(a).to_be_bytes();
        let kb = ProposalId::new(b).to_be_bytes();
        prop_assert_eq!(ka < kb, a < b);
    }
}
