//! Property tests: the chain is order-sensitive, deterministic, and sensitive
//! to claim ids exactly when payloads carry identifiers.

use endorser_chain::{chain, ChainEntry};
use endorser_types::SequenceId;
use proptest::prelude::*;
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers / Strategies
// ---------------------------------------------------------------------------

fn arb_plain_payload() -> impl Strategy<Value = Value> {
    ("[a-z]{1,8}", any::<i32>(), any::<bool>())
        .prop_map(|(name, amount, flag)| json!({"name": name, "amount": amount, "flag": flag}))
}

fn arb_identity_payload() -> impl Strategy<Value = Value> {
    ("[0-9a-f]{8,16}", "[a-z]{1,8}").prop_map(|(account, note)| {
        json!({"agent": {"identifier": format!("did:ethr:0x{account}")}, "note": note})
    })
}

fn arb_seed() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[0-9a-f]{64}"]
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Swapping two distinct identity-bearing claims changes the digest.
    #[test]
    fn reordering_changes_digest(
        first in arb_identity_payload(),
        second in arb_identity_payload(),
        ids in (1u64..1_000, 1_000u64..2_000),
    ) {
        prop_assume!(first != second);
        let a = ChainEntry::new(SequenceId::new(ids.0), first);
        let b = ChainEntry::new(SequenceId::new(ids.1), second);
        prop_assert_ne!(
            chain("", &[a.clone(), b.clone()]),
            chain("", &[b, a])
        );
    }

    /// Same seed and same entries always produce the same digest.
    #[test]
    fn chain_is_deterministic(
        seed in arb_seed(),
        payloads in prop::collection::vec(prop_oneof![arb_plain_payload(), arb_identity_payload()], 0..8),
    ) {
        let entries = payloads
            .into_iter()
            .enumerate()
            .map(|(i, p)| ChainEntry::new(SequenceId::new(i as u64 + 1), p))
            .collect::<Vec<_>>();
        prop_assert_eq!(chain(&seed, &entries), chain(&seed, &entries.clone()));
    }

    /// Renumbering an identity-free claim leaves the digest alone.
    #[test]
    fn plain_payload_ids_do_not_matter(
        seed in arb_seed(),
        payload in arb_plain_payload(),
        ids in (0u64..10_000, 0u64..10_000),
    ) {
        prop_assert_eq!(
            chain(&seed, &[ChainEntry::new(SequenceId::new(ids.0), payload.clone())]),
            chain(&seed, &[ChainEntry::new(SequenceId::new(ids.1), payload)])
        );
    }

    /// Renumbering an identity-bearing claim changes the digest.
    #[test]
    fn identity_payload_ids_matter(
        seed in arb_seed(),
        payload in arb_identity_payload(),
        ids in (0u64..10_000, 0u64..10_000),
    ) {
        prop_assume!(ids.0 != ids.1);
        prop_assert_ne!(
            chain(&seed, &[ChainEntry::new(SequenceId::new(ids.0), payload.clone())]),
            chain(&seed, &[ChainEntry::new(SequenceId::new(ids.1), payload)])
        );
    }
}
