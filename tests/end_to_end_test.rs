// End-to-End Tests - isolated timelines, overminting bounds, reconciliation

use meshledger::mint::{
    base_reward, cumulative_base_reward, scaled_reward, HALVING_INTERVAL,
};
use meshledger::trust::{audit_partition, AuditConfig};
use meshledger::{MintingRecord, MockTrustProvider, NodeId};
use std::collections::HashSet;

fn node(b: u8) -> NodeId {
    NodeId::from_bytes([b; 32])
}

// ============================================================================
// TWO PARTITIONS, 1,000 EPOCHS OF INDEPENDENT MINTING
// ============================================================================

#[test]
fn test_overminting_is_exactly_one_extra_timeline() {
    // Two partitions isolate at epoch 100,000 and each close 1,000 epochs,
    // both with a saturated active set.
    let start = HALVING_INTERVAL;
    let span = 1_000u64;

    let mut minted_left = 0u128;
    let mut minted_right = 0u128;
    for epoch in start..start + span {
        minted_left += scaled_reward(epoch, 0, 120) as u128;
        minted_right += scaled_reward(epoch, 0, 500) as u128;
    }

    // Single-timeline issuance over the same span, in closed form
    let single_timeline = cumulative_base_reward(start + span) - cumulative_base_reward(start);

    assert_eq!(minted_left, single_timeline);
    assert_eq!(minted_right, single_timeline);

    // Overminting = (N - 1) x reward per epoch, summed over the span
    let total_minted = minted_left + minted_right;
    let overminted = total_minted - single_timeline;
    assert_eq!(overminted, span as u128 * base_reward(start) as u128);
    assert_eq!(overminted, single_timeline);
}

#[test]
fn test_overminting_fraction_decays_with_supply() {
    // The same two-partition excess measured against circulating supply
    // keeps shrinking as halvings accumulate.
    let fraction_at = |epoch: u64| {
        let supply = cumulative_base_reward(epoch) as f64;
        base_reward(epoch) as f64 / supply
    };

    let mut previous = fraction_at(HALVING_INTERVAL);
    for interval in [2u64, 4, 8, 16] {
        let current = fraction_at(interval * HALVING_INTERVAL);
        assert!(current < previous);
        previous = current;
    }
}

// ============================================================================
// ISOLATED MINTING MEETS THE AUDIT AT MERGE
// ============================================================================

#[test]
fn test_reconciled_overmint_survives_only_at_trust_fraction() {
    // An isolated fragment minted 1,000 epochs of rewards; a quarter of
    // its members are vouched for from outside.
    let start = HALVING_INTERVAL;
    let reward = base_reward(start);
    let records: Vec<MintingRecord> = (0..1_000u64)
        .map(|i| MintingRecord::new(start + i, node(1), reward))
        .collect();

    let partition: HashSet<NodeId> = (1..=4u8).map(node).collect();
    let provider = MockTrustProvider::new().with_trusted(node(1));

    let outcomes = audit_partition(
        &provider,
        &AuditConfig::default(),
        &partition,
        &records,
        start + 1_000,
    );

    let accepted: u128 = outcomes.iter().map(|o| o.accepted as u128).sum();
    let rejected: u128 = outcomes.iter().map(|o| o.rejected as u128).sum();
    let minted_total = 1_000u128 * reward as u128;

    assert_eq!(accepted + rejected, minted_total);
    assert_eq!(accepted, minted_total / 4);
}
