// Bloom Filter Tests - the verification window and the recovery gate

use meshledger::{
    FilterWindow, NodeId, RecoveryDecision, SettlementFilter, SettlementRecord,
};

fn record(a: u8, b: u8, amount: u64, epoch: u64) -> SettlementRecord {
    SettlementRecord::new(
        NodeId::from_bytes([a; 32]),
        NodeId::from_bytes([b; 32]),
        amount,
        0,
        0,
        amount,
        epoch,
    )
    .unwrap()
}

fn filter_over(epoch: u64, records: &[SettlementRecord]) -> SettlementFilter {
    let mut filter = SettlementFilter::for_capacity(epoch, records.len().max(8));
    for r in records {
        filter.insert(r.hash());
    }
    filter
}

// ============================================================================
// FILTER BEHAVIOR
// ============================================================================

#[test]
fn test_no_false_negatives() {
    let records: Vec<SettlementRecord> =
        (0..200u64).map(|i| record(1, 2, i + 1, 0)).collect();
    let filter = filter_over(0, &records);

    for r in &records {
        assert!(filter.contains(r.hash()), "inserted hash must be found");
    }
}

#[test]
fn test_low_false_positive_rate_at_sizing() {
    // 1,000 inserted, 2,000 probed absent. At a 1e-4 target rate the
    // expected false positives are ~0.2; allow a generous margin.
    let inserted: Vec<SettlementRecord> =
        (0..1_000u64).map(|i| record(1, 2, i + 1, 0)).collect();
    let filter = filter_over(0, &inserted);

    let false_positives = (0..2_000u64)
        .map(|i| record(3, 4, i + 1, 0))
        .filter(|r| filter.contains(r.hash()))
        .count();

    assert!(
        false_positives <= 3,
        "unexpectedly many false positives: {false_positives}"
    );
}

// ============================================================================
// VERIFICATION WINDOW
// ============================================================================

#[test]
fn test_recovery_gate_inside_window() {
    let absorbed = record(1, 2, 500, 1);
    let fresh = record(1, 3, 40, 1);

    let mut window = FilterWindow::new();
    window.publish(filter_over(1, &[absorbed.clone()]), 1);

    assert_eq!(
        window.decide(absorbed.hash()),
        RecoveryDecision::AlreadyCounted { epoch: 1 }
    );
    assert_eq!(window.decide(fresh.hash()), RecoveryDecision::Apply);
}

#[test]
fn test_filters_prunable_after_four_epochs() {
    let mut window = FilterWindow::new();
    window.publish(filter_over(1, &[]), 1);
    window.publish(filter_over(2, &[]), 2);

    window.prune(5);
    assert_eq!(window.retained(), 2);

    window.prune(6);
    assert_eq!(window.retained(), 1);

    window.prune(7);
    assert_eq!(window.retained(), 0);
    assert_eq!(
        window.decide(record(1, 2, 1, 0).hash()),
        RecoveryDecision::OutsideWindow
    );
}

#[test]
fn test_skip_then_dispute_reverses_the_loss() {
    let lost = record(1, 2, 75, 1);
    let mut window = FilterWindow::new();
    window.publish(filter_over(1, &[lost.clone()]), 1);

    // The filter (rightly or wrongly) claims the settlement was counted
    window.record_skip(lost.hash().clone(), 1, 2, None);
    assert_eq!(window.skipped().len(), 1);

    // Counterparty disputes inside the window
    assert!(window.dispute(lost.hash(), 3).is_some());
    assert!(window.skipped().is_empty());
}

#[test]
fn test_dispute_outside_window_is_refused() {
    let lost = record(1, 2, 75, 1);
    let mut window = FilterWindow::new();
    window.record_skip(lost.hash().clone(), 1, 2, None);

    // Window is 4 epochs; epoch 7 is too late
    assert!(window.dispute(lost.hash(), 7).is_none());
}
