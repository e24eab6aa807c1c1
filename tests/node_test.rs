// Ledger Node Tests - settlement intake through close, merge, and recovery

use meshledger::epoch::TriggerConfig;
use meshledger::{
    AccountBalance, BalanceLedger, FilterWindow, LedgerNode, MockTrustProvider, NodeConfig,
    NodeId, PartitionState, SettlementFilter, SettlementRecord,
};
use std::collections::HashSet;

fn node_id(b: u8) -> NodeId {
    NodeId::from_bytes([b; 32])
}

fn settlement(a: u8, b: u8, amount: u64, epoch: u64) -> SettlementRecord {
    SettlementRecord::new(node_id(a), node_id(b), amount, 0, 0, amount, epoch).unwrap()
}

/// Config that closes epochs after a handful of settlements
fn fast_close_config() -> NodeConfig {
    NodeConfig {
        trigger: TriggerConfig {
            settlement_trigger: 3,
            ..TriggerConfig::default()
        },
        ..NodeConfig::default()
    }
}

/// Exchange rounds between two nodes until neither produces output
fn exchange(a: &mut LedgerNode, b: &mut LedgerNode, max_rounds: usize) {
    let mut to_a = Vec::new();
    let mut to_b = Vec::new();
    for _ in 0..max_rounds {
        let out_a = a.process_round(std::mem::take(&mut to_a)).unwrap();
        let out_b = b.process_round(std::mem::take(&mut to_b)).unwrap();
        if out_a.is_empty() && out_b.is_empty() {
            break;
        }
        to_b = out_a;
        to_a = out_b;
    }
}

// ============================================================================
// INTAKE
// ============================================================================

#[test]
fn test_intake_applies_and_announces() {
    let mut node = LedgerNode::new(node_id(1), NodeConfig::default());

    assert!(node.observe_settlement(settlement(1, 2, 100, 0)).unwrap());
    assert!(!node.observe_settlement(settlement(1, 2, 100, 0)).unwrap());

    assert_eq!(node.balance_of(&node_id(1)), 100);
    assert_eq!(node.stats().settlements_observed, 1);
    assert_eq!(node.stats().duplicates_dropped, 1);

    let snapshot = node.snapshot();
    assert_eq!(snapshot.settlement_count, 1);
    assert!(snapshot.gset_bytes > 0);
}

// ============================================================================
// JOINT EPOCH CLOSE
// ============================================================================

#[test]
fn test_two_nodes_close_an_epoch_together() {
    let mut a = LedgerNode::new(node_id(1), fast_close_config());
    let mut b = LedgerNode::new(node_id(2), fast_close_config());

    for (i, amount) in [100u64, 150, 50].iter().enumerate() {
        a.observe_settlement(settlement(1, 2, *amount, i as u64)).unwrap();
    }

    exchange(&mut a, &mut b, 10);

    // Both nodes closed epoch 0 and opened epoch 1
    assert_eq!(a.current_epoch(), 1);
    assert_eq!(b.current_epoch(), 1);
    assert_eq!(a.stats().epochs_closed, 1);
    assert_eq!(b.stats().epochs_closed, 1);

    // Identical close: same filter, same reward, same balances
    assert_eq!(a.mint_log(), b.mint_log());
    assert_eq!(a.supply(), b.supply());
    assert_eq!(a.balance_of(&node_id(1)), b.balance_of(&node_id(1)));
    assert_eq!(a.balance_of(&node_id(2)), b.balance_of(&node_id(2)));

    // The close published a retained filter
    assert_eq!(a.filter_window().retained(), 1);
    assert!(a.snapshot().bloom_occupancy > 0.0);
}

#[test]
fn test_deltas_rebased_into_base_at_close() {
    let mut a = LedgerNode::new(node_id(1), fast_close_config());
    let mut b = LedgerNode::new(node_id(2), fast_close_config());

    a.observe_settlement(settlement(1, 2, 100, 0)).unwrap();
    a.observe_settlement(settlement(1, 2, 150, 0)).unwrap();
    a.observe_settlement(settlement(1, 2, 50, 0)).unwrap();

    exchange(&mut a, &mut b, 10);

    let account = a.ledger().account(&node_id(1)).unwrap();
    assert!(!account.has_deltas(), "close must fold deltas into the base");
    assert!(account.epoch_balance() >= 300);
}

// ============================================================================
// LIVENESS STALL (DEFINED GAP, NOT A DEFECT)
// ============================================================================

#[test]
fn test_isolated_node_stalls_against_wide_active_set() {
    let mut a = LedgerNode::new(node_id(1), fast_close_config());

    // Ten distinct parties settled recently: active set of 10, quorum 7
    for i in 0..5u8 {
        a.observe_settlement(settlement(10 + i, 20 + i, 100, 0)).unwrap();
    }

    for _ in 0..20 {
        a.process_round(Vec::new()).unwrap();
    }

    // Proposals keep expiring; the epoch never closes alone
    assert_eq!(a.current_epoch(), 0);
    assert_eq!(a.stats().epochs_closed, 0);
}

// ============================================================================
// PARTITION MERGE THROUGH THE NODE
// ============================================================================

/// A remote partition whose timeline closed further ahead
fn remote_partition(
    account: NodeId,
    base: u64,
    absorbed: &[SettlementRecord],
    mint: u64,
) -> PartitionState {
    let mut ledger = BalanceLedger::new();
    *ledger.account_mut(&account) = AccountBalance::with_base(base);

    let mut filter = SettlementFilter::for_capacity(1, absorbed.len().max(8));
    for record in absorbed {
        filter.insert(record.hash());
    }
    let mut filters = FilterWindow::new();
    filters.publish(filter, 1);

    let mint_records = if mint > 0 {
        vec![meshledger::MintingRecord::new(1, account.clone(), mint)]
    } else {
        Vec::new()
    };

    let mut members = HashSet::new();
    members.insert(account);

    PartitionState {
        log: meshledger::SettlementLog::new(),
        ledger,
        filters,
        mint_records,
        members,
        open_epoch: 2,
        supply: base,
    }
}

#[test]
fn test_merge_takes_winning_base_and_keeps_local_activity() {
    let mut local = LedgerNode::new(node_id(1), NodeConfig::default());
    local.observe_settlement(settlement(1, 2, 100, 0)).unwrap();

    // Remote closed epochs we never saw: account 1 at base 5_000
    let remote = remote_partition(node_id(1), 5_000, &[], 0);
    let provider = MockTrustProvider::new().with_trusted(node_id(1));

    let summary = local.merge_partition(&remote, &provider).unwrap();

    assert_eq!(summary.report.divergent_base, 1);
    // Winning base plus our recovered post-rebase earnings
    assert_eq!(local.balance_of(&node_id(1)), 5_100);
    // The merged timeline resumes from the furthest epoch
    assert_eq!(local.current_epoch(), 2);
}

#[test]
fn test_merge_audit_discounts_untrusted_minting() {
    let mut local = LedgerNode::new(node_id(1), NodeConfig::default());

    // Remote minted 1_000 while isolated; nobody vouches for it
    let remote = remote_partition(node_id(9), 1_000, &[], 1_000);
    let provider = MockTrustProvider::new();

    let summary = local.merge_partition(&remote, &provider).unwrap();

    assert_eq!(summary.audit_outcomes.len(), 1);
    assert_eq!(summary.audit_outcomes[0].rejected, 1_000);
    assert_eq!(summary.audit_removed, 1_000);
    // The untrusted mint is gone from the merged balance
    assert_eq!(local.balance_of(&node_id(9)), 0);
}

#[test]
fn test_merge_skip_then_counterparty_dispute() {
    let mut local = LedgerNode::new(node_id(1), NodeConfig::default());
    let lost = settlement(1, 2, 100, 0);
    local.observe_settlement(lost.clone()).unwrap();

    // The remote winner's filter (falsely) covers our settlement
    let remote = remote_partition(node_id(1), 5_000, &[lost.clone()], 0);
    let provider = MockTrustProvider::new().with_trusted(node_id(1));

    let summary = local.merge_partition(&remote, &provider).unwrap();
    assert_eq!(summary.report.skipped_already_counted.len(), 1);
    assert_eq!(local.balance_of(&node_id(1)), 5_000);
    assert_eq!(local.snapshot().skipped_recoveries, 1);

    // The counterparty disputes inside the window; the share comes back
    assert!(local.dispute_settlement(lost).unwrap());
    assert_eq!(local.balance_of(&node_id(1)), 5_100);
}

// ============================================================================
// CRASH RECOVERY
// ============================================================================

#[test]
fn test_node_state_survives_store_roundtrip() {
    meshledger::logging::init();

    let mut a = LedgerNode::new(node_id(1), fast_close_config());
    let mut b = LedgerNode::new(node_id(2), fast_close_config());
    a.observe_settlement(settlement(1, 2, 100, 0)).unwrap();
    a.observe_settlement(settlement(1, 2, 150, 0)).unwrap();
    a.observe_settlement(settlement(1, 2, 50, 0)).unwrap();
    exchange(&mut a, &mut b, 10);

    let dir = tempfile::TempDir::new().unwrap();
    let store = meshledger::LedgerStore::open(dir.path()).unwrap();
    store.save_node_id(a.node_id()).unwrap();
    store.save_settlement_log(a.log()).unwrap();
    store.save_ledger(a.ledger()).unwrap();
    store.save_epoch(a.epoch_state()).unwrap();
    store.save_filters(a.filter_window()).unwrap();
    store.save_mint_log(a.mint_log()).unwrap();
    store.save_supply(a.supply()).unwrap();
    store.flush().unwrap();

    let restored = LedgerNode::restore(
        store.load_node_id().unwrap().unwrap(),
        fast_close_config(),
        store.load_settlement_log().unwrap().unwrap(),
        store.load_ledger().unwrap().unwrap(),
        store.load_epoch().unwrap().unwrap(),
        store.load_filters().unwrap().unwrap(),
        store.load_mint_log().unwrap(),
        store.load_supply().unwrap().unwrap(),
    );

    assert_eq!(restored.current_epoch(), a.current_epoch());
    assert_eq!(restored.supply(), a.supply());
    assert_eq!(
        restored.balance_of(&node_id(1)),
        a.balance_of(&node_id(1))
    );
    assert_eq!(restored.filter_window().retained(), 1);
}

// ============================================================================
// RECOVERY PROOF INTAKE
// ============================================================================

#[test]
fn test_recovery_proof_applied_when_filters_clear_it() {
    let mut a = LedgerNode::new(node_id(1), fast_close_config());
    let mut b = LedgerNode::new(node_id(2), fast_close_config());

    a.observe_settlement(settlement(1, 2, 100, 0)).unwrap();
    a.observe_settlement(settlement(1, 2, 150, 0)).unwrap();
    a.observe_settlement(settlement(1, 2, 50, 0)).unwrap();
    exchange(&mut a, &mut b, 10);
    assert_eq!(a.current_epoch(), 1);

    // A settlement the closed epoch never covered arrives as a proof
    let missing = settlement(3, 4, 70, 0);
    let proof = meshledger::RecoveryProof::new(
        missing.hash().clone(),
        missing.clone(),
        node_id(3),
    )
    .unwrap();

    a.submit_recovery_proof(proof).unwrap();

    assert_eq!(a.stats().proofs_recovered, 1);
    assert_eq!(a.balance_of(&node_id(3)), 70);
}
