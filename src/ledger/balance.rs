// Account balances - frozen base plus per-node delta counters
//
// An account's live balance is never a single mutable scalar. It is a base
// value frozen at the last local epoch close, plus grow-only delta counters
// for activity since that close. Rebasing folds the deltas into the base at
// each epoch boundary; the deltas then restart empty.

use crate::ledger::crdt::GCounter;
use crate::settlement::record::{NodeId, SettlementRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from balance ledger operations
#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("Deserialization failed")]
    DeserializationFailed,
}

/// A single account: frozen base + post-rebase delta counters.
///
/// Invariant: current balance = epoch_balance + Σdelta_earned − Σdelta_spent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    epoch_balance: u64,
    delta_earned: GCounter,
    delta_spent: GCounter,
}

impl AccountBalance {
    /// Create an empty account
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account with a starting base
    pub fn with_base(epoch_balance: u64) -> Self {
        Self {
            epoch_balance,
            delta_earned: GCounter::new(),
            delta_spent: GCounter::new(),
        }
    }

    /// The base frozen at the last local rebase
    pub fn epoch_balance(&self) -> u64 {
        self.epoch_balance
    }

    /// Post-rebase earned deltas
    pub fn delta_earned(&self) -> &GCounter {
        &self.delta_earned
    }

    /// Post-rebase spent deltas
    pub fn delta_spent(&self) -> &GCounter {
        &self.delta_spent
    }

    /// Record earnings under the owner's own counter key
    pub fn credit(&mut self, owner: &NodeId, amount: u64) {
        if amount > 0 {
            self.delta_earned.increment(owner, amount);
        }
    }

    /// Record spending under the owner's own counter key
    pub fn debit(&mut self, owner: &NodeId, amount: u64) {
        if amount > 0 {
            self.delta_spent.increment(owner, amount);
        }
    }

    /// Sum of post-rebase earnings
    pub fn post_rebase_earned(&self) -> u64 {
        self.delta_earned.total()
    }

    /// Sum of post-rebase spending
    pub fn post_rebase_spent(&self) -> u64 {
        self.delta_spent.total()
    }

    /// The live balance: base + earned − spent
    pub fn current(&self) -> u64 {
        self.epoch_balance
            .saturating_add(self.delta_earned.total())
            .saturating_sub(self.delta_spent.total())
    }

    /// Check whether any post-rebase activity exists
    pub fn has_deltas(&self) -> bool {
        !self.delta_earned.is_empty() || !self.delta_spent.is_empty()
    }

    /// Fold the deltas into the base and reset them.
    /// Called exactly once per local epoch close. Returns the new base.
    pub fn rebase(&mut self) -> u64 {
        self.epoch_balance = self.current();
        self.delta_earned.clear();
        self.delta_spent.clear();
        self.epoch_balance
    }

    /// Merge another replica's deltas (per-key max). Only valid when both
    /// sides rebased from the same base; divergent bases go through the
    /// merge dispatch in `ledger::merge`.
    pub fn merge_deltas(&mut self, other: &AccountBalance) {
        self.delta_earned.merge(&other.delta_earned);
        self.delta_spent.merge(&other.delta_spent);
    }

    /// Add directly to the frozen base (minting at epoch close)
    pub fn credit_base(&mut self, amount: u64) {
        self.epoch_balance = self.epoch_balance.saturating_add(amount);
    }

    /// Remove from the frozen base, never dropping below `floor`.
    /// Returns the amount actually removed.
    pub fn deduct_base_floored(&mut self, amount: u64, floor: u64) -> u64 {
        let removable = self.epoch_balance.saturating_sub(floor);
        let deducted = amount.min(removable);
        self.epoch_balance -= deducted;
        deducted
    }
}

/// The balance ledger: every known account's CRDT balance.
///
/// Applying a settlement credits each party's account under that party's
/// own counter key, so concurrent contributions from different nodes never
/// collide and replicas converge under per-key-max merge.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BalanceLedger {
    accounts: HashMap<NodeId, AccountBalance>,
}

impl BalanceLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known accounts
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Get an account if known
    pub fn account(&self, node: &NodeId) -> Option<&AccountBalance> {
        self.accounts.get(node)
    }

    /// Get or create an account
    pub fn account_mut(&mut self, node: &NodeId) -> &mut AccountBalance {
        self.accounts.entry(node.clone()).or_default()
    }

    /// Live balance of an account (0 if unknown)
    pub fn balance_of(&self, node: &NodeId) -> u64 {
        self.accounts.get(node).map(|a| a.current()).unwrap_or(0)
    }

    /// Iterate over (node, account) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &AccountBalance)> {
        self.accounts.iter()
    }

    /// Apply a settlement: each party's earnings and spending land on that
    /// party's own account under its own counter key.
    pub fn apply_settlement(&mut self, record: &SettlementRecord) {
        let party_a = record.party_a().clone();
        let party_b = record.party_b().clone();

        let account_a = self.account_mut(&party_a);
        account_a.credit(&party_a, record.earned_a());
        account_a.debit(&party_a, record.spent_a());

        let account_b = self.account_mut(&party_b);
        account_b.credit(&party_b, record.earned_b());
        account_b.debit(&party_b, record.spent_b());
    }

    /// Re-apply one party's share of a recovered settlement
    pub fn apply_recovered_share(&mut self, record: &SettlementRecord, party: &NodeId) {
        let (earned, spent) = if record.party_a() == party {
            (record.earned_a(), record.spent_a())
        } else if record.party_b() == party {
            (record.earned_b(), record.spent_b())
        } else {
            return;
        };

        let account = self.account_mut(party);
        account.credit(party, earned);
        account.debit(party, spent);
    }

    /// Rebase every account at an epoch close. Returns accounts rebased.
    pub fn rebase_all(&mut self) -> usize {
        let mut rebased = 0;
        for account in self.accounts.values_mut() {
            account.rebase();
            rebased += 1;
        }
        rebased
    }

    /// Sum of all live balances
    pub fn total_balance(&self) -> u64 {
        self.accounts
            .values()
            .fold(0u64, |acc, a| acc.saturating_add(a.current()))
    }

    /// Snapshot of every account's frozen base (pre-isolation bookkeeping)
    pub fn base_snapshot(&self) -> HashMap<NodeId, u64> {
        self.accounts
            .iter()
            .map(|(k, v)| (k.clone(), v.epoch_balance()))
            .collect()
    }

    /// All known account ids
    pub fn account_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.accounts.keys()
    }

    /// Replace an account wholesale (merge machinery)
    pub(crate) fn put_account(&mut self, node: NodeId, account: AccountBalance) {
        self.accounts.insert(node, account);
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BalanceError> {
        postcard::from_bytes(bytes).map_err(|_| BalanceError::DeserializationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    fn settlement(a: u8, b: u8, earned_a: u64, spent_a: u64) -> SettlementRecord {
        SettlementRecord::new(node(a), node(b), earned_a, spent_a, spent_a, earned_a, 0).unwrap()
    }

    #[test]
    fn test_balance_invariant() {
        let mut account = AccountBalance::with_base(100);
        account.credit(&node(1), 50);
        account.debit(&node(1), 30);

        assert_eq!(account.current(), 120);
        assert_eq!(account.epoch_balance(), 100);
    }

    #[test]
    fn test_rebase_folds_and_clears() {
        let mut account = AccountBalance::with_base(100);
        account.credit(&node(1), 50);
        account.debit(&node(1), 30);

        let new_base = account.rebase();

        assert_eq!(new_base, 120);
        assert_eq!(account.epoch_balance(), 120);
        assert!(!account.has_deltas());
        assert_eq!(account.current(), 120);
    }

    #[test]
    fn test_apply_settlement_credits_both_parties() {
        let mut ledger = BalanceLedger::new();
        ledger.apply_settlement(&settlement(1, 2, 100, 0));

        assert_eq!(ledger.balance_of(&node(1)), 100);
        assert_eq!(ledger.balance_of(&node(2)), 0); // earned 0, spent 100 from empty
        assert_eq!(ledger.account(&node(2)).unwrap().post_rebase_spent(), 100);
    }

    #[test]
    fn test_deduct_base_floored() {
        let mut account = AccountBalance::with_base(1_000);

        let deducted = account.deduct_base_floored(300, 800);
        assert_eq!(deducted, 200);
        assert_eq!(account.epoch_balance(), 800);

        // Already at the floor: nothing more comes out
        assert_eq!(account.deduct_base_floored(100, 800), 0);
        assert_eq!(account.epoch_balance(), 800);
    }

    #[test]
    fn test_delta_merge_between_replicas() {
        let mut replica1 = AccountBalance::with_base(100);
        replica1.credit(&node(1), 40);

        let mut replica2 = AccountBalance::with_base(100);
        replica2.credit(&node(2), 25);

        replica1.merge_deltas(&replica2);

        assert_eq!(replica1.current(), 165);
    }
}
