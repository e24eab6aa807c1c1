// Partition merge - reconciling divergent balance histories
//
// Two partitions that closed different epochs while isolated arrive here
// with different frozen bases. The dispatch is a tagged variant, not nested
// conditionals: SameBase merges deltas by per-key max; DivergentBase takes
// the higher base as the winner and re-applies the losing side's
// post-rebase settlements one by one, gated on the winning side's bloom
// filters so nothing is counted both inside the base and as a recovered
// delta. No path aborts; convergence is by construction.

use crate::bloom::window::{FilterWindow, RecoveryDecision};
use crate::ledger::balance::{AccountBalance, BalanceLedger};
use crate::settlement::record::{NodeId, SettlementHash, SettlementRecord};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Which merge rule applies to a pair of account replicas
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeCase {
    /// Both replicas rebased from an identical base; deltas union cleanly
    SameBase,
    /// Bases differ; the higher base wins and the loser goes through
    /// settlement-proof recovery
    DivergentBase { winning_base: u64, local_wins: bool },
}

/// Classify a pair of account replicas
pub fn classify(local: &AccountBalance, remote: &AccountBalance) -> MergeCase {
    let lb = local.epoch_balance();
    let rb = remote.epoch_balance();
    if lb == rb {
        MergeCase::SameBase
    } else {
        MergeCase::DivergentBase {
            winning_base: lb.max(rb),
            local_wins: lb > rb,
        }
    }
}

/// One side of a partition merge
pub struct MergeSide<'a> {
    /// The side's balance ledger
    pub ledger: &'a BalanceLedger,
    /// Settlements the side observed after its last rebase
    pub post_rebase: &'a [SettlementRecord],
    /// The side's published bloom filters (its closed-epoch history)
    pub filters: &'a FilterWindow,
}

/// Outcome summary of a ledger merge
#[derive(Clone, Debug, Default)]
pub struct MergeReport {
    pub accounts_merged: usize,
    pub same_base: usize,
    pub divergent_base: usize,
    pub recovered_shares: usize,
    /// Recovery candidates the winning filter claimed were already counted:
    /// (hash, matching filter's epoch, affected account)
    pub skipped_already_counted: Vec<(SettlementHash, u64, NodeId)>,
    /// Recovery candidates that could not be checked against any retained filter
    pub outside_window: Vec<SettlementHash>,
}

/// Merge two partition ledgers into a single converged ledger.
///
/// Deterministic and direction-independent: swapping `local` and `remote`
/// produces the same balances.
pub fn merge_ledgers(local: &MergeSide<'_>, remote: &MergeSide<'_>) -> (BalanceLedger, MergeReport) {
    let mut merged = BalanceLedger::new();
    let mut report = MergeReport::default();

    let accounts: BTreeSet<NodeId> = local
        .ledger
        .account_ids()
        .chain(remote.ledger.account_ids())
        .cloned()
        .collect();

    for account_id in accounts {
        let local_account = local
            .ledger
            .account(&account_id)
            .cloned()
            .unwrap_or_default();
        let remote_account = remote
            .ledger
            .account(&account_id)
            .cloned()
            .unwrap_or_default();

        let result = match classify(&local_account, &remote_account) {
            MergeCase::SameBase => {
                report.same_base += 1;
                let mut account = local_account;
                account.merge_deltas(&remote_account);
                account
            }
            MergeCase::DivergentBase { winning_base, local_wins } => {
                report.divergent_base += 1;
                debug!(
                    account = %account_id,
                    winning_base,
                    local_wins,
                    "divergent bases at merge, entering settlement recovery"
                );

                let (winner_account, winner, loser) = if local_wins {
                    (local_account, local, remote)
                } else {
                    (remote_account, remote, local)
                };

                merge_divergent(
                    &account_id,
                    winner_account,
                    winner,
                    loser,
                    &mut report,
                )
            }
        };

        merged.put_account(account_id, result);
        report.accounts_merged += 1;
    }

    (merged, report)
}

/// Divergent-base rule: the winner's base already encodes every settlement
/// its partition closed over; its own post-rebase deltas apply as-is. The
/// loser's post-rebase activity is only re-applied per settlement, and only
/// when the winner's filters do not claim it was already incorporated.
fn merge_divergent(
    account_id: &NodeId,
    winner_account: AccountBalance,
    winner: &MergeSide<'_>,
    loser: &MergeSide<'_>,
    report: &mut MergeReport,
) -> AccountBalance {
    let mut scratch = BalanceLedger::new();
    scratch.put_account(account_id.clone(), winner_account);

    for record in loser.post_rebase.iter().filter(|r| r.involves(account_id)) {
        match winner.filters.decide(record.hash()) {
            RecoveryDecision::Apply => {
                scratch.apply_recovered_share(record, account_id);
                report.recovered_shares += 1;
            }
            RecoveryDecision::AlreadyCounted { epoch } => {
                debug!(
                    hash = %record.hash(),
                    epoch,
                    "settlement already in winning base, skipping recovery"
                );
                report.skipped_already_counted.push((
                    record.hash().clone(),
                    epoch,
                    account_id.clone(),
                ));
            }
            RecoveryDecision::OutsideWindow => {
                warn!(
                    hash = %record.hash(),
                    "no retained filter to verify recovery against, skipping"
                );
                report.outside_window.push(record.hash().clone());
            }
        }
    }

    scratch
        .account(account_id)
        .cloned()
        .unwrap_or_default()
}
