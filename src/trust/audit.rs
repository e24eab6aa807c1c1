// Trust-Gated Merge Audit - retroactive discounting of isolated minting
//
// A partition mints freely while isolated; payment comes due at merge.
// The audit scores the whole partition once per merge event - the
// fraction of its members holding a verifiable trust edge from outside -
// and accepts only that fraction of each minting record. The rejected
// remainder comes back out of the proposer's merged base, floored at the
// balance it held before isolation began. A discount is an intended
// economic outcome, logged, never an error.

use crate::ledger::balance::BalanceLedger;
use crate::mint::record::MintingRecord;
use crate::settlement::record::NodeId;
use crate::trust::provider::TrustProvider;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Audit configuration
#[derive(Clone, Debug, Default)]
pub struct AuditConfig {
    /// Pre-merge eligibility gate: a proposer without a non-expired
    /// continuity attestation scores zero regardless of partition trust
    pub require_attestation: bool,
}

/// The once-per-merge trust score of a reconciled partition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionTrustScore {
    trusted: usize,
    size: usize,
}

impl PartitionTrustScore {
    /// Compute the score: members with an external trust edge / members
    pub fn compute(
        provider: &dyn TrustProvider,
        partition: &HashSet<NodeId>,
    ) -> Self {
        let trusted = partition
            .iter()
            .filter(|node| provider.has_external_edge(node, partition))
            .count();
        Self {
            trusted,
            size: partition.len(),
        }
    }

    /// Members with external trust
    pub fn trusted(&self) -> usize {
        self.trusted
    }

    /// Partition size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Apply the score to a minted amount
    pub fn accepted_of(&self, amount: u64) -> u64 {
        if self.size == 0 {
            return 0;
        }
        (amount as u128 * self.trusted as u128 / self.size as u128) as u64
    }

    /// The score as a float, for logs and snapshots
    pub fn as_f64(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.trusted as f64 / self.size as f64
        }
    }
}

/// The audited fate of one minting record
#[derive(Clone, Debug)]
pub struct AuditOutcome {
    pub record: MintingRecord,
    pub accepted: u64,
    pub rejected: u64,
    pub score: PartitionTrustScore,
    /// Set when the attestation gate zeroed the record
    pub gated: bool,
}

/// Audit every minting record a reconciled partition brings to a merge.
/// Evaluated once per merge event.
pub fn audit_partition(
    provider: &dyn TrustProvider,
    config: &AuditConfig,
    partition: &HashSet<NodeId>,
    records: &[MintingRecord],
    current_epoch: u64,
) -> Vec<AuditOutcome> {
    let score = PartitionTrustScore::compute(provider, partition);

    records
        .iter()
        .map(|record| {
            let gated = config.require_attestation
                && !provider
                    .attestation(record.proposer())
                    .map(|a| a.is_valid_at(current_epoch))
                    .unwrap_or(false);

            let minted = record.reward_emitted();
            let accepted = if gated { 0 } else { score.accepted_of(minted) };
            let rejected = minted - accepted;

            let mut audited = record.clone();
            audited.mark_audited();

            info!(
                epoch = audited.epoch_number(),
                proposer = %audited.proposer(),
                minted,
                accepted,
                rejected,
                score = score.as_f64(),
                gated,
                "merge audit discounted minted supply"
            );

            AuditOutcome {
                record: audited,
                accepted,
                rejected,
                score,
                gated,
            }
        })
        .collect()
}

/// Remove the rejected remainders from the merged ledger. Each proposer's
/// base is floored at its pre-isolation balance: a partition can never
/// merge in less than it entered isolation with.
pub fn apply_outcomes(
    ledger: &mut BalanceLedger,
    outcomes: &[AuditOutcome],
    pre_isolation_bases: &HashMap<NodeId, u64>,
) -> u64 {
    let mut removed_total = 0u64;
    for outcome in outcomes {
        if outcome.rejected == 0 {
            continue;
        }
        let proposer = outcome.record.proposer();
        let floor = pre_isolation_bases.get(proposer).copied().unwrap_or(0);
        let account = ledger.account_mut(proposer);
        removed_total =
            removed_total.saturating_add(account.deduct_base_floored(outcome.rejected, floor));
    }
    removed_total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::provider::MockTrustProvider;

    fn node(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    fn partition(ids: &[u8]) -> HashSet<NodeId> {
        ids.iter().map(|b| node(*b)).collect()
    }

    #[test]
    fn test_zero_trust_rejects_everything() {
        let provider = MockTrustProvider::new();
        let records = vec![MintingRecord::new(10, node(1), 1_000)];

        let outcomes = audit_partition(
            &provider,
            &AuditConfig::default(),
            &partition(&[1, 2, 3, 4]),
            &records,
            12,
        );

        assert_eq!(outcomes[0].accepted, 0);
        assert_eq!(outcomes[0].rejected, 1_000);
        assert!(outcomes[0].record.trust_discount_applied());
    }

    #[test]
    fn test_full_trust_accepts_everything() {
        let provider = MockTrustProvider::new()
            .with_trusted(node(1))
            .with_trusted(node(2));
        let records = vec![MintingRecord::new(10, node(1), 1_000)];

        let outcomes = audit_partition(
            &provider,
            &AuditConfig::default(),
            &partition(&[1, 2]),
            &records,
            12,
        );

        assert_eq!(outcomes[0].accepted, 1_000);
        assert_eq!(outcomes[0].rejected, 0);
    }

    #[test]
    fn test_partial_trust_prorates() {
        let provider = MockTrustProvider::new().with_trusted(node(1));
        let records = vec![MintingRecord::new(10, node(1), 1_000)];

        let outcomes = audit_partition(
            &provider,
            &AuditConfig::default(),
            &partition(&[1, 2, 3, 4]),
            &records,
            12,
        );

        assert_eq!(outcomes[0].accepted, 250);
        assert_eq!(outcomes[0].rejected, 750);
    }

    #[test]
    fn test_attestation_gate_zeroes_unattested_proposer() {
        let provider = MockTrustProvider::new().with_trusted(node(1));
        let config = AuditConfig {
            require_attestation: true,
        };
        let records = vec![MintingRecord::new(10, node(1), 1_000)];

        let outcomes =
            audit_partition(&provider, &config, &partition(&[1]), &records, 12);

        assert!(outcomes[0].gated);
        assert_eq!(outcomes[0].accepted, 0);
    }

    #[test]
    fn test_rejection_floored_at_pre_isolation_balance() {
        let mut ledger = BalanceLedger::new();
        ledger.account_mut(&node(1)).credit_base(1_200);

        let provider = MockTrustProvider::new();
        let records = vec![MintingRecord::new(10, node(1), 1_000)];
        let outcomes = audit_partition(
            &provider,
            &AuditConfig::default(),
            &partition(&[1]),
            &records,
            12,
        );

        let mut floors = HashMap::new();
        floors.insert(node(1), 500u64);

        let removed = apply_outcomes(&mut ledger, &outcomes, &floors);

        // Only 700 can come out before the floor stops the deduction
        assert_eq!(removed, 700);
        assert_eq!(ledger.balance_of(&node(1)), 500);
    }
}
