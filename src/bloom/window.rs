// Verification Window - retained filters and the recovery/dispute path
//
// Filters stay live for four epochs after their close. Inside that window
// a recovery proof is checked against every retained filter: a positive
// means the settlement is already inside a frozen base and must not be
// re-applied; a negative means it is safe to apply. A false positive
// wrongly skips a legitimate settlement; the counterparty dispute intake
// is the second independent check that bounds that loss.

use crate::bloom::filter::SettlementFilter;
use crate::settlement::record::SettlementHash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// How many epochs a published filter stays checkable
pub const VERIFICATION_WINDOW_EPOCHS: u64 = 4;

/// What to do with a settlement submitted for recovery
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Not present in any retained filter: apply it
    Apply,
    /// A retained filter claims it was incorporated at this epoch's close
    AlreadyCounted { epoch: u64 },
    /// No retained filter can vouch either way; applying is unsafe
    OutsideWindow,
}

/// A recovery that was skipped on a filter positive, kept for dispute
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecovery {
    pub hash: SettlementHash,
    /// Epoch of the filter that matched
    pub matched_epoch: u64,
    /// Epoch the skip was observed at (bounds the dispute window)
    pub observed_epoch: u64,
    /// The account whose share was dropped; None when the whole record
    /// was withheld
    pub account: Option<crate::settlement::record::NodeId>,
}

/// The retained set of published filters plus the skipped-recovery ledger
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterWindow {
    window: u64,
    filters: BTreeMap<u64, SettlementFilter>,
    skipped: Vec<SkippedRecovery>,
}

impl Default for FilterWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterWindow {
    /// Create a window with the standard four-epoch retention
    pub fn new() -> Self {
        Self::with_window(VERIFICATION_WINDOW_EPOCHS)
    }

    /// Create a window with a custom retention span
    pub fn with_window(window: u64) -> Self {
        Self {
            window,
            filters: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }

    /// Retention span in epochs
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Number of retained filters
    pub fn retained(&self) -> usize {
        self.filters.len()
    }

    /// Get a retained filter by epoch
    pub fn filter(&self, epoch: u64) -> Option<&SettlementFilter> {
        self.filters.get(&epoch)
    }

    /// The most recently published filter
    pub fn latest(&self) -> Option<&SettlementFilter> {
        self.filters.values().next_back()
    }

    /// Iterate over retained filters, oldest first
    pub fn retained_filters(&self) -> impl Iterator<Item = &SettlementFilter> {
        self.filters.values()
    }

    /// Publish a filter for a closed epoch and prune anything that fell
    /// out of the window as of `current_epoch`.
    pub fn publish(&mut self, filter: SettlementFilter, current_epoch: u64) {
        self.filters.insert(filter.epoch_number(), filter);
        self.prune(current_epoch);
    }

    /// Adopt a peer's filter for an epoch we have no filter for
    pub fn adopt(&mut self, filter: SettlementFilter, current_epoch: u64) -> bool {
        if self.filters.contains_key(&filter.epoch_number()) {
            return false;
        }
        self.publish(filter, current_epoch);
        true
    }

    /// Drop filters older than the window; the skipped ledger ages out with them
    pub fn prune(&mut self, current_epoch: u64) {
        let cutoff = current_epoch.saturating_sub(self.window);
        self.filters.retain(|epoch, _| *epoch >= cutoff);
        self.skipped.retain(|s| s.observed_epoch >= cutoff);
    }

    /// Decide what to do with a settlement hash submitted for recovery
    pub fn decide(&self, hash: &SettlementHash) -> RecoveryDecision {
        if self.filters.is_empty() {
            return RecoveryDecision::OutsideWindow;
        }
        for (epoch, filter) in self.filters.iter().rev() {
            if filter.contains(hash) {
                return RecoveryDecision::AlreadyCounted { epoch: *epoch };
            }
        }
        RecoveryDecision::Apply
    }

    /// Record a skipped recovery so a counterparty can dispute it
    pub fn record_skip(
        &mut self,
        hash: SettlementHash,
        matched_epoch: u64,
        observed_epoch: u64,
        account: Option<crate::settlement::record::NodeId>,
    ) {
        warn!(
            %hash,
            matched_epoch,
            "recovery skipped on filter positive, open to dispute"
        );
        self.skipped.push(SkippedRecovery {
            hash,
            matched_epoch,
            observed_epoch,
            account,
        });
    }

    /// Skipped recoveries still inside the dispute window
    pub fn skipped(&self) -> &[SkippedRecovery] {
        &self.skipped
    }

    /// Counterparty dispute: if the hash is on the skipped ledger and the
    /// dispute arrives inside the window, hand the entry back so the caller
    /// can re-apply the settlement.
    pub fn dispute(
        &mut self,
        hash: &SettlementHash,
        current_epoch: u64,
    ) -> Option<SkippedRecovery> {
        let pos = self.skipped.iter().position(|s| {
            &s.hash == hash && current_epoch.saturating_sub(s.observed_epoch) <= self.window
        })?;
        let entry = self.skipped.remove(pos);
        info!(%hash, "counterparty dispute accepted inside the window");
        Some(entry)
    }

    /// Occupancy of the latest retained filter (monitoring signal)
    pub fn latest_occupancy(&self) -> f64 {
        self.latest().map(|f| f.occupancy()).unwrap_or(0.0)
    }
}
