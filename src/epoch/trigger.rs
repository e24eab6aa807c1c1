// Epoch Triggers - when to start closing the current epoch
//
// An ordered list of pure predicates evaluated every gossip round; the
// first match wins and names the close reason. There is no timeout
// fallback: if nothing fires the epoch stays open, and the proportional
// small-partition trigger is what keeps tiny fragments from stalling
// until memory runs out. Growth past the device limit with no trigger
// fired is fatal and surfaced, never dropped.

use crate::epoch::state::EpochState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Large-mesh close threshold
pub const SETTLEMENT_TRIGGER_LARGE: usize = 10_000;

/// Memory-pressure close threshold for the open epoch's settlement set
pub const GSET_TRIGGER_BYTES: usize = 500 * 1024;

/// Minimum rounds before the small-partition trigger may fire
pub const SMALL_PARTITION_MIN_ROUNDS: u64 = 1_000;

/// Settlement floor for the small-partition trigger
pub const SMALL_PARTITION_FLOOR: usize = 200;

/// Per-member scaling for the small-partition trigger
pub const SMALL_PARTITION_PER_MEMBER: usize = 10;

/// Default hard memory bound for constrained devices
pub const DEVICE_MEMORY_LIMIT_BYTES: usize = 520 * 1024;

/// Why an epoch close was initiated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    /// Large-mesh settlement volume
    SettlementCount,
    /// Open set approaching memory limits
    MemoryPressure,
    /// Small partition with proportionally enough activity and elapsed rounds
    SmallPartition,
}

impl TriggerReason {
    /// Stable label for logs and snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::SettlementCount => "settlement_count",
            TriggerReason::MemoryPressure => "memory_pressure",
            TriggerReason::SmallPartition => "small_partition",
        }
    }
}

/// Errors from trigger evaluation
#[derive(Error, Debug)]
pub enum TriggerError {
    #[error(
        "settlement set reached the device memory limit ({bytes} bytes) with no close trigger fired"
    )]
    ResourceExhaustion { bytes: usize },
}

/// Tunable thresholds; the defaults are the protocol constants
#[derive(Clone, Debug)]
pub struct TriggerConfig {
    pub settlement_trigger: usize,
    pub gset_trigger_bytes: usize,
    pub small_partition_min_rounds: u64,
    pub memory_limit_bytes: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            settlement_trigger: SETTLEMENT_TRIGGER_LARGE,
            gset_trigger_bytes: GSET_TRIGGER_BYTES,
            small_partition_min_rounds: SMALL_PARTITION_MIN_ROUNDS,
            memory_limit_bytes: DEVICE_MEMORY_LIMIT_BYTES,
        }
    }
}

/// Settlement threshold for a partition of the given active-set size
pub fn small_partition_threshold(active_set_size: usize) -> usize {
    SMALL_PARTITION_FLOOR.max(active_set_size * SMALL_PARTITION_PER_MEMBER)
}

fn large_mesh(config: &TriggerConfig, epoch: &EpochState) -> Option<TriggerReason> {
    (epoch.settlement_count() >= config.settlement_trigger).then_some(TriggerReason::SettlementCount)
}

fn memory_pressure(config: &TriggerConfig, epoch: &EpochState) -> Option<TriggerReason> {
    (epoch.gset_bytes() >= config.gset_trigger_bytes).then_some(TriggerReason::MemoryPressure)
}

fn small_partition(config: &TriggerConfig, epoch: &EpochState) -> Option<TriggerReason> {
    let threshold = small_partition_threshold(epoch.active_set_size());
    (epoch.settlement_count() >= threshold
        && epoch.rounds_since_last_epoch() >= config.small_partition_min_rounds)
        .then_some(TriggerReason::SmallPartition)
}

/// Fixed priority order; first match wins
const EVALUATORS: &[fn(&TriggerConfig, &EpochState) -> Option<TriggerReason>] =
    &[large_mesh, memory_pressure, small_partition];

/// Evaluate the close triggers for the current epoch.
///
/// `Ok(Some(reason))` starts a close, `Ok(None)` leaves the epoch open, and
/// `Err(ResourceExhaustion)` means growth outran every trigger.
pub fn evaluate(
    config: &TriggerConfig,
    epoch: &EpochState,
) -> Result<Option<TriggerReason>, TriggerError> {
    for evaluator in EVALUATORS {
        if let Some(reason) = evaluator(config, epoch) {
            return Ok(Some(reason));
        }
    }

    if epoch.gset_bytes() >= config.memory_limit_bytes {
        return Err(TriggerError::ResourceExhaustion {
            bytes: epoch.gset_bytes(),
        });
    }

    Ok(None)
}
