// Epoch State - the lifecycle of a single ledger round

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of an epoch on this node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochStatus {
    /// Accepting settlements, no close in flight
    Open,
    /// A close proposal is circulating
    Proposed,
    /// Quorum of acknowledgements collected
    Acked,
    /// Rebase and minting done; successor epoch takes over
    Closed,
}

/// Errors from epoch state transitions
#[derive(Error, Debug)]
pub enum EpochError {
    #[error("Invalid epoch transition: {from:?} -> {to:?}")]
    InvalidTransition { from: EpochStatus, to: EpochStatus },
}

/// Everything the triggers and the consensus engine observe about the
/// current epoch on this node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EpochState {
    epoch_number: u64,
    active_set_size: usize,
    settlement_count: usize,
    gset_bytes: usize,
    rounds_since_last_epoch: u64,
    status: EpochStatus,
}

impl EpochState {
    /// Open a fresh epoch
    pub fn open(epoch_number: u64, active_set_size: usize) -> Self {
        Self {
            epoch_number,
            active_set_size,
            settlement_count: 0,
            gset_bytes: 0,
            rounds_since_last_epoch: 0,
            status: EpochStatus::Open,
        }
    }

    /// Epoch number
    pub fn epoch_number(&self) -> u64 {
        self.epoch_number
    }

    /// Locally observed active-set size
    pub fn active_set_size(&self) -> usize {
        self.active_set_size
    }

    /// Settlements observed this epoch
    pub fn settlement_count(&self) -> usize {
        self.settlement_count
    }

    /// Byte size of this epoch's settlement set
    pub fn gset_bytes(&self) -> usize {
        self.gset_bytes
    }

    /// Gossip rounds since the previous close
    pub fn rounds_since_last_epoch(&self) -> u64 {
        self.rounds_since_last_epoch
    }

    /// Current lifecycle status
    pub fn status(&self) -> EpochStatus {
        self.status
    }

    /// Record settlement intake totals
    pub fn observe_settlements(&mut self, count: usize, gset_bytes: usize) {
        self.settlement_count = count;
        self.gset_bytes = gset_bytes;
    }

    /// Refresh the local active-set view
    pub fn set_active_set_size(&mut self, size: usize) {
        self.active_set_size = size;
    }

    /// Count a gossip round
    pub fn tick_round(&mut self) {
        self.rounds_since_last_epoch += 1;
    }

    /// Advance the lifecycle, rejecting transitions the protocol forbids.
    /// Proposed -> Open is the abandonment path after a stalled proposal.
    pub fn advance(&mut self, to: EpochStatus) -> Result<(), EpochError> {
        use EpochStatus::*;
        let valid = matches!(
            (self.status, to),
            (Open, Proposed) | (Proposed, Acked) | (Acked, Closed) | (Proposed, Open)
        );
        if !valid {
            return Err(EpochError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
