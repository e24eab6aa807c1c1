// Minting records - one per epoch close, consumed once by the merge audit

use crate::settlement::record::NodeId;
use serde::{Deserialize, Serialize};

/// What a partition minted at one epoch close.
///
/// Written exactly once when the close pipeline runs; read exactly once
/// when a reconciling partition's history passes through the trust audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintingRecord {
    epoch_number: u64,
    proposer: NodeId,
    reward_emitted: u64,
    trust_discount_applied: bool,
}

impl MintingRecord {
    /// Record a close's emission
    pub fn new(epoch_number: u64, proposer: NodeId, reward_emitted: u64) -> Self {
        Self {
            epoch_number,
            proposer,
            reward_emitted,
            trust_discount_applied: false,
        }
    }

    /// Epoch the reward was minted at
    pub fn epoch_number(&self) -> u64 {
        self.epoch_number
    }

    /// Node whose close proposal won the epoch
    pub fn proposer(&self) -> &NodeId {
        &self.proposer
    }

    /// Amount minted
    pub fn reward_emitted(&self) -> u64 {
        self.reward_emitted
    }

    /// Whether the merge audit has already discounted this record
    pub fn trust_discount_applied(&self) -> bool {
        self.trust_discount_applied
    }

    /// Mark the record as consumed by the audit
    pub fn mark_audited(&mut self) {
        self.trust_discount_applied = true;
    }

    /// Identity for deduplicating records across merged timelines
    pub fn dedup_key(&self) -> (u64, NodeId) {
        (self.epoch_number, self.proposer.clone())
    }
}
