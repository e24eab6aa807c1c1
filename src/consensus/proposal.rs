// Close proposals and their acknowledgements

use crate::epoch::trigger::TriggerReason;
use crate::settlement::record::NodeId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Identity of a close proposal (hash of epoch, proposer, and round)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId([u8; 32]);

impl ProposalId {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// A gossiped proposal to close the current epoch.
///
/// Carries the proposer's locally observed active-set size; the ack
/// threshold is evaluated against that view and nothing else.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloseProposal {
    epoch_number: u64,
    proposer: NodeId,
    active_set_size: usize,
    settlement_count: usize,
    reason: TriggerReason,
    proposed_round: u64,
}

impl CloseProposal {
    /// Create a new close proposal
    pub fn new(
        epoch_number: u64,
        proposer: NodeId,
        active_set_size: usize,
        settlement_count: usize,
        reason: TriggerReason,
        proposed_round: u64,
    ) -> Self {
        Self {
            epoch_number,
            proposer,
            active_set_size,
            settlement_count,
            reason,
            proposed_round,
        }
    }

    /// Epoch this proposal wants to close
    pub fn epoch_number(&self) -> u64 {
        self.epoch_number
    }

    /// Node that raised the proposal
    pub fn proposer(&self) -> &NodeId {
        &self.proposer
    }

    /// The proposer's local active-set view
    pub fn active_set_size(&self) -> usize {
        self.active_set_size
    }

    /// The proposer's settlement count for the epoch
    pub fn settlement_count(&self) -> usize {
        self.settlement_count
    }

    /// Why the close was initiated
    pub fn reason(&self) -> TriggerReason {
        self.reason
    }

    /// Round the proposal was raised at
    pub fn proposed_round(&self) -> u64 {
        self.proposed_round
    }

    /// Compute the proposal identity
    pub fn id(&self) -> ProposalId {
        let mut hasher = Sha256::new();
        hasher.update(b"proposal:");
        hasher.update(self.epoch_number.to_le_bytes());
        hasher.update(self.proposer.as_bytes());
        hasher.update(self.proposed_round.to_le_bytes());
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        ProposalId(bytes)
    }
}

/// Acknowledgement of a close proposal
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ack {
    proposal: ProposalId,
    epoch_number: u64,
    voter: NodeId,
}

impl Ack {
    /// Create an acknowledgement
    pub fn new(proposal: ProposalId, epoch_number: u64, voter: NodeId) -> Self {
        Self {
            proposal,
            epoch_number,
            voter,
        }
    }

    /// The proposal being acknowledged
    pub fn proposal(&self) -> &ProposalId {
        &self.proposal
    }

    /// Epoch the ack refers to
    pub fn epoch_number(&self) -> u64 {
        self.epoch_number
    }

    /// The acknowledging node
    pub fn voter(&self) -> &NodeId {
        &self.voter
    }
}

/// Why a node refuses a close proposal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NakReason {
    /// The proposer's settlement count is behind this node's view
    MissingSettlements,
    /// The proposal refers to an epoch this node already moved past
    StaleEpoch,
}

/// Refusal of a close proposal
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Nak {
    proposal: ProposalId,
    epoch_number: u64,
    voter: NodeId,
    reason: NakReason,
}

impl Nak {
    /// Create a refusal
    pub fn new(proposal: ProposalId, epoch_number: u64, voter: NodeId, reason: NakReason) -> Self {
        Self {
            proposal,
            epoch_number,
            voter,
            reason,
        }
    }

    /// The proposal being refused
    pub fn proposal(&self) -> &ProposalId {
        &self.proposal
    }

    /// Epoch the nak refers to
    pub fn epoch_number(&self) -> u64 {
        self.epoch_number
    }

    /// The refusing node
    pub fn voter(&self) -> &NodeId {
        &self.voter
    }

    /// Why the proposal was refused
    pub fn reason(&self) -> NakReason {
        self.reason
    }
}
