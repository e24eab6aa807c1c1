// Protocol - message types carried by the gossip transport
//
// One wire enum for everything a round can deliver: close proposals and
// their votes, settlement announcements, published bloom filters, and
// externally submitted recovery proofs. The transport itself is an
// external collaborator; it only promises eventual flooding at a fixed
// round interval.

use crate::bloom::filter::SettlementFilter;
use crate::consensus::proposal::{Ack, CloseProposal, Nak};
use crate::settlement::record::{NodeId, SettlementHash, SettlementRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Unique identifier for a message (for deduplication)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId([u8; 32]);

impl MessageId {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Types of messages in the protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    CloseProposal,
    Ack,
    Nak,
    Settlement,
    FilterPublish,
    RecoveryProof,
}

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Deserialization failed")]
    DeserializationFailed,

    #[error("Recovery proof hash does not match its payload")]
    ProofMismatch,
}

/// Announcement of a settlement record for flood propagation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementAnnouncement {
    record: SettlementRecord,
    hop_count: u8,
    max_hops: u8,
}

impl SettlementAnnouncement {
    /// Announce a record with a hop budget
    pub fn new(record: SettlementRecord, max_hops: u8) -> Self {
        Self {
            record,
            hop_count: 0,
            max_hops,
        }
    }

    /// The announced record
    pub fn record(&self) -> &SettlementRecord {
        &self.record
    }

    /// Hops traveled so far
    pub fn hop_count(&self) -> u8 {
        self.hop_count
    }

    /// Count a forwarding hop
    pub fn increment_hop(&mut self) {
        self.hop_count = self.hop_count.saturating_add(1);
    }

    /// Whether propagation should stop here
    pub fn should_stop_propagation(&self) -> bool {
        self.hop_count >= self.max_hops
    }
}

/// A bloom filter published at an epoch close
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterAnnouncement {
    publisher: NodeId,
    filter: SettlementFilter,
}

impl FilterAnnouncement {
    /// Publish a filter
    pub fn new(publisher: NodeId, filter: SettlementFilter) -> Self {
        Self { publisher, filter }
    }

    /// The publishing node
    pub fn publisher(&self) -> &NodeId {
        &self.publisher
    }

    /// The filter
    pub fn filter(&self) -> &SettlementFilter {
        &self.filter
    }

    /// Consume into the filter
    pub fn into_filter(self) -> SettlementFilter {
        self.filter
    }
}

/// An externally supplied settlement-recovery proof: the claimed hash
/// plus the full record payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecoveryProof {
    hash: SettlementHash,
    record: SettlementRecord,
    submitter: NodeId,
}

impl RecoveryProof {
    /// Build a proof, rejecting payloads that do not match the claimed hash
    pub fn new(
        hash: SettlementHash,
        record: SettlementRecord,
        submitter: NodeId,
    ) -> Result<Self, ProtocolError> {
        if &hash != record.hash() || !record.verify_hash() {
            return Err(ProtocolError::ProofMismatch);
        }
        Ok(Self {
            hash,
            record,
            submitter,
        })
    }

    /// The claimed settlement hash
    pub fn hash(&self) -> &SettlementHash {
        &self.hash
    }

    /// The full settlement payload
    pub fn record(&self) -> &SettlementRecord {
        &self.record
    }

    /// Who submitted the proof
    pub fn submitter(&self) -> &NodeId {
        &self.submitter
    }
}

/// Wrapper for all message types
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Message {
    CloseProposal(CloseProposal),
    Ack(Ack),
    Nak(Nak),
    Settlement(SettlementAnnouncement),
    FilterPublish(FilterAnnouncement),
    RecoveryProof(RecoveryProof),
}

impl Message {
    /// Get the message type
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::CloseProposal(_) => MessageType::CloseProposal,
            Message::Ack(_) => MessageType::Ack,
            Message::Nak(_) => MessageType::Nak,
            Message::Settlement(_) => MessageType::Settlement,
            Message::FilterPublish(_) => MessageType::FilterPublish,
            Message::RecoveryProof(_) => MessageType::RecoveryProof,
        }
    }

    /// Get a unique ID for this message (for deduplication)
    pub fn id(&self) -> MessageId {
        let mut hasher = Sha256::new();
        hasher.update(b"msg:");

        match self {
            Message::CloseProposal(p) => {
                hasher.update(b"proposal:");
                hasher.update(p.id().as_bytes());
            }
            Message::Ack(a) => {
                hasher.update(b"ack:");
                hasher.update(a.proposal().as_bytes());
                hasher.update(a.voter().as_bytes());
            }
            Message::Nak(n) => {
                hasher.update(b"nak:");
                hasher.update(n.proposal().as_bytes());
                hasher.update(n.voter().as_bytes());
            }
            Message::Settlement(s) => {
                hasher.update(b"settlement:");
                hasher.update(s.record().hash().as_bytes());
            }
            Message::FilterPublish(f) => {
                hasher.update(b"filter:");
                hasher.update(f.publisher().as_bytes());
                hasher.update(f.filter().epoch_number().to_le_bytes());
            }
            Message::RecoveryProof(p) => {
                hasher.update(b"proof:");
                hasher.update(p.hash().as_bytes());
                hasher.update(p.submitter().as_bytes());
            }
        }

        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        MessageId(bytes)
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        postcard::from_bytes(bytes).map_err(|_| ProtocolError::DeserializationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::trigger::TriggerReason;

    fn node(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    fn record() -> SettlementRecord {
        SettlementRecord::new(node(1), node(2), 10, 0, 0, 10, 0).unwrap()
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let proposal = CloseProposal::new(3, node(1), 10, 400, TriggerReason::MemoryPressure, 7);
        let msg = Message::CloseProposal(proposal);

        let restored = Message::from_bytes(&msg.to_bytes()).unwrap();
        assert_eq!(restored.message_type(), MessageType::CloseProposal);
        assert_eq!(restored.id(), msg.id());
    }

    #[test]
    fn test_settlement_announcement_hop_budget() {
        let mut ann = SettlementAnnouncement::new(record(), 2);
        assert!(!ann.should_stop_propagation());
        ann.increment_hop();
        ann.increment_hop();
        assert!(ann.should_stop_propagation());
    }

    #[test]
    fn test_recovery_proof_rejects_mismatched_hash() {
        let r = record();
        let wrong = SettlementHash::from_bytes([9u8; 32]);
        assert!(matches!(
            RecoveryProof::new(wrong, r, node(3)),
            Err(ProtocolError::ProofMismatch)
        ));
    }

    #[test]
    fn test_distinct_voters_distinct_ack_ids() {
        let proposal = CloseProposal::new(3, node(1), 10, 400, TriggerReason::SmallPartition, 7);
        let a1 = Message::Ack(Ack::new(proposal.id(), 3, node(2)));
        let a2 = Message::Ack(Ack::new(proposal.id(), 3, node(3)));
        assert_ne!(a1.id(), a2.id());
    }
}
