// Settlement records - immutable value transfers consumed from payment channels

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Unique identifier for a node in the mesh
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId([u8; 32]);

impl NodeId {
    /// Generate a random node ID
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Content hash of a settlement record (SHA256 over all fields)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettlementHash([u8; 32]);

impl SettlementHash {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for SettlementHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Errors from settlement record validation
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record hash does not match its contents")]
    HashMismatch,

    #[error("Settlement parties must be distinct")]
    SelfSettlement,
}

/// The net result of a closed payment channel between two parties.
///
/// Records are produced and signed by the payment-channel subsystem; this
/// crate consumes them as immutable facts. A record never changes after
/// creation and is identified by the hash of its contents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementRecord {
    hash: SettlementHash,
    party_a: NodeId,
    party_b: NodeId,
    earned_a: u64,
    spent_a: u64,
    earned_b: u64,
    spent_b: u64,
    epoch_created: u64,
}

impl SettlementRecord {
    /// Create a new settlement record, computing its content hash
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        party_a: NodeId,
        party_b: NodeId,
        earned_a: u64,
        spent_a: u64,
        earned_b: u64,
        spent_b: u64,
        epoch_created: u64,
    ) -> Result<Self, RecordError> {
        if party_a == party_b {
            return Err(RecordError::SelfSettlement);
        }

        let mut record = Self {
            hash: SettlementHash([0u8; 32]),
            party_a,
            party_b,
            earned_a,
            spent_a,
            earned_b,
            spent_b,
            epoch_created,
        };
        record.hash = record.compute_hash();
        Ok(record)
    }

    /// Compute the content hash (SHA256 over a deterministic field encoding)
    fn compute_hash(&self) -> SettlementHash {
        let mut hasher = Sha256::new();
        hasher.update(b"settlement:");
        hasher.update(self.party_a.as_bytes());
        hasher.update(self.party_b.as_bytes());
        hasher.update(self.earned_a.to_le_bytes());
        hasher.update(self.spent_a.to_le_bytes());
        hasher.update(self.earned_b.to_le_bytes());
        hasher.update(self.spent_b.to_le_bytes());
        hasher.update(self.epoch_created.to_le_bytes());
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        SettlementHash(bytes)
    }

    /// Verify the stored hash against the record contents
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Get the content hash
    pub fn hash(&self) -> &SettlementHash {
        &self.hash
    }

    /// Get party A
    pub fn party_a(&self) -> &NodeId {
        &self.party_a
    }

    /// Get party B
    pub fn party_b(&self) -> &NodeId {
        &self.party_b
    }

    /// Amount earned by party A
    pub fn earned_a(&self) -> u64 {
        self.earned_a
    }

    /// Amount spent by party A
    pub fn spent_a(&self) -> u64 {
        self.spent_a
    }

    /// Amount earned by party B
    pub fn earned_b(&self) -> u64 {
        self.earned_b
    }

    /// Amount spent by party B
    pub fn spent_b(&self) -> u64 {
        self.spent_b
    }

    /// Epoch the channel subsystem created this record in
    pub fn epoch_created(&self) -> u64 {
        self.epoch_created
    }

    /// Check whether a node is one of the two parties
    pub fn involves(&self, node: &NodeId) -> bool {
        &self.party_a == node || &self.party_b == node
    }

    /// Total value settled (service income signal for emission capping)
    pub fn settled_volume(&self) -> u64 {
        self.earned_a.saturating_add(self.earned_b)
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }
}

impl PartialEq for SettlementRecord {
    fn eq(&self, other: &Self) -> bool {
        // Two records are equal if they have the same content hash
        self.hash == other.hash
    }
}

impl Eq for SettlementRecord {}

impl Hash for SettlementRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.as_bytes().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hash_is_deterministic() {
        let a = NodeId::from_bytes([1u8; 32]);
        let b = NodeId::from_bytes([2u8; 32]);

        let r1 = SettlementRecord::new(a.clone(), b.clone(), 100, 0, 0, 100, 5).unwrap();
        let r2 = SettlementRecord::new(a, b, 100, 0, 0, 100, 5).unwrap();

        assert_eq!(r1.hash(), r2.hash());
        assert!(r1.verify_hash());
    }

    #[test]
    fn test_record_hash_changes_with_contents() {
        let a = NodeId::from_bytes([1u8; 32]);
        let b = NodeId::from_bytes([2u8; 32]);

        let r1 = SettlementRecord::new(a.clone(), b.clone(), 100, 0, 0, 100, 5).unwrap();
        let r2 = SettlementRecord::new(a, b, 101, 0, 0, 100, 5).unwrap();

        assert_ne!(r1.hash(), r2.hash());
    }

    #[test]
    fn test_self_settlement_rejected() {
        let a = NodeId::from_bytes([1u8; 32]);
        let result = SettlementRecord::new(a.clone(), a, 10, 0, 0, 10, 0);
        assert!(matches!(result, Err(RecordError::SelfSettlement)));
    }

    #[test]
    fn test_settled_volume() {
        let a = NodeId::from_bytes([1u8; 32]);
        let b = NodeId::from_bytes([2u8; 32]);
        let r = SettlementRecord::new(a, b, 70, 10, 30, 5, 0).unwrap();
        assert_eq!(r.settled_volume(), 100);
    }
}
