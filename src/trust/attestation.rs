// Continuity attestations - time-limited proof of recently vouched connectivity

use crate::settlement::record::NodeId;
use serde::{Deserialize, Serialize};

/// Epochs an attestation stays valid without re-attested connectivity.
/// Longer tolerates legitimate isolation; shorter shortens an attacker's
/// usable cycle.
pub const ATTESTATION_EXPIRY_EPOCHS: u64 = 10;

/// A credential from a trusted peer vouching that the subject was
/// reachable recently. Issued by the external trust-graph service; this
/// crate only verifies freshness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityAttestation {
    subject: NodeId,
    issuer: NodeId,
    issued_epoch: u64,
}

impl ContinuityAttestation {
    /// Create an attestation
    pub fn new(subject: NodeId, issuer: NodeId, issued_epoch: u64) -> Self {
        Self {
            subject,
            issuer,
            issued_epoch,
        }
    }

    /// The node being vouched for
    pub fn subject(&self) -> &NodeId {
        &self.subject
    }

    /// The vouching peer
    pub fn issuer(&self) -> &NodeId {
        &self.issuer
    }

    /// Epoch of issuance
    pub fn issued_epoch(&self) -> u64 {
        self.issued_epoch
    }

    /// Valid from issuance through the expiry window
    pub fn is_valid_at(&self, epoch: u64) -> bool {
        epoch >= self.issued_epoch
            && epoch - self.issued_epoch < ATTESTATION_EXPIRY_EPOCHS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    #[test]
    fn test_valid_within_window() {
        let att = ContinuityAttestation::new(node(1), node(2), 100);
        assert!(att.is_valid_at(100));
        assert!(att.is_valid_at(109));
    }

    #[test]
    fn test_expires_after_window() {
        let att = ContinuityAttestation::new(node(1), node(2), 100);
        assert!(!att.is_valid_at(110));
        assert!(!att.is_valid_at(500));
    }

    #[test]
    fn test_not_valid_before_issuance() {
        let att = ContinuityAttestation::new(node(1), node(2), 100);
        assert!(!att.is_valid_at(99));
    }
}
