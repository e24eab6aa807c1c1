// Trust Provider - the seam to the external trust-graph service

use crate::settlement::record::NodeId;
use crate::trust::attestation::ContinuityAttestation;
use std::collections::{HashMap, HashSet};

/// Lookups the merge audit needs from the trust graph.
///
/// Implementations live outside this crate; the audit only asks two
/// questions and never mutates trust state.
pub trait TrustProvider: Send + Sync {
    /// Does `node` hold at least one verifiable trust edge from a node
    /// outside `partition`?
    fn has_external_edge(&self, node: &NodeId, partition: &HashSet<NodeId>) -> bool;

    /// The freshest continuity attestation known for `node`, if any
    fn attestation(&self, node: &NodeId) -> Option<ContinuityAttestation>;
}

/// In-memory implementation of TrustProvider for testing
#[derive(Default)]
pub struct MockTrustProvider {
    externally_trusted: HashSet<NodeId>,
    attestations: HashMap<NodeId, ContinuityAttestation>,
}

impl MockTrustProvider {
    /// Create an empty provider (nobody is trusted)
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node as holding an external trust edge
    pub fn with_trusted(mut self, node: NodeId) -> Self {
        self.externally_trusted.insert(node);
        self
    }

    /// Register an attestation for its subject
    pub fn with_attestation(mut self, attestation: ContinuityAttestation) -> Self {
        self.attestations
            .insert(attestation.subject().clone(), attestation);
        self
    }
}

impl TrustProvider for MockTrustProvider {
    fn has_external_edge(&self, node: &NodeId, _partition: &HashSet<NodeId>) -> bool {
        self.externally_trusted.contains(node)
    }

    fn attestation(&self, node: &NodeId) -> Option<ContinuityAttestation> {
        self.attestations.get(node).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    #[test]
    fn test_mock_provider_lookups() {
        let provider = MockTrustProvider::new()
            .with_trusted(node(1))
            .with_attestation(ContinuityAttestation::new(node(2), node(1), 5));

        let partition = HashSet::new();
        assert!(provider.has_external_edge(&node(1), &partition));
        assert!(!provider.has_external_edge(&node(2), &partition));
        assert!(provider.attestation(&node(2)).is_some());
        assert!(provider.attestation(&node(1)).is_none());
    }
}
