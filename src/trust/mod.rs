// Trust module - the trust-graph seam, attestations, and the merge audit

pub mod attestation;
pub mod audit;
pub mod provider;

pub use attestation::{ContinuityAttestation, ATTESTATION_EXPIRY_EPOCHS};
pub use audit::{
    apply_outcomes, audit_partition, AuditConfig, AuditOutcome, PartitionTrustScore,
};
pub use provider::{MockTrustProvider, TrustProvider};
