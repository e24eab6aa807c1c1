//! Partition-tolerant settlement ledger for mesh-network currencies.
//!
//! Nodes in frequently-disconnected regions keep recording value transfers
//! and minting supply while isolated, then reconcile on reconnection
//! without double-counting or losing settlements. The pieces:
//!
//! - [`settlement`]: immutable records, the append-only log, and the
//!   activity-derived active set
//! - [`epoch`]: epoch lifecycle and the ordered close triggers
//! - [`consensus`]: the propose/ack/nak close protocol with a 67% quorum
//!   over the proposer's local view
//! - [`ledger`]: CRDT balances (frozen base + per-node deltas) and the
//!   divergent-base merge with settlement-proof recovery
//! - [`bloom`]: per-epoch settlement filters and the verification window
//! - [`mint`]: halving emission, active-set scaling, and the income cap
//! - [`trust`]: the trust-graph seam and the merge-time audit
//! - [`gossip`] / [`node`] / [`storage`]: wire messages, the round-driven
//!   orchestrator, and sled-backed crash recovery

pub mod bloom;
pub mod consensus;
pub mod epoch;
pub mod gossip;
pub mod ledger;
pub mod logging;
pub mod mint;
pub mod node;
pub mod settlement;
pub mod storage;
pub mod trust;

pub use bloom::{FilterWindow, RecoveryDecision, SettlementFilter};
pub use consensus::{quorum, CloseProposal, ConsensusEngine, ConsensusEvent};
pub use epoch::{EpochState, EpochStatus, TriggerConfig, TriggerReason};
pub use gossip::{Message, RecoveryProof};
pub use ledger::{AccountBalance, BalanceLedger, GCounter, GSet, MergeCase};
pub use mint::MintingRecord;
pub use node::{LedgerNode, LedgerSnapshot, NodeConfig, PartitionState};
pub use settlement::{ActiveSet, NodeId, SettlementHash, SettlementLog, SettlementRecord};
pub use storage::LedgerStore;
pub use trust::{ContinuityAttestation, MockTrustProvider, TrustProvider};
