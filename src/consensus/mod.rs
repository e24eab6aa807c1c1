// Consensus module - quorum math and the epoch-close state machine

pub mod engine;
pub mod proposal;
pub mod quorum;

pub use engine::{ConsensusConfig, ConsensusEngine, ConsensusError, ConsensusEvent, ConsensusStats};
pub use proposal::{Ack, CloseProposal, Nak, NakReason, ProposalId};
pub use quorum::{meets_quorum, quorum, ACK_THRESHOLD_PERCENT, NAK_WAIT_ROUNDS};
