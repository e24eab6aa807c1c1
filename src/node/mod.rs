// Node module - orchestration and the round-driven runtime

pub mod ledger_node;
pub mod runtime;

pub use ledger_node::{
    GossipConfig, LedgerNode, LedgerSnapshot, MergeSummary, NodeConfig, NodeError, NodeStats,
    PartitionState,
};
pub use runtime::{ChannelTransport, NodeRuntime, RoundTransport, RuntimeConfig, RuntimeError};
