// Node Runtime - fixed-interval round loop over an opaque transport
//
// The ledger core is synchronous and advances only at round boundaries;
// this runtime supplies the boundaries. Every tick it drains whatever the
// transport delivered since the last round, processes the round, and hands
// the outbound batch back to the transport. The transport itself lives
// outside this crate and promises nothing beyond eventual flooding.

use crate::gossip::protocol::Message;
use crate::node::ledger_node::{LedgerNode, NodeError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Runtime errors
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Inbound channel closed")]
    InboundClosed,
}

/// Outbound seam to the gossip transport
#[async_trait]
pub trait RoundTransport: Send + Sync {
    /// Flood a round's outbound messages to reachable peers
    async fn broadcast(&self, messages: Vec<Message>) -> Result<(), String>;
}

/// Transport that forwards into an in-process channel (tests, loopback)
pub struct ChannelTransport {
    tx: mpsc::Sender<Message>,
}

impl ChannelTransport {
    /// Wrap a channel sender
    pub fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RoundTransport for ChannelTransport {
    async fn broadcast(&self, messages: Vec<Message>) -> Result<(), String> {
        for message in messages {
            self.tx.send(message).await.map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// Runtime configuration
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Gossip round interval
    pub round_interval: Duration,
    /// Inbound messages drained per round at most
    pub max_inbound_per_round: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            round_interval: Duration::from_secs(60),
            max_inbound_per_round: 4_096,
        }
    }
}

/// Drives a LedgerNode over a transport at a fixed tick
pub struct NodeRuntime {
    node: LedgerNode,
    inbound: mpsc::Receiver<Message>,
    transport: Box<dyn RoundTransport>,
    config: RuntimeConfig,
}

impl NodeRuntime {
    /// Create a runtime around a node
    pub fn new(
        node: LedgerNode,
        inbound: mpsc::Receiver<Message>,
        transport: Box<dyn RoundTransport>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            node,
            inbound,
            transport,
            config,
        }
    }

    /// The node being driven
    pub fn node(&self) -> &LedgerNode {
        &self.node
    }

    /// Mutable access for intake outside the round loop
    pub fn node_mut(&mut self) -> &mut LedgerNode {
        &mut self.node
    }

    /// Take the node back out of the runtime
    pub fn into_node(self) -> LedgerNode {
        self.node
    }

    /// Drain what the transport delivered since the last tick
    fn drain_inbound(&mut self) -> Vec<Message> {
        let mut batch = Vec::new();
        while batch.len() < self.config.max_inbound_per_round {
            match self.inbound.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        batch
    }

    /// Run one round now (tests and manual stepping)
    pub async fn step(&mut self) -> Result<(), RuntimeError> {
        let inbound = self.drain_inbound();
        let outbound = self.node.process_round(inbound)?;
        if !outbound.is_empty() {
            debug!(count = outbound.len(), "broadcasting round output");
            if let Err(err) = self.transport.broadcast(outbound).await {
                warn!(%err, "transport broadcast failed, retrying next round");
            }
        }
        Ok(())
    }

    /// Run rounds forever at the configured interval. Returns only on a
    /// fatal node error (resource exhaustion is the one that matters).
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        let mut tick = tokio::time::interval(self.config.round_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            self.step().await?;
        }
    }
}
