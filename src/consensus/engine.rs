// Consensus Engine - the epoch-close propose/ack/nak state machine
//
// One instance per node, advanced only at gossip round boundaries. Many
// nodes may propose concurrently; there is no leader and no fork choice.
// The first proposal to collect a quorum of distinct acks wins, and a
// losing proposal simply expires after NAK_WAIT_ROUNDS without progress.

use crate::consensus::proposal::{Ack, CloseProposal, Nak, NakReason, ProposalId};
use crate::consensus::quorum::{meets_quorum, quorum, NAK_WAIT_ROUNDS};
use crate::settlement::record::NodeId;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

/// Consensus errors
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Unknown proposal: {0}")]
    UnknownProposal(ProposalId),
}

/// Configuration for the consensus engine
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Rounds a proposal may stall before abandonment
    pub nak_wait_rounds: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            nak_wait_rounds: NAK_WAIT_ROUNDS,
        }
    }
}

/// Statistics about consensus activity
#[derive(Clone, Debug, Default)]
pub struct ConsensusStats {
    pub proposals_raised: u64,
    pub proposals_adopted: u64,
    pub proposals_expired: u64,
    pub acks_recorded: u64,
    pub naks_recorded: u64,
    pub quorums_reached: u64,
}

/// Events surfaced to the node after processing consensus input
#[derive(Clone, Debug)]
pub enum ConsensusEvent {
    /// A proposal reached its quorum; the epoch may close
    QuorumReached { proposal: CloseProposal },
    /// A proposal stalled out; if it was ours, re-propose with a
    /// refreshed active-set view
    ProposalExpired { proposal: ProposalId, ours: bool },
}

/// A proposal this engine is tracking, with its vote tallies
#[derive(Clone, Debug)]
struct TrackedProposal {
    proposal: CloseProposal,
    acks: HashSet<NodeId>,
    naks: HashSet<NodeId>,
    ours: bool,
}

/// The epoch-close consensus state machine
pub struct ConsensusEngine {
    node_id: NodeId,
    config: ConsensusConfig,
    proposals: HashMap<ProposalId, TrackedProposal>,
    stats: ConsensusStats,
}

impl ConsensusEngine {
    /// Create an engine for this node
    pub fn new(node_id: NodeId, config: ConsensusConfig) -> Self {
        Self {
            node_id,
            config,
            proposals: HashMap::new(),
            stats: ConsensusStats::default(),
        }
    }

    /// Statistics
    pub fn stats(&self) -> &ConsensusStats {
        &self.stats
    }

    /// Number of proposals currently in flight
    pub fn pending_proposals(&self) -> usize {
        self.proposals.len()
    }

    /// The proposal we raised ourselves, if one is in flight
    pub fn own_proposal(&self) -> Option<&CloseProposal> {
        self.proposals
            .values()
            .find(|t| t.ours)
            .map(|t| &t.proposal)
    }

    /// Raise our own close proposal. The proposer implicitly acks itself,
    /// which is what lets a narrowed single-node partition close alone.
    pub fn propose(&mut self, proposal: CloseProposal) -> CloseProposal {
        let id = proposal.id();
        let mut acks = HashSet::new();
        acks.insert(self.node_id.clone());

        info!(
            proposal = %id,
            epoch = proposal.epoch_number(),
            active_set = proposal.active_set_size(),
            reason = proposal.reason().as_str(),
            "raising epoch-close proposal"
        );

        self.proposals.insert(
            id,
            TrackedProposal {
                proposal: proposal.clone(),
                acks,
                naks: HashSet::new(),
                ours: true,
            },
        );
        self.stats.proposals_raised += 1;
        proposal
    }

    /// Handle a peer's proposal against our local epoch view.
    /// Returns our vote (an ack, or a nak naming the disagreement) plus a
    /// quorum event if our own ack was the one that completed it.
    pub fn handle_proposal(
        &mut self,
        proposal: CloseProposal,
        local_epoch: u64,
        local_settlement_count: usize,
    ) -> Result<(Result<Ack, Nak>, Option<ConsensusEvent>), ConsensusError> {
        let id = proposal.id();

        if !self.proposals.contains_key(&id) {
            self.proposals.insert(
                id.clone(),
                TrackedProposal {
                    proposal: proposal.clone(),
                    acks: HashSet::new(),
                    naks: HashSet::new(),
                    ours: false,
                },
            );
            self.stats.proposals_adopted += 1;
        }

        // Causal ordering: never ack a close that would drop settlements
        // we have already observed.
        if proposal.epoch_number() < local_epoch {
            let nak = Nak::new(
                id,
                proposal.epoch_number(),
                self.node_id.clone(),
                NakReason::StaleEpoch,
            );
            self.record_nak(&nak);
            return Ok((Err(nak), None));
        }
        if proposal.settlement_count() < local_settlement_count {
            let nak = Nak::new(
                id,
                proposal.epoch_number(),
                self.node_id.clone(),
                NakReason::MissingSettlements,
            );
            self.record_nak(&nak);
            return Ok((Err(nak), None));
        }

        let ack = Ack::new(id, proposal.epoch_number(), self.node_id.clone());
        let event = self.record_ack(&ack)?;
        Ok((Ok(ack), event))
    }

    /// Record an acknowledgement. Returns a quorum event when the
    /// proposal's own local active-set view is satisfied.
    pub fn record_ack(&mut self, ack: &Ack) -> Result<Option<ConsensusEvent>, ConsensusError> {
        let tracked = self
            .proposals
            .get_mut(ack.proposal())
            .ok_or_else(|| ConsensusError::UnknownProposal(ack.proposal().clone()))?;

        if tracked.acks.insert(ack.voter().clone()) {
            self.stats.acks_recorded += 1;
        }

        let needed = quorum(tracked.proposal.active_set_size());
        debug!(
            proposal = %ack.proposal(),
            acks = tracked.acks.len(),
            needed,
            "ack recorded"
        );

        if meets_quorum(tracked.acks.len(), tracked.proposal.active_set_size()) {
            let proposal = tracked.proposal.clone();
            self.stats.quorums_reached += 1;
            info!(
                proposal = %ack.proposal(),
                epoch = proposal.epoch_number(),
                acks = tracked.acks.len(),
                "quorum reached, epoch may close"
            );
            self.proposals.clear();
            return Ok(Some(ConsensusEvent::QuorumReached { proposal }));
        }
        Ok(None)
    }

    /// Record a refusal
    pub fn record_nak(&mut self, nak: &Nak) {
        if let Some(tracked) = self.proposals.get_mut(nak.proposal()) {
            if tracked.naks.insert(nak.voter().clone()) {
                self.stats.naks_recorded += 1;
            }
        }
    }

    /// Advance to a round boundary: expire proposals that stalled past
    /// the wait window. Losing proposals die here, not by cancellation.
    pub fn tick(&mut self, round: u64) -> Vec<ConsensusEvent> {
        let wait = self.config.nak_wait_rounds;
        let mut events = Vec::new();

        let expired: Vec<ProposalId> = self
            .proposals
            .iter()
            .filter(|(_, t)| round.saturating_sub(t.proposal.proposed_round()) > wait)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(tracked) = self.proposals.remove(&id) {
                debug!(proposal = %id, ours = tracked.ours, "proposal expired without quorum");
                self.stats.proposals_expired += 1;
                events.push(ConsensusEvent::ProposalExpired {
                    proposal: id,
                    ours: tracked.ours,
                });
            }
        }

        events
    }

    /// Forget all in-flight proposals (used when the epoch closes)
    pub fn reset(&mut self) {
        self.proposals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::trigger::TriggerReason;

    fn node(b: u8) -> NodeId {
        NodeId::from_bytes([b; 32])
    }

    fn proposal(proposer: u8, active: usize, round: u64) -> CloseProposal {
        CloseProposal::new(
            1,
            node(proposer),
            active,
            500,
            TriggerReason::SettlementCount,
            round,
        )
    }

    #[test]
    fn test_self_ack_on_propose() {
        let mut engine = ConsensusEngine::new(node(1), ConsensusConfig::default());
        let p = engine.propose(proposal(1, 3, 0));

        // Two more distinct acks reach quorum(3) == 3
        let e1 = engine
            .record_ack(&Ack::new(p.id(), 1, node(2)))
            .unwrap();
        assert!(e1.is_none());
        let e2 = engine
            .record_ack(&Ack::new(p.id(), 1, node(3)))
            .unwrap();
        assert!(matches!(e2, Some(ConsensusEvent::QuorumReached { .. })));
    }

    #[test]
    fn test_duplicate_acks_do_not_count_twice() {
        let mut engine = ConsensusEngine::new(node(1), ConsensusConfig::default());
        let p = engine.propose(proposal(1, 3, 0));

        for _ in 0..5 {
            let event = engine.record_ack(&Ack::new(p.id(), 1, node(2))).unwrap();
            assert!(event.is_none());
        }
    }

    #[test]
    fn test_proposal_expires_after_wait() {
        let mut engine = ConsensusEngine::new(node(1), ConsensusConfig::default());
        engine.propose(proposal(1, 100, 10));

        assert!(engine.tick(13).is_empty()); // within NAK_WAIT_ROUNDS
        let events = engine.tick(14);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ConsensusEvent::ProposalExpired { ours: true, .. }
        ));
        assert_eq!(engine.pending_proposals(), 0);
    }

    #[test]
    fn test_nak_on_missing_settlements() {
        let mut engine = ConsensusEngine::new(node(2), ConsensusConfig::default());
        let p = proposal(1, 10, 0);

        // Our view has more settlements than the proposal covers
        let (vote, event) = engine.handle_proposal(p, 1, 600).unwrap();
        assert!(matches!(
            vote,
            Err(ref nak) if nak.reason() == NakReason::MissingSettlements
        ));
        assert!(event.is_none());
    }

    #[test]
    fn test_ack_when_proposal_covers_our_view() {
        let mut engine = ConsensusEngine::new(node(2), ConsensusConfig::default());
        let (vote, _) = engine.handle_proposal(proposal(1, 10, 0), 1, 400).unwrap();
        assert!(vote.is_ok());
    }

    #[test]
    fn test_own_ack_can_complete_quorum() {
        // Proposer self-acked; in a two-node set our ack is the second of
        // quorum(2) == 2
        let mut proposer = ConsensusEngine::new(node(1), ConsensusConfig::default());
        let p = proposer.propose(proposal(1, 2, 0));

        let mut voter = ConsensusEngine::new(node(2), ConsensusConfig::default());
        let (_, first) = voter.handle_proposal(p.clone(), 1, 0).unwrap();
        assert!(first.is_none()); // voter only has its own ack so far

        let event = proposer
            .record_ack(&Ack::new(p.id(), 1, node(2)))
            .unwrap();
        assert!(matches!(event, Some(ConsensusEvent::QuorumReached { .. })));
    }
}
