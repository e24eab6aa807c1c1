// Ledger Node - orchestrates the settlement ledger on a single mesh node
//
// Owns every subsystem and advances them only at gossip round boundaries:
// settlement intake feeds the log and the balance deltas, the triggers
// watch the open epoch, the consensus engine drives the close, the close
// pipeline rebases and mints, and partition reconciliation runs the CRDT
// merge followed by the trust audit. All state is append-only or merged
// via commutative operations; no locks anywhere.

use crate::bloom::filter::SettlementFilter;
use crate::bloom::window::{FilterWindow, RecoveryDecision};
use crate::consensus::engine::{
    ConsensusConfig, ConsensusEngine, ConsensusError, ConsensusEvent,
};
use crate::consensus::proposal::CloseProposal;
use crate::epoch::state::{EpochError, EpochState, EpochStatus};
use crate::epoch::trigger::{self, TriggerConfig, TriggerError, TriggerReason};
use crate::gossip::protocol::{
    FilterAnnouncement, Message, ProtocolError, RecoveryProof, SettlementAnnouncement,
};
use crate::gossip::round::{RoundConfig, SeenCache};
use crate::ledger::balance::BalanceLedger;
use crate::ledger::merge::{merge_ledgers, MergeReport, MergeSide};
use crate::mint::emission;
use crate::mint::record::MintingRecord;
use crate::settlement::active_set::ActiveSet;
use crate::settlement::log::{LogError, SettlementLog};
use crate::settlement::record::{NodeId, SettlementRecord};
use crate::trust::audit::{self, AuditConfig, AuditOutcome};
use crate::trust::provider::TrustProvider;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from node operations
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Trigger evaluation failed: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Epoch state error: {0}")]
    Epoch(#[from] EpochError),

    #[error("Settlement log error: {0}")]
    Log(#[from] LogError),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Node configuration, all defaults drawn from the protocol constants
#[derive(Clone, Debug, Default)]
pub struct NodeConfig {
    pub trigger: TriggerConfig,
    pub consensus: ConsensusConfig,
    pub round: RoundConfig,
    pub audit: AuditConfig,
    pub gossip: GossipConfig,
}

/// Gossip propagation settings
#[derive(Clone, Debug)]
pub struct GossipConfig {
    /// Maximum hops for settlement announcements
    pub max_hops: u8,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self { max_hops: 6 }
    }
}

/// Statistics about node activity
#[derive(Clone, Debug, Default)]
pub struct NodeStats {
    pub settlements_observed: u64,
    pub duplicates_dropped: u64,
    pub settlements_rejected: u64,
    pub epochs_closed: u64,
    pub merges_completed: u64,
    pub proofs_recovered: u64,
    pub proofs_skipped: u64,
    pub proofs_outside_window: u64,
    pub disputes_honored: u64,
    pub total_minted: u64,
    pub audit_removed: u64,
}

/// Read-only monitoring snapshot
#[derive(Clone, Debug)]
pub struct LedgerSnapshot {
    pub epoch_number: u64,
    pub status: EpochStatus,
    pub active_set_size: usize,
    pub settlement_count: usize,
    pub gset_bytes: usize,
    pub rounds_since_last_epoch: u64,
    pub account_count: usize,
    pub balance_total: u64,
    pub supply: u64,
    pub total_minted: u64,
    pub bloom_occupancy: f64,
    pub skipped_recoveries: usize,
    pub pending_proposals: usize,
}

/// Everything one partition hands to another at reconciliation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionState {
    pub log: SettlementLog,
    pub ledger: BalanceLedger,
    pub filters: FilterWindow,
    pub mint_records: Vec<MintingRecord>,
    pub members: HashSet<NodeId>,
    pub open_epoch: u64,
    pub supply: u64,
}

/// Outcome of a partition merge
#[derive(Debug)]
pub struct MergeSummary {
    pub report: MergeReport,
    pub audit_outcomes: Vec<AuditOutcome>,
    pub audit_removed: u64,
    pub epoch_number: u64,
}

/// A single mesh node's view of the settlement ledger
pub struct LedgerNode {
    node_id: NodeId,
    config: NodeConfig,
    log: SettlementLog,
    ledger: BalanceLedger,
    epoch: EpochState,
    consensus: ConsensusEngine,
    filters: FilterWindow,
    mint_log: Vec<MintingRecord>,
    seen: SeenCache,
    outbound: Vec<Message>,
    round: u64,
    supply: u64,
    pre_isolation_bases: HashMap<NodeId, u64>,
    stats: NodeStats,
}

impl LedgerNode {
    /// Create a fresh node at epoch 0
    pub fn new(node_id: NodeId, config: NodeConfig) -> Self {
        let consensus = ConsensusEngine::new(node_id.clone(), config.consensus.clone());
        Self {
            node_id,
            config,
            log: SettlementLog::new(),
            ledger: BalanceLedger::new(),
            epoch: EpochState::open(0, 0),
            consensus,
            filters: FilterWindow::new(),
            mint_log: Vec::new(),
            seen: SeenCache::new(),
            outbound: Vec::new(),
            round: 0,
            supply: 0,
            pre_isolation_bases: HashMap::new(),
            stats: NodeStats::default(),
        }
    }

    /// This node's id
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Current epoch number
    pub fn current_epoch(&self) -> u64 {
        self.epoch.epoch_number()
    }

    /// Current gossip round
    pub fn round(&self) -> u64 {
        self.round
    }

    /// The balance ledger
    pub fn ledger(&self) -> &BalanceLedger {
        &self.ledger
    }

    /// The settlement log
    pub fn log(&self) -> &SettlementLog {
        &self.log
    }

    /// Live balance of an account
    pub fn balance_of(&self, node: &NodeId) -> u64 {
        self.ledger.balance_of(node)
    }

    /// Node statistics
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Minting history on this timeline
    pub fn mint_log(&self) -> &[MintingRecord] {
        &self.mint_log
    }

    // ========================================================================
    // SETTLEMENT INTAKE
    // ========================================================================

    /// Ingest a settlement record from the payment-channel subsystem.
    /// Returns true if the record was new.
    pub fn observe_settlement(&mut self, record: SettlementRecord) -> Result<bool, NodeError> {
        let epoch = self.epoch.epoch_number();
        let fresh = self.log.insert(epoch, record.clone())?;

        if !fresh {
            self.stats.duplicates_dropped += 1;
            return Ok(false);
        }

        self.ledger.apply_settlement(&record);
        self.epoch
            .observe_settlements(self.log.epoch_count(epoch), self.log.epoch_bytes(epoch));
        self.stats.settlements_observed += 1;

        self.outbound.push(Message::Settlement(
            SettlementAnnouncement::new(record, self.config.gossip.max_hops),
        ));
        Ok(true)
    }

    // ========================================================================
    // ROUND PROCESSING
    // ========================================================================

    /// Advance one gossip round: ingest the round's inbound messages, move
    /// the trigger and consensus machinery, and emit this round's outbound
    /// messages. The only fatal error is resource exhaustion.
    pub fn process_round(&mut self, inbound: Vec<Message>) -> Result<Vec<Message>, NodeError> {
        self.round += 1;
        self.epoch.tick_round();

        let mut quorums: Vec<CloseProposal> = Vec::new();

        for message in inbound {
            if !self.seen.observe(message.id(), self.round) {
                continue;
            }
            if let Some(proposal) = self.handle_message(message)? {
                quorums.push(proposal);
            }
        }

        if let Some(proposal) = self.evaluate_close()? {
            quorums.push(proposal);
        }

        // Competing proposals can reach quorum in the same round. Every
        // member closes with the same winner: lowest proposal id.
        quorums.sort_by(|a, b| a.id().as_bytes().cmp(b.id().as_bytes()));
        if let Some(winner) = quorums.into_iter().next() {
            self.close_epoch(winner)?;
        }

        let expiries = self.consensus.tick(self.round);
        for event in expiries {
            if let ConsensusEvent::ProposalExpired { ours: true, .. } = event {
                if self.epoch.status() == EpochStatus::Proposed {
                    // Back to Open; the next round re-evaluates the triggers
                    // and re-proposes with a refreshed active-set view.
                    self.epoch.advance(EpochStatus::Open)?;
                }
            }
        }

        self.seen.prune(self.round, &self.config.round);
        Ok(std::mem::take(&mut self.outbound))
    }

    /// Handle one inbound message. Returns a proposal that reached quorum,
    /// if this message completed one.
    fn handle_message(&mut self, message: Message) -> Result<Option<CloseProposal>, NodeError> {
        match message {
            Message::Settlement(mut announcement) => {
                match self.observe_settlement(announcement.record().clone()) {
                    Ok(true) => {
                        if !announcement.should_stop_propagation() {
                            announcement.increment_hop();
                            self.outbound.push(Message::Settlement(announcement));
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(%err, "rejected announced settlement");
                        self.stats.settlements_rejected += 1;
                    }
                }
            }

            Message::CloseProposal(proposal) => {
                if proposal.epoch_number() != self.epoch.epoch_number() {
                    debug!(
                        proposal_epoch = proposal.epoch_number(),
                        local_epoch = self.epoch.epoch_number(),
                        "ignoring proposal for another epoch"
                    );
                    return Ok(None);
                }

                let (vote, event) = self.consensus.handle_proposal(
                    proposal,
                    self.epoch.epoch_number(),
                    self.epoch.settlement_count(),
                )?;

                match vote {
                    Ok(ack) => {
                        if self.epoch.status() == EpochStatus::Open {
                            self.epoch.advance(EpochStatus::Proposed)?;
                        }
                        self.outbound.push(Message::Ack(ack));
                    }
                    Err(nak) => self.outbound.push(Message::Nak(nak)),
                }

                if let Some(ConsensusEvent::QuorumReached { proposal }) = event {
                    return Ok(Some(proposal));
                }
            }

            Message::Ack(ack) => {
                match self.consensus.record_ack(&ack) {
                    Ok(Some(ConsensusEvent::QuorumReached { proposal })) => {
                        return Ok(Some(proposal));
                    }
                    Ok(_) => {}
                    // Acks for proposals we never saw or already expired
                    Err(ConsensusError::UnknownProposal(_)) => {}
                }
            }

            Message::Nak(nak) => {
                self.consensus.record_nak(&nak);
            }

            Message::FilterPublish(announcement) => {
                let epoch = self.epoch.epoch_number();
                self.filters.adopt(announcement.into_filter(), epoch);
            }

            Message::RecoveryProof(proof) => {
                self.handle_recovery_proof(proof)?;
            }
        }
        Ok(None)
    }

    /// Trigger evaluation, run every round while the epoch is open
    fn evaluate_close(&mut self) -> Result<Option<CloseProposal>, NodeError> {
        if self.epoch.status() != EpochStatus::Open {
            return Ok(None);
        }

        match trigger::evaluate(&self.config.trigger, &self.epoch)? {
            Some(reason) => self.initiate_close(reason),
            None => Ok(None),
        }
    }

    /// Raise our own close proposal with a freshly recomputed active set.
    /// Returns the proposal if our own ack already completed its quorum
    /// (the narrowed single-node partition case).
    fn initiate_close(&mut self, reason: TriggerReason) -> Result<Option<CloseProposal>, NodeError> {
        let epoch = self.epoch.epoch_number();
        let active_set = ActiveSet::project(&self.log, epoch);
        self.epoch.set_active_set_size(active_set.size());

        info!(
            epoch,
            reason = reason.as_str(),
            active_set = active_set.size(),
            "epoch close trigger fired"
        );

        let proposal = CloseProposal::new(
            epoch,
            self.node_id.clone(),
            active_set.size(),
            self.epoch.settlement_count(),
            reason,
            self.round,
        );
        let proposal = self.consensus.propose(proposal);
        self.epoch.advance(EpochStatus::Proposed)?;

        // Peers count our ack like any other, so it goes on the wire
        // alongside the proposal itself.
        let own_ack =
            crate::consensus::proposal::Ack::new(proposal.id(), epoch, self.node_id.clone());
        self.outbound.push(Message::CloseProposal(proposal));
        self.outbound.push(Message::Ack(own_ack.clone()));

        match self.consensus.record_ack(&own_ack)? {
            Some(ConsensusEvent::QuorumReached { proposal }) => Ok(Some(proposal)),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // EPOCH CLOSE PIPELINE
    // ========================================================================

    /// Run the close: publish the filter, rebase every account, mint, and
    /// open the successor epoch.
    fn close_epoch(&mut self, proposal: CloseProposal) -> Result<(), NodeError> {
        let closing = self.epoch.epoch_number();
        if proposal.epoch_number() != closing {
            return Ok(());
        }

        // A node that voted nak still follows the partition's quorum
        if self.epoch.status() == EpochStatus::Open {
            self.epoch.advance(EpochStatus::Proposed)?;
        }
        self.epoch.advance(EpochStatus::Acked)?;

        // Bloom filter over everything incorporated into the new bases
        let count = self.log.epoch_count(closing);
        let mut filter = SettlementFilter::for_capacity(closing, count.max(8));
        let mut gross_income = 0u64;
        for record in self.log.epoch_records(closing) {
            filter.insert(record.hash());
            gross_income = gross_income.saturating_add(record.settled_volume());
        }

        let rebased = self.ledger.rebase_all();

        // Emission is computed from the proposal's active-set view so every
        // partition member mints the identical amount.
        let reward = emission::emission_for_close(
            closing,
            self.supply,
            proposal.active_set_size(),
            gross_income,
        );
        if reward > 0 {
            self.ledger
                .account_mut(proposal.proposer())
                .credit_base(reward);
            self.supply = self.supply.saturating_add(reward);
            self.stats.total_minted = self.stats.total_minted.saturating_add(reward);
            self.mint_log.push(MintingRecord::new(
                closing,
                proposal.proposer().clone(),
                reward,
            ));
        }

        self.filters.publish(filter.clone(), closing);
        self.outbound.push(Message::FilterPublish(
            FilterAnnouncement::new(self.node_id.clone(), filter),
        ));

        self.epoch.advance(EpochStatus::Closed)?;
        self.consensus.reset();
        self.stats.epochs_closed += 1;

        info!(
            epoch = closing,
            settlements = count,
            rebased,
            reward,
            reason = proposal.reason().as_str(),
            "epoch closed"
        );

        self.open_epoch(closing + 1);
        Ok(())
    }

    /// Open a successor epoch with a recomputed active set
    fn open_epoch(&mut self, epoch_number: u64) {
        let active_set = ActiveSet::project(&self.log, epoch_number);
        self.epoch = EpochState::open(epoch_number, active_set.size());
        self.epoch.observe_settlements(
            self.log.epoch_count(epoch_number),
            self.log.epoch_bytes(epoch_number),
        );
        self.filters.prune(epoch_number);
    }

    // ========================================================================
    // RECOVERY PROOFS & DISPUTES
    // ========================================================================

    /// Intake for externally supplied settlement-recovery proofs
    pub fn submit_recovery_proof(&mut self, proof: RecoveryProof) -> Result<(), NodeError> {
        self.handle_recovery_proof(proof)
    }

    fn handle_recovery_proof(&mut self, proof: RecoveryProof) -> Result<(), NodeError> {
        if self.log.contains(proof.hash()) {
            self.stats.duplicates_dropped += 1;
            return Ok(());
        }

        let epoch = self.epoch.epoch_number();
        match self.filters.decide(proof.hash()) {
            RecoveryDecision::Apply => {
                let record = proof.record().clone();
                self.log.insert(epoch, record.clone())?;
                self.ledger.apply_settlement(&record);
                self.epoch
                    .observe_settlements(self.log.epoch_count(epoch), self.log.epoch_bytes(epoch));
                self.stats.proofs_recovered += 1;
            }
            RecoveryDecision::AlreadyCounted { epoch: matched } => {
                self.filters
                    .record_skip(proof.hash().clone(), matched, epoch, None);
                self.stats.proofs_skipped += 1;
            }
            RecoveryDecision::OutsideWindow => {
                warn!(hash = %proof.hash(), "recovery proof outside the verification window");
                self.stats.proofs_outside_window += 1;
            }
        }
        Ok(())
    }

    /// Counterparty dispute of a skipped recovery. Inside the window the
    /// dispute overrides the filter positive and re-applies what was
    /// dropped: one account's share for a merge-time skip, the whole
    /// record when the record itself was withheld.
    pub fn dispute_settlement(&mut self, record: SettlementRecord) -> Result<bool, NodeError> {
        let epoch = self.epoch.epoch_number();
        let entry = match self.filters.dispute(record.hash(), epoch) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        match entry.account {
            Some(account) => {
                self.ledger.apply_recovered_share(&record, &account);
            }
            None => {
                self.log.insert(epoch, record.clone())?;
                self.ledger.apply_settlement(&record);
            }
        }
        self.stats.disputes_honored += 1;
        Ok(true)
    }

    // ========================================================================
    // PARTITION RECONCILIATION
    // ========================================================================

    /// Export the state another partition needs to reconcile with us
    pub fn partition_state(&self) -> PartitionState {
        let members =
            ActiveSet::project(&self.log, self.epoch.epoch_number()).into_members();
        PartitionState {
            log: self.log.clone(),
            ledger: self.ledger.clone(),
            filters: self.filters.clone(),
            mint_records: self.mint_log.clone(),
            members,
            open_epoch: self.epoch.epoch_number(),
            supply: self.supply,
        }
    }

    /// Reconcile with a partition: merge logs and balances, recover the
    /// losing side's activity through the bloom gate, then run the trust
    /// audit over the minting the other timeline brings in. Never aborts.
    pub fn merge_partition(
        &mut self,
        remote: &PartitionState,
        provider: &dyn TrustProvider,
    ) -> Result<MergeSummary, NodeError> {
        let local_epoch = self.epoch.epoch_number();

        let local_post_rebase: Vec<SettlementRecord> =
            self.log.epoch_records(local_epoch).cloned().collect();
        let remote_post_rebase: Vec<SettlementRecord> =
            remote.log.epoch_records(remote.open_epoch).cloned().collect();

        let (merged_ledger, report) = merge_ledgers(
            &MergeSide {
                ledger: &self.ledger,
                post_rebase: &local_post_rebase,
                filters: &self.filters,
            },
            &MergeSide {
                ledger: &remote.ledger,
                post_rebase: &remote_post_rebase,
                filters: &remote.filters,
            },
        );
        self.ledger = merged_ledger;

        for (hash, matched, account) in &report.skipped_already_counted {
            self.filters
                .record_skip(hash.clone(), *matched, local_epoch, Some(account.clone()));
            self.stats.proofs_skipped += 1;
        }

        self.log.merge(&remote.log);
        for filter in remote.filters.retained_filters() {
            self.filters.adopt(filter.clone(), local_epoch);
        }

        // Audit only the minting the remote timeline adds
        let known: HashSet<(u64, NodeId)> =
            self.mint_log.iter().map(|r| r.dedup_key()).collect();
        let new_records: Vec<MintingRecord> = remote
            .mint_records
            .iter()
            .filter(|r| !known.contains(&r.dedup_key()))
            .cloned()
            .collect();

        let outcomes = audit::audit_partition(
            provider,
            &self.config.audit,
            &remote.members,
            &new_records,
            local_epoch,
        );
        let removed =
            audit::apply_outcomes(&mut self.ledger, &outcomes, &self.pre_isolation_bases);
        let rejected_total: u64 = outcomes.iter().map(|o| o.rejected).sum();

        self.mint_log
            .extend(outcomes.iter().map(|o| o.record.clone()));
        self.supply = self
            .supply
            .max(remote.supply)
            .saturating_sub(rejected_total);
        self.stats.audit_removed = self.stats.audit_removed.saturating_add(removed);
        self.stats.merges_completed += 1;

        // The merged timeline continues from the furthest epoch either
        // side reached; this merge is the new reconciliation point.
        let next_epoch = local_epoch.max(remote.open_epoch);
        self.open_epoch(next_epoch);
        self.consensus.reset();
        self.pre_isolation_bases = self.ledger.base_snapshot();

        info!(
            accounts = report.accounts_merged,
            divergent = report.divergent_base,
            recovered = report.recovered_shares,
            audit_removed = removed,
            epoch = next_epoch,
            "partition reconciled"
        );

        Ok(MergeSummary {
            report,
            audit_outcomes: outcomes,
            audit_removed: removed,
            epoch_number: next_epoch,
        })
    }

    // ========================================================================
    // MONITORING
    // ========================================================================

    /// Read-only snapshot for monitoring
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            epoch_number: self.epoch.epoch_number(),
            status: self.epoch.status(),
            active_set_size: self.epoch.active_set_size(),
            settlement_count: self.epoch.settlement_count(),
            gset_bytes: self.epoch.gset_bytes(),
            rounds_since_last_epoch: self.epoch.rounds_since_last_epoch(),
            account_count: self.ledger.account_count(),
            balance_total: self.ledger.total_balance(),
            supply: self.supply,
            total_minted: self.stats.total_minted,
            bloom_occupancy: self.filters.latest_occupancy(),
            skipped_recoveries: self.filters.skipped().len(),
            pending_proposals: self.consensus.pending_proposals(),
        }
    }

    /// The epoch state (for persistence and tests)
    pub fn epoch_state(&self) -> &EpochState {
        &self.epoch
    }

    /// The filter window (for persistence and tests)
    pub fn filter_window(&self) -> &FilterWindow {
        &self.filters
    }

    /// The in-flight proposal we raised, if any (for persistence)
    pub fn pending_proposal(&self) -> Option<&CloseProposal> {
        self.consensus.own_proposal()
    }

    /// Restore persisted state after a crash. Balances, log, filters, and
    /// the epoch view are rehydrated. A close that was in flight restarts
    /// from Open; the triggers re-fire and re-propose on the next round.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        node_id: NodeId,
        config: NodeConfig,
        log: SettlementLog,
        ledger: BalanceLedger,
        mut epoch: EpochState,
        filters: FilterWindow,
        mint_log: Vec<MintingRecord>,
        supply: u64,
    ) -> Self {
        if epoch.status() == EpochStatus::Proposed {
            let _ = epoch.advance(EpochStatus::Open);
        }
        let consensus = ConsensusEngine::new(node_id.clone(), config.consensus.clone());
        let pre_isolation_bases = ledger.base_snapshot();
        Self {
            node_id,
            config,
            log,
            ledger,
            epoch,
            consensus,
            filters,
            mint_log,
            seen: SeenCache::new(),
            outbound: Vec::new(),
            round: 0,
            supply,
            pre_isolation_bases,
            stats: NodeStats::default(),
        }
    }

    /// Circulating supply as this node sees it
    pub fn supply(&self) -> u64 {
        self.supply
    }
}
