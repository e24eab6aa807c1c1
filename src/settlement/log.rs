// Settlement Log - per-epoch grow-only sets of settlement records
//
// The log is the append-only ground truth every other component projects
// from: the active set, the epoch triggers, the bloom filters, and the
// balance deltas. Records are never mutated or deleted; partitions
// reconcile their logs by per-epoch union.

use crate::ledger::crdt::{GSet, MergeResult};
use crate::settlement::record::{SettlementHash, SettlementRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Errors from settlement log operations
#[derive(Error, Debug)]
pub enum LogError {
    #[error("Record hash does not match its contents")]
    InvalidRecord,

    #[error("Deserialization failed")]
    DeserializationFailed,
}

/// Append-only settlement history, bucketed by the epoch each record was
/// observed in on this node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementLog {
    /// Epoch number -> grow-only set of records observed in that epoch
    epochs: BTreeMap<u64, GSet<SettlementRecord>>,
    /// Encoded byte size per epoch bucket (memory-pressure signal)
    bytes: BTreeMap<u64, usize>,
    /// Index: record hash -> epoch, for fast duplicate checks
    #[serde(skip)]
    hash_index: BTreeMap<SettlementHash, u64>,
}

impl Default for SettlementLog {
    fn default() -> Self {
        Self::new()
    }
}

impl SettlementLog {
    /// Create a new empty log
    pub fn new() -> Self {
        Self {
            epochs: BTreeMap::new(),
            bytes: BTreeMap::new(),
            hash_index: BTreeMap::new(),
        }
    }

    /// Insert a record under the given observation epoch.
    /// Returns true if the record was new anywhere in the log.
    pub fn insert(&mut self, epoch: u64, record: SettlementRecord) -> Result<bool, LogError> {
        if !record.verify_hash() {
            return Err(LogError::InvalidRecord);
        }

        if self.hash_index.contains_key(record.hash()) {
            return Ok(false);
        }

        let encoded_len = record.to_bytes().len();
        self.hash_index.insert(record.hash().clone(), epoch);
        self.epochs.entry(epoch).or_default().insert(record);
        *self.bytes.entry(epoch).or_insert(0) += encoded_len;

        Ok(true)
    }

    /// Check if a record is anywhere in the log
    pub fn contains(&self, hash: &SettlementHash) -> bool {
        self.hash_index.contains_key(hash)
    }

    /// Number of records observed in a specific epoch
    pub fn epoch_count(&self, epoch: u64) -> usize {
        self.epochs.get(&epoch).map(|s| s.len()).unwrap_or(0)
    }

    /// Encoded byte size of a specific epoch's record set
    pub fn epoch_bytes(&self, epoch: u64) -> usize {
        self.bytes.get(&epoch).copied().unwrap_or(0)
    }

    /// Iterate over records observed in a specific epoch
    pub fn epoch_records(&self, epoch: u64) -> impl Iterator<Item = &SettlementRecord> {
        self.epochs.get(&epoch).into_iter().flat_map(|s| s.iter())
    }

    /// Iterate over records observed in `[from_epoch, to_epoch]`
    pub fn window_records(
        &self,
        from_epoch: u64,
        to_epoch: u64,
    ) -> impl Iterator<Item = &SettlementRecord> {
        self.epochs
            .range(from_epoch..=to_epoch)
            .flat_map(|(_, s)| s.iter())
    }

    /// Total records across all epochs
    pub fn total_count(&self) -> usize {
        self.epochs.values().map(|s| s.len()).sum()
    }

    /// Epochs with at least one record
    pub fn epochs(&self) -> impl Iterator<Item = u64> + '_ {
        self.epochs.keys().copied()
    }

    /// Merge another log into this one (per-epoch set union)
    pub fn merge(&mut self, other: &SettlementLog) -> MergeResult {
        let before = self.total_count();

        for (epoch, records) in &other.epochs {
            for record in records.iter() {
                if self.hash_index.contains_key(record.hash()) {
                    continue;
                }
                let encoded_len = record.to_bytes().len();
                self.hash_index.insert(record.hash().clone(), *epoch);
                self.epochs.entry(*epoch).or_default().insert(record.clone());
                *self.bytes.entry(*epoch).or_insert(0) += encoded_len;
            }
        }

        let after = self.total_count();
        MergeResult {
            new_entries: after - before,
            total_after_merge: after,
        }
    }

    /// Rebuild the hash index from the epoch sets (after deserialization)
    pub fn rebuild_index(&mut self) {
        self.hash_index.clear();
        let entries: Vec<(u64, SettlementHash)> = self
            .epochs
            .iter()
            .flat_map(|(epoch, set)| set.iter().map(|r| (*epoch, r.hash().clone())))
            .collect();
        for (epoch, hash) in entries {
            self.hash_index.insert(hash, epoch);
        }
    }

    /// Distinct party ids across a window of epochs
    pub fn parties_in_window(
        &self,
        from_epoch: u64,
        to_epoch: u64,
    ) -> HashSet<crate::settlement::record::NodeId> {
        let mut parties = HashSet::new();
        for record in self.window_records(from_epoch, to_epoch) {
            parties.insert(record.party_a().clone());
            parties.insert(record.party_b().clone());
        }
        parties
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogError> {
        let mut log: SettlementLog =
            postcard::from_bytes(bytes).map_err(|_| LogError::DeserializationFailed)?;
        log.rebuild_index();
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::record::NodeId;

    fn record(a: u8, b: u8, amount: u64, epoch: u64) -> SettlementRecord {
        SettlementRecord::new(
            NodeId::from_bytes([a; 32]),
            NodeId::from_bytes([b; 32]),
            amount,
            0,
            0,
            amount,
            epoch,
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_duplicate() {
        let mut log = SettlementLog::new();
        let r = record(1, 2, 100, 0);

        assert!(log.insert(0, r.clone()).unwrap());
        assert!(!log.insert(0, r.clone()).unwrap());
        assert!(!log.insert(1, r).unwrap()); // duplicate even across epochs
        assert_eq!(log.total_count(), 1);
    }

    #[test]
    fn test_epoch_bytes_accumulate() {
        let mut log = SettlementLog::new();
        assert_eq!(log.epoch_bytes(0), 0);

        log.insert(0, record(1, 2, 100, 0)).unwrap();
        let one = log.epoch_bytes(0);
        assert!(one > 0);

        log.insert(0, record(1, 2, 200, 0)).unwrap();
        assert!(log.epoch_bytes(0) > one);
    }

    #[test]
    fn test_merge_is_union() {
        let mut log1 = SettlementLog::new();
        log1.insert(0, record(1, 2, 100, 0)).unwrap();
        log1.insert(1, record(1, 3, 50, 1)).unwrap();

        let mut log2 = SettlementLog::new();
        log2.insert(1, record(1, 3, 50, 1)).unwrap();
        log2.insert(1, record(2, 3, 75, 1)).unwrap();

        let result = log1.merge(&log2);
        assert_eq!(result.new_entries, 1);
        assert_eq!(log1.total_count(), 3);
    }

    #[test]
    fn test_window_records() {
        let mut log = SettlementLog::new();
        log.insert(0, record(1, 2, 10, 0)).unwrap();
        log.insert(1, record(1, 3, 20, 1)).unwrap();
        log.insert(2, record(2, 3, 30, 2)).unwrap();

        assert_eq!(log.window_records(1, 2).count(), 2);
        assert_eq!(log.parties_in_window(0, 0).len(), 2);
        assert_eq!(log.parties_in_window(0, 2).len(), 3);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut log = SettlementLog::new();
        let r = record(1, 2, 100, 0);
        log.insert(0, r.clone()).unwrap();

        let restored = SettlementLog::from_bytes(&log.to_bytes()).unwrap();
        assert_eq!(restored.total_count(), 1);
        assert!(restored.contains(r.hash()));
    }
}
