// LedgerStore - persistent node-local state using sled
//
// Durability here is for local crash recovery only: closed epoch states,
// the balance ledger with its live deltas, the retained bloom filters,
// the minting log, and any pending close proposal. Nothing in this store
// is a wire format or a consensus input.

use crate::bloom::window::FilterWindow;
use crate::consensus::proposal::CloseProposal;
use crate::epoch::state::EpochState;
use crate::ledger::balance::BalanceLedger;
use crate::mint::record::MintingRecord;
use crate::settlement::log::SettlementLog;
use crate::settlement::record::NodeId;
use std::path::Path;
use thiserror::Error;

/// Key prefixes for organizing data
mod keys {
    pub const NODE_ID: &[u8] = b"node:id";
    pub const SUPPLY: &[u8] = b"node:supply";
    pub const EPOCH_CURRENT: &[u8] = b"epoch:current";
    pub const EPOCH_CLOSED_PREFIX: &[u8] = b"epoch:closed:";
    pub const LEDGER: &[u8] = b"ledger:balances";
    pub const SETTLEMENT_LOG: &[u8] = b"ledger:settlements";
    pub const FILTERS: &[u8] = b"bloom:window";
    pub const MINT_LOG: &[u8] = b"mint:log";
    pub const PENDING_PROPOSAL: &[u8] = b"consensus:pending";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

/// Statistics about the storage
#[derive(Clone, Debug)]
pub struct StorageStats {
    /// Number of keys in the database
    pub key_count: usize,
    /// Approximate disk size in bytes
    pub disk_size_bytes: u64,
}

/// Persistent key-value store for a node's ledger state
pub struct LedgerStore {
    db: sled::Db,
}

impl LedgerStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        Ok(Self { db })
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        Ok(StorageStats {
            key_count: self.db.len(),
            disk_size_bytes: self.db.size_on_disk().unwrap_or(0),
        })
    }

    fn put<T: serde::Serialize>(&self, key: &[u8], value: &T) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(value)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
        self.db.insert(key, bytes)?;
        Ok(())
    }

    fn get<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.db.get(key)? {
            Some(bytes) => {
                let value = postcard::from_bytes(&bytes)
                    .map_err(|e| StoreError::DeserializationFailed(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // NODE IDENTITY
    // ========================================================================

    /// Save the node ID
    pub fn save_node_id(&self, node_id: &NodeId) -> Result<(), StoreError> {
        self.db.insert(keys::NODE_ID, node_id.as_bytes().as_slice())?;
        Ok(())
    }

    /// Load the node ID
    pub fn load_node_id(&self) -> Result<Option<NodeId>, StoreError> {
        match self.db.get(keys::NODE_ID)? {
            Some(bytes) => {
                if bytes.len() != 32 {
                    return Err(StoreError::DeserializationFailed(
                        "Invalid node ID length".to_string(),
                    ));
                }
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Some(NodeId::from_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    /// Get the node ID, creating one if it doesn't exist
    pub fn get_or_create_node_id(&self) -> Result<NodeId, StoreError> {
        if let Some(node_id) = self.load_node_id()? {
            return Ok(node_id);
        }
        let node_id = NodeId::generate();
        self.save_node_id(&node_id)?;
        Ok(node_id)
    }

    /// Save the locally observed supply
    pub fn save_supply(&self, supply: u64) -> Result<(), StoreError> {
        self.put(keys::SUPPLY, &supply)
    }

    /// Load the locally observed supply
    pub fn load_supply(&self) -> Result<Option<u64>, StoreError> {
        self.get(keys::SUPPLY)
    }

    // ========================================================================
    // EPOCH STATE
    // ========================================================================

    /// Save the current (open) epoch state
    pub fn save_epoch(&self, epoch: &EpochState) -> Result<(), StoreError> {
        self.put(keys::EPOCH_CURRENT, epoch)
    }

    /// Load the current epoch state
    pub fn load_epoch(&self) -> Result<Option<EpochState>, StoreError> {
        self.get(keys::EPOCH_CURRENT)
    }

    /// Archive a closed epoch state under its number
    pub fn save_closed_epoch(&self, epoch: &EpochState) -> Result<(), StoreError> {
        let key = [
            keys::EPOCH_CLOSED_PREFIX,
            epoch.epoch_number().to_be_bytes().as_slice(),
        ]
        .concat();
        self.put(&key, epoch)
    }

    /// Load an archived closed epoch by number
    pub fn load_closed_epoch(&self, epoch_number: u64) -> Result<Option<EpochState>, StoreError> {
        let key = [
            keys::EPOCH_CLOSED_PREFIX,
            epoch_number.to_be_bytes().as_slice(),
        ]
        .concat();
        self.get(&key)
    }

    // ========================================================================
    // LEDGER & SETTLEMENTS
    // ========================================================================

    /// Save the balance ledger (bases and live deltas)
    pub fn save_ledger(&self, ledger: &BalanceLedger) -> Result<(), StoreError> {
        self.put(keys::LEDGER, ledger)
    }

    /// Load the balance ledger
    pub fn load_ledger(&self) -> Result<Option<BalanceLedger>, StoreError> {
        self.get(keys::LEDGER)
    }

    /// Save the settlement log
    pub fn save_settlement_log(&self, log: &SettlementLog) -> Result<(), StoreError> {
        self.put(keys::SETTLEMENT_LOG, log)
    }

    /// Load the settlement log
    pub fn load_settlement_log(&self) -> Result<Option<SettlementLog>, StoreError> {
        let loaded: Option<SettlementLog> = self.get(keys::SETTLEMENT_LOG)?;
        Ok(loaded.map(|mut log| {
            log.rebuild_index();
            log
        }))
    }

    // ========================================================================
    // BLOOM FILTERS & MINTING
    // ========================================================================

    /// Save the retained filter window
    pub fn save_filters(&self, window: &FilterWindow) -> Result<(), StoreError> {
        self.put(keys::FILTERS, window)
    }

    /// Load the retained filter window
    pub fn load_filters(&self) -> Result<Option<FilterWindow>, StoreError> {
        self.get(keys::FILTERS)
    }

    /// Save the minting log
    pub fn save_mint_log(&self, records: &[MintingRecord]) -> Result<(), StoreError> {
        self.put(keys::MINT_LOG, &records.to_vec())
    }

    /// Load the minting log
    pub fn load_mint_log(&self) -> Result<Vec<MintingRecord>, StoreError> {
        Ok(self.get(keys::MINT_LOG)?.unwrap_or_default())
    }

    // ========================================================================
    // PENDING CONSENSUS
    // ========================================================================

    /// Save an in-flight close proposal
    pub fn save_pending_proposal(&self, proposal: &CloseProposal) -> Result<(), StoreError> {
        self.put(keys::PENDING_PROPOSAL, proposal)
    }

    /// Load the in-flight close proposal, if any
    pub fn load_pending_proposal(&self) -> Result<Option<CloseProposal>, StoreError> {
        self.get(keys::PENDING_PROPOSAL)
    }

    /// Drop the in-flight proposal after a close or abandonment
    pub fn clear_pending_proposal(&self) -> Result<(), StoreError> {
        self.db.remove(keys::PENDING_PROPOSAL)?;
        Ok(())
    }
}
