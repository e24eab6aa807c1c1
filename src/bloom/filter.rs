// Settlement Filter - bloom filter over the hashes closed into an epoch's base
//
// Published at every epoch close so reconnecting partitions can tell
// whether a settlement was already incorporated into a frozen base before
// re-applying it as a recovered delta. Sized at ~19.2 bits per element
// with 13 hash functions for a 1e-4 target false-positive rate.

use crate::settlement::record::SettlementHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of hash functions
pub const BLOOM_K: usize = 13;

/// Bits per expected element, as a ratio (96/5 = 19.2)
pub const BLOOM_BITS_PER_ELEMENT_NUM: usize = 96;
pub const BLOOM_BITS_PER_ELEMENT_DEN: usize = 5;

/// Errors from filter operations
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Deserialization failed")]
    DeserializationFailed,
}

/// Bloom filter over the settlement hashes incorporated into one epoch's base
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementFilter {
    epoch_number: u64,
    bits: Vec<u8>,
    bit_len: u64,
    inserted: usize,
}

impl SettlementFilter {
    /// Create a filter sized for an expected number of elements
    pub fn for_capacity(epoch_number: u64, expected_elements: usize) -> Self {
        let wanted =
            (expected_elements * BLOOM_BITS_PER_ELEMENT_NUM + BLOOM_BITS_PER_ELEMENT_DEN - 1)
                / BLOOM_BITS_PER_ELEMENT_DEN;
        let bit_len = wanted.max(64) as u64;
        let byte_len = ((bit_len + 7) / 8) as usize;

        Self {
            epoch_number,
            bits: vec![0u8; byte_len],
            bit_len,
            inserted: 0,
        }
    }

    /// The epoch whose close published this filter
    pub fn epoch_number(&self) -> u64 {
        self.epoch_number
    }

    /// Number of insertions performed
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    /// Size of the bit array
    pub fn bit_len(&self) -> u64 {
        self.bit_len
    }

    /// Two independent 64-bit values derived from the settlement hash,
    /// combined by double hashing into the k probe positions.
    fn hash_pair(hash: &SettlementHash) -> (u64, u64) {
        let d1 = Sha256::new()
            .chain_update(b"bloom1:")
            .chain_update(hash.as_bytes())
            .finalize();
        let d2 = Sha256::new()
            .chain_update(b"bloom2:")
            .chain_update(hash.as_bytes())
            .finalize();

        let mut h1 = [0u8; 8];
        h1.copy_from_slice(&d1[..8]);
        let mut h2 = [0u8; 8];
        h2.copy_from_slice(&d2[..8]);

        // An odd stride never degenerates on a shared factor with bit_len
        (u64::from_le_bytes(h1), u64::from_le_bytes(h2) | 1)
    }

    fn probe(&self, h1: u64, h2: u64, i: usize) -> usize {
        let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
        (combined % self.bit_len) as usize
    }

    /// Insert a settlement hash
    pub fn insert(&mut self, hash: &SettlementHash) {
        let (h1, h2) = Self::hash_pair(hash);
        for i in 0..BLOOM_K {
            let idx = self.probe(h1, h2, i);
            self.bits[idx / 8] |= 1 << (idx % 8);
        }
        self.inserted += 1;
    }

    /// Check for a settlement hash. False positives occur at roughly the
    /// target rate; false negatives never.
    pub fn contains(&self, hash: &SettlementHash) -> bool {
        let (h1, h2) = Self::hash_pair(hash);
        (0..BLOOM_K).all(|i| {
            let idx = self.probe(h1, h2, i);
            self.bits[idx / 8] & (1 << (idx % 8)) != 0
        })
    }

    /// Fraction of bits set (monitoring signal)
    pub fn occupancy(&self) -> f64 {
        if self.bit_len == 0 {
            return 0.0;
        }
        let set: u64 = self.bits.iter().map(|b| b.count_ones() as u64).sum();
        set as f64 / self.bit_len as f64
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        postcard::to_allocvec(self).unwrap_or_default()
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FilterError> {
        postcard::from_bytes(bytes).map_err(|_| FilterError::DeserializationFailed)
    }
}
