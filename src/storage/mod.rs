// Storage module - durable node-local state

pub mod store;

pub use store::{LedgerStore, StorageStats, StoreError};
