// Ledger module - CRDT primitives, account balances, and partition merge

pub mod balance;
pub mod crdt;
pub mod merge;

pub use balance::{AccountBalance, BalanceError, BalanceLedger};
pub use crdt::{GCounter, GSet, MergeResult};
pub use merge::{classify, merge_ledgers, MergeCase, MergeReport, MergeSide};
