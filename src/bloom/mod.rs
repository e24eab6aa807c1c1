// Bloom module - settlement filters and the verification window

pub mod filter;
pub mod window;

pub use filter::{FilterError, SettlementFilter, BLOOM_K};
pub use window::{
    FilterWindow, RecoveryDecision, SkippedRecovery, VERIFICATION_WINDOW_EPOCHS,
};
