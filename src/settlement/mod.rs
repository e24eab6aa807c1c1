// Settlement module - records, the append-only log, and the active-set projection

pub mod active_set;
pub mod log;
pub mod record;

pub use active_set::{ActiveSet, ACTIVE_SET_WINDOW_EPOCHS};
pub use log::{LogError, SettlementLog};
pub use record::{NodeId, RecordError, SettlementHash, SettlementRecord};
