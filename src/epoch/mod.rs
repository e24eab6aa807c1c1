// Epoch module - lifecycle state and close triggers

pub mod state;
pub mod trigger;

pub use state::{EpochError, EpochState, EpochStatus};
pub use trigger::{
    evaluate, small_partition_threshold, TriggerConfig, TriggerError, TriggerReason,
    DEVICE_MEMORY_LIMIT_BYTES, GSET_TRIGGER_BYTES, SETTLEMENT_TRIGGER_LARGE,
    SMALL_PARTITION_MIN_ROUNDS,
};
