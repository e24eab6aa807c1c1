// Mint module - the emission schedule and per-close minting records

pub mod emission;
pub mod record;

pub use emission::{
    base_reward, cumulative_base_reward, emission_for_close, minting_cap, net_income, reward,
    scaled_reward, tail_floor, BURN_RATE_PERCENT, EPOCHS_PER_YEAR, HALVING_INTERVAL,
    INITIAL_REWARD, MINTING_CAP_PERCENT, REFERENCE_SIZE,
};
pub use record::MintingRecord;
