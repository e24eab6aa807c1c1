// Emission schedule - halving reward, active-set scaling, and the income cap
//
// Reward halves every 100,000 epochs down to a tail floor of 0.1% of
// supply per year. The scaled reward grows with the active set only up to
// REFERENCE_SIZE members, so inflating the apparent set past that earns
// nothing extra. On top of the schedule, a close can never mint more than
// half of the epoch's net service income after the burn, tying issuance
// to real throughput. Isolated partitions each mint their own scaled
// reward, so N concurrent timelines overmint exactly (N-1) rewards per
// epoch relative to a single timeline.

/// Reward per epoch before any halving, in base units
pub const INITIAL_REWARD: u64 = 1_000_000_000_000;

/// Epochs between reward halvings
pub const HALVING_INTERVAL: u64 = 100_000;

/// Shift cap: beyond 63 halvings the schedule is zero and only the tail pays
pub const MAX_HALVINGS: u64 = 63;

/// Active-set size at which the scaled reward saturates
pub const REFERENCE_SIZE: usize = 100;

/// Tail emission: 0.1% of circulating supply per year
pub const TAIL_EMISSION_PER_MILLE: u64 = 1;

/// Approximate epochs per year at the target epoch cadence
pub const EPOCHS_PER_YEAR: u64 = 52_600;

/// Burn applied to service income before the minting cap, in percent
pub const BURN_RATE_PERCENT: u64 = 2;

/// Minting cap as a share of net service income, in percent
pub const MINTING_CAP_PERCENT: u64 = 50;

/// Halving-schedule reward for an epoch, ignoring the tail floor
pub const fn base_reward(epoch: u64) -> u64 {
    let halvings = epoch / HALVING_INTERVAL;
    let shift = if halvings > MAX_HALVINGS {
        MAX_HALVINGS
    } else {
        halvings
    };
    INITIAL_REWARD >> shift
}

/// Per-epoch tail floor derived from circulating supply
pub fn tail_floor(supply: u64) -> u64 {
    let per_year = (supply as u128 * TAIL_EMISSION_PER_MILLE as u128) / 1000;
    (per_year / EPOCHS_PER_YEAR as u128) as u64
}

/// Schedule reward for an epoch: the halving curve, floored by the tail
pub fn reward(epoch: u64, supply: u64) -> u64 {
    base_reward(epoch).max(tail_floor(supply))
}

/// Reward scaled by the observed active set, saturating at REFERENCE_SIZE
pub fn scaled_reward(epoch: u64, supply: u64, active_set_size: usize) -> u64 {
    let capped = active_set_size.min(REFERENCE_SIZE) as u128;
    let scaled = reward(epoch, supply) as u128 * capped / REFERENCE_SIZE as u128;
    scaled as u64
}

/// Service income left after the burn
pub fn net_income(gross_income: u64) -> u64 {
    gross_income - (gross_income as u128 * BURN_RATE_PERCENT as u128 / 100) as u64
}

/// Largest amount a close may mint from a given net income
pub fn minting_cap(net_income: u64) -> u64 {
    (net_income as u128 * MINTING_CAP_PERCENT as u128 / 100) as u64
}

/// The amount actually minted at an epoch close: the scaled schedule
/// reward, capped by half the epoch's post-burn service income.
pub fn emission_for_close(
    epoch: u64,
    supply: u64,
    active_set_size: usize,
    gross_income: u64,
) -> u64 {
    scaled_reward(epoch, supply, active_set_size).min(minting_cap(net_income(gross_income)))
}

/// Cumulative schedule reward over epochs `[0, target_epoch)`, summed in
/// closed form one halving interval at a time. The single-timeline
/// baseline that overminting is measured against.
pub fn cumulative_base_reward(target_epoch: u64) -> u128 {
    let mut supply: u128 = 0;
    let mut epoch = 0u64;
    while epoch < target_epoch {
        let reward = base_reward(epoch) as u128;
        let next_halving = (epoch / HALVING_INTERVAL + 1) * HALVING_INTERVAL;
        let span = next_halving.min(target_epoch) - epoch;
        supply += reward * span as u128;
        if reward == 0 {
            break;
        }
        epoch += span;
    }
    supply
}
