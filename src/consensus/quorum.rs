// Quorum threshold for epoch-close acknowledgements
//
// The threshold is always computed against the proposer's local view of
// the active set; there is no globally agreed membership to compute it
// against. Immediately after a partition the local view still counts
// departed members, so the threshold is unreachable until the active-set
// projection narrows over two epochs. That window is a defined liveness
// gap, not a defect.

/// Acknowledgement threshold, in percent of the active set
pub const ACK_THRESHOLD_PERCENT: usize = 67;

/// Rounds a stalled proposal waits before being abandoned and re-proposed
pub const NAK_WAIT_ROUNDS: u64 = 3;

/// Distinct acknowledgements required to close an epoch.
///
/// ceil(0.67 × n) in integer arithmetic.
pub const fn quorum(active_set_size: usize) -> usize {
    if active_set_size == 0 {
        return 0;
    }
    (active_set_size * ACK_THRESHOLD_PERCENT + 99) / 100
}

/// Check whether a count of distinct acks meets the threshold
pub const fn meets_quorum(acks: usize, active_set_size: usize) -> bool {
    acks >= quorum(active_set_size)
}
