// Active Set - quorum membership derived from recent settlement activity
//
// The active set is never stored as mutable membership state. It is a
// read-only projection over the settlement log: a node is a member if it
// appears as a party in any settlement within the last two epochs. After a
// partition, each fragment's projection narrows to its own members within
// two epoch boundaries, which is what restores consensus liveness.

use crate::settlement::log::SettlementLog;
use crate::settlement::record::NodeId;
use std::collections::HashSet;

/// How many trailing epochs of settlement activity confer membership
pub const ACTIVE_SET_WINDOW_EPOCHS: u64 = 2;

/// A projection of quorum membership at a specific epoch
#[derive(Clone, Debug)]
pub struct ActiveSet {
    epoch: u64,
    members: HashSet<NodeId>,
}

impl ActiveSet {
    /// Project the active set from the log as of `epoch`
    pub fn project(log: &SettlementLog, epoch: u64) -> Self {
        let from = epoch.saturating_sub(ACTIVE_SET_WINDOW_EPOCHS - 1);
        Self {
            epoch,
            members: log.parties_in_window(from, epoch),
        }
    }

    /// The epoch this projection was taken at
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of members
    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Check membership
    pub fn contains(&self, node: &NodeId) -> bool {
        self.members.contains(node)
    }

    /// Iterate over members
    pub fn members(&self) -> impl Iterator<Item = &NodeId> {
        self.members.iter()
    }

    /// Consume into the member set
    pub fn into_members(self) -> HashSet<NodeId> {
        self.members
    }
}
