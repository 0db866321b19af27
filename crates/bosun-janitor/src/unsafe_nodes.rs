//! Detection of active owners that must not be trusted.
//!
//! A declared active owner that reports no copy of a vbucket, while a
//! declared replica still holds one, would come online empty and then
//! overwrite the surviving replica data through normal replication. Nodes
//! in that position block the pass instead of being activated.

use std::collections::BTreeSet;

use bosun_types::{NodeId, ReplicaState, VbucketMap};

use crate::observer::ObservedStates;

/// Find declared active owners whose copy is missing while some declared
/// replica of the same vbucket is not.
///
/// The check runs on the fixed-up map, after sanification. It is only
/// meaningful for storage without on-disk durability, so it is gated on
/// `enabled`; disabled it returns nothing. The result is sorted and
/// deduplicated.
pub fn find_unsafe_nodes(
    map: &VbucketMap,
    observed: &ObservedStates,
    enabled: bool,
) -> Vec<NodeId> {
    if !enabled {
        return Vec::new();
    }

    let mut unsafe_nodes = BTreeSet::new();
    for (vb, chain) in map.iter() {
        let Some(master) = chain.master() else {
            continue;
        };
        if observed.state_of(vb, &master) != ReplicaState::Missing {
            continue;
        }
        let replica_holds_data = chain.slots()[1..]
            .iter()
            .flatten()
            .any(|replica| observed.state_of(vb, replica) != ReplicaState::Missing);
        if replica_holds_data {
            unsafe_nodes.insert(master);
        }
    }
    unsafe_nodes.into_iter().collect()
}
