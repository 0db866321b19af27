//! Planning initial vbucket maps from ring assignments.

use std::collections::BTreeMap;

use bosun_types::{Chain, NodeId, VbucketMap};

use crate::error::RingError;
use crate::ring::{Ring, partition_points};

type Result<T> = std::result::Result<T, RingError>;

/// Partition exponent for a vbucket count: `num_vbuckets == 2^exponent`.
pub fn exponent_for(num_vbuckets: u16) -> Result<u8> {
    if !num_vbuckets.is_power_of_two() {
        return Err(RingError::InvalidPartitionCount(num_vbuckets));
    }
    Ok(num_vbuckets.trailing_zeros() as u8)
}

/// Plan a fresh map for `2^exponent` vbuckets over `servers`.
///
/// Each chain takes the first `1 + num_replicas` distinct ring owners at
/// the vbucket's partition point; when there are fewer servers than chain
/// slots the tail is left unassigned.
pub fn initial_map(exponent: u8, num_replicas: u8, servers: &[NodeId]) -> Result<VbucketMap> {
    let ring = Ring::build(servers)?;
    let chain_len = 1 + num_replicas as usize;

    let chains = partition_points(exponent)
        .into_iter()
        .map(|point| {
            let mut slots: Vec<Option<NodeId>> = ring
                .owners(point, chain_len)
                .into_iter()
                .map(Some)
                .collect();
            slots.resize(chain_len, None);
            Chain::new(slots)
        })
        .collect();

    Ok(VbucketMap::from_chains(chains))
}

/// Whether `map` spreads active ownership acceptably across `servers`.
///
/// Balanced means every vbucket has an active owner drawn from the server
/// list and no node's active count strays more than 25% (at least one
/// vbucket) from the even share.
pub fn is_balanced(map: &VbucketMap, servers: &[NodeId]) -> bool {
    if servers.is_empty() {
        return false;
    }

    let mut actives: BTreeMap<NodeId, usize> = servers.iter().map(|n| (*n, 0)).collect();
    for (_, chain) in map.iter() {
        let Some(master) = chain.master() else {
            return false;
        };
        let Some(count) = actives.get_mut(&master) else {
            return false;
        };
        *count += 1;
    }

    let expected = map.num_vbuckets() as f64 / servers.len() as f64;
    let tolerance = (expected * 0.25).max(1.0);
    actives
        .values()
        .all(|&count| (count as f64 - expected).abs() <= tolerance)
}
