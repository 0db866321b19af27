//! Integration test: fresh bucket placement.
//!
//! A newly created bucket has no server list and no map. The first
//! cleanup pass populates the servers, plans the initial map, applies it
//! to every member, and marks the bucket warmed.

use std::collections::BTreeMap;

use bosun_integration_tests::{TestCluster, member_id};
use bosun_types::{NodeId, ReplicaState};

/// Three members, one bucket with nothing decided yet: after one pass the
/// bucket is fully placed, applied, and warmed.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_first_pass_places_new_bucket() {
    let c = TestCluster::new(3).await;
    c.create_bucket("default", 16, 1, 0);

    c.cleanup("default").await.unwrap();

    let stored = c.store.get_bucket("default").unwrap().unwrap();
    assert_eq!(stored.value.servers, c.members(3));

    let map = stored.value.map.expect("initial map planned");
    assert_eq!(map.num_vbuckets(), 16);
    assert_eq!(map.chain_len(), 2);
    for (vb, chain) in map.iter() {
        let owners: Vec<NodeId> = chain.nodes().collect();
        assert_eq!(owners.len(), 2, "vb {vb} should have a full chain");
        assert_ne!(owners[0], owners[1], "vb {vb} replica must differ from master");
        for owner in owners {
            assert!(stored.value.servers.contains(&owner));
        }
    }

    c.assert_settled("default", &map, 3).await;
    assert_eq!(c.nodes.warmed_nodes("default").await, c.members(3));
}

/// A single-member cluster hosts every active copy itself; replica slots
/// stay unassigned because there is nobody to replicate to.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_single_member_hosts_everything() {
    let c = TestCluster::new(1).await;
    c.create_bucket("default", 8, 1, 0);

    c.cleanup("default").await.unwrap();

    let map = c.map_of("default").unwrap();
    for (vb, chain) in map.iter() {
        assert_eq!(chain.master(), Some(member_id(1)), "vb {vb}");
        assert_eq!(chain.get(1), None, "vb {vb} has nobody to replicate to");
    }

    let states = c.nodes.states_of(member_id(1), "default").await;
    assert_eq!(states.len(), 8);
    assert!(states.values().all(|s| *s == ReplicaState::Active));
}

/// Placement spreads the active copies over the members instead of
/// piling them up on one.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_masters_spread_over_members() {
    let c = TestCluster::new(4).await;
    c.create_bucket("default", 64, 1, 0);

    c.cleanup("default").await.unwrap();

    let map = c.map_of("default").unwrap();
    let mut masters: BTreeMap<NodeId, usize> = BTreeMap::new();
    for (_, chain) in map.iter() {
        *masters.entry(chain.master().unwrap()).or_insert(0) += 1;
    }

    assert_eq!(masters.values().sum::<usize>(), 64);
    assert!(masters.len() >= 2, "placement should use more than one member");
    for owner in masters.keys() {
        assert!(c.members(4).contains(owner));
    }
}

/// A bucket declared on a subset of the members stays on that subset;
/// the other members hold nothing and are not warmed.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_bucket_on_subset_of_members() {
    let c = TestCluster::new(3).await;
    c.create_bucket("default", 8, 1, 2);

    c.cleanup("default").await.unwrap();

    let stored = c.store.get_bucket("default").unwrap().unwrap();
    assert_eq!(stored.value.servers, c.members(2));

    let map = stored.value.map.unwrap();
    for (_, chain) in map.iter() {
        for owner in chain.nodes() {
            assert!(owner == member_id(1) || owner == member_id(2));
        }
    }

    assert_eq!(c.nodes.warmed_nodes("default").await, c.members(2));
    assert!(c.nodes.states_of(member_id(3), "default").await.is_empty());
}
