//! Integration test: crash recovery.
//!
//! The janitor's whole purpose: after a node crash, restart, or an
//! interrupted topology change, one cleanup pass restores a coherent map
//! and settles every member back onto it.

use bosun_integration_tests::{TestCluster, chain, member_id, uniform_map};
use bosun_types::{ReplicaState, VbucketMap};

/// The master of every vbucket died and its replica took over (the data
/// service promoted it). The pass adopts the takeover: the replica
/// becomes the declared master and the dead slot is cleared without
/// shrinking the chain.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_replica_takeover_is_adopted() {
    let c = TestCluster::new(2).await;
    c.create_bucket_with_map("default", 1, 2, uniform_map(8, &[Some(1), Some(2)]));
    for vb in 0..8 {
        c.observe("default", vb, &[(2, ReplicaState::Active)]).await;
    }

    c.cleanup("default").await.unwrap();

    let map = c.map_of("default").unwrap();
    assert_eq!(map, uniform_map(8, &[Some(2), None]));
    c.assert_settled("default", &map, 2).await;
}

/// A rebalance crashed right after moving the actives onto the target
/// topology. The observed world matches the fast-forward map, so the
/// pass adopts it wholesale instead of patching chains one by one.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_interrupted_rebalance_completes() {
    let c = TestCluster::new(2).await;
    c.create_bucket_with_map("default", 1, 2, uniform_map(8, &[Some(2), Some(1)]));
    let stored = c.store.get_bucket("default").unwrap().unwrap();
    c.store
        .update_bucket("default", &stored.clock, |config| {
            config.fast_forward_map = Some(uniform_map(8, &[Some(1), Some(2)]));
        })
        .unwrap();

    for vb in 0..8 {
        c.observe(
            "default",
            vb,
            &[(1, ReplicaState::Active), (2, ReplicaState::Dead)],
        )
        .await;
    }

    c.cleanup("default").await.unwrap();

    let map = c.map_of("default").unwrap();
    assert_eq!(map, uniform_map(8, &[Some(1), Some(2)]));
    // Dropping the fast-forward map is the rebalancer's move, not the
    // janitor's.
    let stored = c.store.get_bucket("default").unwrap().unwrap();
    assert!(stored.value.fast_forward_map.is_some());
    c.assert_settled("default", &map, 2).await;
}

/// A replica lost its copy but the master is healthy: the declared chain
/// stays as it is and the apply step rebuilds the replica.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_lost_replica_is_rebuilt() {
    let c = TestCluster::new(2).await;
    c.create_bucket_with_map("default", 1, 2, uniform_map(8, &[Some(1), Some(2)]));
    for vb in 0..8 {
        c.observe("default", vb, &[(1, ReplicaState::Active)]).await;
    }

    c.cleanup("default").await.unwrap();

    let map = c.map_of("default").unwrap();
    assert_eq!(map, uniform_map(8, &[Some(1), Some(2)]));
    c.assert_settled("default", &map, 2).await;
}

/// A persistent-storage master restarted with its memory gone but its
/// disk intact. No takeover happened (the replica never promoted), so
/// the chain is kept and the master is told to activate again.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_restarted_master_reactivates() {
    let c = TestCluster::new(2).await;
    c.create_bucket_with_map("default", 1, 2, uniform_map(8, &[Some(1), Some(2)]));
    for vb in 0..8 {
        c.observe("default", vb, &[(2, ReplicaState::Replica)]).await;
    }

    c.cleanup("default").await.unwrap();

    assert_eq!(
        c.map_of("default").unwrap(),
        uniform_map(8, &[Some(1), Some(2)])
    );
    let states = c.nodes.states_of(member_id(1), "default").await;
    assert_eq!(states.len(), 8);
    assert!(states.values().all(|s| *s == ReplicaState::Active));
}

/// Only some vbuckets failed over. Each chain is patched independently;
/// healthy chains stay identical.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_partial_takeover_patches_only_failed_chains() {
    let c = TestCluster::new(3).await;
    let chains = (0..8u16)
        .map(|vb| {
            if vb < 4 {
                chain(&[Some(1), Some(2)])
            } else {
                chain(&[Some(3), Some(2)])
            }
        })
        .collect();
    c.create_bucket_with_map("default", 1, 3, VbucketMap::from_chains(chains));

    // Member 1 is gone and its replica promoted; member 3's chains are
    // healthy.
    for vb in 0..4 {
        c.observe("default", vb, &[(2, ReplicaState::Active)]).await;
    }
    for vb in 4..8 {
        c.observe(
            "default",
            vb,
            &[(3, ReplicaState::Active), (2, ReplicaState::Replica)],
        )
        .await;
    }

    c.cleanup("default").await.unwrap();

    let map = c.map_of("default").unwrap();
    for vb in 0..4 {
        assert_eq!(map.chain(vb).unwrap(), &chain(&[Some(2), None]), "vb {vb}");
    }
    for vb in 4..8 {
        assert_eq!(map.chain(vb).unwrap(), &chain(&[Some(3), Some(2)]), "vb {vb}");
    }
    c.assert_settled("default", &map, 3).await;
}
