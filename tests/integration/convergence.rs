//! Integration test: convergence.
//!
//! Once a bucket settles, further passes must be no-ops: no map edits, no
//! clock bumps, no peer sync traffic. Faults may fail a pass, but every
//! sequence of faults and recoveries has to end back at the same map.

use std::sync::Arc;

use bosun_config::Replicator;
use bosun_integration_tests::{RecordingReplicator, TestCluster, chain, member_id};
use bosun_janitor::ErrorKind;
use bosun_types::{Member, MemberState, VbucketMap};

/// A settled bucket stays byte-identical across passes, and no sync
/// traffic is generated once the members agree with the map.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_repeated_passes_are_fixed_points() {
    let replicator = Arc::new(RecordingReplicator::default());
    let c = TestCluster::with_replicator(2, Arc::clone(&replicator) as Arc<dyn Replicator>).await;
    c.create_bucket("default", 8, 1, 2);

    c.cleanup("default").await.unwrap();
    let settled = c.store.get_bucket("default").unwrap().unwrap();
    assert_eq!(replicator.pulls(), 1, "first pass pulls before planning");
    assert_eq!(replicator.pushes(), 1, "first pass pushes the new map");

    for _ in 0..3 {
        c.cleanup("default").await.unwrap();
    }

    assert_eq!(c.store.get_bucket("default").unwrap().unwrap(), settled);
    assert_eq!(replicator.pulls(), 1, "settled passes must not pull");
    assert_eq!(replicator.pushes(), 1, "settled passes must not push");
}

/// Joining a member never reshuffles existing buckets; their server lists
/// and maps stay as they are until someone rebalances.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_new_member_does_not_shuffle_map() {
    let c = TestCluster::new(2).await;
    c.create_bucket("default", 16, 1, 2);
    c.cleanup("default").await.unwrap();
    let before = c.map_of("default").unwrap();

    c.cluster
        .add_member(Member {
            node_id: member_id(3),
            name: "node-3".into(),
            state: MemberState::Active,
            generation: 1,
        })
        .await;
    c.nodes.add_node(member_id(3)).await;

    c.cleanup("default").await.unwrap();
    let config = c.store.get_bucket("default").unwrap().unwrap().value;
    assert_eq!(config.map, Some(before));
    assert_eq!(config.servers, c.members(2));
    assert!(c.nodes.states_of(member_id(3), "default").await.is_empty());
}

/// A map whose masters are spread evenly is remembered as the last known
/// balanced layout.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_balanced_map_recorded() {
    let c = TestCluster::new(2).await;
    let map = VbucketMap::from_chains(
        (0..8)
            .map(|vb| {
                if vb % 2 == 0 {
                    chain(&[Some(1), Some(2)])
                } else {
                    chain(&[Some(2), Some(1)])
                }
            })
            .collect(),
    );
    c.create_bucket_with_map("default", 1, 2, map.clone());

    c.cleanup("default").await.unwrap();

    assert_eq!(c.store.balanced_map("default").unwrap(), Some(map));
}

/// Members keep losing their data and coming back empty. Every recovery
/// pass must land on the exact map the bucket started with.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30000)]
async fn test_restart_storm_always_resettles() {
    let c = TestCluster::new(3).await;
    c.create_bucket("default", 16, 1, 3);
    c.cleanup("default").await.unwrap();
    let reference = c.map_of("default").unwrap();

    let mut state: u32 = 0x5EED_CAFE;
    for round in 0..10 {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        let victim = member_id(((state >> 16) % 3) as u8 + 1);

        c.nodes.clear_bucket(victim, "default").await;
        c.cleanup("default")
            .await
            .unwrap_or_else(|err| panic!("round {round}: {err}"));

        assert_eq!(c.map_of("default").unwrap(), reference, "round {round}");
        c.assert_settled("default", &reference, 3).await;
    }
}

/// A pass that fails mid-flight leaves the declared map exactly as it
/// was; the next healthy pass completes the recovery.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30000)]
async fn test_faults_never_half_write() {
    let c = TestCluster::new(3).await;
    c.create_bucket("default", 16, 1, 3);
    c.cleanup("default").await.unwrap();
    let reference = c.map_of("default").unwrap();

    let mut state: u32 = 0xC0FF_EE11;
    for round in 0..6 {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        let victim = member_id(((state >> 16) % 3) as u8 + 1);

        // The victim dies and loses its data. The pass cannot see it and
        // must refuse to change anything.
        c.nodes.set_down(victim, true).await;
        c.nodes.clear_bucket(victim, "default").await;
        let err = c.cleanup("default").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Visibility, "round {round}");
        assert_eq!(c.map_of("default").unwrap(), reference, "round {round}");

        // Back up, next pass restores every copy the map assigns.
        c.nodes.set_down(victim, false).await;
        c.cleanup("default")
            .await
            .unwrap_or_else(|err| panic!("round {round}: {err}"));
        assert_eq!(c.map_of("default").unwrap(), reference, "round {round}");
        c.assert_settled("default", &reference, 3).await;
    }
}
