//! Integration test: safety interlocks.
//!
//! Passes must refuse to act whenever acting could lose data: members
//! that cannot be observed, masters that restarted empty on ephemeral
//! storage, conflicting actives, corrupted server lists, and config sync
//! failures.

use std::sync::Arc;

use bosun_integration_tests::{FailingReplicator, TestCluster, member_id, options, uniform_map};
use bosun_janitor::{ErrorKind, JanitorError};
use bosun_types::{BucketConfig, ReplicaState, StorageEngine};

/// One member never answers the state query. The pass reports it and
/// leaves both the map and the members untouched.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_unobservable_member_blocks_pass() {
    let c = TestCluster::new(3).await;
    c.create_bucket_with_map("default", 1, 3, uniform_map(8, &[Some(1), Some(2)]));
    c.nodes.set_hung(member_id(3), true).await;

    let err = c.cleanup("default").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Visibility);
    match err {
        JanitorError::StateQueryFailed { zombies } => assert_eq!(zombies, vec![member_id(3)]),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        c.map_of("default").unwrap(),
        uniform_map(8, &[Some(1), Some(2)])
    );
    assert!(c.nodes.warmed_nodes("default").await.is_empty());
}

/// A down member is just as blocking as a hung one.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_down_member_blocks_pass() {
    let c = TestCluster::new(2).await;
    c.create_bucket("default", 8, 1, 2);
    c.nodes.set_down(member_id(1), true).await;

    let err = c.cleanup("default").await.unwrap_err();
    match err {
        JanitorError::StateQueryFailed { zombies } => assert_eq!(zombies, vec![member_id(1)]),
        other => panic!("unexpected error: {other}"),
    }
}

/// On ephemeral storage a restart wipes the master's data. If a replica
/// still holds a copy, re-activating the master would erase it: the pass
/// must stop and name the node.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_ephemeral_empty_master_is_unsafe() {
    let c = TestCluster::new(2).await;
    let declared = uniform_map(8, &[Some(1), Some(2)]);
    let mut config = BucketConfig::new("cache", 8, 1);
    config.servers = c.members(2);
    config.storage = StorageEngine::Ephemeral;
    config.map = Some(declared.clone());
    c.store.create_bucket(config).unwrap();

    for vb in 0..8 {
        c.observe("cache", vb, &[(2, ReplicaState::Replica)]).await;
    }

    let err = c.cleanup("cache").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Safety);
    match err {
        JanitorError::UnsafeNodes { nodes } => assert_eq!(nodes, vec![member_id(1)]),
        other => panic!("unexpected error: {other}"),
    }

    // Nothing moved: the map is unchanged and nothing was applied.
    assert_eq!(c.map_of("cache").unwrap(), declared);
    assert!(c.nodes.warmed_nodes("cache").await.is_empty());
}

/// Two members both claim the active copy and neither is the declared
/// master. There is no safe automatic choice; the vbuckets are flagged
/// and the map left alone.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_conflicting_actives_block_pass() {
    let c = TestCluster::new(3).await;
    c.create_bucket_with_map("default", 1, 3, uniform_map(4, &[Some(2), Some(3)]));
    for vb in 0..4 {
        c.observe(
            "default",
            vb,
            &[(1, ReplicaState::Active), (3, ReplicaState::Active)],
        )
        .await;
    }

    let err = c.cleanup("default").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Consistency);
    match err {
        JanitorError::BadVbuckets { vbuckets } => assert_eq!(vbuckets, vec![0, 1, 2, 3]),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        c.map_of("default").unwrap(),
        uniform_map(4, &[Some(2), Some(3)])
    );
}

/// A server list naming a node that is not an active member cannot be
/// trusted; members are never silently dropped from it.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_unknown_server_blocks_pass() {
    let c = TestCluster::new(2).await;
    let mut config = BucketConfig::new("default", 8, 1);
    config.servers = vec![member_id(1), member_id(7)];
    c.store.create_bucket(config).unwrap();

    let err = c.cleanup("default").await.unwrap_err();
    match err {
        JanitorError::CorruptedServerList { bucket, unexpected } => {
            assert_eq!(bucket, "default");
            assert_eq!(unexpected, vec![member_id(7)]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Config sync failing means nothing local can be trusted: the failing
/// bucket reports the error and the rest of the batch is not touched.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_sync_failure_aborts_batch() {
    let c = TestCluster::with_replicator(2, Arc::new(FailingReplicator)).await;

    // "steady" needs no sync: its map matches what the members report.
    c.create_bucket_with_map("steady", 1, 2, uniform_map(4, &[Some(1), Some(2)]));
    for vb in 0..4 {
        c.observe(
            "steady",
            vb,
            &[(1, ReplicaState::Active), (2, ReplicaState::Replica)],
        )
        .await;
    }
    // "fresh" forces a pull, which fails; "never" must not be touched.
    c.create_bucket("fresh", 8, 1, 2);
    c.create_bucket("never", 8, 1, 2);

    let batch: Vec<_> = ["steady", "fresh", "never"]
        .iter()
        .map(|name| (name.to_string(), options()))
        .collect();
    let results = c.janitor.cleanup_buckets(&batch).await;

    assert!(results[0].1.is_ok());
    assert_eq!(
        results[1].1.as_ref().unwrap_err().kind(),
        ErrorKind::Synchronization
    );
    assert_eq!(
        results[2].1.as_ref().unwrap_err().kind(),
        ErrorKind::Synchronization
    );
    assert!(c.map_of("never").is_none());
}
