//! Shared test harness for bosun integration tests.
//!
//! Provides [`TestCluster`]: N named members backed by simulated data
//! nodes, a temporary config store, local leases, and a janitor wired over
//! them. Fault injection goes through [`bosun_janitor::MemoryNodes`]
//! (down, hung, wiped nodes) and through replicators that fail or count.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bosun_cluster::{ClusterState, LeaseService, LocalLeases};
use bosun_config::{ConfigStore, NoopReplicator, ReplicationError, Replicator};
use bosun_janitor::{CleanupOptions, Janitor, JanitorError, MemoryNodes, NodeApi};
use bosun_types::{
    BucketConfig, Chain, Member, MemberState, NodeId, ReplicaState, VbId, VbucketMap,
};

// =========================================================================
// Identity helpers
// =========================================================================

/// Deterministic ID of the i-th member. IDs sort in member order, so
/// assertions against sorted node lists stay readable.
pub fn member_id(i: u8) -> NodeId {
    NodeId::from([i; 32])
}

/// Chain from member numbers; `None` is an unassigned slot.
pub fn chain(slots: &[Option<u8>]) -> Chain {
    Chain::new(slots.iter().map(|slot| slot.map(member_id)).collect())
}

/// A map with the same chain for every vbucket.
pub fn uniform_map(vbuckets: u16, slots: &[Option<u8>]) -> VbucketMap {
    VbucketMap::from_chains(vec![chain(slots); vbuckets as usize])
}

/// Pass options with short timeouts so fault tests finish quickly.
pub fn options() -> CleanupOptions {
    CleanupOptions {
        query_timeout: Some(Duration::from_millis(250)),
        sync_timeout: Duration::from_secs(1),
        apply_timeout: Duration::from_secs(1),
        ..CleanupOptions::default()
    }
}

// =========================================================================
// Replicators
// =========================================================================

/// Counts pulls and pushes without moving any data.
#[derive(Debug, Default)]
pub struct RecordingReplicator {
    pulls: AtomicUsize,
    pushes: AtomicUsize,
}

impl RecordingReplicator {
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::Relaxed)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Replicator for RecordingReplicator {
    async fn pull(&self) -> Result<(), ReplicationError> {
        self.pulls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn push(&self, _buckets: &[String]) -> Result<(), ReplicationError> {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// A replicator whose peers are all unreachable.
#[derive(Debug, Clone, Copy)]
pub struct FailingReplicator;

#[async_trait::async_trait]
impl Replicator for FailingReplicator {
    async fn pull(&self) -> Result<(), ReplicationError> {
        Err(ReplicationError::new("no peers reachable"))
    }

    async fn push(&self, _buckets: &[String]) -> Result<(), ReplicationError> {
        Err(ReplicationError::new("no peers reachable"))
    }
}

// =========================================================================
// TestCluster
// =========================================================================

/// A simulated N-member cluster for reconciliation tests.
pub struct TestCluster {
    pub cluster: Arc<ClusterState>,
    pub nodes: Arc<MemoryNodes>,
    pub store: Arc<ConfigStore>,
    pub leases: Arc<LocalLeases>,
    pub janitor: Arc<Janitor>,
}

impl TestCluster {
    /// N members named `node-1..=node-N`, all active, each backed by a
    /// simulated data node.
    pub async fn new(n: u8) -> Self {
        Self::with_replicator(n, Arc::new(NoopReplicator)).await
    }

    pub async fn with_replicator(n: u8, replicator: Arc<dyn Replicator>) -> Self {
        assert!(n >= 1, "need at least 1 member");

        let cluster = ClusterState::new(member_id(1));
        let nodes = MemoryNodes::new();
        for i in 1..=n {
            cluster
                .add_member(Member {
                    node_id: member_id(i),
                    name: format!("node-{i}"),
                    state: MemberState::Active,
                    generation: 1,
                })
                .await;
            nodes.add_node(member_id(i)).await;
        }

        let store = Arc::new(ConfigStore::open_temporary(member_id(1)).unwrap());
        let leases = Arc::new(LocalLeases::new());
        let janitor = Janitor::new(
            Arc::clone(&cluster),
            Arc::clone(&store),
            Arc::clone(&nodes) as Arc<dyn NodeApi>,
            replicator,
            Arc::clone(&leases) as Arc<dyn LeaseService>,
        );

        Self {
            cluster,
            nodes,
            store,
            leases,
            janitor,
        }
    }

    /// The first `count` member IDs, in order.
    pub fn members(&self, count: u8) -> Vec<NodeId> {
        (1..=count).map(member_id).collect()
    }

    /// Create a bucket hosted on the first `servers` members. With
    /// `servers == 0` the list starts empty, leaving population to the
    /// janitor.
    pub fn create_bucket(&self, name: &str, vbuckets: u16, replicas: u8, servers: u8) {
        let mut config = BucketConfig::new(name, vbuckets, replicas);
        config.servers = self.members(servers);
        self.store.create_bucket(config).unwrap();
    }

    /// Create a bucket with a declared map already in place.
    pub fn create_bucket_with_map(&self, name: &str, replicas: u8, servers: u8, map: VbucketMap) {
        let mut config = BucketConfig::new(name, map.num_vbuckets() as u16, replicas);
        config.servers = self.members(servers);
        config.map = Some(map);
        self.store.create_bucket(config).unwrap();
    }

    /// One cleanup pass with test-friendly timeouts.
    pub async fn cleanup(&self, bucket: &str) -> Result<(), JanitorError> {
        self.janitor.cleanup(bucket, &options()).await
    }

    /// The declared map of a bucket, straight from the store.
    pub fn map_of(&self, bucket: &str) -> Option<VbucketMap> {
        self.store.get_bucket(bucket).unwrap().unwrap().value.map
    }

    /// Record observed states for one vbucket on several members.
    pub async fn observe(&self, bucket: &str, vb: VbId, states: &[(u8, ReplicaState)]) {
        for (member, state) in states {
            self.nodes
                .set_state(member_id(*member), bucket, vb, *state)
                .await;
        }
    }

    /// Assert every member holds exactly the states `map` assigns it.
    pub async fn assert_settled(&self, bucket: &str, map: &VbucketMap, members: u8) {
        for member in 1..=members {
            let states = self.nodes.states_of(member_id(member), bucket).await;
            for (vb, chain) in map.iter() {
                match chain.position(&member_id(member)) {
                    Some(0) => assert_eq!(
                        states.get(&vb),
                        Some(&ReplicaState::Active),
                        "member {member} should be active for vb {vb}"
                    ),
                    Some(_) => assert_eq!(
                        states.get(&vb),
                        Some(&ReplicaState::Replica),
                        "member {member} should be replica for vb {vb}"
                    ),
                    None => assert!(
                        !states.contains_key(&vb),
                        "member {member} should hold no copy of vb {vb}"
                    ),
                }
            }
        }
    }
}
