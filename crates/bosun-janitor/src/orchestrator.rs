//! The janitor pass state machine.
//!
//! One cleanup pass per bucket walks: fetch config, check the server list,
//! ensure an initial map exists, collect observed states, sanify, check for
//! unsafe nodes, persist and apply, mark warmed. Any failed check exits the
//! pass before a single map write happens. The whole pass runs under a
//! majority lease per bucket, and the apply step under an
//! all-target-servers lease, so at most one reconciliation is in flight
//! per bucket cluster-wide.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bosun_cluster::{ClusterState, LeaseService, Quorum};
use bosun_config::{ConfigError, ConfigStore, Replicator};
use bosun_ring::{exponent_for, initial_map, is_balanced};
use bosun_types::{BucketConfig, NodeId, StorageEngine, VbId, VbucketMap, Versioned};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::JanitorError;
use crate::node_api::NodeApi;
use crate::observer::{self, ObservedStates};
use crate::sanify;
use crate::sync::{SyncCoordinator, SyncError};
use crate::unsafe_nodes;

type Result<T> = std::result::Result<T, JanitorError>;

/// Knobs for one cleanup pass.
#[derive(Debug, Clone)]
pub struct CleanupOptions {
    /// How long to wait for each node's state answer; `None` waits
    /// indefinitely.
    pub query_timeout: Option<Duration>,
    /// Bound on each config pull or push.
    pub sync_timeout: Duration,
    /// Bound on each per-node apply and mark-warmed call.
    pub apply_timeout: Duration,
    /// Vbuckets to leave untouched for this pass.
    pub exclude_vbuckets: Vec<VbId>,
    /// Run the unsafe-node check even for persistent buckets.
    pub check_unsafe_nodes: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            query_timeout: Some(Duration::from_secs(10)),
            sync_timeout: Duration::from_secs(10),
            apply_timeout: Duration::from_secs(30),
            exclude_vbuckets: Vec::new(),
            check_unsafe_nodes: false,
        }
    }
}

/// Outcome of validating a bucket's server list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerListCheck {
    /// The stored list is usable as-is.
    Ok,
    /// The stored list is empty and should be replaced with these nodes.
    UpdateServers(Vec<NodeId>),
}

/// Validate a bucket's server list against the active cluster members.
///
/// An empty list is repaired from the desired servers, or failing that the
/// active members. A list naming nodes that are not active members is
/// corrupt and fails the pass; members are never silently dropped.
pub fn check_server_list(config: &BucketConfig, active: &[NodeId]) -> Result<ServerListCheck> {
    if config.servers.is_empty() {
        let servers = match &config.desired_servers {
            Some(desired) if !desired.is_empty() => desired.clone(),
            _ => active.to_vec(),
        };
        return Ok(ServerListCheck::UpdateServers(servers));
    }

    let unexpected: Vec<NodeId> = config
        .servers
        .iter()
        .filter(|server| !active.contains(server))
        .copied()
        .collect();
    if !unexpected.is_empty() {
        return Err(JanitorError::CorruptedServerList {
            bucket: config.name.clone(),
            unexpected,
        });
    }
    Ok(ServerListCheck::Ok)
}

/// Drives cleanup passes over buckets.
pub struct Janitor {
    cluster: Arc<ClusterState>,
    store: Arc<ConfigStore>,
    nodes: Arc<dyn NodeApi>,
    replicator: Arc<dyn Replicator>,
    leases: Arc<dyn LeaseService>,
    passes: AtomicU64,
}

impl Janitor {
    pub fn new(
        cluster: Arc<ClusterState>,
        store: Arc<ConfigStore>,
        nodes: Arc<dyn NodeApi>,
        replicator: Arc<dyn Replicator>,
        leases: Arc<dyn LeaseService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            store,
            nodes,
            replicator,
            leases,
            passes: AtomicU64::new(0),
        })
    }

    /// Number of passes started so far.
    pub fn pass_count(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run one cleanup pass for one bucket, under the bucket's lease.
    #[tracing::instrument(skip(self, options))]
    pub async fn cleanup(&self, bucket: &str, options: &CleanupOptions) -> Result<()> {
        let resource = format!("janitor/{bucket}");
        let _lease = self.leases.acquire(&resource, Quorum::Majority).await?;

        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(bucket, pass, "cleanup pass starting");
        self.run_pass(bucket, options).await
    }

    /// Clean several buckets, collecting a per-bucket outcome.
    ///
    /// Buckets fail independently, with one exception: a sync failure
    /// means the local config cannot be trusted for anything, so the
    /// remaining buckets of the batch are failed with the same cause
    /// without being touched.
    pub async fn cleanup_buckets(
        &self,
        buckets: &[(String, CleanupOptions)],
    ) -> Vec<(String, Result<()>)> {
        let mut results = Vec::with_capacity(buckets.len());
        let mut sync_failure: Option<SyncError> = None;
        for (bucket, options) in buckets {
            if let Some(error) = &sync_failure {
                results.push((bucket.clone(), Err(JanitorError::Sync(error.clone()))));
                continue;
            }
            let result = self.cleanup(bucket, options).await;
            if let Err(JanitorError::Sync(error)) = &result {
                sync_failure = Some(error.clone());
            }
            results.push((bucket.clone(), result));
        }
        results
    }

    async fn run_pass(&self, bucket: &str, options: &CleanupOptions) -> Result<()> {
        let sync = SyncCoordinator::new(Arc::clone(&self.replicator), options.sync_timeout);
        let active = self.cluster.active_members().await;

        let (mut revision, mut map) = self.prepare(bucket, &active).await?;

        let (observed, zombies) = observer::collect(
            &self.nodes,
            bucket,
            &revision.value.servers,
            &options.exclude_vbuckets,
            options.query_timeout,
        )
        .await;
        if !zombies.is_empty() {
            return Err(JanitorError::StateQueryFailed { zombies });
        }

        // A mismatch between the declared map and what the cluster reports
        // may mean this node's config is stale; pull and re-read before
        // deciding anything.
        if sync
            .pull_if_needed(&map, &observed, &options.exclude_vbuckets)
            .await?
        {
            (revision, map) = self.prepare(bucket, &active).await?;
        }

        let mut fixed = decide(&map, &revision.value, &observed, options)?;
        if fixed != map {
            (revision, fixed) = self
                .persist_fixed(bucket, revision, fixed, &observed, options, &sync, &active)
                .await?;
            info!(bucket, "persisted repaired vbucket map");
        }

        // Peers must converge on the corrected config before the nodes
        // are told to act on it.
        sync.push_if_needed(bucket, &fixed, &observed, &options.exclude_vbuckets)
            .await?;

        let servers = revision.value.servers.clone();
        {
            let resource = format!("janitor/{bucket}/apply");
            let _apply_lease = self
                .leases
                .acquire(&resource, Quorum::AllOf(servers.clone()))
                .await?;
            let failures = self
                .apply_everywhere(bucket, &servers, &revision.value, options.apply_timeout)
                .await;
            if !failures.is_empty() {
                return Err(JanitorError::ApplyFailed { failures });
            }
        }

        let failures = self
            .mark_warmed_everywhere(bucket, &servers, options.apply_timeout)
            .await;
        if !failures.is_empty() {
            return Err(JanitorError::MarkWarmedFailed { failures });
        }

        if is_balanced(&fixed, &servers) {
            self.store.record_balanced_map(bucket, &fixed)?;
        }

        info!(bucket, "bucket reconciled and healthy");
        Ok(())
    }

    /// Write the fixed-up map on top of `revision`.
    ///
    /// A conflict means some other writer got in between this pass's read
    /// and its write. The config is pulled, re-read, and the decision
    /// redone once on top of the winner's revision; a second conflict (or
    /// a failing pull) fails the pass. Returns the persisted revision and
    /// the map it carries.
    pub(crate) async fn persist_fixed(
        &self,
        bucket: &str,
        revision: Versioned<BucketConfig>,
        fixed: VbucketMap,
        observed: &ObservedStates,
        options: &CleanupOptions,
        sync: &SyncCoordinator,
        active: &[NodeId],
    ) -> Result<(Versioned<BucketConfig>, VbucketMap)> {
        let update = fixed.clone();
        let write = self.store.update_bucket(bucket, &revision.clock, move |config| {
            config.map = Some(update);
        });
        match write {
            Ok(updated) => Ok((updated, fixed)),
            Err(ConfigError::Conflict(_)) => {
                warn!(bucket, "map write conflicted, re-deciding on pulled config");
                sync.pull().await?;
                let (retry, retry_map) = self.prepare(bucket, active).await?;
                let fixed = decide(&retry_map, &retry.value, observed, options)?;
                if fixed == retry_map {
                    return Ok((retry, fixed));
                }
                let update = fixed.clone();
                let updated = self.store.update_bucket(bucket, &retry.clock, move |config| {
                    config.map = Some(update);
                })?;
                Ok((updated, fixed))
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Fetch the bucket config and make it fit to reconcile: refuse
    /// hibernating buckets, repair an empty server list, and plan the
    /// initial map if none exists yet. Every repair is persisted before
    /// the pass continues on the returned revision.
    async fn prepare(
        &self,
        bucket: &str,
        active: &[NodeId],
    ) -> Result<(Versioned<BucketConfig>, VbucketMap)> {
        let mut revision = self
            .store
            .get_bucket(bucket)?
            .ok_or_else(|| JanitorError::BucketNotFound(bucket.to_string()))?;

        if revision.value.hibernation.is_some() {
            return Err(JanitorError::BucketHibernating(bucket.to_string()));
        }

        match check_server_list(&revision.value, active)? {
            ServerListCheck::Ok => {}
            ServerListCheck::UpdateServers(servers) => {
                info!(bucket, count = servers.len(), "populating server list");
                revision = self
                    .store
                    .update_bucket(bucket, &revision.clock, move |config| {
                        config.servers = servers;
                    })?;
            }
        }

        let map = match &revision.value.map {
            Some(map) => map.clone(),
            None => {
                let exponent = exponent_for(revision.value.num_vbuckets)?;
                let planned = initial_map(
                    exponent,
                    revision.value.num_replicas,
                    &revision.value.servers,
                )?;
                info!(
                    bucket,
                    vbuckets = planned.num_vbuckets(),
                    "planned initial vbucket map"
                );
                let update = planned.clone();
                revision = self
                    .store
                    .update_bucket(bucket, &revision.clock, move |config| {
                        config.map = Some(update);
                    })?;
                planned
            }
        };

        Ok((revision, map))
    }

    async fn apply_everywhere(
        &self,
        bucket: &str,
        servers: &[NodeId],
        config: &BucketConfig,
        timeout: Duration,
    ) -> Vec<(NodeId, String)> {
        let mut join_set = JoinSet::new();
        for server in servers {
            let api = Arc::clone(&self.nodes);
            let bucket = bucket.to_string();
            let config = config.clone();
            let server = *server;
            join_set.spawn(async move {
                let call = api.apply_bucket_config(&bucket, server, &config);
                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result.map_err(|error| error.to_string()),
                    Err(_) => Err(format!("timed out after {timeout:?}")),
                };
                (server, result)
            });
        }
        drain_failures(join_set, servers).await
    }

    async fn mark_warmed_everywhere(
        &self,
        bucket: &str,
        servers: &[NodeId],
        timeout: Duration,
    ) -> Vec<(NodeId, String)> {
        let mut join_set = JoinSet::new();
        for server in servers {
            let api = Arc::clone(&self.nodes);
            let bucket = bucket.to_string();
            let server = *server;
            join_set.spawn(async move {
                let call = api.mark_bucket_warmed(&bucket, server);
                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result.map_err(|error| error.to_string()),
                    Err(_) => Err(format!("timed out after {timeout:?}")),
                };
                (server, result)
            });
        }
        drain_failures(join_set, servers).await
    }
}

impl std::fmt::Debug for Janitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Janitor")
            .field("passes", &self.pass_count())
            .finish_non_exhaustive()
    }
}

/// Sanify the map and safety-check the result. Fails instead of returning
/// a map whenever any vbucket is untouchable or any node is unsafe.
fn decide(
    map: &VbucketMap,
    config: &BucketConfig,
    observed: &ObservedStates,
    options: &CleanupOptions,
) -> Result<VbucketMap> {
    let (fixed, ignored) = sanify::sanify_map(
        map,
        config.fast_forward_map.as_ref(),
        observed,
        &options.exclude_vbuckets,
    );
    if !ignored.is_empty() {
        return Err(JanitorError::BadVbuckets { vbuckets: ignored });
    }

    let check_unsafe = config.storage == StorageEngine::Ephemeral || options.check_unsafe_nodes;
    let nodes = unsafe_nodes::find_unsafe_nodes(&fixed, observed, check_unsafe);
    if !nodes.is_empty() {
        return Err(JanitorError::UnsafeNodes { nodes });
    }

    Ok(fixed)
}

/// Join a per-server fan-out and collect failures, attributing tasks that
/// never reported back to their servers.
async fn drain_failures(
    mut join_set: JoinSet<(NodeId, std::result::Result<(), String>)>,
    servers: &[NodeId],
) -> Vec<(NodeId, String)> {
    let mut failures = Vec::new();
    let mut pending: BTreeSet<NodeId> = servers.iter().copied().collect();
    while let Some(joined) = join_set.join_next().await {
        let Ok((server, result)) = joined else {
            continue;
        };
        pending.remove(&server);
        if let Err(reason) = result {
            failures.push((server, reason));
        }
    }
    for server in pending {
        failures.push((server, "task aborted".to_string()));
    }
    failures.sort_by_key(|(node, _)| *node);
    failures
}
