//! Replication seam for the configuration store.

use async_trait::async_trait;

/// A pull or push against the rest of the cluster failed.
///
/// Cloneable so one synchronization failure can be attributed to every
/// bucket a batch pass had not reached yet.
#[derive(Debug, Clone, thiserror::Error)]
#[error("config replication failed: {0}")]
pub struct ReplicationError(String);

impl ReplicationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Moves configuration revisions between this node and its peers.
///
/// `pull` brings in remote revisions (installing any that causally dominate
/// the local ones), `push` offers local revisions of the named buckets to
/// peers. Both are best effort against a quorum of reachable nodes; an error
/// means the caller cannot assume the config is in sync.
#[async_trait]
pub trait Replicator: Send + Sync {
    async fn pull(&self) -> Result<(), ReplicationError>;

    async fn push(&self, buckets: &[String]) -> Result<(), ReplicationError>;
}

/// Replicator for single-node deployments: there are no peers, so every
/// exchange trivially succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReplicator;

#[async_trait]
impl Replicator for NoopReplicator {
    async fn pull(&self) -> Result<(), ReplicationError> {
        Ok(())
    }

    async fn push(&self, _buckets: &[String]) -> Result<(), ReplicationError> {
        Ok(())
    }
}
