//! Error types for reconciliation passes.

use bosun_cluster::LeaseError;
use bosun_config::ConfigError;
use bosun_ring::RingError;
use bosun_types::{NodeId, VbId};

use crate::sync::SyncError;

/// Broad classification of a pass failure, used by callers to decide
/// whether a retry is worthwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Some nodes could not be observed; retry once they respond.
    Visibility,
    /// Proceeding could lose data; needs external reprovisioning.
    Safety,
    /// The stored configuration is wrong in a way the janitor must not
    /// auto-correct; needs operator attention.
    Consistency,
    /// Config replication or coordination failed; transient, retry.
    Synchronization,
    /// Some nodes refused the new config; reported per node.
    Apply,
}

/// Errors that can occur during a cleanup pass.
#[derive(Debug, thiserror::Error)]
pub enum JanitorError {
    /// The bucket is not in the configuration store.
    #[error("bucket {0:?} not found")]
    BucketNotFound(String),

    /// The bucket is paused or moving in/out of pause; nothing to reconcile.
    #[error("bucket {0:?} is hibernating")]
    BucketHibernating(String),

    /// Some servers did not answer the state query in time. Deciding
    /// without full visibility risks data loss, so the pass stops here.
    #[error("state query failed on {} node(s)", zombies.len())]
    StateQueryFailed {
        /// Servers that failed to respond.
        zombies: Vec<NodeId>,
    },

    /// Declared active owners whose copy is gone while replicas hold data.
    #[error("{} node(s) are unsafe to activate", nodes.len())]
    UnsafeNodes {
        /// The untrustworthy active owners.
        nodes: Vec<NodeId>,
    },

    /// The stored server list names nodes that are not active cluster
    /// members. Never auto-corrected by dropping members.
    #[error("server list of bucket {bucket:?} contains {} unexpected node(s)", unexpected.len())]
    CorruptedServerList {
        /// Bucket whose list is corrupt.
        bucket: String,
        /// Listed servers that are not active members.
        unexpected: Vec<NodeId>,
    },

    /// Vbuckets the sanifier refused to touch (conflicting active copies
    /// with no declared master among them).
    #[error("{} vbucket(s) are in conflicting states", vbuckets.len())]
    BadVbuckets {
        /// The untouchable vbuckets.
        vbuckets: Vec<VbId>,
    },

    /// Config pull or push failed; the whole batch aborts on this.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Some servers did not accept the new bucket config.
    #[error("applying config failed on {} node(s)", failures.len())]
    ApplyFailed {
        /// Per-node failure reasons.
        failures: Vec<(NodeId, String)>,
    },

    /// Some servers could not be marked warmed.
    #[error("marking as warmed failed on {} node(s)", failures.len())]
    MarkWarmedFailed {
        /// Per-node failure reasons.
        failures: Vec<(NodeId, String)>,
    },

    /// Lease acquisition failed (another janitor holds the resource, or
    /// quorum was not reached).
    #[error("lease error: {0}")]
    Lease(#[from] LeaseError),

    /// Configuration store error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Map planning error.
    #[error("placement error: {0}")]
    Ring(#[from] RingError),
}

impl JanitorError {
    /// Classify this error for retry and reporting decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StateQueryFailed { .. } => ErrorKind::Visibility,
            Self::UnsafeNodes { .. } => ErrorKind::Safety,
            Self::BucketNotFound(_)
            | Self::BucketHibernating(_)
            | Self::CorruptedServerList { .. }
            | Self::BadVbuckets { .. }
            | Self::Ring(_) => ErrorKind::Consistency,
            Self::Sync(_) | Self::Lease(_) | Self::Config(_) => ErrorKind::Synchronization,
            Self::ApplyFailed { .. } | Self::MarkWarmedFailed { .. } => ErrorKind::Apply,
        }
    }
}
