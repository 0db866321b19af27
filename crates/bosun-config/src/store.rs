//! [`ConfigStore`] implementation wrapping Fjall keyspaces.

use std::path::Path;

use bosun_types::{BucketConfig, CausalClock, NodeId, VbucketMap, Versioned};
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use tracing::debug;

use crate::ConfigError;

type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration store backed by Fjall.
///
/// Holds this node's copy of the replicated cluster configuration. Bucket
/// revisions carry causal clocks; [`ConfigStore::update_bucket`] refuses to
/// overwrite a revision the caller has not seen.
pub struct ConfigStore {
    /// The underlying Fjall database handle.
    #[allow(dead_code)]
    db: Database,
    /// Bucket name → serialized `Versioned<BucketConfig>`.
    buckets: Keyspace,
    /// Bucket name → serialized last-known-balanced `VbucketMap`.
    balanced: Keyspace,
    /// Node whose clock entry is bumped on local edits.
    local_node: NodeId,
}

impl ConfigStore {
    /// Open a persistent ConfigStore at the given path.
    pub fn open(path: impl AsRef<Path>, local_node: NodeId) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_keyspaces(db, local_node)
    }

    /// Open a temporary ConfigStore that is cleaned up on drop.
    ///
    /// Useful for tests.
    pub fn open_temporary(local_node: NodeId) -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(std::io::Error::other)?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init_keyspaces(db, local_node)
    }

    fn init_keyspaces(db: Database, local_node: NodeId) -> Result<Self> {
        let buckets = db.keyspace("buckets", KeyspaceCreateOptions::default)?;
        let balanced = db.keyspace("balanced", KeyspaceCreateOptions::default)?;
        Ok(Self {
            db,
            buckets,
            balanced,
            local_node,
        })
    }

    // ----- Buckets -----

    /// Create a bucket, seeding its clock at this node's first revision.
    pub fn create_bucket(&self, config: BucketConfig) -> Result<Versioned<BucketConfig>> {
        let key = config.name.clone();
        if self.buckets.get(key.as_bytes())?.is_some() {
            return Err(ConfigError::BucketExists(key));
        }
        let versioned = Versioned::initial(config, self.local_node);
        let value = postcard::to_allocvec(&versioned)?;
        self.buckets.insert(key.as_bytes(), value.as_slice())?;
        debug!(bucket = %key, "created bucket");
        Ok(versioned)
    }

    /// Retrieve a bucket's current revision by name.
    pub fn get_bucket(&self, name: &str) -> Result<Option<Versioned<BucketConfig>>> {
        match self.buckets.get(name.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Apply an edit on top of the revision the caller read.
    ///
    /// `base` must equal the stored clock exactly; anything else means the
    /// bucket changed since the caller's read and the edit is rejected with
    /// [`ConfigError::Conflict`]. On success the stored clock is bumped at
    /// this node and the new revision returned.
    pub fn update_bucket(
        &self,
        name: &str,
        base: &CausalClock,
        edit: impl FnOnce(&mut BucketConfig),
    ) -> Result<Versioned<BucketConfig>> {
        let stored = self
            .get_bucket(name)?
            .ok_or_else(|| ConfigError::BucketNotFound(name.to_string()))?;
        if stored.clock != *base {
            return Err(ConfigError::Conflict(name.to_string()));
        }

        let mut config = stored.value;
        edit(&mut config);
        let versioned = Versioned {
            value: config,
            clock: base.bump(self.local_node),
        };
        let value = postcard::to_allocvec(&versioned)?;
        self.buckets.insert(name.as_bytes(), value.as_slice())?;
        debug!(bucket = %name, "updated bucket");
        Ok(versioned)
    }

    /// Overwrite a bucket revision wholesale, clock included.
    ///
    /// This is the replication entry point: a revision learned from another
    /// node is installed as-is, without bumping the local clock.
    pub fn install_bucket(&self, versioned: &Versioned<BucketConfig>) -> Result<()> {
        let key = versioned.value.name.clone();
        let value = postcard::to_allocvec(versioned)?;
        self.buckets.insert(key.as_bytes(), value.as_slice())?;
        debug!(bucket = %key, "installed replicated bucket revision");
        Ok(())
    }

    /// Delete a bucket definition.
    pub fn remove_bucket(&self, name: &str) -> Result<()> {
        self.buckets.remove(name.as_bytes())?;
        self.balanced.remove(name.as_bytes())?;
        debug!(bucket = %name, "removed bucket");
        Ok(())
    }

    /// List all bucket names, sorted.
    pub fn list_buckets(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for guard in self.buckets.iter() {
            let k = guard.key()?;
            names.push(String::from_utf8_lossy(&k).into_owned());
        }
        names.sort();
        Ok(names)
    }

    // ----- Balanced map bookkeeping -----

    /// Record the map of a bucket that a full pass found balanced.
    pub fn record_balanced_map(&self, bucket: &str, map: &VbucketMap) -> Result<()> {
        let value = postcard::to_allocvec(map)?;
        self.balanced.insert(bucket.as_bytes(), value.as_slice())?;
        debug!(bucket, "recorded balanced map");
        Ok(())
    }

    /// The last map recorded as balanced for a bucket, if any.
    pub fn balanced_map(&self, bucket: &str) -> Result<Option<VbucketMap>> {
        match self.balanced.get(bucket.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}
