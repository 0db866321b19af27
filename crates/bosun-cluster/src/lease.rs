//! Leadership leases for maintenance work.
//!
//! Cleanup passes must not race each other: before touching a bucket, the
//! janitor takes a [`Lease`] on a resource name through a [`LeaseService`].
//! The lease is held for as long as the guard lives and released on drop,
//! so an early return or panic in the holder cannot strand the resource.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bosun_types::NodeId;

use crate::LeaseError;

/// How many nodes must acknowledge a lease before it is granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quorum {
    /// A majority of the current cluster members.
    Majority,
    /// Every one of the named nodes, no substitutes.
    AllOf(Vec<NodeId>),
}

/// An exclusive claim on a resource, released when dropped.
pub struct Lease {
    resource: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Lease {
    /// Wrap a granted claim with its release action.
    pub fn new(resource: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            resource: resource.into(),
            release: Some(Box::new(release)),
        }
    }

    /// The resource this lease covers.
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Grants exclusive leases on named resources.
#[async_trait]
pub trait LeaseService: Send + Sync {
    /// Claim `resource` against `quorum`, or fail if it is already held
    /// or too few nodes acknowledge the claim.
    async fn acquire(&self, resource: &str, quorum: Quorum) -> Result<Lease, LeaseError>;
}

/// In-process lease registry.
///
/// In a single-node deployment this process is every quorum by itself, so
/// both quorum kinds reduce to a local exclusivity check.
#[derive(Debug, Default, Clone)]
pub struct LocalLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LocalLeases {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // A poisoned registry only means a holder panicked; the set itself
        // is still consistent.
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LeaseService for LocalLeases {
    async fn acquire(&self, resource: &str, _quorum: Quorum) -> Result<Lease, LeaseError> {
        if !self.registry().insert(resource.to_string()) {
            return Err(LeaseError::Held {
                resource: resource.to_string(),
            });
        }

        let held = Arc::clone(&self.held);
        let name = resource.to_string();
        Ok(Lease::new(resource, move || {
            held.lock().unwrap_or_else(|e| e.into_inner()).remove(&name);
        }))
    }
}
