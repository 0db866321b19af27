use thiserror::Error;

/// Errors from lease acquisition.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The resource is already leased by someone else.
    #[error("lease on {resource:?} is already held")]
    Held {
        /// Resource the caller asked for.
        resource: String,
    },

    /// Not enough nodes acknowledged the lease to satisfy the quorum.
    #[error("no quorum for lease on {resource:?}")]
    NoQuorum {
        /// Resource the caller asked for.
        resource: String,
    },
}
