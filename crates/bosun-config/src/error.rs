//! Error types for the configuration store.

/// Errors returned by [`ConfigStore`](crate::ConfigStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Fjall database error.
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    /// I/O error (e.g. from Fjall guard operations).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] postcard::Error),

    /// Tried to create a bucket that already exists.
    #[error("bucket {0:?} already exists")]
    BucketExists(String),

    /// The named bucket is not in the store.
    #[error("bucket {0:?} not found")]
    BucketNotFound(String),

    /// An update was based on a clock that no longer matches the stored
    /// revision.
    #[error("bucket {0:?} was modified concurrently")]
    Conflict(String),
}
