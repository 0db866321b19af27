use thiserror::Error;

/// Errors from ring construction and map planning.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// Ring construction was given no nodes (or only zero-weight nodes).
    #[error("cannot build a ring with no nodes")]
    EmptyRing,

    /// Two assignments cover different partition sets and cannot be diffed.
    #[error("assignments cover different partitions ({left} vs {right})")]
    SizeMismatch {
        /// Partition count of the old assignment.
        left: usize,
        /// Partition count of the new assignment.
        right: usize,
    },

    /// The requested vbucket count is not a power of two.
    #[error("vbucket count {0} is not a power of two")]
    InvalidPartitionCount(u16),
}
