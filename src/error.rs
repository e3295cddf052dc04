//! Error types shared across the store.

/// Errors surfaced by store operations.
///
/// Every operation returns its failure to the immediate caller; the store
/// never retries or swallows an error internally.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// A vector's length does not match the store dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A caller-supplied argument is out of range (negative k, non-finite
    /// vector component).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup by id found no record.
    #[error("vector not found: {0}")]
    NotFound(String),

    /// Backing storage failed (I/O, serialization, poisoned lock).
    #[error("storage failure: {0}")]
    Storage(String),
}
