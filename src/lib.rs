//! # CAVDB - A Content-Addressed Vector Store
//!
//! CAVDB persists fixed-dimension `f64` feature vectors (e.g. image
//! embeddings), deduplicates them by content, and answers k-nearest-neighbor
//! queries by exact Euclidean distance.
//!
//! Each vector's id is the SHA-256 fingerprint of its content, so inserting
//! the same vector twice is a no-op and references stay stable. Queries
//! return the true distance ranking regardless of insertion order, with ties
//! broken by ascending id; acceleration strategies are pluggable behind
//! [`index::NearestNeighborIndex`] as long as they keep that ordering.
//!
//! ## Example
//!
//! ```
//! use cavdb::VecStore;
//!
//! let store = VecStore::new(2);
//!
//! // Inserts are idempotent: identical content converges to one record
//! let (id, inserted) = store.insert(vec![1.0, 0.0]).unwrap();
//! assert!(inserted);
//! let (same_id, inserted) = store.insert(vec![1.0, 0.0]).unwrap();
//! assert!(!inserted);
//! assert_eq!(id, same_id);
//!
//! store.insert(vec![0.0, 1.0]).unwrap();
//!
//! // Exact nearest neighbors, ascending distance
//! let results = store.knn(&[0.9, 0.1], 1).unwrap();
//! assert_eq!(results[0].0.id, id);
//! ```

pub mod error;
pub mod fingerprint;
pub mod index;
pub mod server;
pub mod vector;
mod db;

// Re-export the primary public API
pub use db::{VecStore, VectorRecord, DEFAULT_DIMENSION};
pub use error::StoreError;
