//! Content fingerprinting for vectors.
//!
//! A vector's identifier is derived solely from its content, so identical
//! vectors always map to the same id and an insert of already-present
//! content can be detected before anything is written.
//!
//! Canonical encoding, fixed for the lifetime of any store file: each
//! component's IEEE-754 little-endian 8-byte representation, concatenated in
//! index order. Fixed-width fields need no separator, and the encoding is
//! independent of any textual float formatting. Identity is therefore
//! bit-pattern identity: `0.0` and `-0.0` hash to different ids.

use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Length in characters of a hex-encoded fingerprint.
pub const FINGERPRINT_LEN: usize = 64;

/// Computes the content fingerprint of a vector.
///
/// Returns the SHA-256 digest of the canonical encoding as a 64-character
/// lowercase hex string, suitable as a primary key.
///
/// # Errors
///
/// `DimensionMismatch` when `vector.len() != dimension`.
///
/// # Examples
///
/// ```
/// use cavdb::fingerprint::fingerprint;
///
/// let id = fingerprint(&[1.0, 2.0], 2).unwrap();
/// assert_eq!(id.len(), 64);
/// // Same content, same id
/// assert_eq!(id, fingerprint(&[1.0, 2.0], 2).unwrap());
/// // Reordered content, different id
/// assert_ne!(id, fingerprint(&[2.0, 1.0], 2).unwrap());
/// ```
pub fn fingerprint(vector: &[f64], dimension: usize) -> Result<String, StoreError> {
    if vector.len() != dimension {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            got: vector.len(),
        });
    }

    let mut hasher = Sha256::new();
    for component in vector {
        hasher.update(component.to_le_bytes());
    }

    let digest = hasher.finalize();
    let mut id = String::with_capacity(FINGERPRINT_LEN);
    for byte in digest {
        id.push_str(&format!("{:02x}", byte));
    }

    Ok(id)
}
