//! The database module
//! Provide the content-addressed record store and the KNN entry point

use crate::error::StoreError;
use crate::fingerprint::fingerprint;
use crate::index::{BruteForceIndex, NearestNeighborIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter},
    sync::RwLock,
};

/// Dimension used when no explicit dimension is given (CLI, server default).
pub const DEFAULT_DIMENSION: usize = 128;

/// One stored vector. Immutable once stored: records are only ever created,
/// never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    /// Content fingerprint, 64 hex characters. Identical vector content
    /// always yields the same id.
    pub id: String,
    pub vector: Vec<f64>,
    /// Assigned once at first successful insert; non-decreasing across the
    /// records of one store.
    pub created_at: DateTime<Utc>,
}

struct StoreState {
    records: BTreeMap<String, VectorRecord>,
    index: Box<dyn NearestNeighborIndex>,
    last_created_at: Option<DateTime<Utc>>,
}

/// On-disk snapshot. The index is derived state and is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct PersistedStore {
    dimension: usize,
    records: BTreeMap<String, VectorRecord>,
    last_created_at: Option<DateTime<Utc>>,
}

/// A content-addressed store of fixed-dimension vectors with exact KNN
/// queries.
///
/// All operations take `&self`: the record collection lives behind one
/// `RwLock`, so one store instance can be shared by concurrent callers.
/// The insert check-then-write runs entirely under the write lock, which is
/// what keeps inserts of identical content converging to a single record.
pub struct VecStore {
    dimension: usize,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for VecStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VecStore")
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl VecStore {
    /// Creates a new empty store for vectors of the given dimension, ranked
    /// by the brute-force baseline index.
    ///
    /// # Examples
    ///
    /// ```
    /// use cavdb::VecStore;
    ///
    /// let store = VecStore::new(128);
    /// assert_eq!(store.count(), 0);
    /// ```
    pub fn new(dimension: usize) -> VecStore {
        VecStore::with_index(dimension, Box::new(BruteForceIndex::new()))
    }

    /// Creates a new empty store with a caller-chosen index strategy.
    ///
    /// The index must be empty and built for the same dimension. Any
    /// strategy must preserve the exact `(distance, id)` ordering; see
    /// [`crate::index`].
    ///
    /// # Examples
    ///
    /// ```
    /// use cavdb::VecStore;
    /// use cavdb::index::KdTreeIndex;
    ///
    /// let store = VecStore::with_index(2, Box::new(KdTreeIndex::new(2)));
    /// store.insert(vec![1.0, 0.0]).unwrap();
    /// assert_eq!(store.knn(&[0.0, 0.0], 1).unwrap()[0].1, 1.0);
    /// ```
    pub fn with_index(dimension: usize, index: Box<dyn NearestNeighborIndex>) -> VecStore {
        VecStore {
            dimension,
            state: RwLock::new(StoreState {
                records: BTreeMap::new(),
                index,
                last_created_at: None,
            }),
        }
    }

    /// The fixed vector dimension of this store.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Inserts a vector if its content is not already stored.
    ///
    /// The id is the content fingerprint, computed before the write
    /// decision. Returns the id and whether a new record was created;
    /// re-inserting identical content is a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` - vector length differs from the store dimension
    /// * `InvalidArgument` - a component is NaN or infinite
    ///
    /// Both are checked before any mutation, so a failed insert leaves the
    /// store unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use cavdb::VecStore;
    ///
    /// let store = VecStore::new(2);
    ///
    /// let (id, inserted) = store.insert(vec![1.0, 2.0]).unwrap();
    /// assert!(inserted);
    ///
    /// // Same content: same id, nothing stored twice
    /// let (again, inserted) = store.insert(vec![1.0, 2.0]).unwrap();
    /// assert_eq!(id, again);
    /// assert!(!inserted);
    /// assert_eq!(store.count(), 1);
    ///
    /// // Dimension mismatch is rejected before any mutation
    /// assert!(store.insert(vec![1.0, 2.0, 3.0]).is_err());
    /// assert_eq!(store.count(), 1);
    /// ```
    pub fn insert(&self, vector: Vec<f64>) -> Result<(String, bool), StoreError> {
        self.check_vector(&vector)?;
        let id = fingerprint(&vector, self.dimension)?;

        let mut state = self.write_state()?;
        if state.records.contains_key(&id) {
            return Ok((id, false));
        }

        // Clamp to the previous maximum so created_at never decreases even
        // if the wall clock does
        let now = Utc::now();
        let created_at = match state.last_created_at {
            Some(prev) if prev > now => prev,
            _ => now,
        };

        state.records.insert(
            id.clone(),
            VectorRecord { id: id.clone(), vector: vector.clone(), created_at },
        );
        state.index.add(id.clone(), vector);
        state.last_created_at = Some(created_at);

        Ok((id, true))
    }

    /// Retrieves a record by its id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no record has this id.
    ///
    /// # Examples
    ///
    /// ```
    /// use cavdb::VecStore;
    ///
    /// let store = VecStore::new(2);
    /// let (id, _) = store.insert(vec![3.0, 4.0]).unwrap();
    ///
    /// assert_eq!(store.get(&id).unwrap().vector, vec![3.0, 4.0]);
    /// assert!(store.get("no such id").is_err());
    /// ```
    pub fn get(&self, id: &str) -> Result<VectorRecord, StoreError> {
        let state = self.read_state()?;
        state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Returns the number of distinct records.
    pub fn count(&self) -> usize {
        self.state.read().map(|state| state.records.len()).unwrap_or(0)
    }

    /// Returns a snapshot of all records, ordered by id.
    ///
    /// Each call takes a fresh snapshot of the store state at call time; the
    /// returned records are owned and unaffected by later inserts.
    pub fn scan(&self) -> Vec<VectorRecord> {
        self.state
            .read()
            .map(|state| state.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the `min(k, count)` records nearest to `probe` by exact
    /// Euclidean distance, as `(record, distance)` pairs in ascending
    /// `(distance, id)` order.
    ///
    /// Read-only: either the full ranking is returned or an error, never a
    /// partial result. An empty store or `k == 0` yields an empty vector.
    ///
    /// # Errors
    ///
    /// * `DimensionMismatch` - probe length differs from the store dimension
    /// * `InvalidArgument` - a probe component is NaN or infinite
    ///
    /// # Examples
    ///
    /// ```
    /// use cavdb::VecStore;
    ///
    /// let store = VecStore::new(2);
    /// store.insert(vec![0.0, 0.0]).unwrap();
    /// store.insert(vec![3.0, 4.0]).unwrap();
    ///
    /// let results = store.knn(&[0.0, 0.0], 2).unwrap();
    /// assert_eq!(results[0].1, 0.0);
    /// assert_eq!(results[1].1, 5.0);
    /// ```
    pub fn knn(&self, probe: &[f64], k: usize) -> Result<Vec<(VectorRecord, f64)>, StoreError> {
        self.check_vector(probe)?;

        let state = self.read_state()?;
        let neighbors = state.index.search(probe, k)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let record = state.records.get(&neighbor.id).cloned().ok_or_else(|| {
                StoreError::Storage(format!("index entry '{}' missing from records", neighbor.id))
            })?;
            results.push((record, neighbor.distance));
        }

        Ok(results)
    }

    /// Saves the store to a file using bincode serialization.
    ///
    /// Snapshots the records under the read lock, then writes with buffered
    /// I/O. The index is not persisted; [`VecStore::load`] rebuilds it.
    pub fn save(&self, path: &str) -> Result<(), StoreError> {
        let snapshot = {
            let state = self.read_state()?;
            PersistedStore {
                dimension: self.dimension,
                records: state.records.clone(),
                last_created_at: state.last_created_at,
            }
        };

        let file = File::create(path)
            .map_err(|e| StoreError::Storage(format!("fail to create file for saving '{}': {}", path, e)))?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, &snapshot)
            .map_err(|e| StoreError::Storage(format!("serialization failed: {}", e)))?;

        Ok(())
    }

    /// Loads a store from a file previously saved with [`save`](VecStore::save).
    ///
    /// The index is rebuilt from the records. A file whose records disagree
    /// with its recorded dimension is rejected as corrupt.
    pub fn load(path: &str) -> Result<VecStore, StoreError> {
        if !std::path::Path::new(path).exists() {
            return Err(StoreError::Storage(format!("file not found: '{}'", path)));
        }

        let file = File::open(path)
            .map_err(|e| StoreError::Storage(format!("fail to open file '{}': {}", path, e)))?;
        let reader = BufReader::new(file);
        let persisted: PersistedStore = bincode::deserialize_from(reader)
            .map_err(|e| StoreError::Storage(format!("deserialization failed: {}", e)))?;

        for record in persisted.records.values() {
            if record.vector.len() != persisted.dimension {
                return Err(StoreError::Storage(format!(
                    "corrupt store file: record '{}' has dimension {}, store dimension is {}",
                    record.id,
                    record.vector.len(),
                    persisted.dimension
                )));
            }
        }

        let store = VecStore::new(persisted.dimension);
        {
            let mut state = store.write_state()?;
            for (id, record) in persisted.records {
                state.index.add(id.clone(), record.vector.clone());
                state.records.insert(id, record);
            }
            state.last_created_at = persisted.last_created_at;
        }

        Ok(store)
    }

    fn check_vector(&self, vector: &[f64]) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        if let Some(position) = vector.iter().position(|c| !c.is_finite()) {
            return Err(StoreError::InvalidArgument(format!(
                "non-finite vector component at index {}",
                position
            )));
        }
        Ok(())
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("poisoned store lock".to_string()))
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("poisoned store lock".to_string()))
    }
}

#[cfg(test)]
mod db_test {
    use super::*;
    use crate::index::KdTreeIndex;

    #[test]
    fn test_insert_single_vector() {
        let store = VecStore::new(3);
        let (id, inserted) = store.insert(vec![1.0, 2.0, 3.0]).unwrap();

        assert!(inserted);
        assert_eq!(id.len(), 64);
        assert_eq!(store.count(), 1);
        assert_eq!(store.get(&id).unwrap().vector, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = VecStore::new(2);

        let (first_id, first) = store.insert(vec![1.0, 2.0]).unwrap();
        let (second_id, second) = store.insert(vec![1.0, 2.0]).unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(first_id, second_id);
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_insert_distinct_content_gets_distinct_ids() {
        let store = VecStore::new(2);

        let (a, _) = store.insert(vec![1.0, 2.0]).unwrap();
        let (b, _) = store.insert(vec![2.0, 1.0]).unwrap();

        assert_ne!(a, b);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_insert_dimension_mismatch_leaves_store_unchanged() {
        let store = VecStore::new(3);
        store.insert(vec![1.0, 2.0, 3.0]).unwrap();

        let result = store.insert(vec![1.0, 2.0]);

        assert_eq!(
            result,
            Err(StoreError::DimensionMismatch { expected: 3, got: 2 })
        );
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_insert_non_finite_rejected() {
        let store = VecStore::new(2);

        assert!(matches!(
            store.insert(vec![1.0, f64::NAN]),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.insert(vec![f64::INFINITY, 0.0]),
            Err(StoreError::InvalidArgument(_))
        ));
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = VecStore::new(2);
        store.insert(vec![1.0, 2.0]).unwrap();

        let result = store.get("0000000000000000000000000000000000000000000000000000000000000000");

        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_scan_is_id_ordered_snapshot() {
        let store = VecStore::new(2);
        store.insert(vec![1.0, 0.0]).unwrap();
        store.insert(vec![0.0, 1.0]).unwrap();
        store.insert(vec![5.0, 5.0]).unwrap();

        let snapshot = store.scan();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.windows(2).all(|w| w[0].id < w[1].id));

        // Later inserts do not affect an already-taken snapshot
        store.insert(vec![7.0, 7.0]).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(store.scan().len(), 4);
    }

    #[test]
    fn test_created_at_set_once_and_non_decreasing() {
        let store = VecStore::new(1);

        let (a, _) = store.insert(vec![1.0]).unwrap();
        let first = store.get(&a).unwrap().created_at;

        let (b, _) = store.insert(vec![2.0]).unwrap();
        assert!(store.get(&b).unwrap().created_at >= first);

        // Re-insert does not touch the original timestamp
        store.insert(vec![1.0]).unwrap();
        assert_eq!(store.get(&a).unwrap().created_at, first);
    }

    #[test]
    fn test_knn_exact_ordering_with_tie() {
        let store = VecStore::new(2);
        store.insert(vec![0.0, 0.0]).unwrap();
        store.insert(vec![1.0, 0.0]).unwrap();
        store.insert(vec![0.0, 1.0]).unwrap();
        store.insert(vec![5.0, 5.0]).unwrap();

        let top2 = store.knn(&[0.0, 0.0], 2).unwrap();
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].0.vector, vec![0.0, 0.0]);
        assert_eq!(top2[0].1, 0.0);
        assert_eq!(top2[1].1, 1.0);

        // The two distance-1 records tie; the lexicographically smaller id
        // must come first
        let id_10 = fingerprint(&[1.0, 0.0], 2).unwrap();
        let id_01 = fingerprint(&[0.0, 1.0], 2).unwrap();
        let smaller = if id_10 < id_01 { &id_10 } else { &id_01 };
        assert_eq!(&top2[1].0.id, smaller);

        let all = store.knn(&[0.0, 0.0], 4).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].0.vector, vec![5.0, 5.0]);
        assert!((all[3].1 - 50.0_f64.sqrt()).abs() < 1e-12);
        assert!(all.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_knn_k_edge_cases() {
        let store = VecStore::new(2);

        // Empty store: empty result, not an error
        assert!(store.knn(&[0.0, 0.0], 3).unwrap().is_empty());

        store.insert(vec![1.0, 1.0]).unwrap();
        store.insert(vec![2.0, 2.0]).unwrap();

        assert!(store.knn(&[0.0, 0.0], 0).unwrap().is_empty());
        // k beyond the store size returns everything
        assert_eq!(store.knn(&[0.0, 0.0], 7).unwrap().len(), 2);
    }

    #[test]
    fn test_knn_probe_guards() {
        let store = VecStore::new(2);
        store.insert(vec![1.0, 1.0]).unwrap();

        assert_eq!(
            store.knn(&[1.0], 1),
            Err(StoreError::DimensionMismatch { expected: 2, got: 1 })
        );
        assert!(matches!(
            store.knn(&[f64::NAN, 0.0], 1),
            Err(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_knn_with_kd_tree_matches_brute_force() {
        let brute = VecStore::new(3);
        let tree = VecStore::with_index(3, Box::new(KdTreeIndex::new(3)));

        let data = [
            vec![0.0, 0.0, 0.0],
            vec![1.0, 0.5, -0.5],
            vec![0.2, 0.2, 0.2],
            vec![-3.0, 1.0, 2.0],
            vec![0.21, 0.19, 0.2],
        ];
        for v in &data {
            brute.insert(v.clone()).unwrap();
            tree.insert(v.clone()).unwrap();
        }

        // Compare ids and distances; created_at differs between the stores
        let expected: Vec<(String, f64)> = brute
            .knn(&[0.2, 0.2, 0.2], 5)
            .unwrap()
            .into_iter()
            .map(|(record, distance)| (record.id, distance))
            .collect();
        let actual: Vec<(String, f64)> = tree
            .knn(&[0.2, 0.2, 0.2], 5)
            .unwrap()
            .into_iter()
            .map(|(record, distance)| (record.id, distance))
            .collect();

        assert_eq!(actual, expected);
    }

    #[test]
    fn test_concurrent_identical_inserts_converge() {
        use std::sync::Arc;

        let store = Arc::new(VecStore::new(4));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store.insert(vec![1.0, 2.0, 3.0, 4.0]).unwrap()
            }));
        }

        let outcomes: Vec<(String, bool)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Exactly one caller created the record; all saw the same id
        assert_eq!(store.count(), 1);
        assert_eq!(outcomes.iter().filter(|(_, inserted)| *inserted).count(), 1);
        assert!(outcomes.windows(2).all(|w| w[0].0 == w[1].0));
    }

    // ========== Save/Load Tests ==========

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let path_str = path.to_str().unwrap();

        let store = VecStore::new(3);
        let (id, _) = store.insert(vec![1.0, 0.0, 0.0]).unwrap();
        store.insert(vec![0.0, 1.0, 0.0]).unwrap();
        let created_at = store.get(&id).unwrap().created_at;

        store.save(path_str).unwrap();
        let loaded = VecStore::load(path_str).unwrap();

        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.count(), 2);
        let record = loaded.get(&id).unwrap();
        assert_eq!(record.vector, vec![1.0, 0.0, 0.0]);
        assert_eq!(record.created_at, created_at);

        // Dedup survives the round trip
        let (same_id, inserted) = loaded.insert(vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(same_id, id);
        assert!(!inserted);

        // So does the query path
        let results = loaded.knn(&[1.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].0.id, id);
        assert_eq!(results[0].1, 0.0);
    }

    #[test]
    fn test_save_and_load_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        let path_str = path.to_str().unwrap();

        let store = VecStore::new(5);
        store.save(path_str).unwrap();

        let loaded = VecStore::load(path_str).unwrap();
        assert_eq!(loaded.count(), 0);
        assert_eq!(loaded.dimension(), 5);
    }

    #[test]
    fn test_load_nonexistent_file() {
        match VecStore::load("nonexistent_file.db") {
            Err(StoreError::Storage(message)) => assert!(message.contains("file not found")),
            other => panic!("expected storage error, got {:?}", other),
        }
    }
}
