//! Nearest-neighbor index strategies.
//!
//! The store ranks candidates through a [`NearestNeighborIndex`], so the
//! acceleration structure is swappable without touching the query contract:
//! every implementation here is exact and returns the true distance ordering.
//! [`BruteForceIndex`] is the correctness baseline; [`KdTreeIndex`] prunes
//! whole subtrees but must produce byte-identical rankings.
//!
//! Ranking is by `(distance, id)` ascending. The id tie-break makes results
//! deterministic across runs, insertion orders and index strategies.

use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::error::StoreError;
use crate::vector::euclidean_sq;

/// One ranked query result: a stored id and its exact Euclidean distance to
/// the probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub distance: f64,
}

/// A k-nearest-neighbor strategy over `(id, vector)` entries.
///
/// Callers guarantee that every added vector and every probe share one
/// dimension, and that ids are unique (the store deduplicates by content
/// before touching the index).
pub trait NearestNeighborIndex: Send + Sync {
    /// Adds an entry. Never called twice with the same id.
    fn add(&mut self, id: String, vector: Vec<f64>);

    /// Returns the `min(k, len)` entries closest to `probe`, sorted by
    /// `(distance, id)` ascending.
    fn search(&self, probe: &[f64], k: usize) -> Result<Vec<Neighbor>, StoreError>;

    /// Number of indexed entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The O(n·D) baseline: rank every entry, keep the first k.
#[derive(Default)]
pub struct BruteForceIndex {
    entries: Vec<(String, Vec<f64>)>,
}

impl BruteForceIndex {
    pub fn new() -> BruteForceIndex {
        BruteForceIndex { entries: Vec::new() }
    }
}

impl NearestNeighborIndex for BruteForceIndex {
    fn add(&mut self, id: String, vector: Vec<f64>) {
        self.entries.push((id, vector));
    }

    fn search(&self, probe: &[f64], k: usize) -> Result<Vec<Neighbor>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut ranked: Vec<(OrderedFloat<f64>, &str)> = Vec::with_capacity(self.entries.len());
        for (id, vector) in &self.entries {
            ranked.push((OrderedFloat(euclidean_sq(probe, vector)?), id.as_str()));
        }

        // Tuple order is (squared distance, id); sqrt is monotonic so the
        // squared ranking is the true ranking
        ranked.sort_unstable();
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(d2, id)| Neighbor { id: id.to_string(), distance: d2.into_inner().sqrt() })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

struct KdNode {
    id: String,
    point: Vec<f64>,
    left: Option<usize>,
    right: Option<usize>,
}

/// Exact k-d tree: axis-cycling insertion, best-k search with a bounded
/// max-heap and splitting-plane pruning.
///
/// No rebalancing: balance affects speed, never correctness. The pruning
/// bound keeps equal-distance subtrees, so the `(distance, id)` tie-break
/// survives acceleration.
pub struct KdTreeIndex {
    dimension: usize,
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

impl KdTreeIndex {
    pub fn new(dimension: usize) -> KdTreeIndex {
        KdTreeIndex { dimension, nodes: Vec::new(), root: None }
    }

    fn visit(
        &self,
        node_index: usize,
        depth: usize,
        probe: &[f64],
        k: usize,
        best: &mut BinaryHeap<(OrderedFloat<f64>, String)>,
    ) -> Result<(), StoreError> {
        let node = &self.nodes[node_index];

        let d2 = euclidean_sq(probe, &node.point)?;
        let key = (OrderedFloat(d2), node.id.clone());
        if best.len() < k {
            best.push(key);
        } else if let Some(worst) = best.peek() {
            if key < *worst {
                best.pop();
                best.push(key);
            }
        }

        if self.dimension == 0 {
            // A zero-dimension tree is a lone root
            return Ok(());
        }

        let axis = depth % self.dimension;
        let diff = probe[axis] - node.point[axis];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(near_index) = near {
            self.visit(near_index, depth + 1, probe, k, best)?;
        }

        // Everything on the far side is at least |diff| away along this
        // axis. Keep equal bounds: a far entry at exactly the worst distance
        // can still win its tie on id.
        let must_visit_far = best.len() < k
            || best
                .peek()
                .is_none_or(|(worst_d2, _)| OrderedFloat(diff * diff) <= *worst_d2);
        if must_visit_far {
            if let Some(far_index) = far {
                self.visit(far_index, depth + 1, probe, k, best)?;
            }
        }

        Ok(())
    }
}

impl NearestNeighborIndex for KdTreeIndex {
    fn add(&mut self, id: String, vector: Vec<f64>) {
        let new_index = self.nodes.len();

        let Some(mut current) = self.root else {
            self.nodes.push(KdNode { id, point: vector, left: None, right: None });
            self.root = Some(new_index);
            return;
        };

        if self.dimension == 0 {
            // Zero-dimension entries all share one content fingerprint, so a
            // second add cannot occur through the store
            return;
        }

        let mut depth = 0;
        loop {
            let axis = depth % self.dimension;
            let node = &mut self.nodes[current];
            let side = if vector[axis] < node.point[axis] {
                &mut node.left
            } else {
                &mut node.right
            };
            match *side {
                Some(next) => {
                    current = next;
                    depth += 1;
                }
                None => {
                    *side = Some(new_index);
                    break;
                }
            }
        }

        self.nodes.push(KdNode { id, point: vector, left: None, right: None });
    }

    fn search(&self, probe: &[f64], k: usize) -> Result<Vec<Neighbor>, StoreError> {
        let Some(root) = self.root else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        // Max-heap of the best k seen so far, worst candidate on top
        let mut best: BinaryHeap<(OrderedFloat<f64>, String)> = BinaryHeap::new();
        self.visit(root, 0, probe, k, &mut best)?;

        Ok(best
            .into_sorted_vec()
            .into_iter()
            .map(|(d2, id)| Neighbor { id, distance: d2.into_inner().sqrt() })
            .collect())
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}
