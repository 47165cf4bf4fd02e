//! Nearest-neighbor backends over section embeddings.
//!
//! Both backends score with [`cosine_similarity`] and order results with
//! [`rank_order`] (score descending, then document position ascending), so
//! they return identical rankings for identical input.

use regcite_core::IndexBackend;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One lookup hit: a flattened document position and its similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub position: usize,
    pub score: f32,
}

/// Ranking order shared by every backend: better hits sort first.
pub fn rank_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.position.cmp(&b.position))
}

/// Cosine similarity between two vectors.
///
/// Vectors of different length, or with zero norm, score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Nearest-neighbor lookup capability.
pub trait NearestNeighbors: Send + Sync + std::fmt::Debug {
    /// Backend name for logs and stats.
    fn backend_name(&self) -> &'static str;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` best hits for `query`, best first.
    fn query(&self, query: &[f32], k: usize) -> Vec<Neighbor>;
}

/// Build the configured backend over vectors given in document order.
pub fn build_backend(
    kind: IndexBackend,
    vectors: &[Vec<f32>],
    dimensions: usize,
) -> Box<dyn NearestNeighbors> {
    match kind {
        IndexBackend::Flat => Box::new(FlatIndex::new(vectors, dimensions)),
        IndexBackend::Linear => Box::new(LinearScan::new(vectors.to_vec())),
    }
}

/// Scores every vector, then sorts.
#[derive(Debug, Clone)]
pub struct LinearScan {
    vectors: Vec<Vec<f32>>,
}

impl LinearScan {
    pub fn new(vectors: Vec<Vec<f32>>) -> Self {
        Self { vectors }
    }
}

impl NearestNeighbors for LinearScan {
    fn backend_name(&self) -> &'static str {
        "linear"
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn query(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut hits: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                score: cosine_similarity(query, vector),
            })
            .collect();

        hits.sort_by(rank_order);
        hits.truncate(k);
        hits
    }
}

/// Row-major matrix of vectors with bounded-heap top-k selection.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    matrix: Vec<f32>,
    dimensions: usize,
    rows: usize,
}

/// Heap entry ordered so the worst-ranked hit sits on top.
#[derive(Debug, PartialEq)]
struct Ranked(Neighbor);

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_order(&self.0, &other.0)
    }
}

impl FlatIndex {
    /// Copy vectors into one contiguous matrix.
    ///
    /// Vectors whose length differs from `dimensions` are stored zero-padded
    /// or truncated; callers validate dimensions before building.
    pub fn new(vectors: &[Vec<f32>], dimensions: usize) -> Self {
        let mut matrix = Vec::with_capacity(vectors.len() * dimensions);
        for vector in vectors {
            let mut row = vector.clone();
            row.resize(dimensions, 0.0);
            matrix.extend_from_slice(&row);
        }

        Self {
            matrix,
            dimensions,
            rows: vectors.len(),
        }
    }

    fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dimensions;
        &self.matrix[start..start + self.dimensions]
    }
}

impl NearestNeighbors for FlatIndex {
    fn backend_name(&self) -> &'static str {
        "flat"
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn query(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for position in 0..self.rows {
            heap.push(Ranked(Neighbor {
                position,
                score: cosine_similarity(query, self.row(position)),
            }));
            if heap.len() > k {
                heap.pop();
            }
        }

        heap.into_sorted_vec().into_iter().map(|r| r.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::l2_normalize;

    fn normalized(v: &[f32]) -> Vec<f32> {
        let mut out = v.to_vec();
        l2_normalize(&mut out);
        out
    }

    fn sample() -> Vec<Vec<f32>> {
        vec![
            normalized(&[1.0, 0.0, 0.0]),
            normalized(&[0.7, 0.7, 0.0]),
            normalized(&[0.0, 1.0, 0.0]),
            normalized(&[-1.0, 0.0, 0.0]),
            normalized(&[0.7, 0.7, 0.0]),
            normalized(&[1.0, 0.0, 0.0]),
        ]
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_linear_scan_orders_descending() {
        let index = LinearScan::new(sample());
        let hits = index.query(&normalized(&[1.0, 0.1, 0.0]), 10);

        assert_eq!(hits.len(), 6);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(hits.last().map(|h| h.position), Some(3));
    }

    #[test]
    fn test_ties_break_by_position() {
        let index = FlatIndex::new(&sample(), 3);
        let hits = index.query(&normalized(&[1.0, 0.0, 0.0]), 2);

        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 5]);
    }

    #[test]
    fn test_backends_rank_identically() {
        let vectors = sample();
        let flat = build_backend(IndexBackend::Flat, &vectors, 3);
        let linear = build_backend(IndexBackend::Linear, &vectors, 3);

        let queries = [
            normalized(&[1.0, 0.0, 0.0]),
            normalized(&[0.5, 0.5, 0.1]),
            normalized(&[0.0, -1.0, 0.3]),
        ];

        for query in &queries {
            for k in 0..=7 {
                assert_eq!(flat.query(query, k), linear.query(query, k), "k = {}", k);
            }
        }
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = FlatIndex::new(&sample()[..2], 3);
        assert_eq!(index.query(&normalized(&[1.0, 0.0, 0.0]), 10).len(), 2);
        assert_eq!(index.backend_name(), "flat");
    }
}
