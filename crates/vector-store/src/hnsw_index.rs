use crate::embeddings::{normalize, splitmix64};
use crate::error::{Result, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

/// Tuning knobs for the HNSW graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    /// Neighbours per node on upper layers (layer 0 keeps `2 * m`)
    pub m: usize,

    /// Beam width while inserting
    pub ef_construction: usize,

    /// Beam width while querying (raised to `k` when smaller)
    pub ef_search: usize,

    /// Seed for level assignment; equal seeds give equal graphs
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 100,
            ef_search: 64,
            seed: 0x7261_6365_5f69_6478,
        }
    }
}

impl HnswParams {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.m < 2 {
            return Err(format!("index.m must be >= 2 (got {})", self.m));
        }
        if self.ef_construction == 0 || self.ef_search == 0 {
            return Err("index.ef_construction and index.ef_search must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct Scored {
    distance: f32,
    id: usize,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Hierarchical navigable small-world graph over cosine distance.
///
/// Node ids are dense insertion positions (`0..len`). Vectors are stored
/// L2-normalised so distance is `1 - dot`.
#[derive(Debug, Clone)]
pub struct HnswIndex {
    dimension: usize,
    params: HnswParams,
    vectors: Vec<Vec<f32>>,
    /// `links[node][layer]` = neighbour ids
    links: Vec<Vec<Vec<usize>>>,
    entry: Option<usize>,
    max_layer: usize,
}

impl HnswIndex {
    pub fn new(dimension: usize, params: HnswParams) -> Self {
        Self {
            dimension,
            params,
            vectors: Vec::new(),
            links: Vec::new(),
            entry: None,
            max_layer: 0,
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Insert a vector, returning its node id.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let id = self.vectors.len();
        let mut stored = vector.to_vec();
        normalize(&mut stored);
        let level = self.level_for(id);
        self.vectors.push(stored);
        self.links.push(vec![Vec::new(); level + 1]);

        let Some(mut entry) = self.entry else {
            self.entry = Some(id);
            self.max_layer = level;
            return Ok(id);
        };

        let query = self.vectors[id].clone();
        for layer in (level + 1..=self.max_layer).rev() {
            entry = self.greedy_closest(&query, entry, layer);
        }

        let mut entry_points = vec![entry];
        for layer in (0..=level.min(self.max_layer)).rev() {
            let found = self.search_layer(&query, &entry_points, self.params.ef_construction, layer);
            let cap = self.layer_capacity(layer);
            let neighbours: Vec<usize> = found.iter().take(cap).map(|s| s.id).collect();

            self.links[id][layer].clone_from(&neighbours);
            for &neighbour in &neighbours {
                self.links[neighbour][layer].push(id);
                if self.links[neighbour][layer].len() > cap {
                    self.prune(neighbour, layer, cap);
                }
            }

            entry_points = found.into_iter().map(|s| s.id).collect();
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry = Some(id);
        }
        Ok(id)
    }

    /// Search for the k nearest neighbours.
    /// Returns (id, cosine distance) sorted by distance ascending.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let Some(mut entry) = self.entry else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        for layer in (1..=self.max_layer).rev() {
            entry = self.greedy_closest(&query, entry, layer);
        }
        let ef = self.params.ef_search.max(k);
        let mut found = self.search_layer(&query, &[entry], ef, 0);
        found.truncate(k);
        Ok(found.into_iter().map(|s| (s.id, s.distance)).collect())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn distance(&self, query: &[f32], id: usize) -> f32 {
        let dot: f32 = query
            .iter()
            .zip(self.vectors[id].iter())
            .map(|(a, b)| a * b)
            .sum();
        (1.0 - dot).clamp(0.0, 2.0)
    }

    fn level_for(&self, id: usize) -> usize {
        let mut state = self.params.seed ^ (id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let bits = splitmix64(&mut state);
        // Uniform in (0, 1].
        let unit = ((bits >> 11) as f64 + 1.0) / (1u64 << 53) as f64;
        let scale = 1.0 / (self.params.m as f64).ln();
        #[allow(clippy::cast_possible_truncation)]
        let level = (-unit.ln() * scale).floor() as usize;
        level.min(16)
    }

    const fn layer_capacity(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    fn greedy_closest(&self, query: &[f32], start: usize, layer: usize) -> usize {
        let mut best = start;
        let mut best_distance = self.distance(query, start);
        loop {
            let mut improved = false;
            for &neighbour in self.neighbours(best, layer) {
                let distance = self.distance(query, neighbour);
                if distance < best_distance {
                    best = neighbour;
                    best_distance = distance;
                    improved = true;
                }
            }
            if !improved {
                return best;
            }
        }
    }

    /// Beam search on one layer; result is ascending by distance.
    fn search_layer(&self, query: &[f32], entry_points: &[usize], ef: usize, layer: usize) -> Vec<Scored> {
        let mut visited: HashSet<usize> = entry_points.iter().copied().collect();
        let mut frontier: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        let mut results: BinaryHeap<Scored> = BinaryHeap::new();

        for &id in entry_points {
            let scored = Scored {
                distance: self.distance(query, id),
                id,
            };
            frontier.push(Reverse(scored));
            results.push(scored);
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(Reverse(current)) = frontier.pop() {
            if let Some(worst) = results.peek() {
                if results.len() >= ef && current.distance > worst.distance {
                    break;
                }
            }

            for &neighbour in self.neighbours(current.id, layer) {
                if !visited.insert(neighbour) {
                    continue;
                }
                let scored = Scored {
                    distance: self.distance(query, neighbour),
                    id: neighbour,
                };
                let admit = results.len() < ef
                    || results.peek().is_some_and(|worst| scored < *worst);
                if admit {
                    frontier.push(Reverse(scored));
                    results.push(scored);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    fn neighbours(&self, id: usize, layer: usize) -> &[usize] {
        self.links[id].get(layer).map_or(&[], Vec::as_slice)
    }

    fn prune(&mut self, node: usize, layer: usize, cap: usize) {
        let base = self.vectors[node].clone();
        let mut scored: Vec<Scored> = self.links[node][layer]
            .iter()
            .map(|&id| Scored {
                distance: self.distance(&base, id),
                id,
            })
            .collect();
        scored.sort();
        scored.truncate(cap);
        self.links[node][layer] = scored.into_iter().map(|s| s.id).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(vectors: &[Vec<f32>], query: &[f32], k: usize) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (id, crate::embeddings::cosine_distance(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.into_iter().take(k).map(|(id, _)| id).collect()
    }

    fn pseudo_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut state = seed;
        (0..count)
            .map(|_| {
                (0..dimension)
                    .map(|_| {
                        let bits = splitmix64(&mut state);
                        ((bits >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_add_and_search() {
        let mut index = HnswIndex::new(3, HnswParams::default());

        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.9, 0.1, 0.0]).unwrap();
        index.add(&[0.0, 1.0, 0.0]).unwrap();

        assert_eq!(index.len(), 3);

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].0, 0);
        assert!(results[0].1.abs() < 1e-6);

        assert_eq!(results[1].0, 1);
        assert!(results[1].1 < 0.1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = HnswIndex::new(3, HnswParams::default());
        assert!(index.add(&[1.0, 0.0]).is_err());

        index.add(&[1.0, 0.0, 0.0]).unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = HnswIndex::new(4, HnswParams::default());
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn small_graphs_match_brute_force() {
        // Below the layer-0 capacity nothing is pruned, so the graph is complete.
        let vectors = pseudo_vectors(20, 8, 7);
        let mut index = HnswIndex::new(8, HnswParams::default());
        for vector in &vectors {
            index.add(vector).unwrap();
        }

        for query in pseudo_vectors(10, 8, 99) {
            let expected = brute_force(&vectors, &query, 5);
            let got: Vec<usize> = index
                .search(&query, 5)
                .unwrap()
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn larger_graphs_keep_high_recall() {
        let vectors = pseudo_vectors(600, 16, 11);
        let mut index = HnswIndex::new(16, HnswParams::default());
        for vector in &vectors {
            index.add(vector).unwrap();
        }

        let queries = pseudo_vectors(30, 16, 1234);
        let mut hits = 0;
        for query in &queries {
            let expected: HashSet<usize> = brute_force(&vectors, query, 10).into_iter().collect();
            hits += index
                .search(query, 10)
                .unwrap()
                .iter()
                .filter(|(id, _)| expected.contains(id))
                .count();
        }
        let recall = hits as f32 / (queries.len() * 10) as f32;
        assert!(recall >= 0.8, "recall {recall}");
    }

    #[test]
    fn results_are_sorted_and_deterministic() {
        let vectors = pseudo_vectors(120, 12, 3);
        let build = || {
            let mut index = HnswIndex::new(12, HnswParams::default());
            for vector in &vectors {
                index.add(vector).unwrap();
            }
            index
        };
        let (a, b) = (build(), build());
        let query = &pseudo_vectors(1, 12, 5)[0];
        let first = a.search(query, 10).unwrap();
        assert_eq!(first, b.search(query, 10).unwrap());
        assert!(first.windows(2).all(|w| w[0].1 <= w[1].1));
    }
}
