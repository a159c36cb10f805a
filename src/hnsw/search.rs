//! HNSW search: single-layer traversal and multi-layer KNN.
//!
//! Supports an optional predicate `Fn(u32) -> bool` evaluated during graph
//! traversal. Rejected nodes still participate in navigation but never enter
//! the result set, so a selective filter widens the search instead of
//! starving it.

use crate::hnsw::graph::HnswIndex;
use crate::hnsw::visited::VisitedSet;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;

/// Frontier entry: negative distance makes the max-heap pop nearest-first.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    neg_distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_distance.cmp(&other.neg_distance)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Result entry: max-heap by distance so the worst hit is cheap to evict.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance.cmp(&other.distance)
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Search one layer, returning up to `ef` admitted nodes sorted by distance.
///
/// `visited` is reused across calls; it is reset here. `admit` decides
/// result membership only — every reachable node still navigates.
pub(crate) fn search_layer<F: Fn(u32) -> bool>(
    index: &HnswIndex,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut VisitedSet,
    admit: &F,
) -> Vec<(f32, u32)> {
    visited.reset();
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
    // Cached worst admitted distance, refreshed on every result-heap change.
    let mut worst_dist = f32::MAX;

    for &ep in entry_points {
        if visited.insert(ep) {
            let dist = index.query_distance(query, ep);
            candidates.push(Candidate {
                neg_distance: OrderedFloat(-dist),
                id: ep,
            });
            if admit(ep) {
                results.push(ResultEntry {
                    distance: OrderedFloat(dist),
                    id: ep,
                });
                if results.len() >= ef {
                    worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
                }
            }
        }
    }

    while let Some(candidate) = candidates.pop() {
        let c_dist = -candidate.neg_distance.0;
        if results.len() >= ef && c_dist > worst_dist {
            break;
        }

        let node = candidate.id as usize;
        if layer >= index.neighbors[node].len() {
            continue;
        }

        let neighbor_list = &index.neighbors[node][layer];
        for i in 0..neighbor_list.len() {
            let neighbor = neighbor_list[i];
            if i + 1 < neighbor_list.len() {
                index.prefetch_vector(neighbor_list[i + 1]);
            }
            if !visited.insert(neighbor) {
                continue;
            }

            let dist = index.query_distance(query, neighbor);
            if results.len() < ef || dist < worst_dist {
                candidates.push(Candidate {
                    neg_distance: OrderedFloat(-dist),
                    id: neighbor,
                });
                if admit(neighbor) {
                    results.push(ResultEntry {
                        distance: OrderedFloat(dist),
                        id: neighbor,
                    });
                    if results.len() > ef {
                        results.pop();
                    }
                    worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect()
}

/// KNN over the full layer stack, nearest-first.
pub fn knn_search(index: &HnswIndex, query: &[f32], k: usize) -> Vec<(f32, u32)> {
    knn_search_filtered(index, query, k, &|_: u32| true)
}

/// KNN with a membership predicate applied during traversal.
///
/// Returns up to `k` `(distance, internal_id)` pairs sorted by ascending
/// distance. The layer-0 sweep runs with `ef = max(ef_search, k)`, which is
/// the widening bound under selective predicates.
pub fn knn_search_filtered<F: Fn(u32) -> bool>(
    index: &HnswIndex,
    query: &[f32],
    k: usize,
    admit: &F,
) -> Vec<(f32, u32)> {
    let entry_point = match index.entry_point {
        Some(ep) => ep,
        None => return Vec::new(),
    };

    let mut visited = VisitedSet::with_capacity(index.node_count() as usize);
    let mut current_ep = entry_point;

    // Upper layers navigate with ef=1 and no predicate; membership only
    // matters at layer 0.
    let pass_all = |_: u32| true;
    for layer in (1..=index.max_layer).rev() {
        let found = search_layer(
            index,
            query,
            std::slice::from_ref(&current_ep),
            1,
            layer,
            &mut visited,
            &pass_all,
        );
        if let Some(&(_, nearest)) = found.first() {
            current_ep = nearest;
        }
    }

    let ef = index.config.ef_search.max(k);
    let mut results = search_layer(
        index,
        query,
        std::slice::from_ref(&current_ep),
        ef,
        0,
        &mut visited,
        admit,
    );
    results.truncate(k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_index(n: u64) -> HnswIndex {
        let mut idx = HnswIndex::with_default_config(1);
        for i in 0..n {
            idx.add_point(&[i as f32], i);
        }
        idx
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let idx = HnswIndex::with_default_config(3);
        assert!(knn_search(&idx, &[0.0, 0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn test_knn_orders_by_distance() {
        let idx = line_index(30);
        let hits = knn_search(&idx, &[4.2], 3);
        assert_eq!(hits.len(), 3);
        let ids: Vec<u32> = hits.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids[0], 4);
        assert!(hits.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_knn_truncates_to_k() {
        let idx = line_index(30);
        assert_eq!(knn_search(&idx, &[0.0], 7).len(), 7);
    }

    #[test]
    fn test_k_larger_than_index() {
        let idx = line_index(4);
        assert_eq!(knn_search(&idx, &[0.0], 10).len(), 4);
    }

    #[test]
    fn test_filtered_search_excludes_but_navigates() {
        let idx = line_index(40);
        // Admit only even internal ids; the odd ones still route traffic.
        let even_only = |id: u32| id % 2 == 0;
        let hits = knn_search_filtered(&idx, &[10.0], 5, &even_only);
        assert_eq!(hits.len(), 5);
        assert!(hits.iter().all(|&(_, id)| id % 2 == 0));
        assert_eq!(hits[0].1, 10);
    }

    #[test]
    fn test_filter_rejecting_all_returns_empty() {
        let idx = line_index(10);
        let none = |_: u32| false;
        assert!(knn_search_filtered(&idx, &[3.0], 3, &none).is_empty());
    }

    #[test]
    fn test_selective_filter_widens_past_k_nearest() {
        let idx = line_index(60);
        // The five nearest to 0.0 are 0..5; admit only ids >= 20. The search
        // must widen until admitted candidates appear.
        let far_only = |id: u32| id >= 20;
        let hits = knn_search_filtered(&idx, &[0.0], 3, &far_only);
        assert_eq!(hits.len(), 3);
        let ids: Vec<u32> = hits.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![20, 21, 22]);
    }
}
