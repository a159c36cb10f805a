//! HNSW insertion: bidirectional connections with heuristic neighbor pruning
//! (Algorithm 4 from the HNSW paper).

use crate::hnsw::graph::HnswIndex;
use crate::hnsw::search::search_layer;
use crate::hnsw::visited::VisitedSet;
use std::cell::RefCell;

thread_local! {
    // Reused across inserts to avoid a per-insert allocation proportional
    // to the node count.
    static INSERT_VISITED: RefCell<VisitedSet> = RefCell::new(VisitedSet::default());
}

impl HnswIndex {
    /// Wire a brand-new internal node into the graph.
    ///
    /// `internal` must equal the node count before this call; the label
    /// mapping has already been recorded by `add_point`.
    pub(crate) fn insert(&mut self, internal: u32, vector: &[f32]) {
        let level = self.random_level();

        // First node: no neighbors to find.
        if self.entry_point.is_none() {
            self.push_vector(vector);
            self.neighbors.push(vec![Vec::new(); level + 1]);
            self.layers.push(level as u8);
            self.entry_point = Some(internal);
            self.max_layer = level;
            return;
        }

        let entry_point = self.entry_point.expect("entry point set for non-empty graph");
        let top = level.min(self.max_layer);

        let node_neighbors = INSERT_VISITED.with(|cell| {
            let mut visited = cell.borrow_mut();
            visited.grow_to(self.node_count() as usize);

            // Phase 1: greedy descent from the top layer to level + 1.
            let mut current_ep = entry_point;
            let pass_all = |_: u32| true;
            for layer in (level + 1..=self.max_layer).rev() {
                let found = search_layer(
                    self,
                    vector,
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

            // Phase 2: collect candidate neighbors per layer, top-down.
            let mut node_neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
            let mut layer_eps: Vec<u32> = vec![current_ep];
            for layer in (0..=top).rev() {
                let candidates = search_layer(
                    self,
                    vector,
                    &layer_eps,
                    self.config.ef_construction,
                    layer,
                    &mut visited,
                    &pass_all,
                );
                let m_max = if layer == 0 {
                    self.config.m_max0
                } else {
                    self.config.m
                };
                let selected = select_neighbors_heuristic(self, &candidates, m_max);
                node_neighbors[layer] = selected.iter().map(|&(_, id)| id).collect();

                layer_eps.clear();
                layer_eps.extend(candidates.iter().map(|&(_, id)| id));
                if layer_eps.is_empty() {
                    layer_eps.push(entry_point);
                }
            }

            node_neighbors
        });

        self.push_vector(vector);
        self.neighbors.push(node_neighbors);
        self.layers.push(level as u8);

        // Phase 3: backlink and prune over-capacity neighbors.
        for layer in 0..=top {
            let m_max = if layer == 0 {
                self.config.m_max0
            } else {
                self.config.m
            };

            let my_neighbors = self.neighbors[internal as usize][layer].clone();
            for neighbor in my_neighbors {
                let nid = neighbor as usize;
                while self.neighbors[nid].len() <= layer {
                    self.neighbors[nid].push(Vec::new());
                }
                self.neighbors[nid][layer].push(internal);

                if self.neighbors[nid][layer].len() > m_max {
                    let candidates: Vec<(f32, u32)> = self.neighbors[nid][layer]
                        .iter()
                        .map(|&cid| (self.node_distance(neighbor, cid), cid))
                        .collect();
                    let pruned = select_neighbors_heuristic(self, &candidates, m_max);
                    self.neighbors[nid][layer] = pruned.iter().map(|&(_, id)| id).collect();
                }
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(internal);
        }
    }
}

/// Diversity-preferring neighbor selection.
///
/// A candidate is accepted only while it is closer to the base node than to
/// any already-selected neighbor; this spreads links across directions
/// instead of clustering them. Remaining slots are filled with the closest
/// rejected candidates.
fn select_neighbors_heuristic(
    index: &HnswIndex,
    candidates: &[(f32, u32)],
    m: usize,
) -> Vec<(f32, u32)> {
    let mut sorted = candidates.to_vec();
    sorted.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
    for &(dist_to_base, cid) in &sorted {
        if selected.len() >= m {
            break;
        }
        let diverse = selected
            .iter()
            .all(|&(_, sid)| dist_to_base <= index.node_distance(cid, sid));
        if diverse {
            selected.push((dist_to_base, cid));
        }
    }

    if selected.len() < m {
        let chosen: std::collections::HashSet<u32> = selected.iter().map(|&(_, id)| id).collect();
        for &(dist, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            if !chosen.contains(&cid) {
                selected.push((dist, cid));
            }
        }
    }

    selected
}
