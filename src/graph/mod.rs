//! Knowledge-graph queries: bounded BFS expansion for context chains.
//!
//! A context chain seeds from vector similarity, then walks the typed edge
//! graph in both directions for a bounded number of hops. Expansion touches
//! the forward edges (stored in each record) and the derived reverse index.

/// Graph JSON export.
pub mod export;

use crate::record::{IncomingEdge, Metadata};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// A node reached by a context chain.
#[derive(Debug, Clone, Serialize)]
pub struct ContextNode {
    pub id: u64,
    /// Composite score: seed similarity or hop decay, modulated by
    /// importance and stickiness.
    pub score: f32,
    /// Vector similarity for seeds; 0 for nodes reached via expansion.
    pub similarity: f32,
    /// 0 for direct search hits, 1+ for graph hops.
    pub hop: u32,
    pub metadata: Metadata,
}

/// A directed edge traversed during expansion.
#[derive(Debug, Clone, Serialize)]
pub struct ContextEdge {
    pub source: u64,
    pub target: u64,
    pub rel_type: String,
    pub weight: f32,
}

/// Result of a context-chain query: nodes sorted by score descending, edges
/// deduplicated on `(source, target, rel_type)`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextChainResult {
    pub nodes: Vec<ContextNode>,
    pub edges: Vec<ContextEdge>,
}

/// Breadth-first expansion from the seed set.
///
/// Returns each visited id with its best (smallest) hop count, plus every
/// edge traversed, deduplicated. Nodes at `hop == hops` are recorded but not
/// expanded further; their outgoing edges are not collected.
pub(crate) fn expand(
    records: &HashMap<u64, Metadata>,
    reverse: &HashMap<u64, Vec<IncomingEdge>>,
    seeds: &HashMap<u64, f32>,
    hops: u32,
) -> (HashMap<u64, u32>, Vec<ContextEdge>) {
    let mut visited: HashMap<u64, u32> = HashMap::new();
    let mut queue: VecDeque<(u64, u32)> = VecDeque::new();
    for &id in seeds.keys() {
        visited.insert(id, 0);
        queue.push_back((id, 0));
    }

    let mut collected: Vec<ContextEdge> = Vec::new();
    while let Some((cur, cur_hop)) = queue.pop_front() {
        if cur_hop >= hops {
            continue;
        }

        if let Some(meta) = records.get(&cur) {
            for e in &meta.edges {
                collected.push(ContextEdge {
                    source: cur,
                    target: e.target_id,
                    rel_type: e.rel_type.clone(),
                    weight: e.weight,
                });
                if !visited.contains_key(&e.target_id) {
                    visited.insert(e.target_id, cur_hop + 1);
                    queue.push_back((e.target_id, cur_hop + 1));
                }
            }
        }
        if let Some(incoming) = reverse.get(&cur) {
            for ie in incoming {
                collected.push(ContextEdge {
                    source: ie.source_id,
                    target: cur,
                    rel_type: ie.rel_type.clone(),
                    weight: ie.weight,
                });
                if !visited.contains_key(&ie.source_id) {
                    visited.insert(ie.source_id, cur_hop + 1);
                    queue.push_back((ie.source_id, cur_hop + 1));
                }
            }
        }
    }

    (visited, dedup_edges(collected))
}

/// Sort and deduplicate traversed edges on `(source, target, rel_type)`.
fn dedup_edges(mut edges: Vec<ContextEdge>) -> Vec<ContextEdge> {
    edges.sort_by(|a, b| {
        (a.source, a.target, a.rel_type.as_str()).cmp(&(b.source, b.target, b.rel_type.as_str()))
    });
    edges.dedup_by(|a, b| a.source == b.source && a.target == b.target && a.rel_type == b.rel_type);
    edges
}
