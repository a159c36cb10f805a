//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] holds the tuning parameters (M, ef_construction, ef_search).
//! [`HnswIndex`] stores the graph in Struct-of-Arrays layout: one contiguous
//! f32 arena for vectors plus parallel arrays for neighbor lists and layer
//! assignments. External `u64` ids map to dense internal `u32` indices.

use crate::config;
use crate::hnsw::distance::l2_sq;
use std::collections::HashMap;

/// Configuration parameters for an HNSW index.
///
/// Controls the trade-off between build speed, search speed, and recall.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Bidirectional links per node above layer 0.
    pub m: usize,
    /// Maximum links per node at layer 0.
    pub m_max0: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Candidate list size during search (raised to the requested candidate
    /// count when that is larger).
    pub ef_search: usize,
    /// Maximum number of layers.
    pub max_layers: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: config::HNSW_M,
            m_max0: config::HNSW_M_MAX0,
            ef_construction: config::HNSW_EF_CONSTRUCTION,
            ef_search: config::HNSW_EF_SEARCH,
            max_layers: config::HNSW_MAX_LAYERS,
        }
    }
}

/// One modality's HNSW graph over raw f32 vectors.
///
/// Vectors are stored uncompressed: persistence, `get_vector`, and auto-link
/// all need the exact bytes back. Distance is always squared Euclidean.
#[derive(Debug)]
pub struct HnswIndex {
    pub config: HnswConfig,
    dimension: usize,
    // SoA arena: node i occupies vectors[i*dim .. (i+1)*dim]
    vectors: Vec<f32>,
    // neighbors[node][layer] -> internal neighbor ids
    pub(crate) neighbors: Vec<Vec<Vec<u32>>>,
    pub(crate) layers: Vec<u8>,
    pub(crate) entry_point: Option<u32>,
    pub(crate) max_layer: usize,
    // external u64 id <-> dense internal index
    label_to_internal: HashMap<u64, u32>,
    internal_to_label: Vec<u64>,
}

impl HnswIndex {
    /// Creates an empty index with the given dimension and configuration.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        Self {
            config,
            dimension,
            vectors: Vec::new(),
            neighbors: Vec::new(),
            layers: Vec::new(),
            entry_point: None,
            max_layer: 0,
            label_to_internal: HashMap::new(),
            internal_to_label: Vec::new(),
        }
    }

    /// Empty index with default configuration (M=16, ef_c=200).
    pub fn with_default_config(dimension: usize) -> Self {
        Self::new(dimension, HnswConfig::default())
    }

    /// Fixed vector dimension of this index.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored nodes.
    #[inline]
    pub fn node_count(&self) -> u32 {
        self.internal_to_label.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.internal_to_label.is_empty()
    }

    /// Random layer for a new node, exponentially distributed with
    /// multiplier `1/ln(M)`, capped at `max_layers - 1`.
    pub(crate) fn random_level(&self) -> usize {
        let ml = 1.0 / (self.config.m as f64).ln();
        let r: f64 = rand::random();
        let level = (-r.ln() * ml).floor() as usize;
        level.min(self.config.max_layers - 1)
    }

    /// Raw vector slice of an internal node. O(1) view into the arena.
    #[inline]
    pub fn vector_at(&self, internal: u32) -> &[f32] {
        let start = internal as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// External id of an internal node.
    #[inline]
    pub fn label_at(&self, internal: u32) -> u64 {
        self.internal_to_label[internal as usize]
    }

    /// Internal index of an external id, if present.
    #[inline]
    pub fn internal_of(&self, label: u64) -> Option<u32> {
        self.label_to_internal.get(&label).copied()
    }

    /// Raw vector of an external id, or `None` if unknown.
    pub fn vector_by_label(&self, label: u64) -> Option<&[f32]> {
        self.internal_of(label).map(|i| self.vector_at(i))
    }

    /// External ids in internal-index (insertion) order.
    pub fn labels(&self) -> impl Iterator<Item = u64> + '_ {
        self.internal_to_label.iter().copied()
    }

    /// Insert or replace the vector stored under `label`.
    ///
    /// A known label overwrites its arena slot in place without repairing
    /// graph topology; the save/open cycle rebuilds the graph from vectors,
    /// which bounds the drift. A new label runs the full HNSW insertion.
    /// The caller must have validated the vector length already.
    pub fn add_point(&mut self, vector: &[f32], label: u64) {
        debug_assert_eq!(vector.len(), self.dimension);
        if let Some(internal) = self.internal_of(label) {
            let start = internal as usize * self.dimension;
            self.vectors[start..start + self.dimension].copy_from_slice(vector);
            return;
        }
        let internal = self.internal_to_label.len() as u32;
        self.label_to_internal.insert(label, internal);
        self.internal_to_label.push(label);
        self.insert(internal, vector);
    }

    /// Append a vector to the arena (insertion bookkeeping only).
    pub(crate) fn push_vector(&mut self, vector: &[f32]) {
        self.vectors.extend_from_slice(vector);
    }

    /// Distance between two stored nodes.
    #[inline]
    pub(crate) fn node_distance(&self, a: u32, b: u32) -> f32 {
        l2_sq(self.vector_at(a), self.vector_at(b))
    }

    /// Distance from a query to a stored node.
    #[inline]
    pub(crate) fn query_distance(&self, query: &[f32], node: u32) -> f32 {
        l2_sq(query, self.vector_at(node))
    }

    /// Prefetch a node's vector into L1 ahead of the distance computation.
    /// No-op on architectures without a portable hint.
    #[inline(always)]
    pub(crate) fn prefetch_vector(&self, internal: u32) {
        #[cfg(target_arch = "x86_64")]
        {
            let start = internal as usize * self.dimension;
            if start < self.vectors.len() {
                unsafe {
                    std::arch::x86_64::_mm_prefetch(
                        self.vectors.as_ptr().add(start) as *const i8,
                        std::arch::x86_64::_MM_HINT_T0,
                    );
                }
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = internal;
        }
    }
}
