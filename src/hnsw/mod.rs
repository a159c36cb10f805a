//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor index.
//!
//! One instance per modality. Vectors are raw f32 in a Struct-of-Arrays
//! arena, distances are squared Euclidean, and search accepts a predicate
//! evaluated during traversal so metadata filters keep their recall.

/// Squared Euclidean distance kernel.
pub mod distance;
/// Graph structure, configuration, and label mapping.
pub mod graph;
/// Insertion with bidirectional connections and heuristic pruning.
pub mod insert;
/// Layered search and filtered KNN.
pub mod search;
/// Epoch-stamped visited set.
pub mod visited;

pub use graph::{HnswConfig, HnswIndex};
pub use search::{knn_search, knn_search_filtered};
