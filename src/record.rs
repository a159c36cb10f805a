//! Core record types: metadata, categories, and typed weighted edges.
//!
//! A record is keyed by a `u64` id and owns one [`Metadata`] value shared
//! across all modalities of that id. Outgoing edges live inside the owning
//! record's metadata; [`IncomingEdge`] entries are derived and live only in
//! the store's reverse index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Coarse category of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextType {
    Fact,
    Preference,
    Event,
    Conversation,
}

impl ContextType {
    /// Wire representation (single byte).
    pub fn as_u8(self) -> u8 {
        match self {
            ContextType::Fact => 0,
            ContextType::Preference => 1,
            ContextType::Event => 2,
            ContextType::Conversation => 3,
        }
    }

    /// Decode from the wire byte. Unknown values fall back to `Fact`.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ContextType::Preference,
            2 => ContextType::Event,
            3 => ContextType::Conversation,
            _ => ContextType::Fact,
        }
    }
}

impl Default for ContextType {
    fn default() -> Self {
        ContextType::Fact
    }
}

/// Conventional relation types. Published for callers; never enforced —
/// `rel_type` is free-form.
pub const CONVENTIONAL_REL_TYPES: &[&str] = &[
    "related_to",
    "derived_from",
    "caused_by",
    "contradicts",
    "supports",
    "precedes",
    "part_of",
    "references",
    "multimodal_of",
];

/// An outgoing typed, weighted edge stored inside the owning record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub target_id: u64,
    pub rel_type: String,
    pub weight: f32,
}

/// A derived incoming edge: who points at a given record.
///
/// Lives only in the reverse index; rebuilt from forward edges on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingEdge {
    pub source_id: u64,
    pub rel_type: String,
    pub weight: f32,
}

/// Structured metadata attached to a record.
///
/// Exists from the moment any vector is added under an id and is shared by
/// every modality of that id. `recall_count` and `last_recalled_at` are
/// bumped by search as a side effect and feed the adaptive decay in scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Logical creation time, seconds since epoch. Drives temporal decay.
    pub timestamp: i64,
    /// Base multiplier in scoring, expected in [0, 1].
    pub importance: f32,
    /// Coarse category.
    pub kind: ContextType,
    /// Origin tag. Filterable by exact match or prefix.
    pub source: String,
    /// Human-readable text. Substring-searchable only.
    pub content: String,
    /// JSON array literal of tags; filters use substring matching.
    pub tags_json: String,
    /// Outgoing typed weighted edges, in insertion order.
    pub edges: Vec<Edge>,
    /// Times this record has appeared in a query result.
    pub recall_count: u32,
    /// Wall-clock seconds of the most recent recall.
    pub last_recalled_at: u64,
    /// Partition key, exact-match filterable.
    pub namespace_id: String,
    /// Subject key, exact-match filterable.
    pub entity_id: String,
    /// Domain key-value metadata.
    pub attributes: HashMap<String, String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            timestamp: 0,
            importance: 1.0,
            kind: ContextType::Fact,
            source: String::new(),
            content: String::new(),
            tags_json: String::new(),
            edges: Vec::new(),
            recall_count: 0,
            last_recalled_at: 0,
            namespace_id: String::new(),
            entity_id: String::new(),
            attributes: HashMap::new(),
        }
    }
}

impl Metadata {
    /// True if an outgoing edge `(target_id, rel_type)` already exists.
    pub fn has_edge(&self, target_id: u64, rel_type: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.target_id == target_id && e.rel_type == rel_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_type_roundtrip() {
        for kind in [
            ContextType::Fact,
            ContextType::Preference,
            ContextType::Event,
            ContextType::Conversation,
        ] {
            assert_eq!(ContextType::from_u8(kind.as_u8()), kind);
        }
    }

    #[test]
    fn test_context_type_unknown_byte_falls_back() {
        assert_eq!(ContextType::from_u8(200), ContextType::Fact);
    }

    #[test]
    fn test_metadata_defaults() {
        let m = Metadata::default();
        assert_eq!(m.timestamp, 0);
        assert_eq!(m.importance, 1.0);
        assert_eq!(m.kind, ContextType::Fact);
        assert!(m.edges.is_empty());
        assert_eq!(m.recall_count, 0);
        assert!(m.attributes.is_empty());
    }

    #[test]
    fn test_has_edge_matches_target_and_rel_type() {
        let mut m = Metadata::default();
        m.edges.push(Edge {
            target_id: 7,
            rel_type: "supports".into(),
            weight: 0.5,
        });
        assert!(m.has_edge(7, "supports"));
        assert!(!m.has_edge(7, "contradicts"));
        assert!(!m.has_edge(8, "supports"));
    }
}
