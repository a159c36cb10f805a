//! Metadata filter predicate evaluated inside the HNSW traversal.
//!
//! Every present field imposes one conjunctive constraint; absent fields
//! impose none, so the default filter accepts everything. Candidates whose
//! id has no metadata record are rejected.

use crate::record::{ContextType, Metadata};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optional constraints on a record's metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Record kind must be a member of this set.
    pub types: Option<Vec<ContextType>>,
    /// Exact source equality.
    pub source: Option<String>,
    /// Source must begin with this prefix.
    pub source_prefix: Option<String>,
    /// Timestamp lower bound (inclusive).
    pub timestamp_after: Option<i64>,
    /// Timestamp upper bound (inclusive).
    pub timestamp_before: Option<i64>,
    /// Importance lower bound (inclusive).
    pub importance_gte: Option<f32>,
    /// Every listed tag must be a substring of `tags_json`.
    pub tags_contains: Option<Vec<String>>,
    /// Exact namespace equality.
    pub namespace_id: Option<String>,
    /// Exact entity equality.
    pub entity_id: Option<String>,
    /// Every listed pair must appear in `attributes` with an equal value.
    pub attributes_match: Option<HashMap<String, String>>,
}

impl SearchFilter {
    /// True when `meta` satisfies every set constraint.
    pub fn matches(&self, meta: &Metadata) -> bool {
        if let Some(ref types) = self.types {
            if !types.contains(&meta.kind) {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if meta.source != *source {
                return false;
            }
        }
        if let Some(ref prefix) = self.source_prefix {
            if !meta.source.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.timestamp_after {
            if meta.timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.timestamp_before {
            if meta.timestamp > before {
                return false;
            }
        }
        if let Some(gte) = self.importance_gte {
            if meta.importance < gte {
                return false;
            }
        }
        if let Some(ref tags) = self.tags_contains {
            if !tags.iter().all(|t| meta.tags_json.contains(t.as_str())) {
                return false;
            }
        }
        if let Some(ref ns) = self.namespace_id {
            if meta.namespace_id != *ns {
                return false;
            }
        }
        if let Some(ref eid) = self.entity_id {
            if meta.entity_id != *eid {
                return false;
            }
        }
        if let Some(ref wanted) = self.attributes_match {
            for (key, val) in wanted {
                if meta.attributes.get(key) != Some(val) {
                    return false;
                }
            }
        }
        true
    }
}
