//! Graph export as a D3/Cytoscape-compatible JSON document.
//!
//! Emits `{"nodes": [...], "edges": [...]}`. Nodes may be restricted to a
//! namespace and/or entity (exact match); edges are emitted only when both
//! endpoints passed the node filter, so the document never contains dangling
//! references. Output order is id-ascending for stable diffs.

use crate::config;
use crate::record::Metadata;
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// Serialize the filtered graph to a JSON string.
pub(crate) fn export_graph(
    records: &HashMap<u64, Metadata>,
    namespace: Option<&str>,
    entity: Option<&str>,
) -> String {
    let keep = |meta: &Metadata| -> bool {
        if let Some(ns) = namespace {
            if meta.namespace_id != ns {
                return false;
            }
        }
        if let Some(eid) = entity {
            if meta.entity_id != eid {
                return false;
            }
        }
        true
    };

    let mut exported: Vec<u64> = records
        .iter()
        .filter(|(_, meta)| keep(meta))
        .map(|(&id, _)| id)
        .collect();
    exported.sort_unstable();
    let exported_set: HashSet<u64> = exported.iter().copied().collect();

    let nodes: Vec<serde_json::Value> = exported
        .iter()
        .map(|id| {
            let meta = &records[id];
            json!({
                "id": id,
                "label": truncate_label(&meta.content, config::EXPORT_LABEL_MAX_CHARS),
                "namespace_id": meta.namespace_id,
                "entity_id": meta.entity_id,
                "type": meta.kind.as_u8(),
                "source": meta.source,
                "importance": meta.importance,
                "recall_count": meta.recall_count,
                "timestamp": meta.timestamp,
                "attributes": meta.attributes,
            })
        })
        .collect();

    let mut edges: Vec<serde_json::Value> = Vec::new();
    for id in &exported {
        for e in &records[id].edges {
            if !exported_set.contains(&e.target_id) {
                continue;
            }
            edges.push(json!({
                "source": id,
                "target": e.target_id,
                "rel_type": e.rel_type,
                "weight": e.weight,
            }));
        }
    }

    json!({ "nodes": nodes, "edges": edges }).to_string()
}

/// First `max` characters of `s`, respecting char boundaries.
fn truncate_label(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Edge;

    fn record(ns: &str, eid: &str, content: &str) -> Metadata {
        Metadata {
            namespace_id: ns.into(),
            entity_id: eid.into(),
            content: content.into(),
            ..Metadata::default()
        }
    }

    fn parse(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("export must be valid JSON")
    }

    #[test]
    fn test_export_empty_store() {
        let records = HashMap::new();
        let doc = parse(&export_graph(&records, None, None));
        assert_eq!(doc["nodes"].as_array().unwrap().len(), 0);
        assert_eq!(doc["edges"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_export_includes_metadata_fields() {
        let mut records = HashMap::new();
        let mut meta = record("ws", "alice", "hello");
        meta.importance = 0.4;
        meta.recall_count = 3;
        meta.timestamp = 77;
        meta.attributes.insert("k".into(), "v".into());
        records.insert(9u64, meta);

        let doc = parse(&export_graph(&records, None, None));
        let node = &doc["nodes"][0];
        assert_eq!(node["id"], 9);
        assert_eq!(node["label"], "hello");
        assert_eq!(node["namespace_id"], "ws");
        assert_eq!(node["entity_id"], "alice");
        assert_eq!(node["type"], 0);
        assert_eq!(node["recall_count"], 3);
        assert_eq!(node["timestamp"], 77);
        assert_eq!(node["attributes"]["k"], "v");
    }

    #[test]
    fn test_namespace_filter_excludes_nodes_and_dangling_edges() {
        let mut records = HashMap::new();
        let mut a = record("keep", "", "a");
        a.edges.push(Edge {
            target_id: 2,
            rel_type: "supports".into(),
            weight: 1.0,
        });
        records.insert(1u64, a);
        records.insert(2u64, record("drop", "", "b"));

        let doc = parse(&export_graph(&records, Some("keep"), None));
        assert_eq!(doc["nodes"].as_array().unwrap().len(), 1);
        assert_eq!(
            doc["edges"].as_array().unwrap().len(),
            0,
            "edge to a filtered-out node must not be emitted"
        );
    }

    #[test]
    fn test_edge_between_kept_nodes_is_emitted() {
        let mut records = HashMap::new();
        let mut a = record("ws", "", "a");
        a.edges.push(Edge {
            target_id: 2,
            rel_type: "caused_by".into(),
            weight: 0.7,
        });
        records.insert(1u64, a);
        records.insert(2u64, record("ws", "", "b"));

        let doc = parse(&export_graph(&records, Some("ws"), None));
        let edges = doc["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0]["source"], 1);
        assert_eq!(edges[0]["target"], 2);
        assert_eq!(edges[0]["rel_type"], "caused_by");
    }

    #[test]
    fn test_nodes_ordered_by_id() {
        let mut records = HashMap::new();
        for id in [42u64, 7, 100, 1] {
            records.insert(id, record("", "", ""));
        }
        let doc = parse(&export_graph(&records, None, None));
        let ids: Vec<u64> = doc["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 7, 42, 100]);
    }

    #[test]
    fn test_label_truncated_char_safe() {
        let long: String = "é".repeat(80);
        let mut records = HashMap::new();
        records.insert(1u64, record("", "", &long));
        let doc = parse(&export_graph(&records, None, None));
        assert_eq!(doc["nodes"][0]["label"].as_str().unwrap().chars().count(), 60);
    }

    #[test]
    fn test_special_characters_escaped() {
        let mut records = HashMap::new();
        records.insert(1u64, record("", "", "line1\nline2 \"quoted\" \\slash\tend"));
        let raw = export_graph(&records, None, None);
        // Must already be valid JSON; round-trip preserves the content.
        let doc = parse(&raw);
        assert_eq!(
            doc["nodes"][0]["label"],
            "line1\nline2 \"quoted\" \\slash\tend"
        );
        assert!(raw.contains("\\n"));
        assert!(raw.contains("\\\""));
    }

    #[test]
    fn test_entity_filter() {
        let mut records = HashMap::new();
        records.insert(1u64, record("ws", "alice", "a"));
        records.insert(2u64, record("ws", "bob", "b"));
        let doc = parse(&export_graph(&records, None, Some("bob")));
        let nodes = doc["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["id"], 2);
    }
}
