//! The embedded store engine.
//!
//! [`FeatherDb`] owns the modality registry (name → HNSW index), the
//! authoritative metadata table, and the derived reverse edge index. Every
//! operation is synchronous and takes `&self`/`&mut self`; callers that need
//! sharing wrap the engine themselves.

use crate::config;
use crate::error::{FeatherError, Result};
use crate::graph::{self, export, ContextChainResult, ContextNode};
use crate::hnsw::{knn_search, knn_search_filtered, HnswIndex};
use crate::record::{Edge, IncomingEdge, Metadata};
use crate::scoring::{self, ScoringConfig};
use crate::search::{SearchFilter, SearchHit};
use crate::storage::codec::{self, ReadOutcome};
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;

/// Wall-clock seconds since epoch, clamped to non-negative.
fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Embedded single-file vector store with a typed knowledge graph.
///
/// Records never leave the store: there is no delete or compaction. Vectors
/// live inside the per-modality HNSW indices; metadata is the authoritative
/// table and the indices can always be rebuilt from the persisted vectors.
#[derive(Debug)]
pub struct FeatherDb {
    path: PathBuf,
    /// Modality registry: name → HNSW index with its fixed dimension.
    modalities: HashMap<String, HnswIndex>,
    /// Authoritative id → metadata table. Owns all forward edges.
    records: HashMap<u64, Metadata>,
    /// Derived transpose of the forward edge set; rebuilt on open.
    reverse: HashMap<u64, Vec<IncomingEdge>>,
    persist_on_drop: bool,
}

impl FeatherDb {
    /// Open the store at `path`, creating a fresh one when the file does not
    /// exist. The default `"text"` modality uses a 768-wide vector space.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_dim(path, config::DEFAULT_DIM)
    }

    /// Open with an explicit dimension for the eagerly created `"text"`
    /// modality (only used when the file carried no indices).
    pub fn open_with_dim(path: impl Into<PathBuf>, default_dim: usize) -> Result<Self> {
        let mut db = Self {
            path: path.into(),
            modalities: HashMap::new(),
            records: HashMap::new(),
            reverse: HashMap::new(),
            persist_on_drop: true,
        };

        if let ReadOutcome::Loaded(loaded) = codec::read_store(&db.path)? {
            db.records = loaded.records;
            for section in loaded.modalities {
                let index = db
                    .modalities
                    .entry(section.name)
                    .or_insert_with(|| HnswIndex::with_default_config(section.dim as usize));
                for (id, vector) in &section.vectors {
                    if vector.len() == index.dimension() {
                        index.add_point(vector, *id);
                    }
                }
            }
        }

        if db.modalities.is_empty() {
            db.modalities.insert(
                config::DEFAULT_MODALITY.to_string(),
                HnswIndex::with_default_config(default_dim),
            );
        }
        db.rebuild_reverse_index();
        Ok(db)
    }

    // ── Ingestion ────────────────────────────────────────────────────

    /// Insert or replace the vector stored under `(id, modality)` and merge
    /// the metadata.
    ///
    /// Re-adding an id under a new modality keeps the record's accumulated
    /// edges when the incoming metadata carries none. Fails with
    /// [`FeatherError::DimensionMismatch`] when the vector length conflicts
    /// with the modality's fixed dimension.
    pub fn add(&mut self, id: u64, vector: &[f32], meta: Metadata, modality: &str) -> Result<()> {
        let index = self.get_or_create_index(modality, vector.len())?;
        index.add_point(vector, id);
        self.insert_or_merge(id, meta);
        self.resync_reverse_for(id);
        Ok(())
    }

    fn get_or_create_index(&mut self, modality: &str, dim: usize) -> Result<&mut HnswIndex> {
        match self.modalities.entry(modality.to_string()) {
            Entry::Occupied(entry) => {
                let expected = entry.get().dimension();
                if expected != dim {
                    return Err(FeatherError::DimensionMismatch {
                        modality: modality.to_string(),
                        expected,
                        got: dim,
                    });
                }
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => Ok(entry.insert(HnswIndex::with_default_config(dim))),
        }
    }

    /// Merge policy: a fresh record stores `meta` verbatim; on an existing
    /// record the incoming value wins field-by-field except that an empty
    /// incoming edge list preserves the accumulated edges.
    fn insert_or_merge(&mut self, id: u64, mut meta: Metadata) {
        if let Some(existing) = self.records.get(&id) {
            if meta.edges.is_empty() && !existing.edges.is_empty() {
                meta.edges = existing.edges.clone();
            }
        }
        self.records.insert(id, meta);
    }

    // ── Search ───────────────────────────────────────────────────────

    /// Approximate nearest neighbor search, optionally filtered and
    /// temporally scored.
    ///
    /// With a scoring config, `3k` candidates are fetched so the re-rank can
    /// promote older-but-sticky records. Every ANN candidate gets its recall
    /// counter bumped; hits are then sorted by score descending (ties by id)
    /// and truncated to `k`. An unknown modality yields an empty result.
    pub fn search(
        &mut self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
        scoring: Option<&ScoringConfig>,
        modality: &str,
    ) -> Vec<SearchHit> {
        let Some(index) = self.modalities.get(modality) else {
            return Vec::new();
        };
        let candidates = if scoring.is_some() {
            k * config::SCORING_CANDIDATE_FACTOR
        } else {
            k
        };

        let records = &self.records;
        let raw: Vec<(f32, u64)> = match filter {
            Some(f) => {
                let admit = |internal: u32| {
                    records
                        .get(&index.label_at(internal))
                        .map(|m| f.matches(m))
                        .unwrap_or(false)
                };
                knn_search_filtered(index, query, candidates, &admit)
            }
            None => knn_search(index, query, candidates),
        }
        .into_iter()
        .map(|(dist, internal)| (dist, index.label_at(internal)))
        .collect();

        let now = now_secs();
        let mut hits: Vec<SearchHit> = Vec::with_capacity(raw.len());
        for (dist, id) in raw {
            // Score against the record as it stood at query time; the recall
            // bump below must not feed back into this query's stickiness.
            let score = match (scoring, self.records.get(&id)) {
                (Some(cfg), Some(meta)) => scoring::score(dist, meta, cfg, now as i64),
                (Some(cfg), None) => scoring::score(dist, &Metadata::default(), cfg, now as i64),
                (None, _) => scoring::similarity(dist),
            };
            self.touch_at(id, now);
            let metadata = self.records.get(&id).cloned().unwrap_or_default();
            hits.push(SearchHit {
                id,
                score,
                metadata,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits
    }

    // ── Graph ────────────────────────────────────────────────────────

    /// Append a typed weighted edge `from → to`.
    ///
    /// Idempotent on `(from, to, rel_type)`: repeats are no-ops even with a
    /// different weight. An unknown `from` drops the edge silently — callers
    /// may link against ids they have not registered yet, and those edges
    /// are intentionally lost.
    pub fn link(&mut self, from: u64, to: u64, rel_type: &str, weight: f32) {
        let Some(meta) = self.records.get_mut(&from) else {
            return;
        };
        if meta.has_edge(to, rel_type) {
            return;
        }
        meta.edges.push(Edge {
            target_id: to,
            rel_type: rel_type.to_string(),
            weight,
        });
        self.reverse.entry(to).or_default().push(IncomingEdge {
            source_id: from,
            rel_type: rel_type.to_string(),
            weight,
        });
    }

    /// Connect each stored vector to its near-duplicates.
    ///
    /// For every element of the modality, queries `candidates + 1` neighbors
    /// (the extra slot absorbs the self-hit) and creates a directed edge of
    /// weight `1/(1+distance)` wherever that similarity reaches `threshold`
    /// and no equal-typed edge exists yet. Sources without a metadata record
    /// get a default one. Returns the number of edges created.
    pub fn auto_link(
        &mut self,
        modality: &str,
        threshold: f32,
        rel_type: &str,
        candidates: usize,
    ) -> usize {
        let Some(index) = self.modalities.get(modality) else {
            return 0;
        };

        let mut proposals: Vec<(u64, u64, f32)> = Vec::new();
        for internal in 0..index.node_count() {
            let from = index.label_at(internal);
            let query = index.vector_at(internal).to_vec();
            for (dist, hit) in knn_search(index, &query, candidates + 1) {
                let to = index.label_at(hit);
                if to == from {
                    continue;
                }
                let sim = scoring::similarity(dist);
                if sim >= threshold {
                    proposals.push((from, to, sim));
                }
            }
        }

        let mut created = 0;
        for (from, to, sim) in proposals {
            let meta = self.records.entry(from).or_default();
            if meta.has_edge(to, rel_type) {
                continue;
            }
            meta.edges.push(Edge {
                target_id: to,
                rel_type: rel_type.to_string(),
                weight: sim,
            });
            self.reverse.entry(to).or_default().push(IncomingEdge {
                source_id: from,
                rel_type: rel_type.to_string(),
                weight: sim,
            });
            created += 1;
        }
        tracing::debug!(created, modality, "auto-link pass finished");
        created
    }

    /// Vector-seeded graph query: `k` ANN seeds, then bounded BFS through
    /// outgoing and incoming edges for at most `hops` hops.
    ///
    /// Seeds get their recall counters bumped; expansion-reached nodes do
    /// not. Node scores are `base × importance × stickiness`, where `base`
    /// is the seed similarity at hop 0 and `1/(1+hop)` beyond. An unknown
    /// modality yields an empty result.
    pub fn context_chain(
        &mut self,
        query: &[f32],
        k: usize,
        hops: u32,
        modality: &str,
    ) -> ContextChainResult {
        let Some(index) = self.modalities.get(modality) else {
            return ContextChainResult::default();
        };

        let seeds: HashMap<u64, f32> = knn_search(index, query, k)
            .into_iter()
            .map(|(dist, internal)| (index.label_at(internal), scoring::similarity(dist)))
            .collect();

        let now = now_secs();
        for &id in seeds.keys() {
            self.touch_at(id, now);
        }

        let (visited, edges) = graph::expand(&self.records, &self.reverse, &seeds, hops);

        let mut nodes: Vec<ContextNode> = visited
            .into_iter()
            .map(|(id, hop)| {
                let meta = self.records.get(&id).cloned().unwrap_or_default();
                let similarity = seeds.get(&id).copied().unwrap_or(0.0);
                let base = if hop == 0 {
                    similarity
                } else {
                    1.0 / (1.0 + hop as f32)
                };
                let score = base * meta.importance * scoring::stickiness(meta.recall_count);
                ContextNode {
                    id,
                    score,
                    similarity,
                    hop,
                    metadata: meta,
                }
            })
            .collect();
        nodes.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        ContextChainResult { nodes, edges }
    }

    /// Serialize the (optionally namespace/entity-filtered) graph as a JSON
    /// document with no dangling edges.
    pub fn export_graph(&self, namespace: Option<&str>, entity: Option<&str>) -> String {
        export::export_graph(&self.records, namespace, entity)
    }

    // ── Salience & metadata writes ───────────────────────────────────

    /// Record a recall: bump the counter and stamp the current wall clock.
    /// Unknown ids are ignored.
    pub fn touch(&mut self, id: u64) {
        self.touch_at(id, now_secs());
    }

    fn touch_at(&mut self, id: u64, now: u64) {
        if let Some(meta) = self.records.get_mut(&id) {
            meta.recall_count = meta.recall_count.saturating_add(1);
            meta.last_recalled_at = now;
        }
    }

    /// Replace a record's metadata wholesale and resynchronize its reverse
    /// index contribution (stale incoming entries sourced at `id` are
    /// removed before the new edges are mirrored).
    pub fn update_metadata(&mut self, id: u64, meta: Metadata) {
        self.records.insert(id, meta);
        self.resync_reverse_for(id);
    }

    /// Set a record's importance. Unknown ids are ignored.
    pub fn update_importance(&mut self, id: u64, importance: f32) {
        if let Some(meta) = self.records.get_mut(&id) {
            meta.importance = importance;
        }
    }

    /// Set one attribute key. Unknown ids are ignored.
    pub fn set_attribute(&mut self, id: u64, key: &str, value: &str) {
        if let Some(meta) = self.records.get_mut(&id) {
            meta.attributes.insert(key.to_string(), value.to_string());
        }
    }

    /// Fetch one attribute value.
    pub fn get_attribute(&self, id: u64, key: &str) -> Option<String> {
        self.records.get(&id)?.attributes.get(key).cloned()
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get_metadata(&self, id: u64) -> Option<&Metadata> {
        self.records.get(&id)
    }

    /// Outgoing edges of `id` (empty for unknown ids).
    pub fn get_edges(&self, id: u64) -> &[Edge] {
        self.records.get(&id).map(|m| m.edges.as_slice()).unwrap_or(&[])
    }

    /// Incoming edges of `id` from the reverse index (empty for unknown ids).
    pub fn get_incoming(&self, id: u64) -> &[IncomingEdge] {
        self.reverse.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Raw stored vector for `(id, modality)`.
    pub fn get_vector(&self, id: u64, modality: &str) -> Option<&[f32]> {
        self.modalities.get(modality)?.vector_by_label(id)
    }

    /// All ids present in a modality, in insertion order.
    pub fn get_all_ids(&self, modality: &str) -> Vec<u64> {
        self.modalities
            .get(modality)
            .map(|index| index.labels().collect())
            .unwrap_or_default()
    }

    /// Number of records in the metadata table.
    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// Fixed dimension of a modality, if it exists.
    pub fn dim(&self, modality: &str) -> Option<usize> {
        self.modalities.get(modality).map(|index| index.dimension())
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write the whole store to its file (atomic temp-file + rename).
    pub fn save(&self) -> Result<()> {
        codec::write_store(&self.path, &self.records, &self.modalities)
    }

    /// Save and consume the engine, surfacing any I/O error. Prefer this
    /// over relying on the drop-time auto-save.
    pub fn close(mut self) -> Result<()> {
        self.persist_on_drop = false;
        self.save()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn rebuild_reverse_index(&mut self) {
        self.reverse.clear();
        for (&id, meta) in &self.records {
            for e in &meta.edges {
                self.reverse.entry(e.target_id).or_default().push(IncomingEdge {
                    source_id: id,
                    rel_type: e.rel_type.clone(),
                    weight: e.weight,
                });
            }
        }
    }

    /// Drop every incoming entry sourced at `id`, then mirror the record's
    /// current forward edges. Keeps the reverse index an exact transpose.
    fn resync_reverse_for(&mut self, id: u64) {
        for list in self.reverse.values_mut() {
            list.retain(|ie| ie.source_id != id);
        }
        let edges: Vec<Edge> = self
            .records
            .get(&id)
            .map(|m| m.edges.clone())
            .unwrap_or_default();
        for e in edges {
            self.reverse.entry(e.target_id).or_default().push(IncomingEdge {
                source_id: id,
                rel_type: e.rel_type,
                weight: e.weight,
            });
        }
    }
}

impl Drop for FeatherDb {
    fn drop(&mut self) {
        if self.persist_on_drop {
            if let Err(e) = self.save() {
                tracing::warn!(path = %self.path.display(), "auto-save on drop failed: {e}");
            }
        }
    }
}
