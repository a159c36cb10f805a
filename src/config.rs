//! Global configuration constants for feather-db.
//!
//! Index tuning parameters, file-format identifiers, and scoring defaults are
//! defined here. These are compile-time constants; per-query knobs (filters,
//! scoring configs) travel as arguments.

/// Number of bidirectional links per HNSW node above layer 0.
///
/// Higher values improve recall but increase memory and build time.
/// Typical range: 8–64. Default: 16.
pub const HNSW_M: usize = 16;

/// Maximum links per node at layer 0 (`2 * M`).
pub const HNSW_M_MAX0: usize = HNSW_M * 2;

/// Candidate list size during index construction.
///
/// Higher values produce a better graph but slow down inserts.
pub const HNSW_EF_CONSTRUCTION: usize = 200;

/// Candidate list size during search.
///
/// Search widens to `max(HNSW_EF_SEARCH, requested candidates)` so selective
/// filters still have headroom to find enough passing results.
pub const HNSW_EF_SEARCH: usize = 50;

/// Maximum number of layers in the HNSW graph.
pub const HNSW_MAX_LAYERS: usize = 16;

/// Default vector dimension for the eagerly created `"text"` modality.
pub const DEFAULT_DIM: usize = 768;

/// Name of the modality created when a store opens with no persisted indices.
pub const DEFAULT_MODALITY: &str = "text";

/// File magic: ASCII `FEAT` as a u32, stored little-endian like every other
/// integer in the format.
pub const FILE_MAGIC: u32 = 0x4645_4154;

/// Format version emitted by the writer.
pub const FILE_VERSION: u32 = 5;

/// Oldest format version the reader accepts.
pub const FILE_MIN_VERSION: u32 = 2;

/// Half-life, in days, of the default temporal decay.
pub const DEFAULT_HALF_LIFE_DAYS: f32 = 30.0;

/// Default blend weight of recency vs. similarity in the composite score.
pub const DEFAULT_TIME_WEIGHT: f32 = 0.3;

/// Default floor applied to the recency term.
pub const DEFAULT_MIN_WEIGHT: f32 = 0.0;

/// Candidate multiplier when temporal scoring re-ranks search results.
///
/// Requesting `3k` ANN candidates gives the re-rank enough headroom to
/// promote older-but-sticky records into the final top `k`.
pub const SCORING_CANDIDATE_FACTOR: usize = 3;

/// Default similarity threshold for `auto_link`.
pub const AUTO_LINK_THRESHOLD: f32 = 0.80;

/// Default neighbor candidates examined per node during `auto_link`.
pub const AUTO_LINK_CANDIDATES: usize = 15;

/// Relation type assigned when none is given (`link`, `auto_link`, and
/// legacy-link promotion during load).
pub const DEFAULT_REL_TYPE: &str = "related_to";

/// Maximum characters of `content` used as a node label in graph export.
pub const EXPORT_LABEL_MAX_CHARS: usize = 60;

/// Seconds per day, used by the age computation in scoring.
pub const SECONDS_PER_DAY: f64 = 86_400.0;
