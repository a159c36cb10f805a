//! # feather-db
//!
//! Embedded, single-file vector database with an in-process knowledge graph
//! and adaptive temporal scoring. Float vectors are stored per named
//! *modality* in HNSW indices sharing one metadata table; records carry
//! typed weighted edges, and queries compose ANN search with metadata
//! filters, recall-aware decay scoring, and bounded graph expansion.
//!
//! The engine is synchronous and single-owner-mutable: wrap it yourself if
//! you need sharing across threads.
//!
//! ```no_run
//! use feather_db::{FeatherDb, Metadata};
//!
//! let mut db = FeatherDb::open_with_dim("memories.feather", 3)?;
//! db.add(1, &[0.9, 0.1, 0.0], Metadata::default(), "text")?;
//! db.add(2, &[0.8, 0.2, 0.0], Metadata::default(), "text")?;
//! db.link(1, 2, "supports", 0.9);
//! let hits = db.search(&[0.9, 0.1, 0.0], 5, None, None, "text");
//! let chain = db.context_chain(&[0.9, 0.1, 0.0], 3, 2, "text");
//! db.close()?;
//! # Ok::<(), feather_db::FeatherError>(())
//! ```

/// Global tuning constants and format identifiers.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Context-chain graph queries and JSON export.
pub mod graph;
/// HNSW approximate nearest neighbor index, one per modality.
pub mod hnsw;
/// Record types: metadata, categories, edges.
pub mod record;
/// Composite similarity + temporal decay scoring.
pub mod scoring;
/// Filter predicate and scored hit types.
pub mod search;
/// Store engine and file codec.
pub mod storage;

pub use error::{FeatherError, Result};
pub use graph::{ContextChainResult, ContextEdge, ContextNode};
pub use record::{ContextType, Edge, IncomingEdge, Metadata, CONVENTIONAL_REL_TYPES};
pub use scoring::ScoringConfig;
pub use search::{SearchFilter, SearchHit};
pub use storage::FeatherDb;
