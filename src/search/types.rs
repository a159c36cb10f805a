//! Scored result types for search queries.

use crate::record::Metadata;
use serde::Serialize;

/// One search hit with its relevance score and a metadata snapshot.
///
/// The score is plain similarity `1/(1+distance)` unless a scoring config
/// was supplied, in which case it is the composite temporal score. The
/// snapshot reflects the record *after* its recall counter was bumped.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: u64,
    pub score: f32,
    pub metadata: Metadata,
}
