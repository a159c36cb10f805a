//! Composite relevance scoring: similarity blended with adaptive temporal decay.
//!
//! Distance converts to similarity as `1 / (1 + d)` (distances are squared
//! Euclidean). Recency decays exponentially with age, but frequently recalled
//! records accumulate "stickiness" — a log-scaled multiplier that stretches
//! their effective half-life so core memories fade slower.

use crate::config;
use crate::record::Metadata;
use serde::{Deserialize, Serialize};

/// Tuning knobs for the composite score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Half-life of the recency term, in days.
    pub half_life_days: f32,
    /// Blend weight of recency vs. similarity, in [0, 1].
    pub time_weight: f32,
    /// Floor applied to the recency term before blending.
    pub min_weight: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            half_life_days: config::DEFAULT_HALF_LIFE_DAYS,
            time_weight: config::DEFAULT_TIME_WEIGHT,
            min_weight: config::DEFAULT_MIN_WEIGHT,
        }
    }
}

/// Convert a squared-L2 distance to a similarity in (0, 1].
///
/// Negative distances cannot occur for L2² but are clamped to zero anyway.
#[inline]
pub fn similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Recall-derived decay brake: 1.0 for never-recalled records, growing
/// logarithmically (recall_count 10 → ~3.4, 100 → ~5.6).
#[inline]
pub fn stickiness(recall_count: u32) -> f32 {
    1.0 + (1.0 + recall_count as f32).ln()
}

/// Composite score for one search hit.
///
/// `now` is wall-clock seconds since epoch; records with timestamps in the
/// future are treated as age zero.
pub fn score(distance: f32, meta: &Metadata, cfg: &ScoringConfig, now: i64) -> f32 {
    let sim = similarity(distance);

    let age_seconds = (now - meta.timestamp).max(0) as f64;
    let age_days = age_seconds / config::SECONDS_PER_DAY;
    let effective_age_days = age_days as f32 / stickiness(meta.recall_count);

    let mut recency = 0.5f32.powf(effective_age_days / cfg.half_life_days);
    if recency < cfg.min_weight {
        recency = cfg.min_weight;
    }

    ((1.0 - cfg.time_weight) * sim + cfg.time_weight * recency) * meta.importance
}
