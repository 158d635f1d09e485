// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic search with composite relevance scoring.
//!
//! relevance = similarity
//!           + 0.10 * exp(-age_days / recency_window)
//!           + 0.10 * importance
//!           + 0.15 * keyword overlap
//!           + min(0.10, 0.02 * ln(cluster_size))

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use recall_config::model::RetrievalConfig;
use recall_core::RecallError;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::store::{MemoryEngine, MemoryState};
use crate::temporal::TemporalFilter;
use crate::text::{overlap_ratio, token_set};
use crate::types::{MemoryRecord, MemoryType, cosine_similarity};

const RECENCY_WEIGHT: f64 = 0.10;
const IMPORTANCE_WEIGHT: f64 = 0.10;
const KEYWORD_WEIGHT: f64 = 0.15;
const CLUSTER_SIZE_WEIGHT: f64 = 0.02;
const CLUSTER_SIZE_CAP: f64 = 0.10;

/// Filters and limits for [`MemoryEngine::semantic_search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub max_results: usize,
    /// Candidates below this cosine similarity are dropped.
    pub min_similarity: f32,
    pub temporal_filter: Option<TemporalFilter>,
    /// Restrict to these memory types when set.
    pub type_filter: Option<Vec<MemoryType>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_results: 10,
            min_similarity: 0.0,
            temporal_filter: None,
            type_filter: None,
        }
    }
}

impl SearchOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            max_results: config.max_results,
            min_similarity: config.min_similarity as f32,
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_temporal_filter(mut self, filter: TemporalFilter) -> Self {
        self.temporal_filter = Some(filter);
        self
    }

    pub fn with_types(mut self, types: Vec<MemoryType>) -> Self {
        self.type_filter = Some(types);
        self
    }
}

/// A same-cluster memory attached to a search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborMemory {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub memory_type: MemoryType,
    /// Cosine similarity of the neighbour itself to the query.
    pub similarity: f32,
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// The memory, without its embedding.
    pub memory: MemoryRecord,
    pub similarity: f32,
    pub relevance: f64,
    pub cluster_size: usize,
    /// Up to `neighbor_count` other members of the same cluster, newest first.
    pub neighbors: Vec<NeighborMemory>,
}

/// Scoring parameters that come from configuration rather than the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingParams {
    pub recency_window_days: f64,
    pub neighbor_count: usize,
}

impl RankingParams {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            recency_window_days: config.recency_window_days,
            neighbor_count: config.neighbor_count,
        }
    }
}

/// `0.1 * exp(-age / window)`.
pub fn recency_boost(age_days: f64, window_days: f64) -> f64 {
    if window_days <= 0.0 {
        return 0.0;
    }
    RECENCY_WEIGHT * (-age_days.max(0.0) / window_days).exp()
}

/// Sub-linear bonus for larger clusters, capped.
pub fn cluster_size_boost(size: usize) -> f64 {
    if size <= 1 {
        return 0.0;
    }
    (CLUSTER_SIZE_WEIGHT * (size as f64).ln()).min(CLUSTER_SIZE_CAP)
}

impl MemoryEngine {
    /// Embed `query` and rank stored memories against it.
    #[instrument(skip_all, fields(max_results = options.max_results))]
    pub async fn semantic_search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, RecallError> {
        if query.trim().is_empty() || options.max_results == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embed_query(query).await?;
        Ok(self.search_embedded(&embedding, query, options, Utc::now()).await)
    }

    /// Rank against an already computed query embedding.
    pub(crate) async fn search_embedded(
        &self,
        embedding: &[f32],
        query: &str,
        options: &SearchOptions,
        now: DateTime<Utc>,
    ) -> Vec<SearchResult> {
        let params = RankingParams::from_config(&self.config().retrieval);
        let state = self.read_state().await;
        let results = rank_memories(&state, embedding, query, options, &params, now);
        debug!(
            candidates = state.records.len(),
            results = results.len(),
            "semantic search ranked"
        );
        results
    }
}

/// Score, filter, sort, and truncate candidates from `state`.
pub(crate) fn rank_memories(
    state: &MemoryState,
    query_embedding: &[f32],
    query: &str,
    options: &SearchOptions,
    params: &RankingParams,
    now: DateTime<Utc>,
) -> Vec<SearchResult> {
    let query_tokens = token_set(query);
    let temporal_candidates: Option<HashSet<&str>> = options
        .temporal_filter
        .as_ref()
        .map(|f| f.candidate_ids(&state.temporal));

    let mut scored: Vec<(&MemoryRecord, f32, f64)> = state
        .records
        .values()
        .filter(|r| {
            options
                .type_filter
                .as_ref()
                .is_none_or(|types| types.contains(&r.memory_type))
        })
        .filter(|r| match (&options.temporal_filter, &temporal_candidates) {
            (Some(filter), Some(ids)) => ids.contains(r.id.as_str()) && filter.matches(r.timestamp),
            _ => true,
        })
        .filter_map(|r| {
            let similarity = cosine_similarity(query_embedding, &r.embedding);
            if similarity < options.min_similarity {
                return None;
            }
            let cluster_size = r
                .cluster_id
                .as_deref()
                .map_or(1, |c| state.clusters.size_of(c).max(1));
            let keywords_hit = {
                let mut tokens = token_set(&r.text);
                if let Some(cluster) = r.cluster_id.as_deref().and_then(|c| state.clusters.get(c)) {
                    tokens.extend(cluster.keywords.iter().cloned());
                }
                overlap_ratio(&query_tokens, &tokens)
            };
            let importance = f64::from(r.metadata.importance.unwrap_or(0.0));
            let relevance = f64::from(similarity)
                + recency_boost(r.age_days(now), params.recency_window_days)
                + IMPORTANCE_WEIGHT * importance
                + KEYWORD_WEIGHT * f64::from(keywords_hit)
                + cluster_size_boost(cluster_size);
            Some((r, similarity, relevance))
        })
        .collect();

    scored.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.id.cmp(&b.0.id)));
    scored.truncate(options.max_results);

    scored
        .into_iter()
        .map(|(record, similarity, relevance)| SearchResult {
            memory: record.without_embedding(),
            similarity,
            relevance,
            cluster_size: record
                .cluster_id
                .as_deref()
                .map_or(1, |c| state.clusters.size_of(c).max(1)),
            neighbors: neighbors_of(state, record, query_embedding, params.neighbor_count),
        })
        .collect()
}

/// Other members of `record`'s cluster, newest first.
fn neighbors_of(
    state: &MemoryState,
    record: &MemoryRecord,
    query_embedding: &[f32],
    limit: usize,
) -> Vec<NeighborMemory> {
    let Some(cluster) = record.cluster_id.as_deref().and_then(|c| state.clusters.get(c)) else {
        return Vec::new();
    };
    let mut members: Vec<&MemoryRecord> = cluster
        .member_ids
        .iter()
        .filter(|id| **id != record.id)
        .filter_map(|id| state.records.get(id))
        .collect();
    members.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    members
        .into_iter()
        .take(limit)
        .map(|m| NeighborMemory {
            id: m.id.clone(),
            text: m.text.clone(),
            timestamp: m.timestamp,
            memory_type: m.memory_type,
            similarity: cosine_similarity(query_embedding, &m.embedding),
        })
        .collect()
}
