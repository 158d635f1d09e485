// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-strategy context retrieval.
//!
//! Up to four strategies produce candidate fragments:
//!
//! - **semantic**: embedding search over stored memories
//! - **keyword**: Jaccard overlap against recent conversation turns
//! - **temporal**: semantic search gated by a recognized temporal phrase
//! - **cross-reference**: cluster neighbours of the top semantic hits
//!
//! A cross-reference fragment takes `0.6` of its parent's relevance, capped
//! at the neighbour's own similarity to the query, so an off-topic cluster
//! mate never outranks the hits that surfaced it.
//!
//! Candidates are deduplicated by a normalized content prefix (highest
//! relevance wins), then fused:
//!
//! `score = min(1, relevance + source_boost + 0.05 * exp(-age / window) + min(0.05, 0.01 * cluster_size))`
//!
//! A failing strategy is logged and skipped; the call itself never fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use recall_core::HistoryAdapter;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::search::{SearchOptions, SearchResult};
use crate::store::MemoryEngine;
use crate::temporal::{TemporalReference, parse_temporal_reference};
use crate::text::{content_tokens, jaccard, token_set};
use crate::types::MemoryType;

/// Cross-reference fragments inherit this share of their parent's relevance,
/// capped at their own query similarity.
const CROSS_REFERENCE_DECAY: f64 = 0.6;
/// Number of top semantic hits expanded by the cross-reference strategy.
const CROSS_REFERENCE_PARENTS: usize = 3;
const FUSED_RECENCY_WEIGHT: f64 = 0.05;
const FUSED_CLUSTER_WEIGHT: f64 = 0.01;
const FUSED_CLUSTER_CAP: f64 = 0.05;

const CONVERSATIONAL_CUES: &[&str] = &[
    "we talked",
    "we discussed",
    "we spoke",
    "you said",
    "you told me",
    "i told you",
    "i mentioned",
    "last time",
    "remember when",
    "remember what",
    "do you remember",
    "our conversation",
];

const RELATIONAL_CUES: &[&str] = &[
    "related",
    "similar",
    "more about",
    "everything about",
    "connected to",
    "anything else",
    "other things",
];

/// Which strategy produced a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    Semantic,
    Keyword,
    Temporal,
    CrossReference,
}

impl RetrievalSource {
    /// Additive boost applied in the fused score.
    pub fn boost(self) -> f64 {
        match self {
            RetrievalSource::Semantic => 0.10,
            RetrievalSource::Temporal => 0.07,
            RetrievalSource::CrossReference => 0.04,
            RetrievalSource::Keyword => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RetrievalSource::Semantic => "semantic",
            RetrievalSource::Keyword => "keyword",
            RetrievalSource::Temporal => "temporal",
            RetrievalSource::CrossReference => "cross_reference",
        }
    }
}

impl std::fmt::Display for RetrievalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategies to run for a retrieval call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrategySet {
    pub semantic: bool,
    pub keyword: bool,
    pub temporal: bool,
    pub cross_reference: bool,
}

impl StrategySet {
    pub fn all() -> Self {
        Self {
            semantic: true,
            keyword: true,
            temporal: true,
            cross_reference: true,
        }
    }

    pub fn none() -> Self {
        Self {
            semantic: false,
            keyword: false,
            temporal: false,
            cross_reference: false,
        }
    }

    pub fn semantic_only() -> Self {
        Self {
            semantic: true,
            ..Self::none()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::none()
    }
}

impl Default for StrategySet {
    fn default() -> Self {
        Self::all()
    }
}

/// Options for [`HybridRetriever::retrieve_context`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub max_results: usize,
    pub strategies: StrategySet,
    pub type_filter: Option<Vec<MemoryType>>,
    pub min_similarity: f32,
}

impl RetrievalOptions {
    pub fn from_config(config: &recall_config::model::RetrievalConfig) -> Self {
        Self {
            max_results: config.max_results,
            strategies: StrategySet::all(),
            type_filter: None,
            min_similarity: config.min_similarity as f32,
        }
    }

    pub fn with_strategies(mut self, strategies: StrategySet) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_limit(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// One piece of retrieved context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextFragment {
    /// Source memory id; `None` for conversation-history fragments.
    pub memory_id: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub source: RetrievalSource,
    /// Strategy-level relevance before fusion.
    pub relevance: f64,
    /// Fused score in [0, 1].
    pub score: f64,
    pub cluster_size: usize,
}

/// Candidate counts per strategy, before deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StrategyContributions {
    pub semantic: usize,
    pub keyword: usize,
    pub temporal: usize,
    pub cross_reference: usize,
}

impl StrategyContributions {
    fn add(&mut self, source: RetrievalSource, n: usize) {
        match source {
            RetrievalSource::Semantic => self.semantic += n,
            RetrievalSource::Keyword => self.keyword += n,
            RetrievalSource::Temporal => self.temporal += n,
            RetrievalSource::CrossReference => self.cross_reference += n,
        }
    }

    pub fn total(&self) -> usize {
        self.semantic + self.keyword + self.temporal + self.cross_reference
    }
}

/// Output of a retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub fragments: Vec<ContextFragment>,
    pub contributions: StrategyContributions,
    /// No fragments and at least one strategy failed.
    pub fallback: bool,
    pub failed_strategies: Vec<RetrievalSource>,
}

/// Cheap lexical pre-analysis of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnalysis {
    pub temporal: Option<TemporalReference>,
    /// Phrases like "you said" or "last time".
    pub conversational_cue: bool,
    /// Phrases like "related" or "more about".
    pub relational_cue: bool,
    pub content_tokens: Vec<String>,
}

impl QueryAnalysis {
    /// Strategies worth running for this query.
    ///
    /// Conversational recall with a known profile is answered from history
    /// alone, so it needs no embedding call.
    pub fn recommended(&self, has_profile: bool) -> StrategySet {
        let history_only = has_profile && self.conversational_cue && !self.relational_cue;
        let set = StrategySet {
            semantic: !self.content_tokens.is_empty() && !history_only,
            keyword: has_profile && self.conversational_cue,
            temporal: self.temporal.is_some(),
            cross_reference: self.relational_cue,
        };
        if set.is_empty() {
            StrategySet::semantic_only()
        } else {
            set
        }
    }
}

/// Inspect `query` for temporal phrases and recall cues.
pub fn analyze_query(query: &str, now: DateTime<Utc>) -> QueryAnalysis {
    let padded = format!(" {} ", crate::text::tokenize(query).join(" "));
    let has_cue = |cues: &[&str]| cues.iter().any(|cue| padded.contains(&format!(" {cue} ")));
    QueryAnalysis {
        temporal: parse_temporal_reference(query, now),
        conversational_cue: has_cue(CONVERSATIONAL_CUES),
        relational_cue: has_cue(RELATIONAL_CUES),
        content_tokens: content_tokens(query),
    }
}

/// Fused score for one fragment, capped at 1.
pub fn fused_score(
    relevance: f64,
    source: RetrievalSource,
    age_days: f64,
    recency_window_days: f64,
    cluster_size: usize,
) -> f64 {
    let recency = if recency_window_days > 0.0 {
        FUSED_RECENCY_WEIGHT * (-age_days.max(0.0) / recency_window_days).exp()
    } else {
        0.0
    };
    let cluster = (FUSED_CLUSTER_WEIGHT * cluster_size as f64).min(FUSED_CLUSTER_CAP);
    (relevance + source.boost() + recency + cluster).clamp(0.0, 1.0)
}

/// Normalized dedup key: trimmed, lowercased, first `prefix_len` chars.
pub fn dedup_key(content: &str, prefix_len: usize) -> String {
    content
        .trim()
        .to_lowercase()
        .chars()
        .take(prefix_len)
        .collect()
}

/// Keep one fragment per dedup key, preferring higher relevance and then
/// the stronger source. First-seen order is preserved.
pub fn dedup_fragments(fragments: Vec<ContextFragment>, prefix_len: usize) -> Vec<ContextFragment> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ContextFragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        let key = dedup_key(&fragment.content, prefix_len);
        match slots.get(&key) {
            Some(&i) => {
                let current = &kept[i];
                if fragment.relevance > current.relevance
                    || (fragment.relevance == current.relevance
                        && fragment.source.boost() > current.source.boost())
                {
                    kept[i] = fragment;
                }
            }
            None => {
                slots.insert(key, kept.len());
                kept.push(fragment);
            }
        }
    }
    kept
}

/// Orchestrates retrieval strategies over one engine and one history source.
pub struct HybridRetriever {
    engine: Arc<MemoryEngine>,
    history: Arc<dyn HistoryAdapter>,
}

impl HybridRetriever {
    pub fn new(engine: Arc<MemoryEngine>, history: Arc<dyn HistoryAdapter>) -> Self {
        Self { engine, history }
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }

    /// Run the selected strategies and return fused, deduplicated fragments.
    ///
    /// The keyword strategy needs a `profile_id`; without one it contributes
    /// nothing.
    #[instrument(skip_all, fields(profile = profile_id.unwrap_or("-"), max_results = options.max_results))]
    pub async fn retrieve_context(
        &self,
        query: &str,
        profile_id: Option<&str>,
        options: &RetrievalOptions,
    ) -> RetrievalResult {
        let started = Instant::now();
        let now = Utc::now();
        let config = &self.engine.config().retrieval;
        let strategies = options.strategies;

        let mut candidates: Vec<ContextFragment> = Vec::new();
        let mut contributions = StrategyContributions::default();
        let mut failed: Vec<RetrievalSource> = Vec::new();
        let mut fail = |source: RetrievalSource, error: &dyn std::fmt::Display| {
            warn!(strategy = %source, error = %error, "retrieval strategy failed, continuing");
            metrics::counter!("recall_strategy_failures_total", "strategy" => source.as_str())
                .increment(1);
            failed.push(source);
        };

        if strategies.keyword
            && let Some(profile_id) = profile_id
        {
            match self.keyword_fragments(query, profile_id, config.history_limit).await {
                Ok(fragments) => {
                    contributions.add(RetrievalSource::Keyword, fragments.len());
                    candidates.extend(fragments);
                }
                Err(e) => fail(RetrievalSource::Keyword, &e),
            }
        }

        let temporal_ref = if strategies.temporal {
            parse_temporal_reference(query, now)
        } else {
            None
        };
        let wants_hits = strategies.semantic || strategies.cross_reference;
        let wants_embedding = wants_hits || temporal_ref.is_some();

        if wants_embedding && !query.trim().is_empty() {
            match self.engine.embed_query(query).await {
                Ok(embedding) => {
                    let search = SearchOptions {
                        max_results: options.max_results,
                        min_similarity: options.min_similarity,
                        temporal_filter: None,
                        type_filter: options.type_filter.clone(),
                    };

                    if wants_hits {
                        let hits = self.engine.search_embedded(&embedding, query, &search, now).await;
                        if strategies.semantic {
                            let fragments: Vec<ContextFragment> = hits
                                .iter()
                                .map(|hit| memory_fragment(hit, RetrievalSource::Semantic))
                                .collect();
                            contributions.add(RetrievalSource::Semantic, fragments.len());
                            candidates.extend(fragments);
                        }
                        if strategies.cross_reference {
                            let fragments = cross_reference_fragments(&hits);
                            contributions.add(RetrievalSource::CrossReference, fragments.len());
                            candidates.extend(fragments);
                        }
                    }

                    if let Some(reference) = &temporal_ref {
                        let filtered = SearchOptions {
                            temporal_filter: Some(reference.to_filter(config.temporal_tolerance_days)),
                            ..search
                        };
                        let hits = self.engine.search_embedded(&embedding, query, &filtered, now).await;
                        debug!(phrase = %reference.phrase, hits = hits.len(), "temporal strategy");
                        contributions.add(RetrievalSource::Temporal, hits.len());
                        candidates.extend(
                            hits.iter()
                                .map(|hit| memory_fragment(hit, RetrievalSource::Temporal)),
                        );
                    }
                }
                Err(e) => {
                    if strategies.semantic {
                        fail(RetrievalSource::Semantic, &e);
                    }
                    if temporal_ref.is_some() {
                        fail(RetrievalSource::Temporal, &e);
                    }
                    if strategies.cross_reference {
                        fail(RetrievalSource::CrossReference, &e);
                    }
                }
            }
        }

        let mut fragments = dedup_fragments(candidates, config.dedup_prefix_len);
        for fragment in &mut fragments {
            let age_days = (now - fragment.timestamp).num_seconds().max(0) as f64 / 86_400.0;
            fragment.score = fused_score(
                fragment.relevance,
                fragment.source,
                age_days,
                config.recency_window_days,
                fragment.cluster_size,
            );
        }
        fragments.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.relevance.total_cmp(&a.relevance))
                .then_with(|| a.content.cmp(&b.content))
        });
        fragments.truncate(options.max_results);

        let result = RetrievalResult {
            fallback: fragments.is_empty() && !failed.is_empty(),
            fragments,
            contributions,
            failed_strategies: failed,
        };
        metrics::histogram!("recall_retrieval_latency_seconds").record(started.elapsed().as_secs_f64());
        info!(
            fragments = result.fragments.len(),
            candidates = result.contributions.total(),
            failed = result.failed_strategies.len(),
            fallback = result.fallback,
            "context retrieved"
        );
        result
    }

    /// Pick strategies from a cheap look at the query, then retrieve.
    #[instrument(skip_all)]
    pub async fn smart_search(&self, query: &str, profile_id: Option<&str>) -> RetrievalResult {
        let analysis = analyze_query(query, Utc::now());
        let strategies = analysis.recommended(profile_id.is_some());
        debug!(?strategies, temporal = analysis.temporal.is_some(), "smart search plan");
        let options = RetrievalOptions::from_config(&self.engine.config().retrieval)
            .with_strategies(strategies);
        self.retrieve_context(query, profile_id, &options).await
    }

    async fn keyword_fragments(
        &self,
        query: &str,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<ContextFragment>, recall_core::RecallError> {
        let query_tokens = token_set(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let turns = self.history.recent_turns(profile_id, limit).await?;
        Ok(turns
            .into_iter()
            .filter_map(|turn| {
                let score = jaccard(&query_tokens, &token_set(&turn.text));
                (score > 0.0).then(|| ContextFragment {
                    memory_id: None,
                    content: turn.text,
                    timestamp: turn.timestamp,
                    source: RetrievalSource::Keyword,
                    relevance: f64::from(score),
                    score: 0.0,
                    cluster_size: 0,
                })
            })
            .collect())
    }
}

fn memory_fragment(hit: &SearchResult, source: RetrievalSource) -> ContextFragment {
    ContextFragment {
        memory_id: Some(hit.memory.id.clone()),
        content: hit.memory.text.clone(),
        timestamp: hit.memory.timestamp,
        source,
        relevance: hit.relevance,
        score: 0.0,
        cluster_size: hit.cluster_size,
    }
}

fn cross_reference_fragments(hits: &[SearchResult]) -> Vec<ContextFragment> {
    hits.iter()
        .take(CROSS_REFERENCE_PARENTS)
        .flat_map(|hit| {
            hit.neighbors.iter().map(move |n| ContextFragment {
                memory_id: Some(n.id.clone()),
                content: n.text.clone(),
                timestamp: n.timestamp,
                source: RetrievalSource::CrossReference,
                relevance: (hit.relevance * CROSS_REFERENCE_DECAY)
                    .min(f64::from(n.similarity))
                    .max(0.0),
                score: 0.0,
                cluster_size: hit.cluster_size,
            })
        })
        .collect()
}
