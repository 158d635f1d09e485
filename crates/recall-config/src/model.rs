// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Recall memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Recall configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecallConfig {
    /// Snapshot file locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Online clustering settings.
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Topic-diversity guard settings.
    #[serde(default)]
    pub diversity: DiversityConfig,

    /// Search and retrieval-fusion settings.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Retention limits. Unset limits mean unbounded growth.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Snapshot persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the snapshot documents and downloaded models.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// File name of the memory/temporal document inside `data_dir`.
    #[serde(default = "default_memory_file")]
    pub memory_file: String,

    /// File name of the clusters document inside `data_dir`.
    #[serde(default = "default_cluster_file")]
    pub cluster_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            memory_file: default_memory_file(),
            cluster_file: default_cluster_file(),
        }
    }
}

impl StorageConfig {
    /// Full path of the memory/temporal document.
    pub fn memory_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.memory_file)
    }

    /// Full path of the clusters document.
    pub fn cluster_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.cluster_file)
    }
}

fn default_data_dir() -> String {
    "recall-data".to_string()
}

fn default_memory_file() -> String {
    "memory_index.json".to_string()
}

fn default_cluster_file() -> String {
    "clusters.json".to_string()
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Name of the local embedding model.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Vector dimensionality produced by the provider.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Length ceiling in chars; longer text is truncated before embedding.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            dimensions: default_dimensions(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_max_input_chars() -> usize {
    2000
}

/// Online nearest-centroid clustering configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClusteringConfig {
    /// Minimum cosine similarity to a centroid for a memory to join that cluster.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Soft cap on the number of clusters.
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    /// Number of frequency-ranked keywords kept as a cluster label.
    #[serde(default = "default_keywords_per_cluster")]
    pub keywords_per_cluster: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_clusters: default_max_clusters(),
            keywords_per_cluster: default_keywords_per_cluster(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.7
}

fn default_max_clusters() -> usize {
    50
}

fn default_keywords_per_cluster() -> usize {
    5
}

/// Diversity guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiversityConfig {
    /// Enable the guard. When false clusters are never merged.
    #[serde(default = "default_diversity_enabled")]
    pub enabled: bool,

    /// Maximum allowed share of dominant-topic clusters (0.0-1.0].
    #[serde(default = "default_ceiling_ratio")]
    pub ceiling_ratio: f64,

    /// Keywords that mark a cluster as belonging to the watched topic.
    #[serde(default = "default_watch_list")]
    pub watch_list: Vec<String>,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            enabled: default_diversity_enabled(),
            ceiling_ratio: default_ceiling_ratio(),
            watch_list: default_watch_list(),
        }
    }
}

fn default_diversity_enabled() -> bool {
    true
}

fn default_ceiling_ratio() -> f64 {
    0.6
}

fn default_watch_list() -> Vec<String> {
    ["robot", "robots", "consciousness", "conscious", "sentient", "identity"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Search and retrieval-fusion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    /// Default number of results returned by search and context retrieval.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Default minimum cosine similarity for semantic search.
    #[serde(default)]
    pub min_similarity: f64,

    /// Characteristic window of the exponential recency decay, in days.
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: f64,

    /// Tolerance applied by temporal filters, in days either side.
    #[serde(default = "default_temporal_tolerance_days")]
    pub temporal_tolerance_days: i64,

    /// Number of cluster neighbours attached to each semantic hit.
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,

    /// Length of the normalised content prefix used to deduplicate fragments.
    #[serde(default = "default_dedup_prefix_len")]
    pub dedup_prefix_len: usize,

    /// Number of recent conversation turns scanned by keyword retrieval.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_similarity: 0.0,
            recency_window_days: default_recency_window_days(),
            temporal_tolerance_days: default_temporal_tolerance_days(),
            neighbor_count: default_neighbor_count(),
            dedup_prefix_len: default_dedup_prefix_len(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_max_results() -> usize {
    10
}

fn default_recency_window_days() -> f64 {
    30.0
}

fn default_temporal_tolerance_days() -> i64 {
    1
}

fn default_neighbor_count() -> usize {
    3
}

fn default_dedup_prefix_len() -> usize {
    50
}

fn default_history_limit() -> usize {
    20
}

/// Retention configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Keep at most this many memories; the oldest are pruned first.
    #[serde(default)]
    pub max_memories: Option<usize>,

    /// Prune memories older than this many days.
    #[serde(default)]
    pub max_age_days: Option<u32>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
