// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory engine: record storage, temporal and cluster indexes, and
//! snapshot persistence behind a single-writer lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use recall_config::RecallConfig;
use recall_core::traits::truncate_for_embedding;
use recall_core::{EmbeddingAdapter, EmbeddingInput, RecallError};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};

use crate::cluster::{ClusterIndex, ClusterSettings};
use crate::diversity::DiversityGuard;
use crate::snapshot::{EncodedSnapshot, SnapshotFiles};
use crate::temporal::TemporalIndex;
use crate::types::{MemoryRecord, MemoryType, NewMemory, memory_id};

/// In-memory state guarded by the engine's `RwLock`.
#[derive(Debug, Default)]
pub(crate) struct MemoryState {
    pub(crate) records: HashMap<String, MemoryRecord>,
    pub(crate) temporal: TemporalIndex,
    pub(crate) clusters: ClusterIndex,
    /// Embedding length, fixed by the first stored memory.
    pub(crate) dimensions: Option<usize>,
}

/// Aggregate statistics over the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total: usize,
    pub by_type: BTreeMap<MemoryType, usize>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    /// Days between oldest and newest memory.
    pub span_days: f64,
    pub cluster_count: usize,
    pub dominant_ratio: f64,
}

/// Read-only view of a cluster for introspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub id: String,
    pub size: usize,
    pub keywords: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub dominant: bool,
}

/// Outcome of a retention pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PruneReport {
    /// Removed for exceeding `max_age_days`.
    pub expired: usize,
    /// Removed for exceeding `max_memories`.
    pub evicted: usize,
    pub remaining: usize,
    /// Dominant clusters merged away by the diversity guard afterwards.
    pub merged_clusters: usize,
}

impl PruneReport {
    pub fn removed(&self) -> usize {
        self.expired + self.evicted
    }
}

/// Owned memory store with clustering and persistence.
///
/// Writes are serialized through an async mutex. Reads share the state lock
/// and never hold it across an embedding call.
pub struct MemoryEngine {
    config: RecallConfig,
    cluster_settings: ClusterSettings,
    embedder: Arc<dyn EmbeddingAdapter>,
    guard: DiversityGuard,
    files: SnapshotFiles,
    state: RwLock<MemoryState>,
    writer: Mutex<()>,
}

impl MemoryEngine {
    /// Open the store described by `config`, loading any existing snapshot.
    ///
    /// Cluster membership is reconciled against the loaded records; records
    /// no cluster claims are re-clustered. The diversity guard then runs once
    /// against the current watch list. An unreadable snapshot is set aside
    /// and the engine starts empty.
    pub async fn open(
        config: RecallConfig,
        embedder: Arc<dyn EmbeddingAdapter>,
    ) -> Result<Self, RecallError> {
        let files = SnapshotFiles::from_config(&config.storage);
        let cluster_settings = ClusterSettings {
            threshold: config.clustering.similarity_threshold as f32,
            max_clusters: config.clustering.max_clusters,
            keyword_limit: config.clustering.keywords_per_cluster,
        };
        let guard = DiversityGuard::from_config(&config.diversity);

        let (memory_doc, cluster_doc) = files.load().await?;
        let (records, temporal) = memory_doc.into_records();
        let mut state = MemoryState {
            records,
            temporal,
            clusters: cluster_doc.into_index(),
            dimensions: None,
        };
        let now = Utc::now();
        let mut repaired = reconcile_state(&mut state, &cluster_settings, now);
        // The watch list or ceiling may have changed since the snapshot.
        if guard
            .rebalance(&mut state.clusters, &mut state.records, now)
            .is_some()
        {
            repaired = true;
        }

        let engine = Self {
            config,
            cluster_settings,
            embedder,
            guard,
            files,
            state: RwLock::new(state),
            writer: Mutex::new(()),
        };

        {
            let state = engine.state.read().await;
            info!(
                memories = state.records.len(),
                clusters = state.clusters.len(),
                path = %engine.files.memory_path().display(),
                "memory engine opened"
            );
        }
        if repaired {
            info!("snapshot reconciled on load, rewriting");
            let snapshot = engine.encode().await;
            engine.persist(snapshot).await;
        }
        Ok(engine)
    }

    /// Store a new memory and return it with its assigned cluster.
    ///
    /// Identical text at the same timestamp returns the existing record
    /// without calling the embedding provider. A provider failure leaves the
    /// store untouched. Persistence failures are logged and retried by the
    /// next write.
    #[instrument(skip_all, fields(memory_type = %memory.memory_type))]
    pub async fn add_memory(&self, memory: NewMemory) -> Result<MemoryRecord, RecallError> {
        memory.validate()?;
        let timestamp = memory.timestamp.unwrap_or_else(Utc::now);
        let id = memory_id(timestamp, &memory.text);

        let _writer = self.writer.lock().await;
        if let Some(existing) = self.state.read().await.records.get(&id) {
            debug!(memory_id = %id, "duplicate memory, returning stored record");
            return Ok(existing.clone());
        }

        let embedding = self.embed_text(&memory.text).await?;
        let now = Utc::now();

        let (record, snapshot) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            if let Some(expected) = state.dimensions
                && expected != embedding.len()
            {
                return Err(RecallError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }

            // Cheap ratio check; merges only when the ceiling is breached.
            self.guard
                .rebalance(&mut state.clusters, &mut state.records, now);

            state.dimensions.get_or_insert(embedding.len());
            state.temporal.insert(timestamp, &id);
            state.records.insert(
                id.clone(),
                MemoryRecord {
                    id: id.clone(),
                    text: memory.text,
                    timestamp,
                    memory_type: memory.memory_type,
                    metadata: memory.metadata,
                    embedding,
                    cluster_id: None,
                },
            );

            let assignment = match state.records.get(&id) {
                Some(record) => {
                    state
                        .clusters
                        .assign(record, &state.records, &self.cluster_settings, now)
                }
                None => return Err(RecallError::Internal("inserted memory vanished".into())),
            };
            if let Some(record) = state.records.get_mut(&id) {
                record.cluster_id = Some(assignment.cluster_id().to_string());
            }
            debug!(memory_id = %id, assignment = ?assignment, "memory clustered");

            // Removals can shrink the non-dominant cluster count; the ratio
            // check must come after them.
            if let Some(cap) = self.config.retention.max_memories {
                let evicted = evict_over_cap(state, cap, Some(&id), &self.cluster_settings, now);
                if evicted > 0 {
                    info!(evicted, cap, "retention cap evicted oldest memories");
                }
            }

            self.guard
                .rebalance(&mut state.clusters, &mut state.records, now);

            let record = state
                .records
                .get(&id)
                .cloned()
                .ok_or_else(|| RecallError::Internal("inserted memory vanished".into()))?;
            let snapshot = EncodedSnapshot::encode(&state.records, &state.temporal, &state.clusters);
            (record, snapshot)
        };

        metrics::counter!("recall_memories_added_total", "type" => record.memory_type.as_str())
            .increment(1);
        self.persist(snapshot).await;
        Ok(record)
    }

    /// Look up a memory by id.
    pub async fn get_memory(&self, id: &str) -> Option<MemoryRecord> {
        self.state.read().await.records.get(id).cloned()
    }

    /// Number of stored memories.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// True when no memories are stored.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Totals, type distribution, time span, and cluster shape.
    pub async fn get_stats(&self) -> MemoryStats {
        let state = self.state.read().await;
        let mut by_type = BTreeMap::new();
        for record in state.records.values() {
            *by_type.entry(record.memory_type).or_insert(0) += 1;
        }
        let oldest = state.records.values().map(|r| r.timestamp).min();
        let newest = state.records.values().map(|r| r.timestamp).max();
        let span_days = match (oldest, newest) {
            (Some(o), Some(n)) => (n - o).num_seconds() as f64 / 86_400.0,
            _ => 0.0,
        };
        MemoryStats {
            total: state.records.len(),
            by_type,
            oldest,
            newest,
            span_days,
            cluster_count: state.clusters.len(),
            dominant_ratio: self.guard.dominant_ratio(&state.clusters),
        }
    }

    /// Cluster summaries, largest first.
    pub async fn clusters(&self) -> Vec<ClusterSummary> {
        let state = self.state.read().await;
        let mut summaries: Vec<ClusterSummary> = state
            .clusters
            .iter()
            .map(|c| ClusterSummary {
                id: c.id.clone(),
                size: c.size(),
                keywords: c.keywords.clone(),
                created: c.created,
                updated: c.updated,
                dominant: self.guard.is_dominant(c),
            })
            .collect();
        summaries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    /// Apply the retention policy relative to `now`.
    #[instrument(skip_all)]
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<PruneReport, RecallError> {
        let _writer = self.writer.lock().await;
        let (report, snapshot) = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            let mut report = PruneReport::default();

            if let Some(days) = self.config.retention.max_age_days {
                let cutoff = now - Duration::days(i64::from(days));
                let expired: Vec<String> = state
                    .records
                    .values()
                    .filter(|r| r.timestamp < cutoff)
                    .map(|r| r.id.clone())
                    .collect();
                for id in &expired {
                    remove_record(state, id, &self.cluster_settings, now);
                }
                report.expired = expired.len();
            }
            if let Some(cap) = self.config.retention.max_memories {
                report.evicted = evict_over_cap(state, cap, None, &self.cluster_settings, now);
            }
            report.remaining = state.records.len();

            if report.removed() > 0
                && let Some(rebalance) =
                    self.guard
                        .rebalance(&mut state.clusters, &mut state.records, now)
            {
                report.merged_clusters = rebalance.merged.len();
            }

            if report.removed() == 0 {
                return Ok(report);
            }
            let snapshot = EncodedSnapshot::encode(&state.records, &state.temporal, &state.clusters);
            (report, snapshot)
        };
        info!(
            expired = report.expired,
            evicted = report.evicted,
            remaining = report.remaining,
            merged_clusters = report.merged_clusters,
            "retention pass removed memories"
        );
        self.persist(snapshot).await;
        Ok(report)
    }

    /// Rewrite both snapshots now, surfacing any persistence error.
    pub async fn flush(&self) -> Result<(), RecallError> {
        let _writer = self.writer.lock().await;
        let snapshot = self.encode().await?;
        self.files.write(&snapshot).await
    }

    /// The configuration this engine was opened with.
    pub fn config(&self) -> &RecallConfig {
        &self.config
    }

    /// The guard that keeps watched topics under the ceiling ratio.
    pub fn diversity_guard(&self) -> &DiversityGuard {
        &self.guard
    }

    /// Embed `text` for querying. Never holds the state lock.
    pub(crate) async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        self.embed_text(text).await
    }

    pub(crate) async fn read_state(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().await
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let ceiling = self
            .embedder
            .max_input_chars()
            .min(self.config.embedding.max_input_chars);
        let input = truncate_for_embedding(text, ceiling);
        let output = self.embedder.embed(EmbeddingInput::single(input)).await?;
        let embedding = output
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RecallError::provider("embedding provider returned no vectors"))?;
        if embedding.is_empty() {
            return Err(RecallError::provider("embedding provider returned an empty vector"));
        }
        let declared = self.embedder.dimensions();
        if declared != embedding.len() {
            return Err(RecallError::DimensionMismatch {
                expected: declared,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    async fn encode(&self) -> Result<EncodedSnapshot, RecallError> {
        let state = self.state.read().await;
        EncodedSnapshot::encode(&state.records, &state.temporal, &state.clusters)
    }

    /// Write a snapshot; failures are logged, counted, and left for the next
    /// write to retry.
    async fn persist(&self, snapshot: Result<EncodedSnapshot, RecallError>) {
        let result = match snapshot {
            Ok(snapshot) => self.files.write(&snapshot).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist memory snapshot, continuing in memory");
            metrics::counter!("recall_persistence_failures_total").increment(1);
        }
    }
}

/// Repair state loaded from disk. Returns true if anything changed.
fn reconcile_state(state: &mut MemoryState, settings: &ClusterSettings, now: DateTime<Utc>) -> bool {
    let mut changed = false;

    // The most common embedding length wins; stragglers cannot be compared.
    let mut lengths: HashMap<usize, usize> = HashMap::new();
    for record in state.records.values() {
        *lengths.entry(record.embedding.len()).or_insert(0) += 1;
    }
    let dimensions = lengths
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(len, _)| len);
    if let Some(dims) = dimensions {
        let before = state.records.len();
        state.records.retain(|id, r| {
            let keep = r.embedding.len() == dims;
            if !keep {
                warn!(memory_id = %id, expected = dims, actual = r.embedding.len(), "dropping memory with mismatched embedding length");
            }
            keep
        });
        changed |= state.records.len() != before;
    }
    state.dimensions = dimensions;

    let orphans = state.clusters.reconcile(&mut state.records, settings.keyword_limit);
    let mut orphans: Vec<(DateTime<Utc>, String)> = orphans
        .into_iter()
        .filter_map(|id| state.records.get(&id).map(|r| (r.timestamp, id)))
        .collect();
    orphans.sort();
    for (_, id) in &orphans {
        let Some(record) = state.records.get(id) else {
            continue;
        };
        let assignment = state.clusters.assign(record, &state.records, settings, now);
        if let Some(record) = state.records.get_mut(id) {
            record.cluster_id = Some(assignment.cluster_id().to_string());
        }
    }
    if !orphans.is_empty() {
        warn!(count = orphans.len(), "re-clustered memories missing from cluster snapshot");
        changed = true;
    }

    let temporal_changed = state
        .temporal
        .reconcile(state.records.values().map(|r| (r.id.as_str(), r.timestamp)));
    changed || temporal_changed
}

/// Remove one memory from every index.
fn remove_record(state: &mut MemoryState, id: &str, settings: &ClusterSettings, now: DateTime<Utc>) {
    let Some(record) = state.records.remove(id) else {
        return;
    };
    state.temporal.remove(record.timestamp, id);
    if let Some(cluster_id) = record.cluster_id.as_deref() {
        state
            .clusters
            .remove_member(cluster_id, id, &state.records, settings.keyword_limit, now);
    }
}

/// Drop the oldest memories until at most `cap` remain, never removing
/// `keep`. Returns how many were removed.
fn evict_over_cap(
    state: &mut MemoryState,
    cap: usize,
    keep: Option<&str>,
    settings: &ClusterSettings,
    now: DateTime<Utc>,
) -> usize {
    let excess = state.records.len().saturating_sub(cap);
    if excess == 0 {
        return 0;
    }
    let mut candidates: Vec<(DateTime<Utc>, String)> = state
        .records
        .values()
        .filter(|r| Some(r.id.as_str()) != keep)
        .map(|r| (r.timestamp, r.id.clone()))
        .collect();
    candidates.sort();
    let victims: Vec<String> = candidates.into_iter().take(excess).map(|(_, id)| id).collect();
    for id in &victims {
        remove_record(state, id, settings, now);
    }
    victims.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cosine_similarity;
    use async_trait::async_trait;
    use recall_core::{AdapterType, EmbeddingOutput, HealthStatus, PluginAdapter};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Maps a few keywords onto fixed axes; fails on demand.
    struct AxisEmbedder {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl AxisEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl PluginAdapter for AxisEmbedder {
        fn name(&self) -> &str {
            "axis"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Embedding
        }
        async fn health_check(&self) -> Result<HealthStatus, RecallError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), RecallError> {
            Ok(())
        }
    }

    #[async_trait]
    impl EmbeddingAdapter for AxisEmbedder {
        async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(RecallError::provider("offline"));
            }
            let embeddings = input
                .texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("budget") { 1.0 } else { 0.0 },
                        if t.contains("hiking") { 1.0 } else { 0.0 },
                        if t.contains("robots") { 1.0 } else { 0.05 },
                    ]
                })
                .collect();
            Ok(EmbeddingOutput {
                embeddings,
                dimensions: 3,
            })
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    fn config(dir: &std::path::Path) -> RecallConfig {
        let mut config = RecallConfig::default();
        config.storage.data_dir = dir.display().to_string();
        config
    }

    #[tokio::test]
    async fn add_memory_assigns_cluster_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::open(config(dir.path()), AxisEmbedder::new()).await.unwrap();

        let a = engine.add_memory(NewMemory::new("Quarterly budget planning")).await.unwrap();
        let b = engine.add_memory(NewMemory::new("Budget spreadsheet review")).await.unwrap();
        let c = engine.add_memory(NewMemory::new("Hiking trails")).await.unwrap();

        assert_eq!(a.cluster_id, b.cluster_id);
        assert_ne!(a.cluster_id, c.cluster_id);
        assert!(cosine_similarity(&a.embedding, &b.embedding) > 0.99);

        let state = engine.read_state().await;
        assert_eq!(state.records.len(), 3);
        assert_eq!(state.temporal.len(), 3);
        assert_eq!(state.dimensions, Some(3));
    }

    #[tokio::test]
    async fn duplicate_skips_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = AxisEmbedder::new();
        let engine = MemoryEngine::open(config(dir.path()), embedder.clone()).await.unwrap();
        let ts = Utc::now();

        let first = engine.add_memory(NewMemory::new("budget").at(ts)).await.unwrap();
        let second = engine.add_memory(NewMemory::new("budget").at(ts)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.len().await, 1);
    }

    #[tokio::test]
    async fn provider_failure_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = AxisEmbedder::new();
        embedder.fail.store(true, Ordering::SeqCst);
        let cfg = config(dir.path());
        let memory_path = cfg.storage.memory_path();
        let engine = MemoryEngine::open(cfg, embedder).await.unwrap();

        let err = engine.add_memory(NewMemory::new("budget")).await.unwrap_err();
        assert!(err.is_provider());
        assert!(engine.is_empty().await);
        assert!(engine.read_state().await.temporal.is_empty());
        assert!(!memory_path.exists());
    }

    #[tokio::test]
    async fn malformed_record_never_embeds() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = AxisEmbedder::new();
        let engine = MemoryEngine::open(config(dir.path()), embedder.clone()).await.unwrap();
        let err = engine.add_memory(NewMemory::new("")).await.unwrap_err();
        assert!(matches!(err, RecallError::MalformedRecord(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stats_report_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MemoryEngine::open(config(dir.path()), AxisEmbedder::new()).await.unwrap();
        let now = Utc::now();
        engine
            .add_memory(NewMemory::new("budget call").with_type(MemoryType::Event).at(now - Duration::days(2)))
            .await
            .unwrap();
        engine
            .add_memory(NewMemory::new("prefers hiking").with_type(MemoryType::Preference).at(now))
            .await
            .unwrap();

        let stats = engine.get_stats().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_type[&MemoryType::Event], 1);
        assert_eq!(stats.by_type[&MemoryType::Preference], 1);
        assert!((stats.span_days - 2.0).abs() < 1e-6);
        assert_eq!(stats.cluster_count, 2);
    }

    #[tokio::test]
    async fn reopen_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = AxisEmbedder::new();
        let a = {
            let engine = MemoryEngine::open(config(dir.path()), embedder.clone()).await.unwrap();
            engine.add_memory(NewMemory::new("budget planning")).await.unwrap()
        };
        let engine = MemoryEngine::open(config(dir.path()), embedder).await.unwrap();
        let loaded = engine.get_memory(&a.id).await.unwrap();
        assert_eq!(loaded, a);
        assert_eq!(engine.clusters().await.len(), 1);
    }

    #[tokio::test]
    async fn retention_cap_evicts_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.retention.max_memories = Some(2);
        let engine = MemoryEngine::open(cfg, AxisEmbedder::new()).await.unwrap();
        let now = Utc::now();
        let oldest = engine
            .add_memory(NewMemory::new("budget one").at(now - Duration::days(3)))
            .await
            .unwrap();
        engine.add_memory(NewMemory::new("budget two").at(now - Duration::days(2))).await.unwrap();
        engine.add_memory(NewMemory::new("hiking three").at(now - Duration::days(1))).await.unwrap();

        assert_eq!(engine.len().await, 2);
        assert!(engine.get_memory(&oldest.id).await.is_none());
        let state = engine.read_state().await;
        assert!(state.clusters.iter().all(|c| !c.member_ids.contains(&oldest.id)));
        assert_eq!(state.temporal.len(), 2);
    }

    #[tokio::test]
    async fn prune_removes_expired() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.retention.max_age_days = Some(30);
        let engine = MemoryEngine::open(cfg, AxisEmbedder::new()).await.unwrap();
        let now = Utc::now();
        engine.add_memory(NewMemory::new("hiking old").at(now - Duration::days(40))).await.unwrap();
        let fresh = engine.add_memory(NewMemory::new("budget new").at(now)).await.unwrap();

        let report = engine.prune(now).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.remaining, 1);
        assert!(engine.get_memory(&fresh.id).await.is_some());
        assert_eq!(engine.clusters().await.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_reclusters_orphans_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let cluster_path = cfg.storage.cluster_path();
        let embedder = AxisEmbedder::new();
        {
            let engine = MemoryEngine::open(cfg.clone(), embedder.clone()).await.unwrap();
            engine.add_memory(NewMemory::new("budget planning")).await.unwrap();
            engine.add_memory(NewMemory::new("hiking trip")).await.unwrap();
        }
        std::fs::remove_file(&cluster_path).unwrap();

        let engine = MemoryEngine::open(cfg, embedder).await.unwrap();
        let state = engine.read_state().await;
        assert_eq!(state.clusters.len(), 2);
        for record in state.records.values() {
            let cluster = state.clusters.get(record.cluster_id.as_deref().unwrap()).unwrap();
            assert!(cluster.member_ids.contains(&record.id));
        }
        drop(state);
        assert!(cluster_path.exists());
    }

    #[tokio::test]
    async fn corrupt_snapshot_opens_empty_and_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let memory_path = cfg.storage.memory_path();
        std::fs::create_dir_all(memory_path.parent().unwrap()).unwrap();
        std::fs::write(&memory_path, b"[truncated").unwrap();

        let engine = MemoryEngine::open(cfg, AxisEmbedder::new()).await.unwrap();
        assert!(engine.is_empty().await);

        engine.add_memory(NewMemory::new("budget planning")).await.unwrap();
        let mut aside = memory_path.clone().into_os_string();
        aside.push(".corrupt");
        assert_eq!(std::fs::read(aside).unwrap(), b"[truncated");
        assert!(memory_path.exists());
    }
}
