// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Diversity guard: keeps watch-listed topics from dominating the cluster
//! population.
//!
//! A cluster is dominant when any of its keywords is on the watch-list. When
//! dominant clusters exceed the ceiling ratio, the surplus is merged into the
//! most recently updated dominant cluster and member records are repointed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::cluster::{Cluster, ClusterIndex};
use crate::types::MemoryRecord;

/// Small slack so float rounding never demands an extra merge.
const MERGE_EPSILON: f64 = 1e-9;

/// Result of a rebalance that merged clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceReport {
    /// The cluster that absorbed the others.
    pub survivor: String,
    /// Cluster ids that were merged away.
    pub merged: Vec<String>,
    /// Number of memories whose `cluster_id` was rewritten.
    pub moved_memories: usize,
    pub ratio_before: f64,
    pub ratio_after: f64,
}

#[derive(Debug, Clone)]
pub struct DiversityGuard {
    enabled: bool,
    ceiling: f64,
    watch_list: HashSet<String>,
}

impl DiversityGuard {
    pub fn new<I, S>(enabled: bool, ceiling: f64, watch_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            enabled,
            ceiling,
            watch_list: watch_list
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &recall_config::model::DiversityConfig) -> Self {
        Self::new(config.enabled, config.ceiling_ratio, &config.watch_list)
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    /// Whether any keyword of `cluster` is watch-listed.
    pub fn is_dominant(&self, cluster: &Cluster) -> bool {
        cluster
            .keywords
            .iter()
            .any(|k| self.watch_list.contains(&k.to_lowercase()))
    }

    /// Dominant clusters divided by total clusters; 0 with no clusters.
    pub fn dominant_ratio(&self, clusters: &ClusterIndex) -> f64 {
        if clusters.is_empty() {
            return 0.0;
        }
        let dominant = clusters.iter().filter(|c| self.is_dominant(c)).count();
        dominant as f64 / clusters.len() as f64
    }

    /// Cheap ratio check run before the merge path.
    pub fn is_breached(&self, clusters: &ClusterIndex) -> bool {
        self.enabled && !self.watch_list.is_empty() && self.dominant_ratio(clusters) > self.ceiling
    }

    /// Merge surplus dominant clusters if the ceiling is breached.
    ///
    /// Every record that pointed at a merged-away cluster is rewritten to the
    /// survivor before this returns.
    pub fn rebalance(
        &self,
        clusters: &mut ClusterIndex,
        records: &mut HashMap<String, MemoryRecord>,
        now: DateTime<Utc>,
    ) -> Option<RebalanceReport> {
        if !self.is_breached(clusters) {
            return None;
        }
        let ratio_before = self.dominant_ratio(clusters);

        let mut dominant: Vec<&Cluster> = clusters.iter().filter(|c| self.is_dominant(c)).collect();
        let merges = merges_needed(dominant.len(), clusters.len(), self.ceiling);
        if merges == 0 {
            return None;
        }

        // Newest first; equal timestamps favour the older cluster.
        dominant.sort_by(|a, b| b.updated.cmp(&a.updated).then(a.seq.cmp(&b.seq)));
        let survivor = dominant[0].id.clone();
        // Victims are the least recently updated.
        let merged: Vec<String> = dominant
            .iter()
            .rev()
            .take(merges)
            .map(|c| c.id.clone())
            .collect();

        let moved = clusters.merge(&survivor, &merged, records, now);
        for id in &moved {
            if let Some(record) = records.get_mut(id) {
                record.cluster_id = Some(survivor.clone());
            }
        }

        let report = RebalanceReport {
            survivor,
            merged,
            moved_memories: moved.len(),
            ratio_before,
            ratio_after: self.dominant_ratio(clusters),
        };
        info!(
            survivor = %report.survivor,
            merged = report.merged.len(),
            moved = report.moved_memories,
            ratio_before = report.ratio_before,
            ratio_after = report.ratio_after,
            "diversity guard merged dominant clusters"
        );
        metrics::counter!("recall_cluster_rebalances_total").increment(1);
        Some(report)
    }
}

/// Number of dominant clusters to merge away so that
/// `(dominant - k) / (total - k) <= ceiling`.
///
/// Never merges the last dominant cluster, so the result is at most
/// `dominant - 1`.
pub fn merges_needed(dominant: usize, total: usize, ceiling: f64) -> usize {
    if dominant <= 1 || ceiling >= 1.0 || total == 0 {
        return 0;
    }
    let (d, n) = (dominant as f64, total as f64);
    if d / n <= ceiling {
        return 0;
    }
    let k = ((d - ceiling * n) / (1.0 - ceiling) - MERGE_EPSILON).ceil();
    (k.max(0.0) as usize).min(dominant - 1)
}
