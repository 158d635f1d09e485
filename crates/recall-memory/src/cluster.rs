// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Online nearest-centroid clustering of memory embeddings.
//!
//! Each new embedding attaches to the most similar existing cluster when the
//! cosine similarity reaches the configured threshold, otherwise it seeds a new
//! singleton cluster. Centroids are recomputed from scratch on every change.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::extract_keywords_from;
use crate::types::{MemoryRecord, cosine_similarity, mean_vector};

/// A group of semantically similar memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    /// Creation sequence number, used for deterministic tie-breaks.
    pub seq: u64,
    /// Ids of member memories. Never empty for a live cluster.
    pub member_ids: BTreeSet<String>,
    /// Mean of member embeddings.
    pub centroid: Vec<f32>,
    /// Frequency-ranked label tokens.
    pub keywords: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.member_ids.len()
    }
}

/// Tuning knobs for cluster assignment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSettings {
    /// Minimum cosine similarity for attaching to an existing cluster.
    pub threshold: f32,
    /// Soft cap on the number of clusters.
    pub max_clusters: usize,
    /// Number of keywords kept per cluster.
    pub keyword_limit: usize,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            max_clusters: 50,
            keyword_limit: 5,
        }
    }
}

/// Outcome of assigning a memory to a cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// Joined an existing cluster.
    Attached { cluster_id: String, similarity: f32 },
    /// Seeded a new cluster.
    Created { cluster_id: String },
}

impl Assignment {
    pub fn cluster_id(&self) -> &str {
        match self {
            Assignment::Attached { cluster_id, .. } | Assignment::Created { cluster_id } => {
                cluster_id
            }
        }
    }
}

/// The set of live clusters.
#[derive(Debug, Clone, Default)]
pub struct ClusterIndex {
    clusters: BTreeMap<String, Cluster>,
    next_seq: u64,
}

impl ClusterIndex {
    /// Rebuild an index from persisted clusters.
    pub fn from_clusters(clusters: Vec<Cluster>) -> Self {
        let next_seq = clusters.iter().map(|c| c.seq + 1).max().unwrap_or(0);
        Self {
            clusters: clusters.into_iter().map(|c| (c.id.clone(), c)).collect(),
            next_seq,
        }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Cluster> {
        self.clusters.get(id)
    }

    /// Clusters in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Size of a cluster, 0 if it does not exist.
    pub fn size_of(&self, id: &str) -> usize {
        self.clusters.get(id).map_or(0, Cluster::size)
    }

    /// The most similar cluster with strictly positive similarity.
    ///
    /// Ties go to the cluster created first.
    pub fn nearest(&self, embedding: &[f32]) -> Option<(&Cluster, f32)> {
        let mut best: Option<(&Cluster, f32)> = None;
        for cluster in self.clusters.values() {
            let sim = cosine_similarity(embedding, &cluster.centroid);
            if sim <= 0.0 {
                continue;
            }
            best = match best {
                Some((b, bs)) if bs > sim || (bs == sim && b.seq < cluster.seq) => Some((b, bs)),
                _ => Some((cluster, sim)),
            };
        }
        best
    }

    /// Place `record` in a cluster and return where it went.
    ///
    /// `records` must already contain `record` so the cluster's centroid and
    /// keywords include it. The caller sets `record.cluster_id`.
    pub fn assign(
        &mut self,
        record: &MemoryRecord,
        records: &HashMap<String, MemoryRecord>,
        settings: &ClusterSettings,
        now: DateTime<Utc>,
    ) -> Assignment {
        let nearest = self
            .nearest(&record.embedding)
            .map(|(c, sim)| (c.id.clone(), sim));

        let target = match nearest {
            Some((id, sim)) if sim >= settings.threshold => Some((id, sim)),
            // Soft cap: past the limit, prefer the nearest cluster over a new one.
            Some((id, sim)) if self.clusters.len() >= settings.max_clusters => Some((id, sim)),
            _ => None,
        };

        match target {
            Some((cluster_id, similarity)) => {
                if let Some(cluster) = self.clusters.get_mut(&cluster_id) {
                    cluster.member_ids.insert(record.id.clone());
                    cluster.updated = now;
                }
                self.rebuild(&cluster_id, records, settings.keyword_limit);
                Assignment::Attached {
                    cluster_id,
                    similarity,
                }
            }
            None => {
                let cluster_id = self.create(record, settings.keyword_limit, now);
                Assignment::Created { cluster_id }
            }
        }
    }

    /// Seed a singleton cluster from `record`.
    pub fn create(&mut self, record: &MemoryRecord, keyword_limit: usize, now: DateTime<Utc>) -> String {
        let seq = self.next_seq;
        self.next_seq += 1;
        let id = format!("cluster-{seq:06}");
        let cluster = Cluster {
            id: id.clone(),
            seq,
            member_ids: BTreeSet::from([record.id.clone()]),
            centroid: record.embedding.clone(),
            keywords: extract_keywords_from([record.text.as_str()], keyword_limit),
            created: now,
            updated: now,
        };
        self.clusters.insert(id.clone(), cluster);
        id
    }

    /// Recompute centroid and keywords of `id` from its members.
    pub fn rebuild(&mut self, id: &str, records: &HashMap<String, MemoryRecord>, keyword_limit: usize) {
        let Some(cluster) = self.clusters.get_mut(id) else {
            return;
        };
        let members: Vec<&MemoryRecord> = cluster
            .member_ids
            .iter()
            .filter_map(|m| records.get(m))
            .collect();
        cluster.centroid = mean_vector(members.iter().map(|r| r.embedding.as_slice()));
        cluster.keywords = extract_keywords_from(members.iter().map(|r| r.text.as_str()), keyword_limit);
    }

    /// Merge `victims` into `survivor`.
    ///
    /// Members and keywords are unioned and the centroid recomputed over the
    /// union. Returns the ids of memories that moved; their `cluster_id` must be
    /// rewritten by the caller.
    pub fn merge(
        &mut self,
        survivor: &str,
        victims: &[String],
        records: &HashMap<String, MemoryRecord>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        if !self.clusters.contains_key(survivor) {
            return Vec::new();
        }
        let mut moved = Vec::new();
        let mut extra_keywords = Vec::new();
        for victim in victims.iter().filter(|v| v.as_str() != survivor) {
            if let Some(cluster) = self.clusters.remove(victim) {
                moved.extend(cluster.member_ids);
                extra_keywords.extend(cluster.keywords);
            }
        }

        if let Some(cluster) = self.clusters.get_mut(survivor) {
            cluster.member_ids.extend(moved.iter().cloned());
            for keyword in extra_keywords {
                if !cluster.keywords.contains(&keyword) {
                    cluster.keywords.push(keyword);
                }
            }
            cluster.centroid = mean_vector(
                cluster
                    .member_ids
                    .iter()
                    .filter_map(|m| records.get(m))
                    .map(|r| r.embedding.as_slice()),
            );
            cluster.updated = now;
        }
        moved
    }

    /// Remove a member. Drops the cluster when it empties, otherwise
    /// recomputes its centroid and keywords. Returns true if the cluster was
    /// dropped.
    pub fn remove_member(
        &mut self,
        cluster_id: &str,
        memory_id: &str,
        records: &HashMap<String, MemoryRecord>,
        keyword_limit: usize,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(cluster) = self.clusters.get_mut(cluster_id) else {
            return false;
        };
        cluster.member_ids.remove(memory_id);
        if cluster.member_ids.is_empty() {
            self.clusters.remove(cluster_id);
            return true;
        }
        cluster.updated = now;
        self.rebuild(cluster_id, records, keyword_limit);
        false
    }

    /// Repair membership against the authoritative record set.
    ///
    /// Drops member ids with no record, keeps each record in only the first
    /// cluster that lists it, removes empty clusters, rewrites every record's
    /// `cluster_id`, and returns the ids of records no cluster claims.
    pub fn reconcile(
        &mut self,
        records: &mut HashMap<String, MemoryRecord>,
        keyword_limit: usize,
    ) -> Vec<String> {
        let mut claimed: HashMap<String, String> = HashMap::new();
        let mut touched = Vec::new();
        for cluster in self.clusters.values_mut() {
            let before = cluster.member_ids.len();
            cluster
                .member_ids
                .retain(|m| records.contains_key(m) && !claimed.contains_key(m));
            for member in &cluster.member_ids {
                claimed.insert(member.clone(), cluster.id.clone());
            }
            if cluster.member_ids.len() != before {
                touched.push(cluster.id.clone());
            }
        }
        self.clusters.retain(|_, c| !c.member_ids.is_empty());
        for id in touched {
            self.rebuild(&id, records, keyword_limit);
        }

        let mut orphans = Vec::new();
        for (id, record) in records.iter_mut() {
            record.cluster_id = claimed.get(id).cloned();
            if record.cluster_id.is_none() {
                orphans.push(id.clone());
            }
        }
        orphans.sort();
        orphans
    }

    /// Clusters as a list for persistence.
    pub fn to_vec(&self) -> Vec<&Cluster> {
        self.clusters.values().collect()
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Cluster> {
        self.clusters.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn record(id: &str, text: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            id: id.into(),
            text: text.into(),
            timestamp: now(),
            memory_type: MemoryType::Note,
            metadata: Default::default(),
            embedding,
            cluster_id: None,
        }
    }

    fn add(
        index: &mut ClusterIndex,
        records: &mut HashMap<String, MemoryRecord>,
        r: MemoryRecord,
        settings: &ClusterSettings,
    ) -> Assignment {
        let id = r.id.clone();
        records.insert(id.clone(), r);
        let assignment = index.assign(&records[&id], records, settings, now());
        records.get_mut(&id).unwrap().cluster_id = Some(assignment.cluster_id().to_string());
        assignment
    }

    #[test]
    fn similar_vectors_share_a_cluster() {
        let settings = ClusterSettings::default();
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();

        let a = add(&mut index, &mut records, record("a", "budget planning", vec![1.0, 0.0, 0.0]), &settings);
        let b = add(&mut index, &mut records, record("b", "budget review", vec![0.9, 0.1, 0.0]), &settings);
        let c = add(&mut index, &mut records, record("c", "hiking trails", vec![0.0, 0.0, 1.0]), &settings);

        assert!(matches!(a, Assignment::Created { .. }));
        assert!(matches!(b, Assignment::Attached { .. }));
        assert_eq!(a.cluster_id(), b.cluster_id());
        assert!(matches!(c, Assignment::Created { .. }));
        assert_ne!(a.cluster_id(), c.cluster_id());
        assert_eq!(index.len(), 2);

        let cluster = index.get(a.cluster_id()).unwrap();
        assert_eq!(cluster.size(), 2);
        assert!((cluster.centroid[0] - 0.95).abs() < 1e-6);
        assert!((cluster.centroid[1] - 0.05).abs() < 1e-6);
        assert_eq!(cluster.keywords[0], "budget");
    }

    #[test]
    fn threshold_is_inclusive() {
        let settings = ClusterSettings {
            threshold: 1.0,
            ..ClusterSettings::default()
        };
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();
        add(&mut index, &mut records, record("a", "x", vec![1.0, 0.0]), &settings);
        let b = add(&mut index, &mut records, record("b", "y", vec![2.0, 0.0]), &settings);
        assert!(matches!(b, Assignment::Attached { .. }));
    }

    #[test]
    fn opposite_vectors_never_match() {
        let settings = ClusterSettings {
            threshold: 0.01,
            max_clusters: 1,
            keyword_limit: 5,
        };
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();
        add(&mut index, &mut records, record("a", "x", vec![1.0, 0.0]), &settings);
        // At the cap, but similarity is negative: still a new cluster.
        let b = add(&mut index, &mut records, record("b", "y", vec![-1.0, 0.0]), &settings);
        assert!(matches!(b, Assignment::Created { .. }));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn soft_cap_attaches_to_nearest() {
        let settings = ClusterSettings {
            threshold: 0.99,
            max_clusters: 2,
            keyword_limit: 5,
        };
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();
        add(&mut index, &mut records, record("a", "x", vec![1.0, 0.0, 0.0]), &settings);
        let far = add(&mut index, &mut records, record("b", "y", vec![0.0, 1.0, 0.0]), &settings);
        let c = add(&mut index, &mut records, record("c", "z", vec![0.2, 1.0, 0.0]), &settings);
        assert_eq!(index.len(), 2);
        assert_eq!(c.cluster_id(), far.cluster_id());
    }

    #[test]
    fn ties_go_to_oldest_cluster() {
        let settings = ClusterSettings::default();
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();
        let first = add(&mut index, &mut records, record("a", "x", vec![1.0, 0.0]), &settings);
        add(&mut index, &mut records, record("b", "y", vec![0.0, 1.0]), &settings);
        let (nearest, _) = index.nearest(&[1.0, 1.0]).unwrap();
        assert_eq!(nearest.id, first.cluster_id());
    }

    #[test]
    fn merge_unions_members_and_keywords() {
        let settings = ClusterSettings {
            threshold: 0.99,
            ..ClusterSettings::default()
        };
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();
        let a = add(&mut index, &mut records, record("a", "robots dream", vec![1.0, 0.0]), &settings);
        let b = add(&mut index, &mut records, record("b", "robots think", vec![0.0, 1.0]), &settings);

        let moved = index.merge(a.cluster_id(), &[b.cluster_id().to_string()], &records, now());
        assert_eq!(moved, vec!["b".to_string()]);
        assert_eq!(index.len(), 1);
        let survivor = index.get(a.cluster_id()).unwrap();
        assert_eq!(survivor.size(), 2);
        assert!(survivor.keywords.contains(&"dream".to_string()));
        assert!(survivor.keywords.contains(&"think".to_string()));
        assert!((survivor.centroid[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn remove_last_member_drops_cluster() {
        let settings = ClusterSettings::default();
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();
        let a = add(&mut index, &mut records, record("a", "x", vec![1.0, 0.0]), &settings);
        add(&mut index, &mut records, record("b", "y", vec![0.9, 0.1]), &settings);

        records.remove("a");
        assert!(!index.remove_member(a.cluster_id(), "a", &records, 5, now()));
        assert_eq!(index.get(a.cluster_id()).unwrap().centroid, vec![0.9, 0.1]);
        records.remove("b");
        assert!(index.remove_member(a.cluster_id(), "b", &records, 5, now()));
        assert!(index.is_empty());
    }

    #[test]
    fn reconcile_repairs_dangling_state() {
        let settings = ClusterSettings::default();
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();
        let a = add(&mut index, &mut records, record("a", "x", vec![1.0, 0.0]), &settings);

        // A member id with no record, and a record no cluster claims.
        index.get_mut(a.cluster_id()).unwrap().member_ids.insert("ghost".into());
        records.insert("orphan".into(), record("orphan", "z", vec![0.0, 1.0]));
        records.get_mut("orphan").unwrap().cluster_id = Some("cluster-999999".into());

        let orphans = index.reconcile(&mut records, 5);
        assert_eq!(orphans, vec!["orphan".to_string()]);
        assert!(!index.get(a.cluster_id()).unwrap().member_ids.contains("ghost"));
        assert_eq!(records["a"].cluster_id.as_deref(), Some(a.cluster_id()));
        assert_eq!(records["orphan"].cluster_id, None);
    }

    #[test]
    fn sequence_survives_reload() {
        let settings = ClusterSettings::default();
        let mut index = ClusterIndex::default();
        let mut records = HashMap::new();
        add(&mut index, &mut records, record("a", "x", vec![1.0, 0.0]), &settings);
        let persisted: Vec<Cluster> = index.to_vec().into_iter().cloned().collect();

        let mut reloaded = ClusterIndex::from_clusters(persisted);
        let b = add(&mut reloaded, &mut records, record("b", "y", vec![0.0, 1.0]), &settings);
        assert_eq!(b.cluster_id(), "cluster-000001");
    }
}
