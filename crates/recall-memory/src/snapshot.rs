// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON snapshot documents for the memory and cluster indexes.
//!
//! Two documents are written wholesale after every mutation:
//!
//! - memory document: `{embeddings: {id: vector}, memoryIndex: {id: record}, temporalIndex: {day: [ids]}}`
//! - cluster document: `{clusters: {id: cluster}}`
//!
//! Writes go to a sibling `.tmp` file that is renamed over the target. A
//! document that cannot be read or parsed is renamed to `<file>.corrupt`
//! and loads as empty.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use recall_config::model::StorageConfig;
use recall_core::RecallError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cluster::{Cluster, ClusterIndex};
use crate::temporal::TemporalIndex;
use crate::types::MemoryRecord;

/// Persisted memory document.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDocument {
    #[serde(default)]
    pub embeddings: HashMap<String, Vec<f32>>,
    #[serde(default)]
    pub memory_index: HashMap<String, MemoryRecord>,
    #[serde(default)]
    pub temporal_index: TemporalIndex,
}

impl MemoryDocument {
    /// Join records with their embeddings.
    ///
    /// Records without an embedding cannot be ranked or clustered and are
    /// dropped with a warning.
    pub fn into_records(self) -> (HashMap<String, MemoryRecord>, TemporalIndex) {
        let MemoryDocument {
            mut embeddings,
            memory_index,
            temporal_index,
        } = self;
        let mut records = HashMap::with_capacity(memory_index.len());
        for (id, mut record) in memory_index {
            match embeddings.remove(&id) {
                Some(embedding) if !embedding.is_empty() => {
                    record.embedding = embedding;
                    record.id = id.clone();
                    records.insert(id, record);
                }
                _ => warn!(memory_id = %id, "dropping persisted memory without an embedding"),
            }
        }
        (records, temporal_index)
    }
}

/// Persisted cluster document.
#[derive(Debug, Default, Deserialize)]
pub struct ClusterDocument {
    #[serde(default)]
    pub clusters: BTreeMap<String, Cluster>,
}

impl ClusterDocument {
    pub fn into_index(self) -> ClusterIndex {
        ClusterIndex::from_clusters(
            self.clusters
                .into_iter()
                .map(|(id, mut cluster)| {
                    cluster.id = id;
                    cluster
                })
                .collect(),
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MemoryDocumentRef<'a> {
    embeddings: BTreeMap<&'a str, &'a [f32]>,
    memory_index: BTreeMap<&'a str, &'a MemoryRecord>,
    temporal_index: &'a TemporalIndex,
}

#[derive(Serialize)]
struct ClusterDocumentRef<'a> {
    clusters: BTreeMap<&'a str, &'a Cluster>,
}

/// Serialized bytes of both documents, taken under the state lock and written
/// after it is released.
#[derive(Debug, Clone)]
pub struct EncodedSnapshot {
    memory: Vec<u8>,
    clusters: Vec<u8>,
}

impl EncodedSnapshot {
    pub fn encode(
        records: &HashMap<String, MemoryRecord>,
        temporal: &TemporalIndex,
        clusters: &ClusterIndex,
    ) -> Result<Self, RecallError> {
        let memory = MemoryDocumentRef {
            embeddings: records
                .iter()
                .map(|(id, r)| (id.as_str(), r.embedding.as_slice()))
                .collect(),
            memory_index: records.iter().map(|(id, r)| (id.as_str(), r)).collect(),
            temporal_index: temporal,
        };
        let cluster_doc = ClusterDocumentRef {
            clusters: clusters.iter().map(|c| (c.id.as_str(), c)).collect(),
        };
        Ok(Self {
            memory: serde_json::to_vec(&memory).map_err(RecallError::storage)?,
            clusters: serde_json::to_vec(&cluster_doc).map_err(RecallError::storage)?,
        })
    }
}

/// Locations of the two snapshot documents.
#[derive(Debug, Clone)]
pub struct SnapshotFiles {
    memory_path: PathBuf,
    cluster_path: PathBuf,
}

impl SnapshotFiles {
    pub fn new(memory_path: PathBuf, cluster_path: PathBuf) -> Self {
        Self {
            memory_path,
            cluster_path,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.memory_path(), config.cluster_path())
    }

    pub fn memory_path(&self) -> &Path {
        &self.memory_path
    }

    pub fn cluster_path(&self) -> &Path {
        &self.cluster_path
    }

    /// Load both documents. A missing file is an empty document. An
    /// unreadable or unparsable file is moved aside and also loads empty;
    /// the error surfaces only if it cannot be moved.
    pub async fn load(&self) -> Result<(MemoryDocument, ClusterDocument), RecallError> {
        let memory = read_document(&self.memory_path).await?;
        let clusters = read_document(&self.cluster_path).await?;
        Ok((memory, clusters))
    }

    /// Atomically replace both documents.
    pub async fn write(&self, snapshot: &EncodedSnapshot) -> Result<(), RecallError> {
        write_atomic(&self.memory_path, &snapshot.memory).await?;
        write_atomic(&self.cluster_path, &snapshot.clusters).await?;
        debug!(
            memory_bytes = snapshot.memory.len(),
            cluster_bytes = snapshot.clusters.len(),
            "snapshot written"
        );
        Ok(())
    }
}

async fn read_document<T>(path: &Path) -> Result<T, RecallError>
where
    T: for<'de> Deserialize<'de> + Default,
{
    let failure = match tokio::fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(doc) => return Ok(doc),
            Err(e) => RecallError::Storage {
                source: format!("failed to parse {}: {e}", path.display()).into(),
            },
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => RecallError::storage(e),
    };

    warn!(error = %failure, path = %path.display(), "snapshot unreadable, starting empty");
    metrics::counter!("recall_persistence_failures_total").increment(1);
    let aside = sibling(path, ".corrupt");
    if let Err(e) = tokio::fs::rename(path, &aside).await {
        warn!(error = %e, "could not move unreadable snapshot aside");
        return Err(failure);
    }
    warn!(path = %aside.display(), "unreadable snapshot preserved");
    Ok(T::default())
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RecallError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(RecallError::storage)?;
    }
    let tmp = sibling(path, ".tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(RecallError::storage)?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(RecallError::storage)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryType;
    use chrono::{TimeZone, Utc};

    fn files(dir: &Path) -> SnapshotFiles {
        SnapshotFiles::new(dir.join("memory_index.json"), dir.join("clusters.json"))
    }

    fn sample() -> (HashMap<String, MemoryRecord>, TemporalIndex, ClusterIndex) {
        let ts = Utc.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap();
        let record = MemoryRecord {
            id: "mem-1".into(),
            text: "quarterly budget planning".into(),
            timestamp: ts,
            memory_type: MemoryType::Event,
            metadata: Default::default(),
            embedding: vec![1.0, 0.0],
            cluster_id: None,
        };
        let mut clusters = ClusterIndex::default();
        let cluster_id = clusters.create(&record, 5, ts);
        let mut temporal = TemporalIndex::default();
        temporal.insert(ts, &record.id);
        let record = MemoryRecord {
            cluster_id: Some(cluster_id),
            ..record
        };
        (HashMap::from([(record.id.clone(), record)]), temporal, clusters)
    }

    #[tokio::test]
    async fn missing_files_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (memory, clusters) = files(dir.path()).load().await.unwrap();
        assert!(memory.memory_index.is_empty());
        assert!(clusters.clusters.is_empty());
    }

    #[tokio::test]
    async fn round_trip_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(dir.path());
        let (records, temporal, clusters) = sample();

        let encoded = EncodedSnapshot::encode(&records, &temporal, &clusters).unwrap();
        files.write(&encoded).await.unwrap();

        let (memory, cluster_doc) = files.load().await.unwrap();
        let (loaded, loaded_temporal) = memory.into_records();
        assert_eq!(loaded, records);
        assert_eq!(loaded_temporal, temporal);
        let index = cluster_doc.into_index();
        assert_eq!(index.len(), 1);
        assert_eq!(index.iter().next(), clusters.iter().next());
    }

    #[tokio::test]
    async fn documents_use_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(dir.path());
        let (records, temporal, clusters) = sample();
        files
            .write(&EncodedSnapshot::encode(&records, &temporal, &clusters).unwrap())
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(files.memory_path()).unwrap()).unwrap();
        assert_eq!(raw["embeddings"]["mem-1"], serde_json::json!([1.0, 0.0]));
        assert_eq!(raw["memoryIndex"]["mem-1"]["type"], "event");
        assert_eq!(raw["temporalIndex"]["2026-02-10"][0], "mem-1");

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(files.cluster_path()).unwrap()).unwrap();
        assert!(raw["clusters"]["cluster-000000"]["memberIds"].is_array());
        assert!(!dir.path().join("clusters.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside_and_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(dir.path());
        let (records, temporal, clusters) = sample();
        files
            .write(&EncodedSnapshot::encode(&records, &temporal, &clusters).unwrap())
            .await
            .unwrap();
        std::fs::write(files.memory_path(), b"{not json").unwrap();

        let (memory, cluster_doc) = files.load().await.unwrap();
        assert!(memory.memory_index.is_empty());
        assert_eq!(cluster_doc.clusters.len(), 1);
        assert!(!files.memory_path().exists());
        let preserved = dir.path().join("memory_index.json.corrupt");
        assert_eq!(std::fs::read(preserved).unwrap(), b"{not json");
    }

    #[test]
    fn records_without_embeddings_are_dropped() {
        let (records, temporal, _) = sample();
        let doc = MemoryDocument {
            embeddings: HashMap::new(),
            memory_index: records,
            temporal_index: temporal,
        };
        let (loaded, _) = doc.into_records();
        assert!(loaded.is_empty());
    }
}
