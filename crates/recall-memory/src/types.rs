// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types for the retrieval engine.

use chrono::{DateTime, Utc};
use recall_core::RecallError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex chars of the content hash kept in a memory id.
const ID_HASH_LEN: usize = 16;

/// A single stored memory.
///
/// The embedding is fixed at creation. Only `cluster_id` changes afterwards,
/// and only through clustering or diversity merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Deterministic id derived from timestamp and content hash.
    pub id: String,
    /// The memory text.
    pub text: String,
    /// When the memory was recorded.
    pub timestamp: DateTime<Utc>,
    /// What kind of memory this is.
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Validated optional metadata.
    #[serde(default)]
    pub metadata: MemoryMetadata,
    /// Embedding vector. Persisted separately under `embeddings`.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    /// Cluster this memory belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
}

impl MemoryRecord {
    /// Clone everything except the embedding vector.
    pub fn without_embedding(&self) -> Self {
        Self {
            id: self.id.clone(),
            text: self.text.clone(),
            timestamp: self.timestamp,
            memory_type: self.memory_type,
            metadata: self.metadata.clone(),
            embedding: Vec::new(),
            cluster_id: self.cluster_id.clone(),
        }
    }

    /// Age of the memory in fractional days relative to `now` (never negative).
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let secs = (now - self.timestamp).num_seconds().max(0) as f64;
        secs / 86_400.0
    }
}

/// Kind of memory.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A summary or excerpt of a conversation.
    #[default]
    Conversation,
    /// A standalone fact about the user or world.
    Fact,
    /// A stated like, dislike, or preference.
    Preference,
    /// Something that happened at a point in time.
    Event,
    /// Free-form note.
    Note,
}

impl MemoryType {
    /// Lowercase name as used in persisted documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Conversation => "conversation",
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Event => "event",
            MemoryType::Note => "note",
        }
    }

    /// Parse a lowercase name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conversation" => Some(MemoryType::Conversation),
            "fact" => Some(MemoryType::Fact),
            "preference" => Some(MemoryType::Preference),
            "event" => Some(MemoryType::Event),
            "note" => Some(MemoryType::Note),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional metadata attached to a memory, validated at insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    /// Importance in [0, 1]; feeds the importance boost in ranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,
    /// Profile the memory belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    /// Session the memory was captured in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Where the memory came from (channel, tool, import).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MemoryMetadata {
    /// Reject out-of-range importance and blank identifiers or tags.
    pub fn validate(&self) -> Result<(), RecallError> {
        if let Some(importance) = self.importance
            && !(0.0..=1.0).contains(&importance)
        {
            return Err(RecallError::MalformedRecord(format!(
                "importance must be in [0, 1], got {importance}"
            )));
        }
        for (field, value) in [
            ("profile_id", &self.profile_id),
            ("session_id", &self.session_id),
            ("source", &self.source),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(RecallError::MalformedRecord(format!(
                    "{field} must not be blank when set"
                )));
            }
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(RecallError::MalformedRecord(
                "tags must not contain blank entries".to_string(),
            ));
        }
        Ok(())
    }
}

/// Input to `MemoryEngine::add_memory`.
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    /// Memory text. Must not be blank.
    pub text: String,
    /// Explicit timestamp; defaults to now.
    pub timestamp: Option<DateTime<Utc>>,
    /// Kind of memory.
    pub memory_type: MemoryType,
    /// Optional metadata.
    pub metadata: MemoryMetadata,
}

impl NewMemory {
    /// A conversation memory with the given text, stamped at insertion time.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Set the memory type.
    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    /// Set an explicit timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the importance metadata.
    pub fn with_importance(mut self, importance: f32) -> Self {
        self.metadata.importance = Some(importance);
        self
    }

    /// Set the owning profile.
    pub fn for_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.metadata.profile_id = Some(profile_id.into());
        self
    }

    /// Validate text and metadata before any embedding call.
    pub fn validate(&self) -> Result<(), RecallError> {
        if self.text.trim().is_empty() {
            return Err(RecallError::MalformedRecord(
                "memory text must not be empty".to_string(),
            ));
        }
        self.metadata.validate()
    }
}

/// Derive the deterministic memory id for a timestamp and text.
///
/// Identical content at the same timestamp always yields the same id.
pub fn memory_id(timestamp: DateTime<Utc>, text: &str) -> String {
    let digest = hex::encode(Sha256::digest(text.as_bytes()));
    format!(
        "mem-{}-{}",
        timestamp.timestamp_millis(),
        &digest[..ID_HASH_LEN]
    )
}

/// Cosine similarity: dot(a, b) / (|a| |b|), in [-1, 1].
///
/// Zero-norm or mismatched-length inputs have similarity 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

/// Arithmetic mean of a set of equal-length vectors.
///
/// Vectors whose length differs from the first are skipped.
pub fn mean_vector<'a, I>(vectors: I) -> Vec<f32>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for v in vectors {
        if sum.is_empty() {
            sum = vec![0.0; v.len()];
        }
        if v.len() != sum.len() {
            continue;
        }
        for (s, x) in sum.iter_mut().zip(v) {
            *s += x;
        }
        count += 1;
    }
    if count > 0 {
        let n = count as f32;
        for s in &mut sum {
            *s /= n;
        }
    }
    sum
}
