// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding adapter for deterministic testing.
//!
//! `MockEmbedder` hashes content tokens into a fixed-size bag-of-words
//! vector, so texts that share words are similar and unrelated texts are
//! orthogonal. Exact texts can be scripted to return chosen vectors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use recall_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, PluginAdapter,
    RecallError,
};
use recall_memory::text::{content_tokens, tokenize};
use tokio::sync::Mutex;

/// Default dimensionality of mock vectors.
pub const DEFAULT_MOCK_DIMENSIONS: usize = 64;

/// A mock embedder with scripted vectors and a failure switch.
pub struct MockEmbedder {
    dimensions: usize,
    scripted: Mutex<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    embedded: Mutex<Vec<String>>,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            scripted: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            embedded: Mutex::new(Vec::new()),
        }
    }

    /// Return `vector` whenever exactly `text` is embedded.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.scripted.get_mut().insert(text.into(), vector);
        self
    }

    /// Script a vector after construction.
    pub async fn script(&self, text: impl Into<String>, vector: Vec<f32>) {
        self.scripted.lock().await.insert(text.into(), vector);
    }

    /// Make every subsequent `embed` call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed` calls, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every text successfully embedded, in call order.
    pub async fn embedded_texts(&self) -> Vec<String> {
        self.embedded.lock().await.clone()
    }

    fn vector_for(&self, text: &str, scripted: &HashMap<String, Vec<f32>>) -> Vec<f32> {
        match scripted.get(text) {
            Some(v) => v.clone(),
            None => feature_hash(text, self.dimensions),
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_DIMENSIONS)
    }
}

/// L2-normalized bag of hashed content tokens. Falls back to all tokens
/// when the text has no content tokens.
pub fn feature_hash(text: &str, dimensions: usize) -> Vec<f32> {
    let mut tokens = content_tokens(text);
    if tokens.is_empty() {
        tokens = tokenize(text);
    }
    let mut vector = vec![0.0f32; dimensions];
    for token in &tokens {
        let bucket = (fnv1a(token.as_bytes()) % dimensions as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        if self.failing.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("mock failure enabled".into()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RecallError::provider("mock embedder is offline"));
        }
        let scripted = self.scripted.lock().await;
        let embeddings = input
            .texts
            .iter()
            .map(|text| self.vector_for(text, &scripted))
            .collect();
        drop(scripted);
        self.embedded.lock().await.extend(input.texts);
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
