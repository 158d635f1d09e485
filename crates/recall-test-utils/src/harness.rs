// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` opens a [`MemoryEngine`] over a temp data directory with a
//! [`MockEmbedder`], plus an [`InMemoryHistory`] and a [`HybridRetriever`]
//! wired to both. `reopen()` reloads the engine from the snapshot on disk.

use std::sync::Arc;

use recall_config::RecallConfig;
use recall_core::{ConversationTurn, EmbeddingAdapter, RecallError};
use recall_memory::{HybridRetriever, InMemoryHistory, MemoryEngine, MemoryRecord, NewMemory};

use crate::mock_embedder::MockEmbedder;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: RecallConfig,
    embedder: Option<Arc<MockEmbedder>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: RecallConfig::default(),
            embedder: None,
        }
    }

    /// Adjust the configuration. The storage directory is always replaced
    /// by the harness temp dir.
    pub fn with_config(mut self, edit: impl FnOnce(&mut RecallConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Use a specific embedder instead of a default [`MockEmbedder`].
    pub fn with_embedder(mut self, embedder: Arc<MockEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Build the harness and open the engine.
    pub async fn build(self) -> Result<TestHarness, RecallError> {
        let temp_dir = tempfile::TempDir::new().map_err(RecallError::storage)?;
        let mut config = self.config;
        config.storage.data_dir = temp_dir.path().display().to_string();

        let embedder = self
            .embedder
            .unwrap_or_else(|| Arc::new(MockEmbedder::default()));
        config.embedding.dimensions = embedder.dimensions();

        let history = Arc::new(InMemoryHistory::default());
        let engine = Arc::new(MemoryEngine::open(config.clone(), embedder.clone()).await?);
        let retriever = HybridRetriever::new(engine.clone(), history.clone());

        Ok(TestHarness {
            config,
            embedder,
            engine,
            history,
            retriever,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment over temp storage.
pub struct TestHarness {
    /// Effective configuration, with `storage.data_dir` pointing at the temp dir.
    pub config: RecallConfig,
    pub embedder: Arc<MockEmbedder>,
    pub engine: Arc<MemoryEngine>,
    pub history: Arc<InMemoryHistory>,
    pub retriever: HybridRetriever,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Store `text` as a conversation memory.
    pub async fn remember(&self, text: &str) -> Result<MemoryRecord, RecallError> {
        self.engine.add_memory(NewMemory::new(text)).await
    }

    /// Append a user turn to `profile_id`'s history.
    pub async fn say(&self, profile_id: &str, text: &str) {
        self.history
            .record(profile_id, ConversationTurn::now("user", text))
            .await;
    }

    /// Drop the engine and open a fresh one from the files on disk.
    ///
    /// History and embedder are carried over.
    pub async fn reopen(self) -> Result<Self, RecallError> {
        let Self {
            config,
            embedder,
            engine,
            history,
            retriever,
            _temp_dir,
        } = self;
        engine.flush().await?;
        drop(retriever);
        drop(engine);

        let engine = Arc::new(MemoryEngine::open(config.clone(), embedder.clone()).await?);
        let retriever = HybridRetriever::new(engine.clone(), history.clone());
        Ok(Self {
            config,
            embedder,
            engine,
            history,
            retriever,
            _temp_dir,
        })
    }
}
