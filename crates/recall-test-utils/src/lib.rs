// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Recall integration tests.
//!
//! Provides a deterministic embedding adapter and a harness that wires an
//! engine, history, and retriever over a temp directory, so tests run
//! without model files or network access.
//!
//! # Components
//!
//! - [`MockEmbedder`] - Feature-hashing embedder with scripted vectors and a failure switch
//! - [`TestHarness`] - Engine + retriever over a temp data directory

pub mod harness;
pub mod mock_embedder;

pub use harness::TestHarness;
pub use mock_embedder::MockEmbedder;
