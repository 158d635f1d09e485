// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the adapter traits and the engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter plugged into the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Embedding,
    History,
}

/// Input for an embedding adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingInput {
    /// Texts to embed, already truncated to the adapter's length ceiling.
    pub texts: Vec<String>,
}

impl EmbeddingInput {
    /// Convenience constructor for a single text.
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            texts: vec![text.into()],
        }
    }
}

/// Output from an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// One vector per input text, in input order.
    pub embeddings: Vec<Vec<f32>>,
    /// Dimensionality of every vector in `embeddings`.
    pub dimensions: usize,
}

/// A single turn of conversational history, as served by a history adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker role, e.g. "user" or "assistant".
    pub role: String,
    /// Turn text.
    pub text: String,
    /// When the turn happened.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ConversationTurn {
    /// Create a turn stamped with the current time.
    pub fn now(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}
