// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Recall memory engine.

use thiserror::Error;

/// The primary error type used across the Recall adapter traits and engine operations.
#[derive(Debug, Error)]
pub enum RecallError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The embedding provider failed. The in-flight operation is aborted
    /// and no partial state is written.
    #[error("embedding provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Snapshot persistence failed (disk read/write, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A record was rejected before any embedding call (empty text,
    /// out-of-range metadata).
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The provider returned a vector whose length differs from the store's
    /// fixed dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RecallError {
    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        RecallError::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap any error as a storage error.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        RecallError::Storage {
            source: Box::new(source),
        }
    }

    /// True for errors raised by the embedding boundary.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            RecallError::Provider { .. } | RecallError::DimensionMismatch { .. }
        )
    }
}
