// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait: the engine's sole external dependency boundary.

use async_trait::async_trait;

use crate::error::RecallError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// Default length ceiling (in chars) applied before an embedding call.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2000;

/// Adapter for generating fixed-length vector embeddings from text.
///
/// Implementations may be slow or fail; any error aborts the caller's
/// in-flight operation.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Generates one embedding per input text.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError>;

    /// Dimensionality of the vectors this adapter produces.
    fn dimensions(&self) -> usize;

    /// Maximum input length in chars. Longer texts are truncated by the caller.
    fn max_input_chars(&self) -> usize {
        DEFAULT_MAX_INPUT_CHARS
    }
}

/// Truncate `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_for_embedding(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
