// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod embedding;
pub mod history;

pub use adapter::PluginAdapter;
pub use embedding::{truncate_for_embedding, EmbeddingAdapter, DEFAULT_MAX_INPUT_CHARS};
pub use history::HistoryAdapter;
