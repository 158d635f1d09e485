// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! History adapter trait for recent conversational turns.

use async_trait::async_trait;

use crate::error::RecallError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ConversationTurn;

/// Source of recent conversation turns per profile.
///
/// Keyword retrieval scores these turns against the query without
/// touching embeddings.
#[async_trait]
pub trait HistoryAdapter: PluginAdapter {
    /// Returns up to `limit` of the most recent turns for `profile_id`,
    /// newest first.
    async fn recent_turns(
        &self,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RecallError>;
}
