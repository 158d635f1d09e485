// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process conversation history used by the keyword retrieval strategy.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use recall_core::{
    AdapterType, ConversationTurn, HealthStatus, HistoryAdapter, PluginAdapter, RecallError,
};
use tokio::sync::RwLock;

/// Default number of turns retained per profile.
pub const DEFAULT_TURNS_PER_PROFILE: usize = 200;

/// Bounded per-profile ring of recent conversation turns.
pub struct InMemoryHistory {
    capacity: usize,
    turns: RwLock<HashMap<String, VecDeque<ConversationTurn>>>,
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new(DEFAULT_TURNS_PER_PROFILE)
    }
}

impl InMemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            turns: RwLock::new(HashMap::new()),
        }
    }

    /// Append a turn, evicting the oldest once the profile is at capacity.
    pub async fn record(&self, profile_id: &str, turn: ConversationTurn) {
        let mut turns = self.turns.write().await;
        let ring = turns.entry(profile_id.to_string()).or_default();
        if ring.len() == self.capacity {
            ring.pop_front();
        }
        ring.push_back(turn);
    }

    /// Drop every turn for a profile.
    pub async fn clear(&self, profile_id: &str) {
        self.turns.write().await.remove(profile_id);
    }
}

#[async_trait]
impl PluginAdapter for InMemoryHistory {
    fn name(&self) -> &str {
        "in-memory-history"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::History
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        Ok(())
    }
}

#[async_trait]
impl HistoryAdapter for InMemoryHistory {
    async fn recent_turns(
        &self,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, RecallError> {
        let turns = self.turns.read().await;
        Ok(turns
            .get(profile_id)
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
