// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Recall memory engine.
//!
//! Provides the error type, the embedding adapter boundary, and the small
//! set of types shared between the engine, configuration, and test crates.

pub mod error;
pub mod traits;
pub mod types;

pub use error::RecallError;
pub use types::{AdapterType, ConversationTurn, EmbeddingInput, EmbeddingOutput, HealthStatus};

pub use traits::{EmbeddingAdapter, HistoryAdapter, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_error_variants_render() {
        let provider = RecallError::provider("connection refused");
        assert!(provider.to_string().contains("connection refused"));
        assert!(provider.is_provider());

        let storage = RecallError::storage(std::io::Error::other("disk full"));
        assert!(storage.to_string().contains("disk full"));
        assert!(!storage.is_provider());

        let mismatch = RecallError::DimensionMismatch {
            expected: 384,
            actual: 3,
        };
        assert!(mismatch.is_provider());
        assert_eq!(
            mismatch.to_string(),
            "embedding dimension mismatch: expected 384, got 3"
        );

        let malformed = RecallError::MalformedRecord("empty text".into());
        assert!(!malformed.is_provider());
    }

    #[test]
    fn adapter_type_round_trips_through_display() {
        use std::str::FromStr;

        for variant in [AdapterType::Embedding, AdapterType::History] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn adapter_type_serialization() {
        let json = serde_json::to_string(&AdapterType::Embedding).expect("should serialize");
        let parsed: AdapterType = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(parsed, AdapterType::Embedding);
    }

    #[test]
    fn embedding_input_single() {
        let input = EmbeddingInput::single("hello world");
        assert_eq!(input.texts, vec!["hello world".to_string()]);
    }

    #[test]
    fn health_status_variants() {
        assert_eq!(HealthStatus::Healthy, HealthStatus::Healthy);
        assert_ne!(HealthStatus::Degraded("slow".into()), HealthStatus::Healthy);
        assert_ne!(HealthStatus::Unhealthy("down".into()), HealthStatus::Healthy);
    }

    #[test]
    fn embedding_trait_is_object_safe() {
        fn _assert_dyn(_: &dyn EmbeddingAdapter) {}
        fn _assert_history(_: &dyn HistoryAdapter) {}
        fn _assert_plugin<T: PluginAdapter>() {}
    }
}
