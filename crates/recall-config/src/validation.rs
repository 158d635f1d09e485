// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: ratio ranges,
//! non-zero sizes, and non-empty paths and keywords.

use crate::diagnostic::ConfigError;
use crate::model::RecallConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or every collected error
/// (does not fail fast).
pub fn validate_config(config: &RecallConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.data_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.data_dir must not be empty".to_string(),
        });
    }
    if config.storage.memory_file == config.storage.cluster_file {
        errors.push(ConfigError::Validation {
            message: format!(
                "storage.memory_file and storage.cluster_file must differ, both are `{}`",
                config.storage.memory_file
            ),
        });
    }

    check_unit_interval(
        &mut errors,
        "clustering.similarity_threshold",
        config.clustering.similarity_threshold,
    );
    check_unit_interval(
        &mut errors,
        "diversity.ceiling_ratio",
        config.diversity.ceiling_ratio,
    );

    if !(-1.0..=1.0).contains(&config.retrieval.min_similarity) {
        errors.push(ConfigError::OutOfRange {
            key: "retrieval.min_similarity".to_string(),
            range: "in [-1, 1]".to_string(),
            value: config.retrieval.min_similarity.to_string(),
        });
    }

    for (key, value) in [
        ("embedding.dimensions", config.embedding.dimensions),
        ("embedding.max_input_chars", config.embedding.max_input_chars),
        ("clustering.max_clusters", config.clustering.max_clusters),
        ("clustering.keywords_per_cluster", config.clustering.keywords_per_cluster),
        ("retrieval.max_results", config.retrieval.max_results),
        ("retrieval.dedup_prefix_len", config.retrieval.dedup_prefix_len),
    ] {
        if value == 0 {
            errors.push(ConfigError::OutOfRange {
                key: key.to_string(),
                range: "at least 1".to_string(),
                value: value.to_string(),
            });
        }
    }

    if config.retrieval.recency_window_days <= 0.0 {
        errors.push(ConfigError::OutOfRange {
            key: "retrieval.recency_window_days".to_string(),
            range: "positive".to_string(),
            value: config.retrieval.recency_window_days.to_string(),
        });
    }

    if config.retrieval.temporal_tolerance_days < 0 {
        errors.push(ConfigError::OutOfRange {
            key: "retrieval.temporal_tolerance_days".to_string(),
            range: "non-negative".to_string(),
            value: config.retrieval.temporal_tolerance_days.to_string(),
        });
    }

    if let Some(max) = config.retention.max_memories
        && max == 0
    {
        errors.push(ConfigError::OutOfRange {
            key: "retention.max_memories".to_string(),
            range: "at least 1 when set".to_string(),
            value: max.to_string(),
        });
    }

    for (i, keyword) in config.diversity.watch_list.iter().enumerate() {
        if keyword.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("diversity.watch_list[{i}] must not be empty"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Require `value` in the half-open unit interval (0, 1].
fn check_unit_interval(errors: &mut Vec<ConfigError>, key: &str, value: f64) {
    if !(value > 0.0 && value <= 1.0) {
        errors.push(ConfigError::OutOfRange {
            key: key.to_string(),
            range: "in (0, 1]".to_string(),
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error_for(errors: &[ConfigError], needle: &str) -> bool {
        errors.iter().any(|e| e.to_string().contains(needle))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&RecallConfig::default()).is_ok());
    }

    #[test]
    fn empty_data_dir_fails_validation() {
        let mut config = RecallConfig::default();
        config.storage.data_dir = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "storage.data_dir"));
    }

    #[test]
    fn threshold_outside_unit_interval_fails() {
        let mut config = RecallConfig::default();
        config.clustering.similarity_threshold = 0.0;
        config.diversity.ceiling_ratio = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "clustering.similarity_threshold"));
        assert!(has_error_for(&errors, "diversity.ceiling_ratio"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = RecallConfig::default();
        config.clustering.max_clusters = 0;
        config.retrieval.dedup_prefix_len = 0;
        config.retention.max_memories = Some(0);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn blank_watch_list_entry_fails() {
        let mut config = RecallConfig::default();
        config.diversity.watch_list.push(String::new());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "diversity.watch_list"));
    }

    #[test]
    fn identical_snapshot_files_fail() {
        let mut config = RecallConfig::default();
        config.storage.cluster_file = config.storage.memory_file.clone();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "must differ"));
    }

    #[test]
    fn ceiling_of_one_is_allowed() {
        let mut config = RecallConfig::default();
        config.diversity.ceiling_ratio = 1.0;
        assert!(validate_config(&config).is_ok());
    }
}
