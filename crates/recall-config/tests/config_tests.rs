// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Recall configuration system.

use recall_config::diagnostic::ConfigError;
use recall_config::model::RecallConfig;
use recall_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_recall_config() {
    let toml = r#"
[storage]
data_dir = "/tmp/recall"
memory_file = "mem.json"
cluster_file = "clu.json"

[embedding]
model_name = "all-MiniLM-L6-v2"
dimensions = 384
max_input_chars = 1000

[clustering]
similarity_threshold = 0.75
max_clusters = 20
keywords_per_cluster = 4

[diversity]
enabled = true
ceiling_ratio = 0.5
watch_list = ["robot", "android"]

[retrieval]
max_results = 5
min_similarity = 0.2
recency_window_days = 14.0
temporal_tolerance_days = 2
neighbor_count = 2
dedup_prefix_len = 40
history_limit = 10

[retention]
max_memories = 1000
max_age_days = 365

[logging]
level = "debug"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.storage.data_dir, "/tmp/recall");
    assert_eq!(config.storage.memory_file, "mem.json");
    assert_eq!(config.embedding.max_input_chars, 1000);
    assert!((config.clustering.similarity_threshold - 0.75).abs() < f64::EPSILON);
    assert_eq!(config.clustering.max_clusters, 20);
    assert_eq!(config.clustering.keywords_per_cluster, 4);
    assert!((config.diversity.ceiling_ratio - 0.5).abs() < f64::EPSILON);
    assert_eq!(config.diversity.watch_list, vec!["robot", "android"]);
    assert_eq!(config.retrieval.max_results, 5);
    assert_eq!(config.retrieval.temporal_tolerance_days, 2);
    assert_eq!(config.retrieval.dedup_prefix_len, 40);
    assert_eq!(config.retention.max_memories, Some(1000));
    assert_eq!(config.retention.max_age_days, Some(365));
    assert_eq!(config.logging.level, "debug");
}

/// Unknown field in a section is rejected.
#[test]
fn unknown_field_in_clustering_produces_error() {
    let toml = r#"
[clustering]
similarity_treshold = 0.7
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("similarity_treshold"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Unknown keys become UnknownKey diagnostics with a suggestion.
#[test]
fn unknown_key_diagnostic_carries_suggestion() {
    let toml = r#"
[diversity]
ceiling_ratoi = 0.5
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown key");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey { suggestion, .. } => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("ceiling_ratio"));
}

/// Wrong value types become InvalidType diagnostics.
#[test]
fn wrong_type_produces_invalid_type() {
    let toml = r#"
[clustering]
max_clusters = "many"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidType { .. })));
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.storage.data_dir, "recall-data");
    assert_eq!(config.storage.memory_file, "memory_index.json");
    assert_eq!(config.storage.cluster_file, "clusters.json");
    assert_eq!(config.embedding.dimensions, 384);
    assert_eq!(config.clustering.max_clusters, 50);
    assert!(config.diversity.enabled);
    assert!(!config.diversity.watch_list.is_empty());
    assert_eq!(config.retrieval.neighbor_count, 3);
    assert_eq!(config.logging.level, "info");
}

/// Validation runs after a successful parse.
#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[diversity]
ceiling_ratio = 0.0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero ceiling is invalid");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::OutOfRange { key, .. } if key == "diversity.ceiling_ratio"
    )));
}

/// Dotted overrides (as produced by the env provider) win over TOML.
#[test]
fn dotted_override_beats_toml() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let toml_content = r#"
[clustering]
similarity_threshold = 0.7
"#;

    let config: RecallConfig = Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::string(toml_content))
        .merge(("clustering.similarity_threshold", 0.9))
        .extract()
        .expect("should merge override");

    assert!((config.clustering.similarity_threshold - 0.9).abs() < f64::EPSILON);
}

/// Missing config files are silently skipped (Figment's Toml::file() behavior).
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: RecallConfig = Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::file("/nonexistent/path/recall.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.storage.data_dir, "recall-data");
}

/// Defaults survive a serialize/deserialize pass through TOML.
#[test]
fn defaults_round_trip_through_toml() {
    let rendered = toml::to_string(&RecallConfig::default()).expect("serialize defaults");
    let config = load_and_validate_str(&rendered).expect("rendered defaults are valid");
    assert_eq!(config.retrieval.history_limit, 20);
}
