// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./recall.toml` > `~/.config/recall/recall.toml` > `/etc/recall/recall.toml`
//! with environment variable overrides via `RECALL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RecallConfig;

/// Top-level sections, used to map `RECALL_<SECTION>_<KEY>` env vars.
const SECTIONS: &[&str] = &[
    "storage",
    "embedding",
    "clustering",
    "diversity",
    "retrieval",
    "retention",
    "logging",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/recall/recall.toml` (system-wide)
/// 3. `~/.config/recall/recall.toml` (user XDG config)
/// 4. `./recall.toml` (local directory)
/// 5. `RECALL_*` environment variables
pub fn load_config() -> Result<RecallConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RecallConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RecallConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::file("/etc/recall/recall.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("recall/recall.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("recall.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `RECALL_CLUSTERING_SIMILARITY_THRESHOLD` must become
/// `clustering.similarity_threshold`, not `clustering.similarity.threshold`.
fn env_provider() -> Env {
    Env::prefixed("RECALL_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(
            map_env_key("clustering_similarity_threshold"),
            "clustering.similarity_threshold"
        );
        assert_eq!(map_env_key("storage_data_dir"), "storage.data_dir");
        assert_eq!(map_env_key("diversity_ceiling_ratio"), "diversity.ceiling_ratio");
        assert_eq!(map_env_key("logging_level"), "logging.level");
    }

    #[test]
    fn unknown_section_passes_through() {
        assert_eq!(map_env_key("unrelated_key"), "unrelated_key");
    }
}
