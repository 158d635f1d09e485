// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations.
//!
//! Each command returns its rendered output so `main` only prints. Text
//! output is colored when stdout is a terminal; `--json` emits the
//! underlying structures.

use std::io::IsTerminal;

use async_trait::async_trait;
use chrono::Utc;
use colored::Colorize;
use recall_core::{
    AdapterType, ConversationTurn, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput,
    HealthStatus, PluginAdapter, RecallError,
};
use recall_memory::{
    HybridRetriever, InMemoryHistory, MemoryEngine, NewMemory, RetrievalOptions, RetrievalResult,
    SearchOptions, StrategySet, parse_temporal_reference,
};
use serde::Serialize;

/// How command output is rendered.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub color: bool,
}

impl Output {
    pub fn detect(json: bool, plain: bool) -> Self {
        Self {
            json,
            color: !json && !plain && std::io::stdout().is_terminal(),
        }
    }

    fn to_json<T: Serialize>(&self, value: &T) -> Result<String, RecallError> {
        serde_json::to_string_pretty(value)
            .map_err(|e| RecallError::Internal(format!("failed to render JSON: {e}")))
    }

    fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

/// Embedding adapter for commands that never embed.
///
/// Lets `stats`, `clusters`, and `prune` open the store without loading
/// the ONNX model.
pub struct OfflineEmbedder {
    dimensions: usize,
}

impl OfflineEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl PluginAdapter for OfflineEmbedder {
    fn name(&self) -> &str {
        "offline-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecallError> {
        Ok(HealthStatus::Degraded("no embedding model loaded".into()))
    }

    async fn shutdown(&self) -> Result<(), RecallError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OfflineEmbedder {
    async fn embed(&self, _input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        Err(RecallError::provider(
            "this command runs without an embedding model",
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// `recall add`
pub async fn add(
    engine: &MemoryEngine,
    memory: NewMemory,
    output: &Output,
) -> Result<String, RecallError> {
    let record = engine.add_memory(memory).await?;
    if output.json {
        return output.to_json(&record);
    }
    Ok(format!(
        "stored {} ({}) in {}",
        output.heading(&record.id),
        record.memory_type,
        record.cluster_id.as_deref().unwrap_or("-")
    ))
}

/// `recall search`
pub async fn search(
    engine: &MemoryEngine,
    query: &str,
    limit: Option<usize>,
    since: Option<&str>,
    output: &Output,
) -> Result<String, RecallError> {
    let retrieval = &engine.config().retrieval;
    let mut options = SearchOptions::from_config(retrieval);
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }
    if let Some(phrase) = since {
        let reference = parse_temporal_reference(phrase, Utc::now())
            .ok_or_else(|| RecallError::Config(format!("unrecognized time phrase '{phrase}'")))?;
        options = options.with_temporal_filter(reference.to_filter(retrieval.temporal_tolerance_days));
    }

    let results = engine.semantic_search(query, &options).await?;
    if output.json {
        return output.to_json(&results);
    }
    if results.is_empty() {
        return Ok("no matching memories".to_string());
    }
    let lines: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{:>2}. [{:.3}] {} {}",
                i + 1,
                r.relevance,
                r.memory.text,
                output.dim(&format!(
                    "({}, {}, cluster of {})",
                    r.memory.timestamp.format("%Y-%m-%d"),
                    r.memory.memory_type,
                    r.cluster_size
                ))
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Record `turns` (oldest first) as user turns for `profile_id`.
pub async fn seed_history(history: &InMemoryHistory, profile_id: Option<&str>, turns: &[String]) {
    let Some(profile_id) = profile_id else {
        return;
    };
    for turn in turns {
        history
            .record(profile_id, ConversationTurn::now("user", turn.as_str()))
            .await;
    }
}

/// `recall context`
pub async fn context(
    retriever: &HybridRetriever,
    query: &str,
    profile_id: Option<&str>,
    limit: Option<usize>,
    output: &Output,
) -> Result<String, RecallError> {
    let mut options = RetrievalOptions::from_config(&retriever.engine().config().retrieval)
        .with_strategies(StrategySet::all());
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }
    let result = retriever.retrieve_context(query, profile_id, &options).await;
    render_retrieval(&result, output)
}

/// `recall smart`
pub async fn smart(
    retriever: &HybridRetriever,
    query: &str,
    profile_id: Option<&str>,
    output: &Output,
) -> Result<String, RecallError> {
    let result = retriever.smart_search(query, profile_id).await;
    render_retrieval(&result, output)
}

fn render_retrieval(result: &RetrievalResult, output: &Output) -> Result<String, RecallError> {
    if output.json {
        return output.to_json(result);
    }
    let mut lines = Vec::with_capacity(result.fragments.len() + 2);
    if result.fragments.is_empty() {
        lines.push(if result.fallback {
            "no context available (all strategies failed)".to_string()
        } else {
            "no relevant context".to_string()
        });
    }
    for fragment in &result.fragments {
        lines.push(format!(
            "[{:.3}] {} {}",
            fragment.score,
            output.dim(&format!("{:<15}", fragment.source.as_str())),
            fragment.content
        ));
    }
    let c = &result.contributions;
    lines.push(output.dim(&format!(
        "candidates: semantic={} keyword={} temporal={} cross_reference={}",
        c.semantic, c.keyword, c.temporal, c.cross_reference
    )));
    if !result.failed_strategies.is_empty() {
        let failed: Vec<&str> = result.failed_strategies.iter().map(|s| s.as_str()).collect();
        let line = format!("failed strategies: {}", failed.join(", "));
        lines.push(if output.color {
            line.yellow().to_string()
        } else {
            line
        });
    }
    Ok(lines.join("\n"))
}

/// `recall stats`
pub async fn stats(engine: &MemoryEngine, output: &Output) -> Result<String, RecallError> {
    let stats = engine.get_stats().await;
    if output.json {
        return output.to_json(&stats);
    }
    let mut lines = vec![
        output.heading("recall stats"),
        format!("  memories:       {}", stats.total),
    ];
    for (memory_type, count) in &stats.by_type {
        lines.push(format!("    {memory_type:<12} {count}"));
    }
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        lines.push(format!(
            "  span:           {} .. {} ({:.1} days)",
            oldest.format("%Y-%m-%d"),
            newest.format("%Y-%m-%d"),
            stats.span_days
        ));
    }
    lines.push(format!("  clusters:       {}", stats.cluster_count));
    lines.push(format!(
        "  dominant ratio: {:.2} (ceiling {:.2})",
        stats.dominant_ratio,
        engine.diversity_guard().ceiling()
    ));
    Ok(lines.join("\n"))
}

/// `recall clusters`
pub async fn clusters(engine: &MemoryEngine, output: &Output) -> Result<String, RecallError> {
    let clusters = engine.clusters().await;
    if output.json {
        return output.to_json(&clusters);
    }
    if clusters.is_empty() {
        return Ok("no clusters".to_string());
    }
    let lines: Vec<String> = clusters
        .iter()
        .map(|c| {
            let marker = if c.dominant { " *" } else { "" };
            format!(
                "{} {:>4}  {}{}",
                output.heading(&c.id),
                c.size,
                c.keywords.join(", "),
                marker
            )
        })
        .collect();
    Ok(lines.join("\n"))
}

/// `recall prune`
pub async fn prune(engine: &MemoryEngine, output: &Output) -> Result<String, RecallError> {
    let report = engine.prune(Utc::now()).await?;
    if output.json {
        return output.to_json(&report);
    }
    let mut line = format!(
        "pruned {} memories ({} expired, {} over cap), {} remaining",
        report.removed(),
        report.expired,
        report.evicted,
        report.remaining
    );
    if report.merged_clusters > 0 {
        line.push_str(&format!(", merged {} dominant clusters", report.merged_clusters));
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_test_utils::TestHarness;

    const TEXT: Output = Output {
        json: false,
        color: false,
    };
    const JSON: Output = Output {
        json: true,
        color: false,
    };

    #[tokio::test]
    async fn add_then_search_renders_text() {
        let harness = TestHarness::builder().build().await.unwrap();
        let added = add(&harness.engine, NewMemory::new("budget planning session"), &TEXT)
            .await
            .unwrap();
        assert!(added.starts_with("stored mem-"));

        let rendered = search(&harness.engine, "budget planning session", None, None, &TEXT)
            .await
            .unwrap();
        assert!(rendered.contains("budget planning session"));
        assert!(rendered.starts_with(" 1."));
    }

    #[tokio::test]
    async fn search_rejects_unknown_time_phrase() {
        let harness = TestHarness::builder().build().await.unwrap();
        let err = search(&harness.engine, "budget", None, Some("whenever"), &TEXT)
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::Config(_)));
    }

    #[tokio::test]
    async fn stats_json_is_parseable() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness.remember("budget planning session").await.unwrap();
        let rendered = stats(&harness.engine, &JSON).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["total"], 1);
        assert_eq!(value["cluster_count"], 1);
    }

    #[tokio::test]
    async fn context_reports_fallback_when_embedding_fails() {
        let harness = TestHarness::builder().build().await.unwrap();
        harness.remember("budget planning session").await.unwrap();
        harness.embedder.set_failing(true);
        let rendered = context(&harness.retriever, "budget", None, None, &TEXT)
            .await
            .unwrap();
        assert!(rendered.contains("all strategies failed"));
        assert!(rendered.contains("failed strategies: semantic"));
    }

    #[tokio::test]
    async fn seeded_turns_feed_keyword_strategy() {
        let harness = TestHarness::builder().build().await.unwrap();
        seed_history(
            &harness.history,
            Some("cli"),
            &["the budget planning moved to monday".to_string()],
        )
        .await;
        let rendered = smart(
            &harness.retriever,
            "what did we discuss last time about budget planning",
            Some("cli"),
            &TEXT,
        )
        .await
        .unwrap();
        assert!(rendered.contains("keyword"));
        assert!(rendered.contains("the budget planning moved to monday"));
    }

    #[tokio::test]
    async fn offline_embedder_refuses_to_embed() {
        let embedder = OfflineEmbedder::new(384);
        assert_eq!(embedder.dimensions(), 384);
        assert!(embedder.embed(EmbeddingInput::single("x")).await.unwrap_err().is_provider());
    }

    #[tokio::test]
    async fn prune_and_clusters_on_empty_store() {
        let harness = TestHarness::builder().build().await.unwrap();
        assert_eq!(clusters(&harness.engine, &TEXT).await.unwrap(), "no clusters");
        let rendered = prune(&harness.engine, &TEXT).await.unwrap();
        assert!(rendered.starts_with("pruned 0 memories"));
    }
}
