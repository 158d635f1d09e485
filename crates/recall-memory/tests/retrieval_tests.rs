// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for hybrid context retrieval.

use std::sync::Arc;

use chrono::{Duration, Utc};
use recall_memory::{NewMemory, RetrievalOptions, RetrievalSource, StrategySet};
use recall_test_utils::{MockEmbedder, TestHarness};
use tracing_test::traced_test;

const MEETING: &str = "Budget review meeting moved to Friday afternoon";
const FOLLOW_UP: &str = "Budget follow-up notes for the finance team";
const HIKE: &str = "Planned a hike along the coastal ridge";

fn embedder() -> Arc<MockEmbedder> {
    Arc::new(
        MockEmbedder::new(4)
            .with_vector(MEETING, vec![1.0, 0.0, 0.0, 0.0])
            .with_vector(FOLLOW_UP, vec![0.95, 0.3, 0.0, 0.0])
            .with_vector(HIKE, vec![0.0, 0.0, 1.0, 0.0])
            .with_vector("budget review meeting", vec![1.0, 0.0, 0.0, 0.0])
            .with_vector("what happened yesterday", vec![0.0, 0.0, 1.0, 0.0]),
    )
}

async fn harness() -> TestHarness {
    TestHarness::builder()
        .with_embedder(embedder())
        .build()
        .await
        .unwrap()
}

fn all_strategies(harness: &TestHarness) -> RetrievalOptions {
    RetrievalOptions::from_config(&harness.config.retrieval).with_strategies(StrategySet::all())
}

#[tokio::test]
async fn fragment_seen_by_two_strategies_appears_once() {
    let harness = harness().await;
    harness.remember(MEETING).await.unwrap();
    harness.say("alice", MEETING).await;

    let result = harness
        .retriever
        .retrieve_context("budget review meeting", Some("alice"), &all_strategies(&harness))
        .await;

    assert_eq!(result.contributions.keyword, 1);
    assert!(result.contributions.semantic >= 1);
    let matches: Vec<_> = result
        .fragments
        .iter()
        .filter(|f| f.content == MEETING)
        .collect();
    assert_eq!(matches.len(), 1);
    // Semantic relevance (similarity 1 plus boosts) beats keyword Jaccard 0.5.
    assert_eq!(matches[0].source, RetrievalSource::Semantic);
    assert!(matches[0].relevance > 0.5);
    assert!(result.fragments.iter().all(|f| (0.0..=1.0).contains(&f.score)));
}

#[tokio::test]
async fn cross_reference_surfaces_cluster_neighbors() {
    let harness = harness().await;
    let meeting = harness.remember(MEETING).await.unwrap();
    let follow_up = harness.remember(FOLLOW_UP).await.unwrap();
    assert_eq!(meeting.cluster_id, follow_up.cluster_id);

    let options = all_strategies(&harness);
    let result = harness
        .retriever
        .retrieve_context("budget review meeting", None, &options)
        .await;

    assert!(result.contributions.cross_reference >= 1);
    assert_eq!(result.contributions.keyword, 0);
    let contents: Vec<&str> = result.fragments.iter().map(|f| f.content.as_str()).collect();
    assert_eq!(contents.iter().filter(|c| **c == FOLLOW_UP).count(), 1);
    assert_eq!(contents[0], MEETING);
}

#[tokio::test]
async fn temporal_strategy_finds_yesterdays_memory() {
    let harness = harness().await;
    let hike = harness
        .engine
        .add_memory(NewMemory::new(HIKE).at(Utc::now() - Duration::hours(22)))
        .await
        .unwrap();
    harness
        .engine
        .add_memory(NewMemory::new(MEETING).at(Utc::now() - Duration::days(5)))
        .await
        .unwrap();

    let result = harness
        .retriever
        .retrieve_context("what happened yesterday", None, &all_strategies(&harness))
        .await;

    assert_eq!(result.contributions.temporal, 1);
    assert_eq!(result.fragments[0].memory_id.as_deref(), Some(hike.id.as_str()));
}

#[tokio::test]
#[traced_test]
async fn failing_provider_degrades_to_keyword_results() {
    let harness = harness().await;
    harness.remember(MEETING).await.unwrap();
    harness.say("alice", "the budget review meeting got moved").await;
    harness.embedder.set_failing(true);

    let result = harness
        .retriever
        .retrieve_context("budget review meeting", Some("alice"), &all_strategies(&harness))
        .await;

    assert!(!result.fallback);
    assert_eq!(result.fragments.len(), 1);
    assert_eq!(result.fragments[0].source, RetrievalSource::Keyword);
    assert!(result.failed_strategies.contains(&RetrievalSource::Semantic));
    assert!(logs_contain("retrieval strategy failed"));
}

#[tokio::test]
#[traced_test]
async fn total_failure_is_an_empty_fallback() {
    let harness = harness().await;
    harness.remember(MEETING).await.unwrap();
    harness.embedder.set_failing(true);

    let result = harness
        .retriever
        .retrieve_context("budget review meeting", None, &all_strategies(&harness))
        .await;

    assert!(result.fallback);
    assert!(result.fragments.is_empty());
    assert!(!result.failed_strategies.is_empty());
    assert!(logs_contain("retrieval strategy failed"));
}

#[tokio::test]
async fn smart_search_answers_conversational_recall_from_history() {
    let harness = harness().await;
    harness.remember(MEETING).await.unwrap();
    harness.say("alice", "we agreed the budget review moves to friday").await;
    let calls_before = harness.embedder.call_count();

    let result = harness
        .retriever
        .smart_search("what did you say last time about the budget review", Some("alice"))
        .await;

    assert_eq!(harness.embedder.call_count(), calls_before);
    assert_eq!(result.contributions.semantic, 0);
    assert_eq!(result.contributions.keyword, 1);
    assert_eq!(result.fragments[0].source, RetrievalSource::Keyword);
}

#[tokio::test]
async fn smart_search_uses_embeddings_for_topical_queries() {
    let harness = harness().await;
    let meeting = harness.remember(MEETING).await.unwrap();
    let calls_before = harness.embedder.call_count();

    let result = harness
        .retriever
        .smart_search("budget review meeting", None)
        .await;

    assert_eq!(harness.embedder.call_count(), calls_before + 1);
    assert_eq!(result.fragments[0].memory_id.as_deref(), Some(meeting.id.as_str()));
}

#[tokio::test]
async fn results_respect_max_results() {
    let harness = harness().await;
    for text in [MEETING, FOLLOW_UP, HIKE] {
        harness.remember(text).await.unwrap();
    }
    let options = all_strategies(&harness).with_limit(2);
    let result = harness
        .retriever
        .retrieve_context("budget review meeting", None, &options)
        .await;

    assert_eq!(result.fragments.len(), 2);
    assert!(result.contributions.total() >= 2);
    assert!(
        result
            .fragments
            .windows(2)
            .all(|w| w[0].score >= w[1].score)
    );
}
