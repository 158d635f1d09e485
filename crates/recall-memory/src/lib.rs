// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic memory and retrieval for the Recall engine.
//!
//! Free-text memories are embedded once, grouped into topic clusters,
//! indexed by calendar day, and persisted as JSON snapshots. Queries are
//! answered by ranked semantic search or by the hybrid retriever, which
//! fuses semantic, keyword, temporal, and cross-reference candidates.
//!
//! ## Architecture
//!
//! - **MemoryEngine**: owns records, indexes, and persistence
//! - **ClusterIndex**: online nearest-centroid topic clustering
//! - **DiversityGuard**: keeps watch-listed topics below a size ceiling
//! - **TemporalIndex**: day-bucketed ids plus natural-language date parsing
//! - **HybridRetriever**: multi-strategy context retrieval and `smart_search`
//! - **OnnxEmbedder** / **ModelManager**: local embedding provider

pub mod cluster;
pub mod diversity;
pub mod embedder;
pub mod history;
pub mod model_manager;
pub mod retriever;
pub mod search;
pub mod snapshot;
pub mod store;
pub mod temporal;
pub mod text;
pub mod types;

pub use cluster::{Assignment, Cluster, ClusterIndex, ClusterSettings};
pub use diversity::{DiversityGuard, RebalanceReport};
pub use embedder::OnnxEmbedder;
pub use history::InMemoryHistory;
pub use model_manager::ModelManager;
pub use retriever::{
    ContextFragment, HybridRetriever, RetrievalOptions, RetrievalResult, RetrievalSource,
    StrategyContributions, StrategySet,
};
pub use search::{NeighborMemory, SearchOptions, SearchResult};
pub use store::{ClusterSummary, MemoryEngine, MemoryStats, PruneReport};
pub use temporal::{TemporalFilter, TemporalIndex, TemporalReference, parse_temporal_reference};
pub use types::{MemoryMetadata, MemoryRecord, MemoryType, NewMemory};
