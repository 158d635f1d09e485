// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recall - semantic memory and context retrieval from the command line.
//!
//! This is the binary entry point for the Recall engine.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use recall_config::RecallConfig;
use recall_core::{EmbeddingAdapter, RecallError};
use recall_memory::{
    HybridRetriever, InMemoryHistory, MemoryEngine, MemoryType, ModelManager, NewMemory,
    OnnxEmbedder,
};
use tracing::error;

use crate::commands::{OfflineEmbedder, Output};

/// Recall - semantic memory and context retrieval.
#[derive(Parser, Debug)]
#[command(name = "recall", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a new memory.
    Add {
        text: String,
        /// conversation, fact, preference, event, or note.
        #[arg(long = "type", default_value = "conversation", value_parser = parse_memory_type)]
        memory_type: MemoryType,
        /// Importance in [0, 1].
        #[arg(long)]
        importance: Option<f32>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Ranked semantic search over stored memories.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        /// Restrict to a time phrase such as "yesterday" or "2026-03-14".
        #[arg(long)]
        since: Option<String>,
    },
    /// Retrieve fused context using every strategy.
    Context {
        query: String,
        #[arg(long)]
        profile: Option<String>,
        /// Recent conversation turn for the profile, oldest first. Repeatable.
        #[arg(long = "turn", requires = "profile")]
        turns: Vec<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Retrieve context with strategies chosen from the query.
    Smart {
        query: String,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long = "turn", requires = "profile")]
        turns: Vec<String>,
    },
    /// Show store statistics.
    Stats,
    /// List topic clusters, largest first.
    Clusters,
    /// Apply the retention policy now.
    Prune,
}

impl Commands {
    /// Commands that embed text load the ONNX model.
    fn needs_embedder(&self) -> bool {
        !matches!(self, Commands::Stats | Commands::Clusters | Commands::Prune)
    }
}

fn parse_memory_type(s: &str) -> Result<MemoryType, String> {
    MemoryType::parse(s).ok_or_else(|| {
        format!("unknown memory type '{s}' (expected conversation, fact, preference, event, or note)")
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => recall_config::load_and_validate_path(path),
        None => recall_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            recall_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);
    let output = Output::detect(cli.json, cli.plain);

    match run(cli.command, config, &output).await {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("recall: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands, config: RecallConfig, output: &Output) -> Result<String, RecallError> {
    let embedder: Arc<dyn EmbeddingAdapter> = if command.needs_embedder() {
        let manager = ModelManager::new(&config.storage.data_dir, &config.embedding.model_name);
        Arc::new(OnnxEmbedder::from_manager(&manager, &config.embedding).await?)
    } else {
        Arc::new(OfflineEmbedder::new(config.embedding.dimensions))
    };
    let engine = Arc::new(MemoryEngine::open(config, embedder).await?);
    let history = Arc::new(InMemoryHistory::default());
    let retriever = HybridRetriever::new(engine.clone(), history.clone());

    match command {
        Commands::Add {
            text,
            memory_type,
            importance,
            profile,
            tags,
        } => {
            let mut memory = NewMemory::new(text).with_type(memory_type);
            memory.metadata.importance = importance;
            memory.metadata.profile_id = profile;
            memory.metadata.tags = tags;
            memory.metadata.source = Some("cli".to_string());
            commands::add(&engine, memory, output).await
        }
        Commands::Search {
            query,
            limit,
            since,
        } => commands::search(&engine, &query, limit, since.as_deref(), output).await,
        Commands::Context {
            query,
            profile,
            turns,
            limit,
        } => {
            commands::seed_history(&history, profile.as_deref(), &turns).await;
            commands::context(&retriever, &query, profile.as_deref(), limit, output).await
        }
        Commands::Smart {
            query,
            profile,
            turns,
        } => {
            commands::seed_history(&history, profile.as_deref(), &turns).await;
            commands::smart(&retriever, &query, profile.as_deref(), output).await
        }
        Commands::Stats => commands::stats(&engine, output).await,
        Commands::Clusters => commands::clusters(&engine, output).await,
        Commands::Prune => commands::prune(&engine, output).await,
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("recall={log_level},recall_memory={log_level},warn"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
