use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use ragfuse::config::Config;
use ragfuse::embedding::{embed_in_batches, EmbeddingProvider};
use ragfuse::embedding::local::{cache_dir, LocalEmbeddingProvider};
use ragfuse::embedding::ollama::OllamaEmbeddingProvider;
use ragfuse::embedding::openai::OpenAIEmbeddingProvider;
use ragfuse::engine::{FusionEngine, SearchRequest};
use ragfuse::logging;
use ragfuse::retrieval::{HttpReranker, LocalCrossEncoder, Reranker};
use ragfuse::types::Metadata;
use ragfuse::vector::{DistanceMetric, InMemoryVectorIndex, NewDocument, VectorIndex};

#[derive(Parser)]
#[command(name = "ragfuse", version, about = "Multi-collection hybrid retrieval with rank fusion and re-ranking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a JSON corpus and print the merged result
    Search {
        /// JSON file mapping collection names to passages
        #[arg(long)]
        corpus: PathBuf,
        /// Collections to search (repeatable)
        #[arg(long = "collection", required = true)]
        collections: Vec<String>,
        /// Queries to run (repeatable)
        #[arg(long = "query", required = true)]
        queries: Vec<String>,
        /// Force hybrid search on regardless of configuration
        #[arg(long)]
        hybrid: bool,
        /// Global result bound (defaults to retrieval.top_k)
        #[arg(long)]
        k: Option<usize>,
    },
    /// Print the effective configuration
    Config,
}

/// One passage of the corpus file.
#[derive(Deserialize)]
struct CorpusEntry {
    #[serde(default)]
    id: Option<String>,
    text: String,
    #[serde(default)]
    metadata: Metadata,
}

/// Create the embedding provider based on configuration.
async fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "openai" => {
            let api_key = embedding.api_key.clone()
                .ok_or_else(|| anyhow::anyhow!(
                    "API key required when embedding provider is 'openai'. \
                     Set RAGFUSE_EMBEDDING__API_KEY or embedding.api_key in ragfuse.toml"
                ))?;
            Ok(Arc::new(OpenAIEmbeddingProvider::new(
                embedding.base_url.clone(),
                api_key,
                embedding.model.clone(),
            )?))
        }
        "ollama" => {
            Ok(Arc::new(OllamaEmbeddingProvider::new(
                embedding.base_url.clone(),
                embedding.api_key.clone(),
                embedding.model.clone(),
            )))
        }
        "local" => {
            let dir = cache_dir(embedding.cache_dir.as_deref());
            Ok(Arc::new(LocalEmbeddingProvider::new(&embedding.model, dir).await?))
        }
        other => anyhow::bail!("Unknown embedding provider '{}': expected local, openai or ollama", other),
    }
}

/// Create the reranker based on configuration. `None` means embedding similarity.
async fn create_reranker(config: &Config) -> Result<Option<Arc<dyn Reranker>>> {
    let reranking = &config.reranking;
    match reranking.provider.as_str() {
        "none" => Ok(None),
        "local" => {
            let model = reranking.model.clone()
                .ok_or_else(|| anyhow::anyhow!(
                    "Model required when reranking provider is 'local'. \
                     Set RAGFUSE_RERANKING__MODEL or reranking.model in ragfuse.toml"
                ))?;
            let dir = cache_dir(config.embedding.cache_dir.as_deref());
            Ok(Some(Arc::new(LocalCrossEncoder::new(&model, dir).await?)))
        }
        "http" => {
            let url = reranking.url.clone().unwrap_or_default();
            Ok(Some(Arc::new(HttpReranker::new(
                url,
                reranking.api_key.clone(),
                reranking.model.clone(),
            )?)))
        }
        other => anyhow::bail!("Unknown reranking provider '{}': expected none, local or http", other),
    }
}

/// Load the corpus file into an in-memory index, embedding every passage.
async fn load_corpus(
    path: &PathBuf,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<InMemoryVectorIndex> {
    let raw = tokio::fs::read_to_string(path).await?;
    let corpus: BTreeMap<String, Vec<CorpusEntry>> = serde_json::from_str(&raw)?;
    let index = InMemoryVectorIndex::new(DistanceMetric::CosineSimilarity);

    for (collection, entries) in corpus {
        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let embeddings = embed_in_batches(provider, &texts, batch_size).await?;
        let documents: Vec<NewDocument> = entries
            .into_iter()
            .zip(embeddings)
            .map(|(entry, embedding)| NewDocument {
                id: entry.id,
                text: entry.text,
                metadata: entry.metadata,
                embedding,
            })
            .collect();
        tracing::info!(collection = %collection, passages = documents.len(), "Collection loaded");
        index.insert(&collection, documents).await;
    }
    Ok(index)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();

    // 2. Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });

    // 3. Initialize logging FIRST (before any other output)
    // stdout is reserved for results; the guard flushes the log file on exit
    let _log_guard = logging::init_logging(&config).context("Failed to open log file")?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Commands::Search { corpus, collections, queries, hybrid, k } => {
            let provider = create_embedding_provider(&config).await?;
            let reranker = create_reranker(&config).await?;
            let index = load_corpus(&corpus, provider.as_ref(), config.embedding.batch_size).await?;
            let score_order = index.score_order();

            let engine = FusionEngine::new(Arc::new(index), provider, reranker, config.retrieval.clone())
                .with_batch_size(config.embedding.batch_size);

            let mut request = SearchRequest::from_config(collections, queries, &config.retrieval);
            request.hybrid |= hybrid;
            if let Some(k) = k {
                request.k = k;
            }
            if !request.hybrid {
                // Plain results carry raw index scores
                request.sort_descending = score_order.sort_descending();
            }

            let merged = engine.search(&request).await?;
            println!("{}", serde_json::to_string_pretty(&merged)?);
        }
    }

    Ok(())
}
