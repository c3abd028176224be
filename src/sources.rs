/// Resolve attached items (files, knowledge collections, inline text, web
/// search results) into context sources for a set of queries.
///
/// Each item takes exactly one path, checked in order:
/// 1. pre-fetched `docs` pass through untouched
/// 2. `context = "full"` returns the attached file's content
/// 3. bypass mode reads content straight from the `FileStore`
/// 4. otherwise the item's collections are searched, or returned whole in
///    full-context mode
///
/// A collection is only extracted once per call; later items that resolve to
/// nothing new are skipped.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, error, warn};

use crate::config::RetrievalConfig;
use crate::engine::{FusionEngine, SearchRequest};
use crate::errors::RetrievalError;
use crate::store::FileStore;
use crate::types::Metadata;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    #[default]
    File,
    Collection,
    Text,
    WebSearch,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    /// Member files of a knowledge collection
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachedFile {
    #[serde(default)]
    pub data: Option<FileData>,
}

/// A document already fetched upstream (e.g. a web page).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrefetchedDoc {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// One attached item as sent by the request layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(rename = "type", default)]
    pub kind: FileKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
    /// Collections of a legacy knowledge item
    #[serde(default)]
    pub collection_names: Vec<String>,
    #[serde(default)]
    pub legacy: bool,
    /// "full" to attach the whole file instead of ranked passages
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub docs: Vec<PrefetchedDoc>,
    /// Inline content of a `text` item
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<FileData>,
    #[serde(default)]
    pub file: Option<AttachedFile>,
}

impl FileRef {
    fn attached_data(&self) -> Option<&FileData> {
        self.file.as_ref().and_then(|f| f.data.as_ref())
    }

    /// Vector collections backing this item, in declaration order.
    pub fn collection_names(&self) -> Vec<String> {
        match (self.kind, &self.collection_name, &self.id) {
            (FileKind::Collection, _, _) if self.legacy => self.collection_names.clone(),
            (FileKind::Collection, _, Some(id)) => vec![id.clone()],
            (FileKind::Collection, _, None) => Vec::new(),
            (_, Some(name), _) => vec![name.clone()],
            (_, None, Some(id)) if self.legacy => vec![id.clone()],
            (_, None, Some(id)) => vec![format!("file-{}", id)],
            (_, None, None) => Vec::new(),
        }
    }
}

/// Context resolved for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub file: FileRef,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distances: Option<Vec<f32>>,
}

/// Retrieval knobs for source resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOptions {
    pub k: usize,
    pub k_reranker: usize,
    pub min_score: f32,
    pub hybrid: bool,
    /// Fall back to plain search when hybrid search fails
    pub fallback: bool,
    pub weights: (f32, f32),
    pub sort_descending: bool,
    pub full_context: bool,
    pub bypass_embedding_and_retrieval: bool,
}

impl SourceOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        SourceOptions {
            k: config.top_k,
            k_reranker: config.top_k_reranker,
            min_score: config.relevance_threshold,
            hybrid: config.hybrid_search,
            fallback: config.hybrid_fallback,
            weights: config.hybrid_weights(),
            sort_descending: config.sort_descending,
            full_context: config.full_context,
            bypass_embedding_and_retrieval: config.bypass_embedding_and_retrieval,
        }
    }

    fn search_request(&self, collections: Vec<String>, queries: &[String]) -> SearchRequest {
        SearchRequest {
            collections,
            queries: queries.to_vec(),
            hybrid: self.hybrid,
            fallback: self.fallback,
            k: self.k,
            k_reranker: self.k_reranker,
            min_score: self.min_score,
            weights: self.weights,
            sort_descending: self.sort_descending,
        }
    }
}

struct Context {
    documents: Vec<String>,
    metadatas: Vec<Metadata>,
    distances: Option<Vec<f32>>,
}

impl Context {
    fn new(documents: Vec<String>, metadatas: Vec<Metadata>) -> Self {
        Context {
            documents,
            metadatas,
            distances: None,
        }
    }
}

fn file_metadata(file_id: &str, filename: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("file_id".into(), json!(file_id));
    metadata.insert("name".into(), json!(filename));
    metadata.insert("source".into(), json!(filename));
    metadata
}

/// Resolve every item into a `Source`, in input order.
///
/// Failures on one item are logged and that item yields no source; this
/// function never fails as a whole.
pub async fn get_sources_from_files(
    engine: &FusionEngine,
    store: &dyn FileStore,
    files: Vec<FileRef>,
    queries: &[String],
    options: &SourceOptions,
) -> Vec<Source> {
    let mut extracted: HashSet<String> = HashSet::new();
    let mut sources = Vec::new();

    for mut file in files {
        let context = if !file.docs.is_empty() {
            Some(Context::new(
                file.docs.iter().map(|d| d.content.clone()).collect(),
                file.docs.iter().map(|d| d.metadata.clone()).collect(),
            ))
        } else if file.context.as_deref() == Some("full") {
            let content = file.attached_data().and_then(|d| d.content.clone()).unwrap_or_default();
            let mut metadata = Metadata::new();
            metadata.insert("file_id".into(), json!(file.id));
            metadata.insert("name".into(), json!(file.name));
            Some(Context::new(vec![content], vec![metadata]))
        } else if file.kind != FileKind::WebSearch && options.bypass_embedding_and_retrieval {
            match read_from_store(store, &file).await {
                Ok(context) => context,
                Err(e) => {
                    error!(file = ?file.id, error = %e, "Failed to read file store");
                    None
                }
            }
        } else {
            let collections: Vec<String> = dedup_in_order(file.collection_names())
                .into_iter()
                .filter(|c| !extracted.contains(c))
                .collect();
            if collections.is_empty() {
                debug!(file = ?file.id, "Skipping item already extracted");
                continue;
            }

            let context = if options.full_context {
                match engine.get_all_items_from_collections(&collections).await {
                    Ok(all) => Some(Context::new(all.documents, all.metadatas)),
                    Err(e) => {
                        error!(error = %e, "Full-context retrieval failed");
                        None
                    }
                }
            } else if file.kind == FileKind::Text {
                file.content.clone().map(|content| {
                    let mut metadata = Metadata::new();
                    metadata.insert("name".into(), json!(file.name));
                    Context::new(vec![content], vec![metadata])
                })
            } else {
                ranked_context(engine, collections.clone(), queries, options).await
            };

            extracted.extend(collections);
            context
        };

        if let Some(context) = context {
            file.data = None;
            sources.push(Source {
                file,
                documents: context.documents,
                metadatas: context.metadatas,
                distances: context.distances.filter(|d| !d.is_empty()),
            });
        }
    }
    sources
}

/// Ranked search over `collections`; a failed hybrid call is retried as plain
/// search when the options allow it.
async fn ranked_context(
    engine: &FusionEngine,
    collections: Vec<String>,
    queries: &[String],
    options: &SourceOptions,
) -> Option<Context> {
    let request = options.search_request(collections, queries);
    let result = match engine.search(&request).await {
        Ok(merged) => Ok(merged),
        Err(e) if request.hybrid && options.fallback => {
            warn!(error = %e, "Hybrid search failed, using plain search as fallback");
            engine
                .query_collection(&request.collections, queries, request.k, request.sort_descending)
                .await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(merged) => Some(Context {
            documents: merged.documents,
            metadatas: merged.metadatas,
            distances: Some(merged.distances),
        }),
        Err(e) => {
            error!(collections = ?request.collections, error = %e, "Ranked retrieval failed");
            None
        }
    }
}

/// Bypass mode: the item's raw content, straight from the store.
async fn read_from_store(store: &dyn FileStore, file: &FileRef) -> Result<Option<Context>, RetrievalError> {
    if file.kind == FileKind::Collection {
        let file_ids = file.data.as_ref().map(|d| d.file_ids.clone()).unwrap_or_default();
        let mut context = Context::new(Vec::new(), Vec::new());
        for file_id in &file_ids {
            if let Some(stored) = store.get_file_by_id(file_id).await? {
                context.documents.push(stored.content);
                context.metadatas.push(file_metadata(file_id, &stored.filename));
            }
        }
        return Ok(Some(context));
    }

    if let Some(id) = &file.id {
        return Ok(store
            .get_file_by_id(id)
            .await?
            .map(|stored| Context::new(vec![stored.content], vec![file_metadata(id, &stored.filename)])));
    }

    Ok(file.attached_data().and_then(|data| {
        data.content.clone().map(|content| {
            Context::new(vec![content], vec![data.metadata.clone().unwrap_or_default()])
        })
    }))
}

fn dedup_in_order(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|n| seen.insert(n.clone())).collect()
}
