/// BM25 lexical search using Tantivy
///
/// A throwaway in-RAM index is built from the snapshot texts for every query;
/// the caller runs this on the blocking pool.

use tantivy::{
    collector::TopDocs,
    doc,
    query::QueryParser,
    schema::{Schema, Value, INDEXED, STORED, TEXT},
    Index, IndexWriter, TantivyDocument,
};
use tracing::debug;

use crate::errors::RetrievalError;
use crate::types::{Candidate, Metadata};

/// Tantivy's minimum per-thread writer budget
const WRITER_HEAP_BYTES: usize = 15_000_000;

/// Capability: rank raw texts against a query, best match first.
pub trait LexicalRanker: Send + Sync {
    /// # Errors
    /// `EmptyCorpus` when `texts` is empty.
    fn rank(
        &self,
        texts: &[String],
        metadatas: &[Metadata],
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RetrievalError>;
}

/// Okapi BM25 ranking backed by an in-memory Tantivy index.
#[derive(Debug, Default, Clone, Copy)]
pub struct Bm25Ranker;

fn lexical_error(e: tantivy::TantivyError) -> RetrievalError {
    RetrievalError::BackendUnavailable(format!("lexical index: {}", e))
}

impl LexicalRanker for Bm25Ranker {
    fn rank(
        &self,
        texts: &[String],
        metadatas: &[Metadata],
        query: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, RetrievalError> {
        if texts.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut schema_builder = Schema::builder();
        let content = schema_builder.add_text_field("content", TEXT);
        let position = schema_builder.add_u64_field("position", STORED | INDEXED);
        let index = Index::create_in_ram(schema_builder.build());

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(lexical_error)?;
        for (i, text) in texts.iter().enumerate() {
            writer
                .add_document(doc!(content => text.as_str(), position => i as u64))
                .map_err(lexical_error)?;
        }
        writer.commit().map_err(lexical_error)?;

        let reader = index.reader().map_err(lexical_error)?;
        let searcher = reader.searcher();

        // Lenient parsing: stray operators in user queries must not fail the search
        let parser = QueryParser::for_index(&index, vec![content]);
        let (parsed, _errors) = parser.parse_query_lenient(query);

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(lexical_error)?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let stored: TantivyDocument = searcher.doc(address).map_err(lexical_error)?;
            let Some(i) = stored.get_first(position).and_then(|v| v.as_u64()) else {
                continue;
            };
            let i = i as usize;
            let metadata = metadatas.get(i).cloned().unwrap_or_default();
            results.push(Candidate::new(texts[i].clone(), metadata).with_score(score));
        }

        debug!(query = %query, corpus = texts.len(), hits = results.len(), "BM25 search complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn corpus() -> (Vec<String>, Vec<Metadata>) {
        let texts = vec![
            "The quick brown fox jumps over the lazy dog".to_string(),
            "A fast cat runs across the street".to_string(),
            "Foxes are wild animals related to dogs".to_string(),
        ];
        let metadatas = (0..texts.len())
            .map(|i| {
                let mut m = Metadata::new();
                m.insert("file_id".into(), json!(format!("f{}", i)));
                m
            })
            .collect();
        (texts, metadatas)
    }

    #[test]
    fn test_bm25_ranks_matching_passage_first() {
        let (texts, metadatas) = corpus();
        let results = Bm25Ranker.rank(&texts, &metadatas, "fox jumps", 10).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].text, texts[0]);
        assert_eq!(results[0].metadata["file_id"], json!("f0"));
        assert!(results[0].score.unwrap() > 0.0);
    }

    #[test]
    fn test_bm25_respects_limit() {
        let (texts, metadatas) = corpus();
        let results = Bm25Ranker.rank(&texts, &metadatas, "the", 1).unwrap();
        assert!(results.len() <= 1);
    }

    #[test]
    fn test_bm25_empty_corpus_fails() {
        let result = Bm25Ranker.rank(&[], &[], "anything", 5);
        assert!(matches!(result, Err(RetrievalError::EmptyCorpus)));
    }

    #[test]
    fn test_bm25_tolerates_query_syntax() {
        let (texts, metadatas) = corpus();
        let results = Bm25Ranker.rank(&texts, &metadatas, "cat AND (street", 5).unwrap();
        assert!(results.iter().any(|c| c.text == texts[1]));
    }

    #[test]
    fn test_bm25_no_match_returns_empty() {
        let (texts, metadatas) = corpus();
        let results = Bm25Ranker.rank(&texts, &metadatas, "zeppelin", 5).unwrap();
        assert!(results.is_empty());
    }
}
