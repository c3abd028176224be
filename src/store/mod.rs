/// File store abstraction layer
///
/// Provides the FileStore trait used by source resolution to read a file's
/// extracted content directly, skipping ranked retrieval. The engine never
/// writes files; ingestion belongs to whatever sits in front of the store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::RetrievalError;
use crate::types::Metadata;

/// A stored file with its extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    /// Extracted plain-text content
    #[serde(default)]
    pub content: String,
    pub filename: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Read-only access to stored files.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Look up a file by id. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    /// `BackendUnavailable` when the store itself cannot be read.
    async fn get_file_by_id(&self, id: &str) -> Result<Option<StoredFile>, RetrievalError>;
}

/// HashMap-backed file store for the CLI and tests.
#[derive(Default)]
pub struct InMemoryFileStore {
    files: RwLock<HashMap<String, StoredFile>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, file: StoredFile) {
        self.files.write().await.insert(file.id.clone(), file);
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn get_file_by_id(&self, id: &str) -> Result<Option<StoredFile>, RetrievalError> {
        Ok(self.files.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_roundtrip() {
        let store = InMemoryFileStore::new();
        store
            .insert(StoredFile {
                id: "f1".into(),
                content: "hello".into(),
                filename: "hello.txt".into(),
                metadata: Metadata::new(),
            })
            .await;

        let file = store.get_file_by_id("f1").await.unwrap().unwrap();
        assert_eq!(file.filename, "hello.txt");
        assert!(store.get_file_by_id("missing").await.unwrap().is_none());
    }
}
