//! In-memory document store

use super::{Document, DocumentStore, StorePath};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Volatile store keeping each collection as an append-only vector
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<StorePath, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub async fn len(&self, path: &StorePath) -> usize {
        let collections = self.collections.read().await;
        collections.get(path).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn exists(&self, path: &StorePath) -> Result<bool> {
        let collections = self.collections.read().await;
        Ok(collections.get(path).is_some_and(|docs| !docs.is_empty()))
    }

    async fn append(&self, path: &StorePath, document: Document) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(path.clone()).or_default().push(document);
        Ok(())
    }

    async fn query_recent(&self, path: &StorePath, limit: usize) -> Result<Vec<Document>> {
        let collections = self.collections.read().await;
        let docs = match collections.get(path) {
            Some(docs) => docs.iter().rev().take(limit).cloned().collect(),
            None => Vec::new(),
        };
        Ok(docs)
    }
}
