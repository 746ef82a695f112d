//! Document store contract
//!
//! The relay treats its backing store as an opaque key/document database
//! addressed by hierarchical paths (`<space>/posts`, `spaces`). It only needs
//! existence checks, appends and recency-ordered queries.

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

use crate::Result;
use async_trait::async_trait;
use std::fmt;

pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

/// A stored JSON document
pub type Document = serde_json::Value;

/// Hierarchical collection path
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct StorePath(String);

impl StorePath {
    /// Collection holding one document per space
    pub fn spaces() -> Self {
        Self("spaces".to_string())
    }

    /// Collection holding the posts of a space
    pub fn posts(space: &str) -> Self {
        Self(format!("{}/posts", space))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backing store used by the relay
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether the collection holds at least one document
    async fn exists(&self, path: &StorePath) -> Result<bool>;

    /// Append a document to the collection
    async fn append(&self, path: &StorePath, document: Document) -> Result<()>;

    /// Up to `limit` documents, newest first
    async fn query_recent(&self, path: &StorePath, limit: usize) -> Result<Vec<Document>>;
}
