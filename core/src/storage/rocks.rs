//! RocksDB-backed document store
//!
//! Keys are `<path> 0x00 <sequence, big-endian u64>` so each collection is a
//! contiguous key range ordered by insertion.

use super::{Document, DocumentStore, StorePath};
use crate::{Error, Result};
use async_trait::async_trait;
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Persistent store for relay documents
pub struct RocksStore {
    db: Arc<DB>,
    sequence: AtomicU64,
}

impl RocksStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // Microseconds keep new keys after anything written by a previous run
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        Ok(Self {
            db: Arc::new(db),
            sequence: AtomicU64::new(seed),
        })
    }

    fn prefix(path: &StorePath) -> Vec<u8> {
        let mut prefix = path.as_str().as_bytes().to_vec();
        prefix.push(0x00);
        prefix
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DB) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| Error::Storage(format!("Store task failed: {}", e)))?
    }
}

#[async_trait]
impl DocumentStore for RocksStore {
    async fn exists(&self, path: &StorePath) -> Result<bool> {
        let prefix = Self::prefix(path);
        self.blocking(move |db| {
            let mut iter = db.iterator(IteratorMode::From(&prefix, Direction::Forward));
            match iter.next() {
                Some(item) => {
                    let (key, _) =
                        item.map_err(|e| Error::Storage(format!("Iterator error: {}", e)))?;
                    Ok(key.starts_with(&prefix))
                }
                None => Ok(false),
            }
        })
        .await
    }

    async fn append(&self, path: &StorePath, document: Document) -> Result<()> {
        let mut key = Self::prefix(path);
        key.extend_from_slice(&self.sequence.fetch_add(1, Ordering::SeqCst).to_be_bytes());
        let value = serde_json::to_vec(&document)?;

        self.blocking(move |db| {
            db.put(&key, &value)
                .map_err(|e| Error::Storage(format!("Failed to append document: {}", e)))
        })
        .await
    }

    async fn query_recent(&self, path: &StorePath, limit: usize) -> Result<Vec<Document>> {
        let prefix = Self::prefix(path);
        self.blocking(move |db| {
            let mut upper = prefix.clone();
            if let Some(last) = upper.last_mut() {
                *last = 0x01;
            }

            // Reverse seek lands on the newest key of the collection
            let mut docs = Vec::new();
            for item in db.iterator(IteratorMode::From(&upper, Direction::Reverse)) {
                let (key, value) =
                    item.map_err(|e| Error::Storage(format!("Iterator error: {}", e)))?;
                if !key.starts_with(&prefix) || docs.len() >= limit {
                    break;
                }
                docs.push(serde_json::from_slice(&value)?);
            }
            Ok(docs)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_query() {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksStore::open(temp_dir.path()).unwrap();
        let path = StorePath::posts("root");

        assert!(!store.exists(&path).await.unwrap());
        for n in 0..4 {
            store.append(&path, json!({ "n": n })).await.unwrap();
        }
        store.append(&StorePath::posts("rootx"), json!({ "n": 99 })).await.unwrap();

        assert!(store.exists(&path).await.unwrap());
        let docs = store.query_recent(&path, 2).await.unwrap();
        let order: Vec<i64> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![3, 2]);
    }
}
