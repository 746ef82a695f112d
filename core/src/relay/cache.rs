//! Recent-post cache
//!
//! Serves the newest posts of a space from memory for a short TTL. Each
//! space has its own slot guarded by an async mutex, so concurrent misses
//! for one space trigger a single store query while other spaces refresh
//! independently. A failed refresh keeps serving whatever was cached before.

use crate::storage::{DocumentStore, StorePath};
use crate::types::Post;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Snapshot of a space's newest posts
#[derive(Clone, Debug)]
pub struct CachedPostList {
    pub posts: Arc<Vec<Post>>,
    pub fetched_at: Instant,
}

type Slot = Arc<Mutex<Option<CachedPostList>>>;

/// TTL cache of recent posts keyed by space
pub struct ContentCache {
    store: Arc<dyn DocumentStore>,
    ttl: Duration,
    page_size: usize,
    entries: DashMap<String, Slot>,
}

impl ContentCache {
    pub fn new(store: Arc<dyn DocumentStore>, ttl: Duration, page_size: usize) -> Self {
        Self {
            store,
            ttl,
            page_size,
            entries: DashMap::new(),
        }
    }

    /// Newest posts of `space`, refreshed from the store once the TTL has passed
    pub async fn get(&self, space: &str) -> Arc<Vec<Post>> {
        let slot = self.entries.entry(space.to_string()).or_default().value().clone();
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() <= self.ttl {
                return Arc::clone(&cached.posts);
            }
        }

        match self.store.query_recent(&StorePath::posts(space), self.page_size).await {
            Ok(docs) => {
                let posts: Vec<Post> = docs
                    .into_iter()
                    .filter_map(|doc| match serde_json::from_value(doc) {
                        Ok(post) => Some(post),
                        Err(e) => {
                            warn!(%space, error = %e, "Skipping unreadable post document");
                            None
                        }
                    })
                    .collect();
                debug!(%space, count = posts.len(), "Refreshed post cache");

                let posts = Arc::new(posts);
                *entry = Some(CachedPostList {
                    posts: Arc::clone(&posts),
                    fetched_at: Instant::now(),
                });
                posts
            }
            Err(e) => {
                warn!(%space, error = %e, "Post cache refresh failed, serving previous snapshot");
                entry
                    .as_ref()
                    .map(|cached| Arc::clone(&cached.posts))
                    .unwrap_or_default()
            }
        }
    }

    /// Drop the cached list so the next read goes to the store
    pub fn invalidate(&self, space: &str) {
        self.entries.remove(space);
    }

    /// Whether `space` already has a slot
    pub fn contains(&self, space: &str) -> bool {
        self.entries.contains_key(space)
    }

    /// Number of spaces with a slot
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Document, MemoryStore};
    use crate::types::ContentItem;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Counts queries and can be switched into failing
    struct CountingStore {
        inner: MemoryStore,
        queries: AtomicUsize,
        failing: AtomicBool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                queries: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
            }
        }

        fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentStore for CountingStore {
        async fn exists(&self, path: &StorePath) -> Result<bool> {
            self.inner.exists(path).await
        }

        async fn append(&self, path: &StorePath, document: Document) -> Result<()> {
            self.inner.append(path, document).await
        }

        async fn query_recent(&self, path: &StorePath, limit: usize) -> Result<Vec<Document>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Storage("store offline".into()));
            }
            self.inner.query_recent(path, limit).await
        }
    }

    async fn seed(store: &CountingStore, space: &str, texts: &[&str]) {
        for text in texts {
            let post = Post::new("x", space, vec![ContentItem::text(*text)]);
            store
                .append(&StorePath::posts(space), serde_json::to_value(&post).unwrap())
                .await
                .unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_boundary() {
        let store = Arc::new(CountingStore::new());
        seed(&store, "root", &["hi"]).await;
        let ttl = Duration::from_secs(5);
        let cache = ContentCache::new(store.clone(), ttl, 10);

        let first = cache.get("root").await;
        assert_eq!(store.queries(), 1);
        assert_eq!(first.len(), 1);

        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        let second = cache.get("root").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.queries(), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        let third = cache.get("root").await;
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(store.queries(), 2);
    }

    #[tokio::test]
    async fn test_page_size_and_order() {
        let store = Arc::new(CountingStore::new());
        seed(&store, "root", &["1", "2", "3", "4"]).await;
        let cache = ContentCache::new(store.clone(), Duration::from_secs(5), 2);

        let posts = cache.get("root").await;
        let texts: Vec<_> = posts.iter().map(|p| p.content[0].clone()).collect();
        assert_eq!(texts, vec![ContentItem::text("4"), ContentItem::text("3")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_stale_snapshot() {
        let store = Arc::new(CountingStore::new());
        seed(&store, "root", &["hi"]).await;
        let cache = ContentCache::new(store.clone(), Duration::from_secs(5), 10);

        let fresh = cache.get("root").await;
        store.failing.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(6)).await;

        let stale = cache.get("root").await;
        assert!(Arc::ptr_eq(&fresh, &stale));

        // fetched_at was not bumped, so the next read tries again
        cache.get("root").await;
        assert_eq!(store.queries(), 3);
    }

    #[tokio::test]
    async fn test_failed_first_refresh_serves_empty() {
        let store = Arc::new(CountingStore::new());
        store.failing.store(true, Ordering::SeqCst);
        let cache = ContentCache::new(store.clone(), Duration::from_secs(5), 10);

        assert!(cache.get("root").await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_misses_refresh_once() {
        let store = Arc::new(CountingStore::new());
        seed(&store, "root", &["hi"]).await;
        let cache = Arc::new(ContentCache::new(store.clone(), Duration::from_secs(5), 10));

        let reads = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get("root").await })
        });
        let results = futures_util::future::join_all(reads).await;

        assert_eq!(store.queries(), 1);
        assert!(results.iter().all(|r| r.as_ref().map(|posts| posts.len() == 1).unwrap_or(false)));
    }

    #[tokio::test]
    async fn test_invalidate_forces_query() {
        let store = Arc::new(CountingStore::new());
        seed(&store, "root", &["hi"]).await;
        let cache = ContentCache::new(store.clone(), Duration::from_secs(5), 10);

        cache.get("root").await;
        seed(&store, "root", &["again"]).await;
        cache.invalidate("root");

        assert_eq!(cache.get("root").await.len(), 2);
        assert_eq!(store.queries(), 2);
    }
}
