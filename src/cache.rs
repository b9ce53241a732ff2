//! In-memory query cache with a fixed staleness window

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::trace;

use crate::error::Result;

/// Hierarchical cache key such as `["tickets", "page=0", ...]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(root: &str) -> Self {
        Self(vec![root.to_string()])
    }

    /// Append one segment
    pub fn with(mut self, part: impl fmt::Display) -> Self {
        self.0.push(part.to_string());
        self
    }

    /// Whether `prefix` is this key or one of its ancestors
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    fetched_at: Instant,
}

/// Caches query results for `stale_time`. Concurrent fetches for the same
/// key are not coalesced; whichever completes last is kept.
#[derive(Debug, Clone)]
pub struct QueryCache {
    stale_time: Duration,
    entries: Arc<RwLock<HashMap<QueryKey, Entry>>>,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> Self {
        Self {
            stale_time,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fresh cached value for `key`, if any
    pub async fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.fetched_at.elapsed() >= self.stale_time {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    /// Store a value under `key`
    pub async fn set<T: Serialize>(&self, key: QueryKey, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.entries.write().await.insert(
            key,
            Entry {
                value,
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Return the cached value when fresh, otherwise run `fetch` and keep
    /// its result. Errors are not cached.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get::<T>(&key).await {
            trace!(%key, "cache hit");
            return Ok(hit);
        }
        trace!(%key, "cache miss");
        let value = fetch().await?;
        self.set(key, &value).await?;
        Ok(value)
    }

    /// Drop every entry under `prefix`
    pub async fn invalidate(&self, prefix: &QueryKey) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !key.starts_with(prefix));
        trace!(%prefix, remaining = entries.len(), "invalidated");
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
