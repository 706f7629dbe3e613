use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};

use super::ObjectStore;
use crate::error::IoError;

/// Default cache capacity in number of objects.
pub const DEFAULT_OBJECT_CACHE_CAPACITY: usize = 256;

/// Object caching layer that wraps any ObjectStore.
///
/// Region reads that straddle block borders touch the same N5 block several
/// times, and attribute files are read once per dataset open. Caching whole
/// objects keeps those repeats off the network.
///
/// Features:
/// - LRU eviction by object count
/// - Absent objects are cached too, so sparse datasets do not re-fetch
/// - Singleflight: concurrent requests for the same key share one fetch
pub struct ObjectCache<S> {
    /// The underlying store
    inner: Arc<S>,
    /// Cached objects indexed by key
    cache: RwLock<LruCache<String, Option<Bytes>>>,
    /// In-flight fetches for singleflight pattern
    in_flight: Mutex<HashMap<String, Arc<Notify>>>,
}

impl<S: ObjectStore> ObjectCache<S> {
    /// Create a new ObjectCache with the default capacity.
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_OBJECT_CACHE_CAPACITY)
    }

    /// Create a new ObjectCache holding at most `capacity` objects.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        Self {
            inner: Arc::new(inner),
            cache: RwLock::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of objects currently cached.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

#[async_trait]
impl<S: ObjectStore + 'static> ObjectStore for ObjectCache<S> {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, IoError> {
        loop {
            // Fast path: check cache
            {
                let mut cache = self.cache.write().await;
                if let Some(data) = cache.get(key) {
                    return Ok(data.clone());
                }
            }

            // Slow path: wait on an in-flight fetch or become leader
            let notify = {
                let mut in_flight = self.in_flight.lock().await;

                if let Some(notify) = in_flight.get(key).cloned() {
                    // Register interest before releasing the lock so the
                    // leader's notify_waiters cannot be missed
                    let notified = notify.notified();
                    drop(in_flight);
                    notified.await;
                    continue;
                }

                let notify = Arc::new(Notify::new());
                in_flight.insert(key.to_string(), notify.clone());
                notify
            };

            let result = self.inner.get(key).await;

            {
                let mut cache = self.cache.write().await;
                let mut in_flight = self.in_flight.lock().await;

                if let Ok(ref data) = result {
                    cache.put(key.to_string(), data.clone());
                }

                in_flight.remove(key);
            }

            notify.notify_waiters();

            return result;
        }
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
