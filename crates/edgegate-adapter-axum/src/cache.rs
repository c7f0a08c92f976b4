use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use edgegate_core::cache::{CacheError, CacheStore};
use web_time::Instant;

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// Process-local response cache for the native server.
///
/// Expired entries are evicted lazily on read and whenever a write finds the map full.
pub struct MemoryCacheStore {
    data: Mutex<HashMap<String, Entry>>,
    max_entries: usize,
}

impl MemoryCacheStore {
    /// Upper bound on live entries before a write triggers eviction.
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

    pub fn new() -> Self {
        Self::with_max_entries(Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock_data().map(|data| data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_data(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.data
            .lock()
            .map_err(|_| CacheError::Internal(anyhow::anyhow!("cache store lock poisoned")))
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl CacheStore for MemoryCacheStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut data = self.lock_data()?;
        match data.get(key) {
            Some(entry) if Instant::now() >= entry.expires_at => {
                data.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn put_bytes_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            CacheError::Validation(format!("TTL {ttl:?} is out of range"))
        })?;
        let mut data = self.lock_data()?;
        if data.len() >= self.max_entries && !data.contains_key(key) {
            data.retain(|_, entry| entry.expires_at > now);
            if data.len() >= self.max_entries {
                // Still full of live entries: drop the one closest to expiry.
                if let Some(oldest) = data
                    .iter()
                    .min_by_key(|(_, entry)| entry.expires_at)
                    .map(|(key, _)| key.clone())
                {
                    data.remove(&oldest);
                }
            }
        }
        data.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgegate_core::cache::{CachedResponse, ResponseCache, DEFAULT_CACHE_TTL};
    use edgegate_core::http::{HeaderMap, StatusCode};
    use std::sync::Arc;

    #[tokio::test]
    async fn ttl_expires_entry() {
        let store = MemoryCacheStore::new();
        store
            .put_bytes_with_ttl("temp", Bytes::from("val"), Duration::from_millis(1))
            .await
            .unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(store.get_bytes("temp").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn overflowing_ttl_is_rejected() {
        let store = MemoryCacheStore::new();
        let err = store
            .put_bytes_with_ttl("k", Bytes::from("v"), Duration::from_secs(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Validation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn full_store_evicts_soonest_expiry() {
        let store = MemoryCacheStore::with_max_entries(2);
        store
            .put_bytes_with_ttl("short", Bytes::from("1"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .put_bytes_with_ttl("long", Bytes::from("2"), Duration::from_secs(600))
            .await
            .unwrap();
        store
            .put_bytes_with_ttl("new", Bytes::from("3"), Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_bytes("short").await.unwrap(), None);
        assert_eq!(store.get_bytes("long").await.unwrap(), Some(Bytes::from("2")));
        assert_eq!(store.get_bytes("new").await.unwrap(), Some(Bytes::from("3")));
    }

    #[tokio::test]
    async fn overwriting_a_key_never_evicts() {
        let store = MemoryCacheStore::with_max_entries(1);
        let ttl = Duration::from_secs(60);
        store.put_bytes_with_ttl("k", Bytes::from("a"), ttl).await.unwrap();
        store.put_bytes_with_ttl("k", Bytes::from("b"), ttl).await.unwrap();
        assert_eq!(store.get_bytes("k").await.unwrap(), Some(Bytes::from("b")));
    }

    #[tokio::test]
    async fn backs_a_response_cache() {
        let cache = ResponseCache::new(Arc::new(MemoryCacheStore::new()));
        let entry = CachedResponse::from_parts(
            StatusCode::OK,
            &HeaderMap::new(),
            &Bytes::from_static(b"zones"),
        );
        cache
            .store("GET http://backend/zones", &entry, DEFAULT_CACHE_TTL)
            .await
            .unwrap();
        assert_eq!(cache.lookup("GET http://backend/zones").await, Some(entry));
    }

    edgegate_core::cache_store_contract_tests!(memory_cache_contract, MemoryCacheStore::new());
}
