//! Response cache stores for Workers: the per-colo Cache API by default, or Workers KV when
//! the `DNS_CACHE` namespace is bound.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use edgegate_core::cache::{CacheError, CacheStore};
use worker::{Cache, Response as CfResponse, Url};

/// KV namespace binding that replaces the Cache API as the response cache.
pub const CACHE_BINDING: &str = "DNS_CACHE";

/// Synthetic origin under which Cache API entries are keyed.
const CACHE_API_ORIGIN: &str = "https://edgegate.cache/entry";

/// Maximum key size in bytes accepted by Workers KV.
const KV_MAX_KEY_SIZE: usize = 512;

/// Store backed by `caches.default`. Entries are opaque bodies with a `max-age` matching the TTL.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheApiStore;

impl CacheApiStore {
    fn request_url(key: &str) -> Result<String, CacheError> {
        Url::parse_with_params(CACHE_API_ORIGIN, &[("key", key)])
            .map(String::from)
            .map_err(|e| CacheError::Validation(format!("unusable cache key: {e}")))
    }
}

#[async_trait(?Send)]
impl CacheStore for CacheApiStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let url = Self::request_url(key)?;
        let cached = Cache::default()
            .get(url, true)
            .await
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("cache match failed: {e}")))?;
        match cached {
            Some(mut response) => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| CacheError::Internal(anyhow::anyhow!("cache read failed: {e}")))?;
                Ok(Some(Bytes::from(body)))
            }
            None => Ok(None),
        }
    }

    async fn put_bytes_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let url = Self::request_url(key)?;
        let mut response = CfResponse::from_bytes(value.to_vec())
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("cache entry build failed: {e}")))?;
        response
            .headers_mut()
            .set("cache-control", &format!("public, max-age={}", ttl.as_secs()))
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("cache entry build failed: {e}")))?;

        Cache::default()
            .put(url, response)
            .await
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("cache put failed: {e}")))
    }
}

pub struct KvCacheStore {
    store: worker::kv::KvStore,
}

impl KvCacheStore {
    /// Open the KV namespace bound as `binding` in `wrangler.toml`.
    pub fn from_env(env: &worker::Env, binding: &str) -> Result<Self, CacheError> {
        let store = env
            .kv(binding)
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("failed to open kv binding: {e}")))?;
        Ok(Self { store })
    }
}

#[async_trait(?Send)]
impl CacheStore for KvCacheStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        if key.len() > KV_MAX_KEY_SIZE {
            return Ok(None);
        }
        let value = self
            .store
            .get(key)
            .bytes()
            .await
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("kv get failed: {e}")))?;
        Ok(value.map(Bytes::from))
    }

    async fn put_bytes_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if key.len() > KV_MAX_KEY_SIZE {
            log::debug!("skipping kv cache write: key is {} bytes", key.len());
            return Ok(());
        }
        // Workers KV rejects expirations under 60 seconds.
        let ttl_secs = ttl.as_secs().max(60);

        self.store
            .put_bytes(key, value.as_ref())
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("kv put failed: {e}")))?
            .expiration_ttl(ttl_secs)
            .execute()
            .await
            .map_err(|e| CacheError::Internal(anyhow::anyhow!("kv put execute failed: {e}")))
    }
}
