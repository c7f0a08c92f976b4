//! Edge response cache.
//!
//! ```text
//!  forwarder ──► ResponseCache (lookup / store, CachedResponse <-> JSON)
//!                      │
//!                Arc<dyn CacheStore>  (object-safe, Bytes + TTL)
//!                      │
//!           ┌──────────┴──────────┐
//!           ▼                     ▼
//!   MemoryCacheStore       CloudflareKvCacheStore
//!   (axum adapter)         (cloudflare adapter)
//! ```
//!
//! Stores are shared, eventually consistent services. Reads and writes are last-writer-wins and
//! the gateway never performs read-modify-write sequences against them, so a duplicate store from
//! two concurrent misses is harmless. Entries are never invalidated explicitly; they age out when
//! their TTL elapses.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::body::Body;
use crate::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode, Uri};
use crate::response::rebuild;

/// Freshness window applied to every stored response.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Errors returned by cache store operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key, value or TTL was rejected before reaching the store.
    #[error("validation error: {0}")]
    Validation(String),

    /// The stored entry could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store is temporarily unavailable.
    #[error("cache store unavailable")]
    Unavailable,

    #[error("cache store error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Object-safe interface implemented by each host's shared key/value service.
///
/// Methods take `&self`; implementations handle their own synchronisation.
#[async_trait(?Send)]
pub trait CacheStore: Send + Sync {
    /// Raw bytes for `key`, or `Ok(None)` when absent or expired.
    async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store `value` under `key`, replacing any previous value. The entry must stop being
    /// returned once `ttl` has elapsed (exact eviction timing is up to the backend).
    async fn put_bytes_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

/// Serialisable snapshot of a backend response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    /// Capture a response. Header values that are not visible ASCII are left out of the copy.
    pub fn from_parts(status: StatusCode, headers: &HeaderMap, body: &Bytes) -> Self {
        let headers = headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        Self {
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        }
    }

    pub fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.append(name, value);
            }
        }
        rebuild(status, headers, Body::from(self.body))
    }
}

/// Cache key for a backend URL. The method is always `GET`: only reads are cached.
pub fn cache_key(target: &Uri) -> String {
    format!("GET {target}")
}

/// Cloneable handle to a [`CacheStore`] that speaks [`CachedResponse`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache").finish_non_exhaustive()
    }
}

impl ResponseCache {
    /// Minimum TTL accepted by Workers KV.
    pub const MIN_TTL: Duration = Duration::from_secs(60);

    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn with_store<S>(store: S) -> Self
    where
        S: CacheStore + 'static,
    {
        Self::new(Arc::new(store))
    }

    fn validate_key(key: &str) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::Validation("key cannot be empty".to_string()));
        }
        if key.chars().any(|c| c.is_control()) {
            return Err(CacheError::Validation(
                "key contains control characters".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_ttl(ttl: Duration) -> Result<(), CacheError> {
        if ttl < Self::MIN_TTL {
            return Err(CacheError::Validation(format!(
                "TTL {:?} is below the minimum of {:?}",
                ttl,
                Self::MIN_TTL
            )));
        }
        Ok(())
    }

    /// Fetch and decode an entry, reporting store and decoding failures.
    pub async fn try_lookup(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        Self::validate_key(key)?;
        match self.store.get_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch an entry. Any failure is logged and reported as a miss.
    pub async fn lookup(&self, key: &str) -> Option<CachedResponse> {
        match self.try_lookup(key).await {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("cache lookup failed for {key}: {err}");
                None
            }
        }
    }

    pub async fn store(
        &self,
        key: &str,
        entry: &CachedResponse,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        Self::validate_key(key)?;
        Self::validate_ttl(ttl)?;
        let bytes = serde_json::to_vec(entry)?;
        self.store
            .put_bytes_with_ttl(key, Bytes::from(bytes), ttl)
            .await
    }
}

/// Generate the behavioural contract every [`CacheStore`] implementation must satisfy.
///
/// ```rust,ignore
/// edgegate_core::cache_store_contract_tests!(memory_contract, MemoryCacheStore::new());
/// ```
#[macro_export]
macro_rules! cache_store_contract_tests {
    ($mod_name:ident, $factory:expr) => {
        mod $mod_name {
            use super::*;
            use bytes::Bytes;
            use std::time::Duration;
            use $crate::cache::CacheStore;

            fn run<F: std::future::Future>(f: F) -> F::Output {
                futures::executor::block_on(f)
            }

            #[test]
            fn contract_put_and_get() {
                let store = $factory;
                run(async {
                    store
                        .put_bytes_with_ttl("GET https://a/x", Bytes::from("v"), Duration::from_secs(300))
                        .await
                        .unwrap();
                    assert_eq!(
                        store.get_bytes("GET https://a/x").await.unwrap(),
                        Some(Bytes::from("v"))
                    );
                });
            }

            #[test]
            fn contract_get_missing_returns_none() {
                let store = $factory;
                run(async {
                    assert_eq!(store.get_bytes("GET https://a/missing").await.unwrap(), None);
                });
            }

            #[test]
            fn contract_put_overwrites() {
                let store = $factory;
                run(async {
                    let ttl = Duration::from_secs(300);
                    store.put_bytes_with_ttl("k", Bytes::from("first"), ttl).await.unwrap();
                    store.put_bytes_with_ttl("k", Bytes::from("second"), ttl).await.unwrap();
                    assert_eq!(store.get_bytes("k").await.unwrap(), Some(Bytes::from("second")));
                });
            }

            #[test]
            fn contract_keys_are_independent() {
                let store = $factory;
                run(async {
                    let ttl = Duration::from_secs(300);
                    store.put_bytes_with_ttl("GET https://a/1", Bytes::from("one"), ttl).await.unwrap();
                    store.put_bytes_with_ttl("GET https://a/2", Bytes::from("two"), ttl).await.unwrap();
                    assert_eq!(
                        store.get_bytes("GET https://a/1").await.unwrap(),
                        Some(Bytes::from("one"))
                    );
                    assert_eq!(
                        store.get_bytes("GET https://a/2").await.unwrap(),
                        Some(Bytes::from("two"))
                    );
                });
            }
        }
    };
}
