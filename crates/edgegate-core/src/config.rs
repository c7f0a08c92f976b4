//! Per-invocation gateway configuration.
//!
//! A [`GatewayConfig`] is assembled by the adapter (once at startup on native hosts, once per
//! request on Workers) and captured by the router. Nothing here is global or mutable after
//! construction.

use std::fmt;
use std::time::Duration;

use crate::cache::{ResponseCache, DEFAULT_CACHE_TTL};
use crate::error::EdgeError;
use crate::http::Uri;

/// Environment variable holding the backend origin URL.
pub const BACKEND_URL_VAR: &str = "BACKEND_URL";
/// Environment variable holding the worker-to-backend API key.
pub const API_KEY_VAR: &str = "API_KEY";

/// Identity reported by the health, info and setup endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerIdentity {
    /// Short machine name (`worker` field of the health report).
    pub worker: String,
    /// Display name (`name` field of the info report).
    pub name: String,
    pub version: String,
    pub description: String,
    /// Link included in the setup instructions.
    pub documentation: String,
}

impl Default for WorkerIdentity {
    fn default() -> Self {
        Self {
            worker: "dnsmanager-worker".to_string(),
            name: "DNS Manager Worker".to_string(),
            version: "1.0.0".to_string(),
            description: "Cloudflare Workers proxy for DNS Manager".to_string(),
            documentation: "https://github.com/longzheng268/dnsmanager#cloudflare-workers-deployment"
                .to_string(),
        }
    }
}

/// Configured upstream origin. Only scheme and authority are used when forwarding.
///
/// The raw value is kept as configured and validated lazily, so a malformed origin surfaces as a
/// per-request 502 instead of preventing the gateway from starting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendOrigin {
    raw: String,
}

impl BackendOrigin {
    /// `None` when `raw` is empty or whitespace.
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self {
                raw: trimmed.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve the backend URL for an inbound request: the origin's scheme and authority followed
    /// by the request's path and query, verbatim.
    pub fn target_for(&self, request_uri: &Uri) -> Result<Uri, EdgeError> {
        let origin: Uri = self
            .raw
            .parse()
            .map_err(|err| self.invalid(format!("invalid backend origin: {err}")))?;

        let scheme = origin
            .scheme()
            .filter(|scheme| matches!(scheme.as_str(), "http" | "https"))
            .ok_or_else(|| self.invalid("backend origin must be an absolute http(s) URL"))?;
        let authority = origin
            .authority()
            .ok_or_else(|| self.invalid("backend origin has no host"))?;
        let path_and_query = request_uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Uri::builder()
            .scheme(scheme.clone())
            .authority(authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|err| self.invalid(format!("invalid backend target: {err}")))
    }

    fn invalid(&self, message: impl Into<String>) -> EdgeError {
        EdgeError::bad_gateway(message, self.raw.clone())
    }
}

impl fmt::Display for BackendOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Database binding. Reported as a capability only; the gateway never queries it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseBinding {
    pub name: String,
}

impl DatabaseBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    identity: WorkerIdentity,
    backend: Option<BackendOrigin>,
    api_key: Option<String>,
    cache: Option<ResponseCache>,
    cache_ttl: Duration,
    reported_caching: Option<bool>,
    database: Option<DatabaseBinding>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            identity: WorkerIdentity::default(),
            backend: None,
            api_key: None,
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            reported_caching: None,
            database: None,
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `BACKEND_URL` and `API_KEY` through `lookup`. Missing or blank values stay unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_lookup(lookup);
        config
    }

    /// Override the backend and API key with any non-blank values `lookup` yields.
    pub fn apply_lookup<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origin) = lookup(BACKEND_URL_VAR).and_then(BackendOrigin::parse) {
            self.backend = Some(origin);
        }
        if let Some(key) = lookup(API_KEY_VAR).and_then(non_blank) {
            self.api_key = Some(key);
        }
    }

    pub fn with_identity(mut self, identity: WorkerIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Set the backend origin. A blank value clears it.
    pub fn with_backend(mut self, origin: impl Into<String>) -> Self {
        self.backend = BackendOrigin::parse(origin);
        self
    }

    /// Set the API key. A blank value clears it.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = non_blank(key.into());
        self
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Override the `features.caching` flag of `/worker/info`, which otherwise follows
    /// whether a cache is attached.
    pub fn with_reported_caching(mut self, enabled: bool) -> Self {
        self.reported_caching = Some(enabled);
        self
    }

    pub fn with_database(mut self, database: DatabaseBinding) -> Self {
        self.database = Some(database);
        self
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn backend(&self) -> Option<&BackendOrigin> {
        self.backend.as_ref()
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn reports_caching(&self) -> bool {
        self.reported_caching.unwrap_or(self.cache.is_some())
    }

    pub fn database(&self) -> Option<&DatabaseBinding> {
        self.database.as_ref()
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
