use std::sync::Arc;

use edgegate_core::cache::ResponseCache;
use edgegate_core::config::{DatabaseBinding, GatewayConfig};
use worker::Env;

use crate::cache::{CacheApiStore, KvCacheStore, CACHE_BINDING};

/// D1 binding reported by `/worker/info`. The gateway never queries it.
pub const DATABASE_BINDING: &str = "DNS_DB";

/// Read a plain var first, then a secret of the same name.
fn lookup(env: &Env, name: &str) -> Option<String> {
    env.var(name)
        .map(|var| var.to_string())
        .or_else(|_| env.secret(name).map(|secret| secret.to_string()))
        .ok()
}

/// Build the per-request configuration from the Worker bindings.
///
/// GET responses are always cached: in the `DNS_CACHE` KV namespace when it is bound,
/// otherwise in the Cache API. `/worker/info` reports caching only for the KV binding.
pub fn gateway_config(env: &Env) -> GatewayConfig {
    let config = GatewayConfig::from_lookup(|name| lookup(env, name));

    let (cache, kv_bound) = match KvCacheStore::from_env(env, CACHE_BINDING) {
        Ok(store) => (ResponseCache::new(Arc::new(store)), true),
        Err(err) => {
            log::debug!("{CACHE_BINDING} not bound, using the Cache API: {err}");
            (ResponseCache::new(Arc::new(CacheApiStore)), false)
        }
    };
    let mut config = config.with_cache(cache).with_reported_caching(kv_bound);

    if env.d1(DATABASE_BINDING).is_ok() {
        config = config.with_database(DatabaseBinding::new(DATABASE_BINDING));
    }
    config
}
