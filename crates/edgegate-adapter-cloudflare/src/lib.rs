//! Cloudflare Workers host for the edge gateway.
//!
//! Bindings read from the Worker environment:
//! - `BACKEND_URL` and `API_KEY`, as vars or secrets;
//! - `DNS_CACHE`, a KV namespace that replaces the Cache API as the response cache;
//! - `DNS_DB`, a D1 database reported by `/worker/info`.

#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub mod cache;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
mod config;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
mod logger;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
mod proxy;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
mod request;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
mod response;

#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use cache::{CacheApiStore, KvCacheStore, CACHE_BINDING};
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use config::{gateway_config, DATABASE_BINDING};
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use logger::init_logger;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use proxy::CloudflareProxyClient;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use request::{dispatch, dispatch_gateway, into_core_request};
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use response::from_core_response;

#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
#[worker::event(fetch)]
pub async fn fetch(
    req: worker::Request,
    env: worker::Env,
    ctx: worker::Context,
) -> worker::Result<worker::Response> {
    init_logger(log::LevelFilter::Info);
    dispatch(req, env, ctx).await
}
