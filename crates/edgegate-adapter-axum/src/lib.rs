//! Native host for the edge gateway: an Axum server with a `reqwest` backend client and an
//! in-memory response cache.

#[cfg(feature = "axum")]
mod cache;
#[cfg(feature = "axum")]
mod proxy;
#[cfg(feature = "axum")]
mod request;
#[cfg(feature = "axum")]
mod response;
#[cfg(feature = "axum")]
mod server;
#[cfg(feature = "axum")]
mod service;

#[cfg(feature = "axum")]
pub use cache::MemoryCacheStore;
#[cfg(feature = "axum")]
pub use proxy::{AxumProxyClient, PROXY_TIMEOUT};
#[cfg(feature = "axum")]
pub use request::into_core_request;
#[cfg(feature = "axum")]
pub use response::into_axum_response;
#[cfg(feature = "axum")]
pub use server::{gateway_config, run_from_manifest, AxumServer, AxumServerConfig};
#[cfg(feature = "axum")]
pub use service::EdgeGateAxumService;
