use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use tokio::runtime::Builder as RuntimeBuilder;
use tokio::signal;
use tower::{service_fn, Service};

use edgegate_core::cache::ResponseCache;
use edgegate_core::config::GatewayConfig;
use edgegate_core::manifest::{Manifest, ManifestLoader};
use edgegate_core::Gateway;

use crate::cache::MemoryCacheStore;
use crate::service::EdgeGateAxumService;

/// Listener settings for [`AxumServer`].
#[derive(Clone, Debug)]
pub struct AxumServerConfig {
    pub addr: SocketAddr,
    pub enable_ctrl_c: bool,
}

impl Default for AxumServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            enable_ctrl_c: true,
        }
    }
}

/// Blocking native server hosting the gateway.
pub struct AxumServer {
    service: EdgeGateAxumService,
    config: AxumServerConfig,
}

impl AxumServer {
    pub fn new(gateway: Gateway) -> Self {
        Self::with_config(gateway, AxumServerConfig::default())
    }

    pub fn with_config(gateway: Gateway, config: AxumServerConfig) -> Self {
        Self::from_service(EdgeGateAxumService::new(gateway), config)
    }

    pub fn from_service(service: EdgeGateAxumService, config: AxumServerConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &AxumServerConfig {
        &self.config
    }

    pub fn run(self) -> anyhow::Result<()> {
        let runtime = RuntimeBuilder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;

        runtime.block_on(async move { self.run_async().await })
    }

    async fn run_async(self) -> anyhow::Result<()> {
        let listener = StdTcpListener::bind(self.config.addr)
            .with_context(|| format!("failed to bind gateway to {}", self.config.addr))?;
        listener
            .set_nonblocking(true)
            .context("failed to set listener to non-blocking")?;
        let listener = tokio::net::TcpListener::from_std(listener)
            .context("failed to adopt std listener into tokio")?;

        log::info!("edgegate listening on http://{}", self.config.addr);
        self.serve(listener).await
    }

    /// Serve on an already bound listener until the server stops.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        let AxumServer { service, config } = self;
        let router = Router::new().fallback_service(service_fn(move |req| {
            let mut svc = service.clone();
            async move { svc.call(req).await }
        }));
        let make_service = router.into_make_service_with_connect_info::<SocketAddr>();

        let server = axum::serve(listener, make_service);
        if config.enable_ctrl_c {
            server
                .with_graceful_shutdown(async {
                    let _ = signal::ctrl_c().await;
                })
                .await
                .context("axum server error")?;
        } else {
            server.await.context("axum server error")?;
        }
        Ok(())
    }
}

/// Build the native gateway configuration: manifest values, then `BACKEND_URL` / `API_KEY` from
/// `lookup`, then an in-memory cache when `[cache] enabled`.
pub fn gateway_config<F>(manifest: &Manifest, lookup: F) -> GatewayConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = manifest.gateway_config();
    config.apply_lookup(lookup);
    if manifest.cache.enabled {
        config = config.with_cache(ResponseCache::new(Arc::new(MemoryCacheStore::new())));
    }
    config
}

/// Load the manifest at `path` (defaults when absent), initialise logging and serve until
/// interrupted.
pub fn run_from_manifest(path: &Path) -> anyhow::Result<()> {
    let loader = ManifestLoader::from_path_or_default(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let manifest = loader.manifest();

    let level: LevelFilter = manifest.log_level().into();
    SimpleLogger::new().with_level(level).init().ok();

    let env = |key: &str| std::env::var(key).ok();
    let addr = manifest.server_addr(env)?;
    let config = gateway_config(manifest, env);
    match config.backend() {
        Some(origin) => log::info!("forwarding to backend {origin}"),
        None => log::warn!("BACKEND_URL is not configured; serving setup instructions"),
    }

    let server_config = AxumServerConfig {
        addr,
        enable_ctrl_c: true,
    };
    AxumServer::with_config(Gateway::new(config), server_config).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn default_config_uses_expected_address() {
        let config = AxumServerConfig::default();
        assert_eq!(config.addr.ip(), IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(config.addr.port(), 8787);
        assert!(config.enable_ctrl_c);
    }

    #[test]
    fn with_config_keeps_custom_address() {
        let config = AxumServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            enable_ctrl_c: false,
        };
        let server = AxumServer::with_config(Gateway::new(GatewayConfig::new()), config);
        assert_eq!(server.config().addr.port(), 9000);
        assert!(!server.config().enable_ctrl_c);
    }

    #[test]
    fn env_overrides_manifest_backend_and_enables_cache() {
        let loader = ManifestLoader::load_from_str(
            "[backend]\norigin = \"https://manifest.example\"\napi_key = \"m\"\n",
        )
        .unwrap();
        let config = gateway_config(loader.manifest(), |key| match key {
            "BACKEND_URL" => Some("https://env.example".to_string()),
            _ => None,
        });
        assert_eq!(config.backend().unwrap().as_str(), "https://env.example");
        assert_eq!(config.api_key(), Some("m"));
        assert!(config.cache().is_some());
    }

    #[test]
    fn disabled_cache_is_not_attached() {
        let loader = ManifestLoader::load_from_str("[cache]\nenabled = false\n").unwrap();
        let config = gateway_config(loader.manifest(), |_| None);
        assert!(config.cache().is_none());
        assert!(config.backend().is_none());
    }
}
