use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::cors::Cors;
use crate::error::EdgeError;
use crate::forward::forward;
use crate::http::{Request, Response};
use crate::middleware::RequestLogger;
use crate::pages;
use crate::router::{RouterBuilder, RouterService};

pub const HEALTH_PATHS: [&str; 2] = ["/health", "/worker/health"];
pub const INFO_PATH: &str = "/worker/info";
pub const ROOT_PATH: &str = "/";

/// The edge proxy: status endpoints answered locally, everything else forwarded once a backend
/// origin is configured.
#[derive(Clone)]
pub struct Gateway {
    router: RouterService,
    config: Arc<GatewayConfig>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let config = Arc::new(config);
        Self {
            router: routes(Arc::clone(&config)),
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> &RouterService {
        &self.router
    }

    /// Handle one request. Never fails: errors are rendered as CORS-normalised JSON responses.
    pub async fn handle(&self, request: Request) -> Response {
        self.router.oneshot(request).await
    }
}

fn routes(config: Arc<GatewayConfig>) -> RouterService {
    let mut builder = RouterBuilder::new().middleware(Cors).middleware(RequestLogger);

    for path in HEALTH_PATHS {
        builder = builder.route(path, local(&config, |config| pages::health(config.identity())));
    }
    builder = builder.route(INFO_PATH, local(&config, pages::info));

    if config.backend().is_none() {
        return builder
            .fallback(local(&config, |config| pages::setup(config.identity())))
            .build();
    }

    let forward_config = Arc::clone(&config);
    builder
        .route(ROOT_PATH, local(&config, pages::welcome))
        .fallback(move |ctx: RequestContext| {
            let config = Arc::clone(&forward_config);
            async move { forward(ctx, &config).await }
        })
        .build()
}

/// Handler answering from configuration alone, without looking at the request.
fn local<F>(
    config: &Arc<GatewayConfig>,
    render: F,
) -> impl Fn(RequestContext) -> futures::future::Ready<Result<Response, EdgeError>>
       + Send
       + Sync
       + 'static
where
    F: Fn(&GatewayConfig) -> Response + Send + Sync + 'static,
{
    let config = Arc::clone(config);
    move |_ctx| futures::future::ready(Ok(render(config.as_ref())))
}
