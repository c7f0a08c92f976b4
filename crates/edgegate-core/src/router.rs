use std::sync::Arc;

use matchit::Router as PathRouter;
use tower_service::Service;

use crate::context::RequestContext;
use crate::error::EdgeError;
use crate::handler::{BoxHandler, IntoHandler};
use crate::http::{HandlerFuture, Request, Response};
use crate::middleware::{BoxMiddleware, Middleware, Next};
use crate::response::IntoResponse;

/// Builds a [`RouterService`] from exact paths, an optional fallback and a middleware stack.
///
/// Routes match on path alone: every method reaches the same handler.
#[derive(Default)]
pub struct RouterBuilder {
    routes: PathRouter<BoxHandler>,
    paths: Vec<String>,
    fallback: Option<BoxHandler>,
    middlewares: Vec<BoxMiddleware>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `path`, for any method.
    ///
    /// # Panics
    ///
    /// Panics when `path` is already registered.
    pub fn route<H>(mut self, path: &str, handler: H) -> Self
    where
        H: IntoHandler,
    {
        self.routes
            .insert(path, handler.into_handler())
            .unwrap_or_else(|err| panic!("duplicate route definition for {}: {}", path, err));
        self.paths.push(path.to_string());
        self
    }

    /// Handler for requests that match no registered path. Without one, such requests fail
    /// with [`EdgeError::NotFound`] after passing through the middleware stack.
    pub fn fallback<H>(mut self, handler: H) -> Self
    where
        H: IntoHandler,
    {
        self.fallback = Some(handler.into_handler());
        self
    }

    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> RouterService {
        RouterService {
            inner: Arc::new(RouterInner {
                routes: self.routes,
                paths: self.paths,
                fallback: self.fallback.unwrap_or_else(|| not_found.into_handler()),
                middlewares: self.middlewares,
            }),
        }
    }
}

async fn not_found(ctx: RequestContext) -> Result<Response, EdgeError> {
    Err(EdgeError::not_found(ctx.request().uri().path()))
}

#[derive(Clone)]
pub struct RouterService {
    inner: Arc<RouterInner>,
}

impl RouterService {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Registered paths, in registration order.
    pub fn paths(&self) -> &[String] {
        &self.inner.paths
    }

    /// Dispatch `request`, rendering any error as a response.
    pub async fn oneshot(&self, request: Request) -> Response {
        let mut service = self.clone();
        match service.call(request).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }
}

struct RouterInner {
    routes: PathRouter<BoxHandler>,
    paths: Vec<String>,
    fallback: BoxHandler,
    middlewares: Vec<BoxMiddleware>,
}

impl RouterInner {
    async fn dispatch(&self, request: Request) -> Result<Response, EdgeError> {
        let handler = match self.routes.at(request.uri().path()) {
            Ok(matched) => Arc::clone(matched.value),
            Err(_) => Arc::clone(&self.fallback),
        };

        let ctx = RequestContext::new(request);
        Next::new(&self.middlewares, handler.as_ref())
            .run(ctx)
            .await
    }
}

impl Service<Request> for RouterService {
    type Response = Response;
    type Error = EdgeError;
    type Future = HandlerFuture;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { inner.dispatch(request).await })
    }
}
