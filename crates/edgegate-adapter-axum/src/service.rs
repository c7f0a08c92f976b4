use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body as AxumBody;
use axum::http::{Request, Response};
use tokio::{runtime::Handle, task};
use tower::Service;

use edgegate_core::background::{BackgroundTasks, TaskFactory};
use edgegate_core::proxy::ProxyHandle;
use edgegate_core::Gateway;

use crate::proxy::AxumProxyClient;
use crate::request::into_core_request;
use crate::response::into_axum_response;

/// Tower service running the gateway behind Axum/Hyper.
///
/// Each request gets the shared proxy handle and a fresh [`BackgroundTasks`] collector. Tasks
/// registered while handling the request are started on a blocking worker after the response
/// has been produced and are never awaited by the request.
#[derive(Clone)]
pub struct EdgeGateAxumService {
    gateway: Gateway,
    proxy: ProxyHandle,
}

impl EdgeGateAxumService {
    pub fn new(gateway: Gateway) -> Self {
        Self::with_proxy(gateway, ProxyHandle::with_client(AxumProxyClient::default()))
    }

    /// Use `proxy` for outbound requests instead of the default `reqwest` client.
    pub fn with_proxy(gateway: Gateway, proxy: ProxyHandle) -> Self {
        Self { gateway, proxy }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }
}

impl Service<Request<AxumBody>> for EdgeGateAxumService {
    type Response = Response<AxumBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<AxumBody>) -> Self::Future {
        let gateway = self.gateway.clone();
        let proxy = self.proxy.clone();
        Box::pin(async move {
            let tasks = BackgroundTasks::new();
            let mut core_request = into_core_request(request);
            core_request.extensions_mut().insert(proxy);
            core_request.extensions_mut().insert(tasks.clone());

            let core_response =
                task::block_in_place(move || Handle::current().block_on(gateway.handle(core_request)));
            let response = into_axum_response(core_response);

            spawn_background(tasks.drain());
            Ok(response)
        })
    }
}

/// Run `pending` on a blocking worker. The handle is dropped, so nothing waits for completion.
fn spawn_background(pending: Vec<TaskFactory>) {
    if pending.is_empty() {
        return;
    }
    let handle = Handle::current();
    task::spawn_blocking(move || {
        handle.block_on(async move {
            for task in pending {
                task().await;
            }
        })
    });
}
