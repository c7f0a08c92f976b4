use edgegate_core::background::BackgroundTasks;
use edgegate_core::body::Body;
use edgegate_core::cors::apply_cors;
use edgegate_core::error::EdgeError;
use edgegate_core::http::{request_builder, Method as CoreMethod, Request, Uri};
use edgegate_core::proxy::ProxyHandle;
use edgegate_core::response::IntoResponse;
use edgegate_core::Gateway;
use worker::{Context, Env, Error as WorkerError, Method, Request as CfRequest, Response as CfResponse};

use crate::config::gateway_config;
use crate::proxy::CloudflareProxyClient;
use crate::response::from_core_response;

/// Convert a Workers request into a core request. The client address stays in the
/// `cf-connecting-ip` header the platform sets.
pub async fn into_core_request(mut req: CfRequest) -> Result<Request, EdgeError> {
    let method = into_core_method(req.method());
    let url = req
        .url()
        .map_err(|err| EdgeError::bad_request(format!("invalid URL: {}", err)))?;
    let uri: Uri = url
        .as_str()
        .parse()
        .map_err(|err| EdgeError::bad_request(format!("invalid URI: {}", err)))?;

    let mut builder = request_builder().method(method).uri(uri);
    for (name, value) in req.headers().entries() {
        builder = builder.header(name.as_str(), value);
    }

    let bytes = req.bytes().await.map_err(EdgeError::internal)?;
    builder.body(Body::from(bytes)).map_err(EdgeError::internal)
}

/// Handle one Worker invocation with configuration read from `env`.
pub async fn dispatch(req: CfRequest, env: Env, ctx: Context) -> Result<CfResponse, WorkerError> {
    let gateway = Gateway::new(gateway_config(&env));
    dispatch_gateway(&gateway, req, &ctx).await
}

/// Run `gateway` for one request. Background work is handed to `ctx.wait_until` after the
/// response is ready.
pub async fn dispatch_gateway(
    gateway: &Gateway,
    req: CfRequest,
    ctx: &Context,
) -> Result<CfResponse, WorkerError> {
    let tasks = BackgroundTasks::new();
    let response = match into_core_request(req).await {
        Ok(mut core_request) => {
            core_request
                .extensions_mut()
                .insert(ProxyHandle::with_client(CloudflareProxyClient));
            core_request.extensions_mut().insert(tasks.clone());
            gateway.handle(core_request).await
        }
        Err(err) => apply_cors(err.into_response()),
    };

    for task in tasks.drain() {
        ctx.wait_until(task());
    }
    from_core_response(response).map_err(edge_error_to_worker)
}

fn edge_error_to_worker(err: EdgeError) -> WorkerError {
    WorkerError::RustError(err.to_string())
}

fn into_core_method(method: Method) -> CoreMethod {
    CoreMethod::from_bytes(method.as_ref().as_bytes()).unwrap_or(CoreMethod::GET)
}
