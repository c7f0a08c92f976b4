//! Forwarding to the backend origin, with a GET response cache in front of it.

use crate::background::detach;
use crate::body::Body;
use crate::cache::{cache_key, CachedResponse};
use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::cors::apply_cors;
use crate::error::EdgeError;
use crate::http::header::CACHE_CONTROL;
use crate::http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use crate::proxy::ProxyRequest;
use crate::response::rebuild;

pub const API_KEY_HEADER: &str = "x-worker-api-key";
pub const FORWARDED_BY_HEADER: &str = "x-forwarded-by";
pub const REAL_IP_HEADER: &str = "x-real-ip";
pub const CONNECTING_IP_HEADER: &str = "cf-connecting-ip";

/// Value of `X-Forwarded-By` on every forwarded request.
pub const FORWARDED_BY: &str = "cloudflare-worker";

/// Forward the request in `ctx` to the configured backend.
///
/// GET requests consult the cache first and a hit is returned without contacting the backend.
/// Successful GET responses are written back through a detached background task. Transport
/// failures become [`EdgeError::BadGateway`] naming the configured origin.
pub async fn forward(ctx: RequestContext, config: &GatewayConfig) -> Result<Response, EdgeError> {
    let origin = config
        .backend()
        .ok_or_else(|| EdgeError::internal(anyhow::anyhow!("no backend origin configured")))?;
    let proxy = ctx
        .proxy_handle()
        .ok_or_else(|| EdgeError::internal(anyhow::anyhow!("no proxy client attached")))?;
    let tasks = ctx.background_tasks();
    let client_ip = resolve_client_ip(&ctx);
    let request = ctx.into_request();

    let target = origin.target_for(request.uri())?;
    let cache = if *request.method() == Method::GET {
        config.cache()
    } else {
        None
    };
    let key = cache_key(&target);

    if let Some(cache) = cache {
        if let Some(hit) = cache.lookup(&key).await {
            log::debug!("cache hit for {key}");
            return Ok(hit.into_response());
        }
    }

    let outbound = outbound_request(request, target, config.api_key(), client_ip)?;
    let response = proxy.send(outbound).await.map_err(|err| {
        log::error!("proxy to {} failed: {}", origin, err.message());
        EdgeError::bad_gateway(err.message(), origin.as_str())
    })?;

    let cache = match cache {
        Some(cache) if response.status().is_success() => cache.clone(),
        _ => return Ok(apply_cors(response.into_response())),
    };

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_response()
        .into_body()
        .collect()
        .await
        .map_err(|err| EdgeError::bad_gateway(err.to_string(), origin.as_str()))?;

    let mut cached_headers = headers.clone();
    cached_headers.insert(CACHE_CONTROL, cache_control(config));
    let cached_headers = apply_cors(rebuild(status, cached_headers, Body::empty()))
        .headers()
        .clone();
    let entry = CachedResponse::from_parts(status, &cached_headers, &bytes);
    let ttl = config.cache_ttl();

    detach(tasks.as_ref(), move || async move {
        if let Err(err) = cache.store(&key, &entry, ttl).await {
            log::warn!("cache store failed for {key}: {err}");
        }
    })
    .await;

    Ok(apply_cors(rebuild(status, headers, Body::from(bytes))))
}

/// Client address for `X-Real-IP`: the adapter-supplied peer address, then `cf-connecting-ip`,
/// then empty.
fn resolve_client_ip(ctx: &RequestContext) -> HeaderValue {
    if let Some(value) = ctx
        .client_ip()
        .and_then(|ip| HeaderValue::from_str(&ip.to_string()).ok())
    {
        return value;
    }
    ctx.request()
        .headers()
        .get(CONNECTING_IP_HEADER)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""))
}

fn outbound_request(
    request: Request,
    target: Uri,
    api_key: Option<&str>,
    client_ip: HeaderValue,
) -> Result<ProxyRequest, EdgeError> {
    let mut outbound = ProxyRequest::from_request(request, target);
    if matches!(*outbound.method(), Method::GET | Method::HEAD) {
        *outbound.body_mut() = Body::empty();
    }

    let headers: &mut HeaderMap = outbound.headers_mut();
    if let Some(key) = api_key {
        let value = HeaderValue::from_str(key)
            .map_err(|_| EdgeError::internal(anyhow::anyhow!("API key is not a valid header value")))?;
        headers.insert(API_KEY_HEADER, value);
    }
    headers.insert(FORWARDED_BY_HEADER, HeaderValue::from_static(FORWARDED_BY));
    headers.insert(REAL_IP_HEADER, client_ip);
    Ok(outbound)
}

fn cache_control(config: &GatewayConfig) -> HeaderValue {
    let value = format!("public, max-age={}", config.cache_ttl().as_secs());
    HeaderValue::try_from(value).unwrap_or_else(|_| HeaderValue::from_static("public, max-age=300"))
}
