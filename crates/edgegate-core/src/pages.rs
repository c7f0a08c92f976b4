//! Locally answered status endpoints.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::config::{GatewayConfig, WorkerIdentity, BACKEND_URL_VAR};
use crate::http::header::CACHE_CONTROL;
use crate::http::{HeaderValue, Response};
use crate::response::{IntoResponse, Json};

#[derive(Debug, Serialize)]
struct Health<'a> {
    status: &'static str,
    worker: &'a str,
    version: &'a str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct Info<'a> {
    name: &'a str,
    version: &'a str,
    description: &'a str,
    backend_configured: bool,
    features: Features,
}

#[derive(Debug, Serialize)]
struct Features {
    caching: bool,
    database: bool,
}

#[derive(Debug, Serialize)]
struct Setup<'a> {
    message: String,
    setup_required: bool,
    instructions: SetupInstructions,
    documentation: &'a str,
}

#[derive(Debug, Serialize)]
struct SetupInstructions {
    step1: String,
    step2: &'static str,
    step3: &'static str,
    example: String,
}

#[derive(Debug, Serialize)]
struct Welcome<'a> {
    message: String,
    worker: &'a str,
    version: &'a str,
    backend: &'a str,
    endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
struct Endpoints {
    health: &'static str,
    info: &'static str,
}

/// `{status, worker, version, timestamp}`, never cached.
pub fn health(identity: &WorkerIdentity) -> Response {
    let body = Health {
        status: "ok",
        worker: &identity.worker,
        version: &identity.version,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    with_cache_control(Json(body).into_response(), "no-cache")
}

/// Capability report, cacheable for an hour.
pub fn info(config: &GatewayConfig) -> Response {
    let identity = config.identity();
    let body = Info {
        name: &identity.name,
        version: &identity.version,
        description: &identity.description,
        backend_configured: config.backend().is_some(),
        features: Features {
            caching: config.reports_caching(),
            database: config.database().is_some(),
        },
    };
    with_cache_control(Json(body).into_response(), "public, max-age=3600")
}

/// Instructions served for every non-status path while no backend is configured.
pub fn setup(identity: &WorkerIdentity) -> Response {
    let body = Setup {
        message: format!("{} is running", identity.name),
        setup_required: true,
        instructions: SetupInstructions {
            step1: format!("Configure {BACKEND_URL_VAR} environment variable in wrangler.toml"),
            step2: "Point BACKEND_URL to your DNS Manager PHP backend",
            step3: "Redeploy the worker using: wrangler deploy",
            example: format!("{BACKEND_URL_VAR} = \"https://your-dnsmanager.example.com\""),
        },
        documentation: &identity.documentation,
    };
    Json(body).into_response()
}

/// Root page once a backend is configured. The root path is never forwarded.
pub fn welcome(config: &GatewayConfig) -> Response {
    let identity = config.identity();
    let body = Welcome {
        message: format!("{} is running", identity.name),
        worker: &identity.worker,
        version: &identity.version,
        backend: config.backend().map(|origin| origin.as_str()).unwrap_or(""),
        endpoints: Endpoints {
            health: "/health",
            info: "/worker/info",
        },
    };
    Json(body).into_response()
}

fn with_cache_control(mut response: Response, value: &'static str) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(value));
    response
}
