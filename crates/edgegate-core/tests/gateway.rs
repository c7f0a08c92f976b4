use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use edgegate_core::background::BackgroundTasks;
use edgegate_core::body::Body;
use edgegate_core::cache::{CacheError, CacheStore, ResponseCache};
use edgegate_core::config::GatewayConfig;
use edgegate_core::error::{EdgeError, BACKEND_FAILURE};
use edgegate_core::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL};
use edgegate_core::http::{request_builder, Method, Response, StatusCode};
use edgegate_core::proxy::{ProxyClient, ProxyHandle, ProxyRequest, ProxyResponse};
use edgegate_core::Gateway;
use futures::executor::block_on;
use serde_json::Value;

const ORIGIN: &str = "https://backend.example";

/// Backend double that counts calls and answers with a fixed status.
#[derive(Clone)]
struct MockBackend {
    calls: Arc<AtomicUsize>,
    targets: Arc<Mutex<Vec<String>>>,
    status: StatusCode,
    refuse: bool,
}

impl MockBackend {
    fn new(status: StatusCode) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            targets: Arc::new(Mutex::new(Vec::new())),
            status,
            refuse: false,
        }
    }

    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(StatusCode::OK)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait(?Send)]
impl ProxyClient for MockBackend {
    async fn send(&self, request: ProxyRequest) -> Result<ProxyResponse, EdgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets
            .lock()
            .unwrap()
            .push(request.uri().to_string());
        if self.refuse {
            return Err(EdgeError::bad_gateway(
                "error sending request: connection refused",
                request.uri().to_string(),
            ));
        }
        let body = format!("{{\"served\":{}}}", self.calls());
        Ok(ProxyResponse::new(self.status, Body::from(body)))
    }
}

#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, Bytes>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

#[async_trait(?Send)]
impl CacheStore for MemoryStore {
    async fn get_bytes(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put_bytes_with_ttl(
        &self,
        key: &str,
        value: Bytes,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

struct FailingStore;

#[async_trait(?Send)]
impl CacheStore for FailingStore {
    async fn get_bytes(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn put_bytes_with_ttl(
        &self,
        _key: &str,
        _value: Bytes,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }
}

struct Harness {
    gateway: Gateway,
    backend: MockBackend,
    tasks: BackgroundTasks,
}

impl Harness {
    fn new(config: GatewayConfig, backend: MockBackend) -> Self {
        Self {
            gateway: Gateway::new(config),
            backend,
            tasks: BackgroundTasks::new(),
        }
    }

    fn send(&self, method: Method, uri: &str, body: &'static str) -> Response {
        let mut request = request_builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .expect("request");
        request
            .extensions_mut()
            .insert(ProxyHandle::with_client(self.backend.clone()));
        request.extensions_mut().insert(self.tasks.clone());
        block_on(self.gateway.handle(request))
    }

    fn get(&self, uri: &str) -> Response {
        self.send(Method::GET, uri, "")
    }

    fn drain(&self) {
        block_on(self.tasks.run_all());
    }
}

fn json(response: &Response) -> Value {
    serde_json::from_slice(response.body().as_bytes()).expect("json body")
}

fn cached_config(store: Arc<dyn CacheStore>) -> GatewayConfig {
    GatewayConfig::new()
        .with_backend(ORIGIN)
        .with_cache(ResponseCache::new(store))
}

#[test]
fn health_endpoints_are_uncached_ok() {
    for config in [GatewayConfig::new(), GatewayConfig::new().with_backend(ORIGIN)] {
        let harness = Harness::new(config, MockBackend::new(StatusCode::OK));
        for path in ["/health", "/worker/health"] {
            for method in [Method::GET, Method::POST] {
                let response = harness.send(method, path, "");
                assert_eq!(response.status(), StatusCode::OK);
                assert_eq!(response.headers().get(CACHE_CONTROL).unwrap(), "no-cache");
                assert_eq!(json(&response)["status"], "ok");
            }
        }
        assert_eq!(harness.backend.calls(), 0);
    }
}

#[test]
fn info_reports_capabilities() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::default());
    let harness = Harness::new(cached_config(store), MockBackend::new(StatusCode::OK));
    let response = harness.get("/worker/info");
    assert_eq!(
        response.headers().get(CACHE_CONTROL).unwrap(),
        "public, max-age=3600"
    );
    let payload = json(&response);
    assert_eq!(payload["backend_configured"], true);
    assert_eq!(payload["features"]["caching"], true);
    assert_eq!(payload["features"]["database"], false);
}

#[test]
fn unconfigured_backend_never_touches_network() {
    let harness = Harness::new(GatewayConfig::new(), MockBackend::new(StatusCode::OK));
    for (method, path) in [
        (Method::GET, "/"),
        (Method::GET, "/zones?domain=a.com"),
        (Method::POST, "/api/records"),
        (Method::DELETE, "/worker"),
    ] {
        let response = harness.send(method, path, "body");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(&response)["setup_required"], true);
    }
    assert_eq!(harness.backend.calls(), 0);
}

#[test]
fn configured_root_is_local_welcome() {
    let harness = Harness::new(
        GatewayConfig::new().with_backend(ORIGIN),
        MockBackend::new(StatusCode::OK),
    );
    let response = harness.get("/");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(&response)["backend"], ORIGIN);
    assert_eq!(harness.backend.calls(), 0);
}

#[test]
fn target_preserves_path_and_query() {
    let harness = Harness::new(
        GatewayConfig::new().with_backend(ORIGIN),
        MockBackend::new(StatusCode::OK),
    );
    harness.get("/zones?domain=a.com");
    assert_eq!(
        *harness.backend.targets.lock().unwrap(),
        vec!["https://backend.example/zones?domain=a.com".to_string()]
    );
}

#[test]
fn repeated_get_is_served_from_cache() {
    let store = Arc::new(MemoryStore::default());
    let harness = Harness::new(cached_config(store.clone()), MockBackend::new(StatusCode::OK));

    let first = harness.get("/zones?domain=a.com");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    harness.drain();
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);

    let second = harness.get("/zones?domain=a.com");
    assert_eq!(harness.backend.calls(), 1);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.body().as_bytes(), first.body().as_bytes());
    assert_eq!(
        second.headers().get(CACHE_CONTROL).unwrap(),
        "public, max-age=300"
    );

    harness.get("/zones?domain=b.com");
    assert_eq!(harness.backend.calls(), 2);
}

#[test]
fn long_query_strings_are_still_cached() {
    let store = Arc::new(MemoryStore::default());
    let harness = Harness::new(cached_config(store.clone()), MockBackend::new(StatusCode::OK));
    let uri = format!("/zones?records={}", "a".repeat(1024));

    harness.get(&uri);
    harness.drain();
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);

    let second = harness.get(&uri);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(harness.backend.calls(), 1);
}

#[test]
fn non_get_methods_bypass_cache() {
    let store = Arc::new(MemoryStore::default());
    let harness = Harness::new(cached_config(store.clone()), MockBackend::new(StatusCode::OK));

    for method in [Method::POST, Method::PUT, Method::DELETE, Method::HEAD] {
        harness.send(method.clone(), "/zones", "payload");
        harness.send(method, "/zones", "payload");
    }
    harness.drain();
    assert_eq!(harness.backend.calls(), 8);
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn unsuccessful_gets_are_not_cached() {
    let store = Arc::new(MemoryStore::default());
    let harness = Harness::new(
        cached_config(store.clone()),
        MockBackend::new(StatusCode::NOT_FOUND),
    );
    let response = harness.get("/zones/missing");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    harness.drain();
    harness.get("/zones/missing");
    assert_eq!(harness.backend.calls(), 2);
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[test]
fn failing_cache_store_is_invisible_to_clients() {
    let harness = Harness::new(
        cached_config(Arc::new(FailingStore)),
        MockBackend::new(StatusCode::OK),
    );
    let first = harness.get("/zones");
    harness.drain();
    let second = harness.get("/zones");
    harness.drain();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(harness.backend.calls(), 2);
}

#[test]
fn connection_failure_is_bad_gateway_naming_origin() {
    let harness = Harness::new(
        GatewayConfig::new().with_backend(ORIGIN),
        MockBackend::refusing(),
    );
    let response = harness.get("/zones");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );

    let payload = json(&response);
    assert_eq!(payload["error"], BACKEND_FAILURE);
    assert!(payload["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
    assert_eq!(payload["backend"], ORIGIN);
}

#[test]
fn malformed_origin_is_bad_gateway_without_network() {
    let harness = Harness::new(
        GatewayConfig::new().with_backend("not a url"),
        MockBackend::new(StatusCode::OK),
    );
    let response = harness.get("/zones");
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json(&response)["backend"], "not a url");
    assert_eq!(harness.backend.calls(), 0);
}

#[test]
fn every_response_carries_cors() {
    let store = Arc::new(MemoryStore::default());
    let configured = Harness::new(cached_config(store), MockBackend::new(StatusCode::OK));
    let refused = Harness::new(
        GatewayConfig::new().with_backend(ORIGIN),
        MockBackend::refusing(),
    );
    let unconfigured = Harness::new(GatewayConfig::new(), MockBackend::new(StatusCode::OK));

    let mut responses = vec![
        configured.get("/health"),
        configured.get("/worker/info"),
        configured.get("/"),
        configured.get("/zones"),
        configured.send(Method::POST, "/zones", "x"),
        refused.get("/zones"),
        unconfigured.get("/anything"),
    ];
    configured.drain();
    responses.push(configured.get("/zones"));
    assert_eq!(configured.backend.calls(), 2);

    for response in responses {
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
