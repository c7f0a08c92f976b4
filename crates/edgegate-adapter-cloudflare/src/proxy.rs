use async_trait::async_trait;
use edgegate_core::body::Body;
use edgegate_core::error::EdgeError;
use edgegate_core::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use edgegate_core::proxy::{ProxyClient, ProxyRequest, ProxyResponse};
use futures_util::stream::{self, StreamExt};
use worker::{
    wasm_bindgen::JsValue, Body as WorkerBody, Fetch, Headers, Method as CfMethod,
    Request as CfRequest, RequestInit, Response as CfResponse,
};

/// Outbound client built on the Workers `fetch` API.
pub struct CloudflareProxyClient;

#[async_trait(?Send)]
impl ProxyClient for CloudflareProxyClient {
    async fn send(&self, request: ProxyRequest) -> Result<ProxyResponse, EdgeError> {
        let (method, uri, headers, body) = request.into_parts();
        let target = uri.to_string();
        let cf_request = build_cf_request(method, &uri, headers, body)?;
        let mut cf_response = Fetch::Request(cf_request)
            .send()
            .await
            .map_err(|err| EdgeError::bad_gateway(err.to_string(), target))?;

        convert_response(&mut cf_response)
    }
}

fn build_cf_request(
    method: Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<CfRequest, EdgeError> {
    let mut init = RequestInit::new();
    init.with_method(http_method_to_cf(&method));
    init.with_headers(Headers::from(&headers));
    attach_body(&mut init, body)?;

    CfRequest::new_with_init(&uri.to_string(), &init).map_err(EdgeError::internal)
}

fn attach_body(init: &mut RequestInit, body: Body) -> Result<(), EdgeError> {
    let stream = match body {
        Body::Once(bytes) if bytes.is_empty() => return Ok(()),
        Body::Once(bytes) => {
            let chunk = bytes.to_vec();
            stream::once(async move { Ok::<Vec<u8>, JsValue>(chunk) }).boxed_local()
        }
        Body::Stream(stream) => stream
            .map(|res| match res {
                Ok(bytes) => Ok::<Vec<u8>, JsValue>(bytes.to_vec()),
                Err(err) => Err(JsValue::from_str(&err.to_string())),
            })
            .boxed_local(),
    };

    let worker_body = WorkerBody::from_stream(stream).map_err(EdgeError::internal)?;
    if let Some(readable) = worker_body.into_inner() {
        init.with_body(Some(JsValue::from(readable)));
    }
    Ok(())
}

fn convert_response(cf_response: &mut CfResponse) -> Result<ProxyResponse, EdgeError> {
    let status = StatusCode::from_u16(cf_response.status_code()).map_err(EdgeError::internal)?;
    let mut proxy_response = ProxyResponse::new(status, Body::empty());

    for (name, value) in cf_response.headers().entries() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            proxy_response.headers_mut().append(name, value);
        }
    }

    let chunks = cf_response.stream().map_err(EdgeError::internal)?;
    *proxy_response.body_mut() = Body::from_stream(
        chunks.map(|res| res.map(bytes::Bytes::from).map_err(|err| anyhow::anyhow!("{err}"))),
    );
    Ok(proxy_response)
}

fn http_method_to_cf(method: &Method) -> CfMethod {
    CfMethod::from(method.as_str().to_string())
}
