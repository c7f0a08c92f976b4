use std::time::Duration;

use async_trait::async_trait;
use edgegate_core::body::Body;
use edgegate_core::error::EdgeError;
use edgegate_core::http::header::{CONNECTION, HOST};
use edgegate_core::proxy::{ProxyClient, ProxyRequest, ProxyResponse};
use futures_util::StreamExt;
use reqwest::Client;

/// Timeout applied to every outbound request.
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

/// `reqwest`-backed client used to reach the backend origin from the native server.
#[derive(Clone)]
pub struct AxumProxyClient {
    client: Client,
}

impl AxumProxyClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(PROXY_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

impl Default for AxumProxyClient {
    fn default() -> Self {
        Self::new().unwrap_or_else(|err| {
            log::warn!("falling back to default reqwest client: {err}");
            Self {
                client: Client::new(),
            }
        })
    }
}

#[async_trait(?Send)]
impl ProxyClient for AxumProxyClient {
    async fn send(&self, request: ProxyRequest) -> Result<ProxyResponse, EdgeError> {
        let (method, uri, mut headers, body) = request.into_parts();
        let target = uri.to_string();

        // reqwest derives these from the target URL and its own connection pool.
        headers.remove(HOST);
        headers.remove(CONNECTION);

        let mut builder = self.client.request(method, target.as_str()).headers(headers);
        builder = match body {
            Body::Once(bytes) if bytes.is_empty() => builder,
            Body::Once(bytes) => builder.body(bytes),
            Body::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(EdgeError::internal)?;
                    buf.extend_from_slice(&chunk);
                }
                builder.body(buf)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|err| EdgeError::bad_gateway(err.to_string(), target.clone()))?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| EdgeError::bad_gateway(err.to_string(), target))?;

        let mut proxy_response = ProxyResponse::new(status, Body::from(bytes));
        *proxy_response.headers_mut() = headers;
        Ok(proxy_response)
    }
}
