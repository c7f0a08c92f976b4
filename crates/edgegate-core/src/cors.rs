//! Cross-origin header normalisation.

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::EdgeError;
use crate::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use crate::http::{HeaderValue, Response};
use crate::middleware::{Middleware, Next};
use crate::response::IntoResponse;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-API-Key";

/// Overwrite the three CORS headers, leaving status, body and every other header untouched.
pub fn apply_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    response
}

/// Router middleware applying [`apply_cors`] to every outcome, errors included.
pub struct Cors;

#[async_trait(?Send)]
impl Middleware for Cors {
    async fn handle(&self, ctx: RequestContext, next: Next<'_>) -> Result<Response, EdgeError> {
        let response = match next.run(ctx).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        };
        Ok(apply_cors(response))
    }
}
