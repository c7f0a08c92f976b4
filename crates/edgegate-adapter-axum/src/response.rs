use axum::body::Body as AxumBody;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Response, StatusCode};
use futures::executor::block_on;

use edgegate_core::body::Body;
use edgegate_core::http::Response as CoreResponse;

/// Convert a core response into one consumable by Axum/Hyper.
///
/// Streaming bodies are collected first: the core stream type is not `Send`, and the native
/// proxy client buffers backend responses anyway.
pub fn into_axum_response(response: CoreResponse) -> Response<AxumBody> {
    let (parts, body) = response.into_parts();
    let body = match body {
        Body::Once(bytes) => AxumBody::from(bytes),
        stream @ Body::Stream(_) => match block_on(stream.collect()) {
            Ok(bytes) => AxumBody::from(bytes),
            Err(err) => {
                tracing::error!("streaming response error: {err}");
                let mut response = Response::new(AxumBody::from("streaming response error"));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("text/plain; charset=utf-8"),
                );
                return response;
            }
        },
    };

    Response::from_parts(parts, body)
}
