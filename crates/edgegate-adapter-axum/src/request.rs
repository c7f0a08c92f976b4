use std::net::SocketAddr;

use axum::body::Body as AxumBody;
use axum::extract::connect_info::ConnectInfo;
use axum::http::Request;
use edgegate_core::body::Body;
use edgegate_core::context::ClientIp;
use edgegate_core::http::Request as CoreRequest;

/// Convert an Axum/Hyper request into a core request. The body stays streaming and the socket
/// peer address, when axum recorded one, becomes a [`ClientIp`] extension.
pub fn into_core_request(request: Request<AxumBody>) -> CoreRequest {
    let (mut parts, body) = request.into_parts();

    let peer = parts
        .extensions
        .remove::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr);

    let mut core_request = CoreRequest::from_parts(parts, Body::from_stream(body.into_data_stream()));
    if let Some(addr) = peer {
        core_request.extensions_mut().insert(ClientIp(addr.ip()));
    }
    core_request
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgegate_core::http::Method;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn converts_request_and_records_peer_ip() {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/records?zone=1")
            .header("x-test", "1")
            .body(AxumBody::from("payload"))
            .expect("request");
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("10.1.2.3:4000".parse().unwrap()));

        let core_request = into_core_request(request);
        assert_eq!(core_request.method(), &Method::POST);
        assert_eq!(core_request.uri().path(), "/records");
        assert_eq!(core_request.uri().query(), Some("zone=1"));
        assert_eq!(core_request.headers()["x-test"], "1");
        assert!(core_request.body().is_stream());
        assert_eq!(
            core_request.extensions().get::<ClientIp>(),
            Some(&ClientIp(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))))
        );
        assert!(core_request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .is_none());

        let body = core_request.into_body().collect().await.expect("body");
        assert_eq!(body.as_ref(), b"payload");
    }

    #[tokio::test]
    async fn missing_connect_info_leaves_client_ip_unset() {
        let request = Request::builder()
            .uri("/zones")
            .body(AxumBody::empty())
            .expect("request");
        let core_request = into_core_request(request);
        assert!(core_request.extensions().get::<ClientIp>().is_none());
    }
}
