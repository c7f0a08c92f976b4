use std::net::IpAddr;

use crate::background::BackgroundTasks;
use crate::body::Body;
use crate::http::Request;
use crate::proxy::ProxyHandle;

/// Socket peer address of the caller, attached by adapters that know it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Request context exposed to handlers and middleware.
pub struct RequestContext {
    request: Request,
}

impl RequestContext {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn into_request(self) -> Request {
        self.request
    }

    pub fn body(&self) -> &Body {
        self.request.body()
    }

    pub fn proxy_handle(&self) -> Option<ProxyHandle> {
        self.request.extensions().get::<ProxyHandle>().cloned()
    }

    pub fn background_tasks(&self) -> Option<BackgroundTasks> {
        self.request.extensions().get::<BackgroundTasks>().cloned()
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.request
            .extensions()
            .get::<ClientIp>()
            .map(|ClientIp(ip)| *ip)
    }
}
