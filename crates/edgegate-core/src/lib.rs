//! Portable core of the edge gateway: request routing, backend forwarding, response caching and
//! CORS normalisation, independent of any host platform.

pub mod background;
pub mod body;
pub mod cache;
pub mod config;
pub mod context;
pub mod cors;
pub mod error;
pub mod forward;
pub mod gateway;
pub mod handler;
pub mod http;
pub mod manifest;
pub mod middleware;
pub mod pages;
pub mod proxy;
pub mod response;
pub mod router;

pub use gateway::Gateway;
