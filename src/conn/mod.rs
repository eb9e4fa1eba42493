//! Connection model shared between the orchestrator and its callers.
//!
//! # Data Flow
//! ```text
//! caller builds Connection (method, location, request half)
//!     → orchestrator opens a transport toward the target
//!     → headers arrive: status + response headers filled in,
//!       promise resolves with the Connection
//!     → response body keeps streaming through connection.response.body
//! ```
//!
//! # Design Decisions
//! - The caller owns the Connection; the core fills it in and hands the
//!   same value back at settlement
//! - Header maps are `http::HeaderMap`: case-insensitive names,
//!   insertion-ordered iteration
//! - `status` stays 0 until response headers arrive

pub mod body;
pub mod uri;

use axum::http::{HeaderMap, Method};

pub use body::{BodySink, BodyStream, DEFAULT_BODY_CAPACITY};
pub use uri::UriParts;

/// Inbound request half of a connection.
#[derive(Debug, Default)]
pub struct RequestHalf {
    pub headers: HeaderMap,
    pub body: Option<BodyStream>,
}

/// Response half, populated by the orchestrator.
#[derive(Debug, Default)]
pub struct ResponseHalf {
    pub headers: HeaderMap,
    pub body: Option<BodyStream>,
}

/// One inbound request/response exchange being proxied.
#[derive(Debug)]
pub struct Connection {
    pub method: Method,
    pub location: UriParts,
    pub request: RequestHalf,
    pub response: ResponseHalf,
    /// Upstream status code; 0 until headers arrive.
    pub status: u16,
}

impl Connection {
    pub fn new(method: Method, location: UriParts) -> Self {
        Self {
            method,
            location,
            request: RequestHalf::default(),
            response: ResponseHalf::default(),
            status: 0,
        }
    }

    /// True when the inbound request arrived over TLS.
    pub fn is_ssl(&self) -> bool {
        self.location.is_https()
    }

    /// True when the request was made via `XMLHttpRequest`.
    pub fn is_xhr(&self) -> bool {
        self.request
            .headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "XMLHttpRequest")
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(url: &str) -> Connection {
        Connection::new(Method::GET, UriParts::parse(url).unwrap())
    }

    #[test]
    fn new_connection_has_unset_status() {
        let conn = connection("http://up.example/a?x=1");
        assert_eq!(conn.status, 0);
        assert!(conn.response.headers.is_empty());
        assert!(conn.response.body.is_none());
    }

    #[test]
    fn ssl_follows_location_scheme() {
        assert!(!connection("http://up.example/").is_ssl());
        assert!(connection("https://up.example/").is_ssl());
    }

    #[test]
    fn xhr_detection_reads_requested_with_header() {
        let mut conn = connection("http://up.example/");
        assert!(!conn.is_xhr());

        conn.request
            .headers
            .insert("X-Requested-With", "XMLHttpRequest".parse().unwrap());
        assert!(conn.is_xhr());
    }
}
