//! Configuration schema definitions.
//!
//! All types derive Serde traits and default to a working configuration,
//! so a minimal TOML file only needs the upstream URL.

use serde::{Deserialize, Serialize};

use crate::conn::DEFAULT_BODY_CAPACITY;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Where proxied requests are sent.
    pub upstream: UpstreamConfig,

    /// Transport backend selection and channel sizing.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Proxy target.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Absolute http(s) URL of the upstream, query string included.
    pub url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/".to_string(),
        }
    }
}

/// Which transport strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Push-streaming over direct sockets.
    #[default]
    Socket,
    /// Readiness-poll state machine with a buffering source.
    Polling,
}

/// Transport backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub backend: BackendKind,

    /// Chunk capacity of response body channels.
    pub body_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Socket,
            body_capacity: DEFAULT_BODY_CAPACITY,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for development.
    #[default]
    Pretty,
    /// Structured JSON, for production.
    Json,
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter, overridable via `RUST_LOG`.
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
