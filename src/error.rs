//! Error types for the relay core.
//!
//! # Taxonomy
//! - `TransportFault`: the upstream could not be reached or failed
//!   mid-stream. Before the promise settles it becomes a rejection;
//!   afterwards it only terminates the response body stream.
//! - `SnapshotError`: a readiness-poll snapshot could not be read.
//!   Never reaches the caller; the polling backend absorbs it by
//!   disabling the failing stage.
//! - `ProxyError`: the caller-facing error of a proxy call.

use thiserror::Error;

/// Failure of the underlying transport (connect, DNS, mid-stream socket).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportFault {
    message: String,
}

impl TransportFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A readiness-poll snapshot (status/headers or content) was unreadable.
///
/// Absorbed by the polling backend as a capability downgrade; the request
/// still completes through the terminal-state fallback.
#[derive(Debug, Clone, Error)]
#[error("snapshot unavailable: {0}")]
pub struct SnapshotError(pub String);

/// Caller-facing error of a proxy call.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream transport failed before the response headers arrived.
    #[error("transport fault: {0}")]
    Transport(#[from] TransportFault),

    /// The proxy target could not be parsed into URI parts.
    #[error("invalid proxy target: {0}")]
    InvalidTarget(String),

    /// The driver task ended without settling the promise.
    #[error("proxy call ended before settling")]
    Incomplete,
}
