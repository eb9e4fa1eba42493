//! Transport backends: one contract, two delivery models.
//!
//! # Data Flow
//! ```text
//! OutboundRequest (method, headers, body, target)
//!     → socket.rs   (push streaming via the hyper client)
//!     → polling.rs  (readiness-state machine over snapshot polls)
//!     → TransportStream of events:
//!           HeadersReady → Data* → Complete | Error
//! ```
//!
//! # Design Decisions
//! - Backends are selected by environment capability behind one trait;
//!   the orchestrator depends only on the trait
//! - Events travel over a bounded channel; abort over a broadcast, so
//!   the abort handle is cheap to clone and safe to fire at any time
//! - A backend whose event channel closes without a terminal event was
//!   aborted; the orchestrator treats that as early termination

pub mod capabilities;
pub mod polling;
pub mod socket;

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};

use crate::conn::{BodyStream, Connection, UriParts};
use crate::error::TransportFault;

pub use capabilities::Capabilities;
pub use polling::{
    BufferedHttpSource, PollingBackend, ReadinessEvent, ReadinessSource, ReadyState,
};
pub use socket::SocketBackend;

/// Capacity of the event channel between a backend task and its driver.
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// One step of an upstream exchange.
#[derive(Debug)]
pub enum TransportEvent {
    /// Status and full header map; exactly once, before any data.
    HeadersReady {
        status: StatusCode,
        headers: HeaderMap,
    },
    /// Newly produced body bytes.
    Data(Bytes),
    /// Clean end of the response.
    Complete,
    /// Transport-level failure; terminal.
    Error(TransportFault),
}

/// Everything a backend needs to issue the upstream request.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<BodyStream>,
    pub target: UriParts,
    /// Path plus query actually sent upstream.
    pub path: String,
}

impl OutboundRequest {
    /// Assemble the upstream request from the inbound connection.
    ///
    /// Takes the request body out of the connection. When the inbound
    /// pathname is bare `/`, the target's own path (query included) is
    /// used instead.
    pub fn assemble(conn: &mut Connection, target: &UriParts) -> Self {
        let path = if conn.location.pathname == "/" {
            target.path.clone()
        } else {
            conn.location.path.clone()
        };

        Self {
            method: conn.method.clone(),
            headers: conn.request.headers.clone(),
            body: conn.request.body.take(),
            target: target.clone(),
            path,
        }
    }

    /// Absolute URI of the upstream request.
    pub fn uri(&self) -> Result<Uri, TransportFault> {
        let authority = match &self.target.auth {
            Some(auth) => format!("{auth}@{}", self.target.host_with_port()),
            None => self.target.host_with_port(),
        };
        format!("{}://{}{}", self.target.protocol, authority, self.path)
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| TransportFault::new(e.to_string()))
    }
}

/// Event stream of one opened upstream exchange.
pub struct TransportStream {
    events: mpsc::Receiver<TransportEvent>,
    abort_tx: broadcast::Sender<()>,
}

impl TransportStream {
    pub(crate) fn channel() -> (
        mpsc::Sender<TransportEvent>,
        broadcast::Receiver<()>,
        TransportStream,
    ) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (abort_tx, abort_rx) = broadcast::channel(1);
        (
            events_tx,
            abort_rx,
            TransportStream {
                events: events_rx,
                abort_tx,
            },
        )
    }

    /// Next event; `None` once the backend task is gone.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Cloneable handle that tears the exchange down.
    pub fn abort_handle(&self) -> TransportAbort {
        TransportAbort {
            tx: self.abort_tx.clone(),
        }
    }
}

/// Abort signal into a backend task. Idempotent.
#[derive(Clone)]
pub struct TransportAbort {
    tx: broadcast::Sender<()>,
}

impl TransportAbort {
    pub fn abort(&self) {
        // Nothing to do if the backend task already finished.
        let _ = self.tx.send(());
    }
}

/// One concrete transport strategy.
///
/// `open` must uphold the event ordering contract: exactly one
/// `HeadersReady` before any `Data`, and a single terminal
/// `Complete`/`Error` as the last event.
pub trait TransportBackend: Send + Sync {
    fn open(&self, request: OutboundRequest) -> TransportStream;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
