//! Proxy orchestration: one backend exchange per call, wired to an
//! abortable promise.
//!
//! # Responsibilities
//! - Assemble the outbound request and open a backend stream
//! - Resolve the promise when headers arrive; keep streaming afterwards
//! - Route transport faults to the promise or the body, depending on
//!   whether settlement already happened
//! - Tear the backend down on abort
//!
//! # Call States
//! ```text
//! Opening → Streaming → Complete | Errored
//! Aborted reachable from any non-terminal state
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::abort::{AbortablePromise, Settler};
use crate::config::RelayConfig;
use crate::conn::{body, BodySink, Connection, UriParts, DEFAULT_BODY_CAPACITY};
use crate::transport::{
    OutboundRequest, PollingBackend, SocketBackend, TransportBackend, TransportEvent,
    TransportStream,
};

/// Global counter for proxy call IDs; uniqueness is all that matters.
static CALL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of one proxy call, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallId(u64);

impl CallId {
    fn next() -> Self {
        Self(CALL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Lifecycle of one proxy call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Opening,
    Streaming,
    Complete,
    Errored,
    Aborted,
}

/// Forwards connections to a transport backend and streams the response
/// back through the connection's response body.
pub struct ProxyOrchestrator {
    backend: Arc<dyn TransportBackend>,
    body_capacity: usize,
}

impl ProxyOrchestrator {
    pub fn new(backend: Arc<dyn TransportBackend>) -> Self {
        Self {
            backend,
            body_capacity: DEFAULT_BODY_CAPACITY,
        }
    }

    /// Orchestrator over the socket-streaming backend.
    pub fn socket() -> Self {
        Self::new(Arc::new(SocketBackend::new()))
    }

    /// Orchestrator over the polling backend with its buffered source.
    pub fn polling() -> Self {
        Self::new(Arc::new(PollingBackend::buffered_http()))
    }

    /// Backend and channel sizing from configuration.
    pub fn from_config(config: &RelayConfig) -> Self {
        let mut orchestrator = match config.transport.backend {
            crate::config::BackendKind::Socket => Self::socket(),
            crate::config::BackendKind::Polling => Self::polling(),
        };
        orchestrator.body_capacity = config.transport.body_capacity;
        orchestrator
    }

    pub fn with_body_capacity(mut self, capacity: usize) -> Self {
        self.body_capacity = capacity.max(1);
        self
    }

    /// Proxy `conn` to `target`.
    ///
    /// The promise resolves with the connection as soon as upstream
    /// headers arrive; the response body keeps streaming through
    /// `connection.response.body` afterwards. Aborting resolves a pending
    /// promise with no value and releases the transport.
    pub fn proxy(&self, mut conn: Connection, target: &UriParts) -> AbortablePromise<Connection> {
        let call = CallId::next();
        let request = OutboundRequest::assemble(&mut conn, target);
        let (sink, stream) = body::channel(self.body_capacity);
        conn.response.body = Some(stream);

        tracing::debug!(
            call = %call,
            backend = self.backend.name(),
            method = %request.method,
            target = %request.target.href,
            path = %request.path,
            "opening proxy call"
        );

        let backend = self.backend.clone();
        AbortablePromise::new(move |settler| {
            let events = backend.open(request);
            let abort = events.abort_handle();
            settler.on_abort(move || abort.abort());
            tokio::spawn(drive(call, conn, settler, events, sink));
        })
    }
}

/// Pump backend events into the connection until a terminal event.
async fn drive(
    call: CallId,
    conn: Connection,
    settler: Settler<Connection>,
    mut events: TransportStream,
    sink: BodySink,
) {
    let mut pending = Some(conn);
    let mut state = CallState::Opening;
    let mut delivered: usize = 0;

    while let Some(event) = events.next_event().await {
        match event {
            TransportEvent::HeadersReady { status, headers } => match pending.take() {
                Some(mut conn) => {
                    conn.status = status.as_u16();
                    conn.response.headers = headers;
                    settler.resolve(conn);
                    state = CallState::Streaming;
                    tracing::debug!(call = %call, status = status.as_u16(), "headers ready");
                }
                None => tracing::warn!(call = %call, "duplicate headers event ignored"),
            },
            TransportEvent::Data(chunk) => {
                if pending.is_some() {
                    tracing::warn!(call = %call, "data before headers dropped");
                    continue;
                }
                delivered += chunk.len();
                if sink.write(chunk).await.is_err() {
                    // Consumer is gone; release the transport.
                    events.abort_handle().abort();
                    state = CallState::Aborted;
                    break;
                }
            }
            TransportEvent::Complete => {
                state = CallState::Complete;
                tracing::debug!(call = %call, delivered, "proxy call complete");
                break;
            }
            TransportEvent::Error(fault) => {
                state = CallState::Errored;
                if pending.is_some() {
                    tracing::debug!(call = %call, error = %fault, "rejecting before headers");
                    settler.reject(fault.into());
                } else {
                    tracing::debug!(call = %call, error = %fault, "failing body after headers");
                    sink.fail(fault).await;
                }
                break;
            }
        }
    }

    if matches!(state, CallState::Opening | CallState::Streaming) {
        // Event channel closed without a terminal event: aborted.
        tracing::debug!(call = %call, delivered, "proxy call aborted");
    }
    // Dropping the sink closes the body: cleanly after Complete, early
    // after abort; an errored body was already failed in-band.
}
