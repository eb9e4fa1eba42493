//! Polling/state-machine transport backend.
//!
//! # Responsibilities
//! - Drive the readiness states of a poll-only source:
//!   Unsent → HeadersReceived → Loading → Done
//! - Extract status/headers and incremental content from whole-buffer
//!   snapshots, deduplicated through a `ContentPipe`
//! - Degrade gracefully when a snapshot stage fails, without surfacing
//!   the failure to the caller
//!
//! # State Handling
//! ```text
//! HeadersReceived: headers-stage usable → emit HeadersReady
//!                  snapshot failed      → disable stage, drop event
//! Loading:         loading-stage usable → ensure headers, emit fresh Data
//!                  snapshot failed      → disable stage, keep going
//! Done:            ensure headers (fallback), flush remaining bytes,
//!                  emit Complete; a snapshot failure here is a real
//!                  transport fault
//! ```
//!
//! # Design Decisions
//! - Request bodies are fully materialized before send: the poll-only
//!   source cannot stream uploads, and that limitation is preserved
//! - Capability flags live in an injectable `Arc<Capabilities>` so tests
//!   reset them per case while production shares one process-wide set
//! - A request whose incremental stages were all disabled still gets its
//!   headers and full body at Done, just without streaming

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::sync::{broadcast, mpsc};

use crate::error::{SnapshotError, TransportFault};
use crate::pipe::{ContentPipe, RawContent};
use crate::transport::socket::http_client;
use crate::transport::{
    Capabilities, OutboundRequest, TransportBackend, TransportEvent, TransportStream,
    EVENT_CHANNEL_CAPACITY,
};

/// Readiness states of a poll-only source, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Unsent,
    HeadersReceived,
    Loading,
    Done,
}

/// Notification pushed by a readiness source.
#[derive(Debug)]
pub enum ReadinessEvent {
    State(ReadyState),
    Failed(TransportFault),
}

/// Seam between the polling backend and its environment.
///
/// The source owns the actual exchange; the backend only ever sees
/// readiness notifications and whole-buffer snapshots.
pub trait ReadinessSource: Send + Sync + 'static {
    /// Issue the request with a fully materialized body. Readiness
    /// changes are pushed through `notify`.
    fn send(
        &mut self,
        payload: Bytes,
        notify: mpsc::Sender<ReadinessEvent>,
    ) -> Result<(), TransportFault>;

    /// Status and headers as currently known; status 0 until available.
    fn status_and_headers(&self) -> Result<(u16, HeaderMap), SnapshotError>;

    /// The entire content received so far.
    fn content(&self) -> Result<RawContent, SnapshotError>;

    /// Tear the exchange down. Must be safe to call at any point.
    fn abort(&mut self);
}

type Connect = Box<dyn Fn(&OutboundRequest) -> Box<dyn ReadinessSource> + Send + Sync>;

/// Backend for environments that only offer a readiness-state poll.
pub struct PollingBackend {
    connect: Connect,
    caps: Arc<Capabilities>,
}

impl PollingBackend {
    /// Backend over a custom source, with its own capability flags.
    pub fn new(
        connect: impl Fn(&OutboundRequest) -> Box<dyn ReadinessSource> + Send + Sync + 'static,
        caps: Arc<Capabilities>,
    ) -> Self {
        Self {
            connect: Box::new(connect),
            caps,
        }
    }

    /// Backend over `BufferedHttpSource` with the process-wide flags.
    pub fn buffered_http() -> Self {
        Self::new(
            |request| Box::new(BufferedHttpSource::new(request)),
            Capabilities::process_wide(),
        )
    }
}

impl TransportBackend for PollingBackend {
    fn open(&self, request: OutboundRequest) -> TransportStream {
        let (events, abort, stream) = TransportStream::channel();
        let source = (self.connect)(&request);
        tokio::spawn(run(source, request, self.caps.clone(), events, abort));
        stream
    }

    fn name(&self) -> &'static str {
        "polling"
    }
}

async fn run(
    mut source: Box<dyn ReadinessSource>,
    request: OutboundRequest,
    caps: Arc<Capabilities>,
    events: mpsc::Sender<TransportEvent>,
    mut abort: broadcast::Receiver<()>,
) {
    // This transport cannot stream uploads; wait for the whole body.
    let payload = match request.body {
        Some(body) => match body.collect().await {
            Ok(payload) => payload,
            Err(fault) => {
                let _ = events.send(TransportEvent::Error(fault)).await;
                return;
            }
        },
        None => Bytes::new(),
    };

    let (notify_tx, mut notify_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    if let Err(fault) = source.send(payload, notify_tx) {
        let _ = events.send(TransportEvent::Error(fault)).await;
        return;
    }

    let mut machine = PollMachine::new(caps);
    loop {
        let event = tokio::select! {
            event = notify_rx.recv() => match event {
                Some(event) => event,
                // Source gone without a terminal state; treated as abort.
                None => return,
            },
            _ = abort.recv() => {
                source.abort();
                return;
            }
        };

        let step = match event {
            ReadinessEvent::Failed(fault) => {
                let _ = events.send(TransportEvent::Error(fault)).await;
                Step::Terminal
            }
            ReadinessEvent::State(state) => machine.on_state(state, source.as_ref(), &events).await,
        };
        if step == Step::Terminal {
            return;
        }
    }
}

#[derive(PartialEq)]
enum Step {
    Continue,
    Terminal,
}

/// Per-request readiness state machine.
struct PollMachine {
    caps: Arc<Capabilities>,
    pipe: ContentPipe,
    headers_emitted: bool,
}

impl PollMachine {
    fn new(caps: Arc<Capabilities>) -> Self {
        Self {
            caps,
            pipe: ContentPipe::new(),
            headers_emitted: false,
        }
    }

    async fn on_state(
        &mut self,
        state: ReadyState,
        source: &dyn ReadinessSource,
        events: &mpsc::Sender<TransportEvent>,
    ) -> Step {
        match state {
            ReadyState::Unsent => Step::Continue,
            ReadyState::HeadersReceived => {
                if self.caps.headers_stage_usable()
                    && self.try_emit_headers(source, events).await.is_err()
                {
                    self.caps.disable_headers_stage();
                }
                Step::Continue
            }
            ReadyState::Loading => {
                if self.caps.loading_stage_usable() {
                    // A prior headers attempt may have been suppressed.
                    let attempted = async {
                        self.try_emit_headers(source, events).await?;
                        self.pump_content(source, events).await
                    }
                    .await;
                    if attempted.is_err() {
                        self.caps.disable_loading_stage();
                    }
                }
                Step::Continue
            }
            ReadyState::Done => {
                let flushed = async {
                    self.try_emit_headers(source, events).await?;
                    self.pump_content(source, events).await
                }
                .await;

                match flushed {
                    Ok(()) if self.headers_emitted => {
                        let _ = events.send(TransportEvent::Complete).await;
                    }
                    Ok(()) => {
                        let _ = events
                            .send(TransportEvent::Error(TransportFault::new(
                                "response completed without a status",
                            )))
                            .await;
                    }
                    Err(e) => {
                        let _ = events
                            .send(TransportEvent::Error(TransportFault::new(e.to_string())))
                            .await;
                    }
                }
                Step::Terminal
            }
        }
    }

    /// Emit `HeadersReady` once the source knows its status.
    async fn try_emit_headers(
        &mut self,
        source: &dyn ReadinessSource,
        events: &mpsc::Sender<TransportEvent>,
    ) -> Result<(), SnapshotError> {
        if self.headers_emitted {
            return Ok(());
        }

        let (status, headers) = source.status_and_headers()?;
        if status == 0 {
            return Ok(());
        }
        let status =
            StatusCode::from_u16(status).map_err(|e| SnapshotError(e.to_string()))?;

        let _ = events
            .send(TransportEvent::HeadersReady { status, headers })
            .await;
        self.headers_emitted = true;
        Ok(())
    }

    /// Deliver whatever the snapshot holds beyond the current offset.
    async fn pump_content(
        &mut self,
        source: &dyn ReadinessSource,
        events: &mpsc::Sender<TransportEvent>,
    ) -> Result<(), SnapshotError> {
        // Never let data get ahead of the headers event.
        if !self.headers_emitted {
            return Ok(());
        }

        let snapshot = source.content()?;
        if let Some(fresh) = self.pipe.extract(&snapshot) {
            let _ = events.send(TransportEvent::Data(fresh)).await;
        }
        Ok(())
    }
}

/// Internal state of a `BufferedHttpSource` exchange.
#[derive(Debug, Default)]
struct BufferedState {
    status: u16,
    headers: HeaderMap,
    buf: BytesMut,
}

/// Readiness-poll adapter over the hyper client.
///
/// Accumulates the response into a growing buffer and pushes readiness
/// notifications, giving the polling backend a real source to run
/// against outside of test fakes.
pub struct BufferedHttpSource {
    client: Client<HttpConnector, Body>,
    method: axum::http::Method,
    headers: HeaderMap,
    uri: Result<Uri, TransportFault>,
    state: Arc<Mutex<BufferedState>>,
    cancel: broadcast::Sender<()>,
}

impl BufferedHttpSource {
    pub fn new(request: &OutboundRequest) -> Self {
        let (cancel, _) = broadcast::channel(1);
        Self {
            client: http_client(),
            method: request.method.clone(),
            headers: request.headers.clone(),
            uri: request.uri(),
            state: Arc::new(Mutex::new(BufferedState::default())),
            cancel,
        }
    }
}

impl ReadinessSource for BufferedHttpSource {
    fn send(
        &mut self,
        payload: Bytes,
        notify: mpsc::Sender<ReadinessEvent>,
    ) -> Result<(), TransportFault> {
        let uri = self.uri.clone()?;

        let mut builder = Request::builder().method(self.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in &self.headers {
                headers.append(name, value.clone());
            }
        }
        let outbound = builder
            .body(Body::from(payload))
            .map_err(|e| TransportFault::new(e.to_string()))?;

        let client = self.client.clone();
        let state = self.state.clone();
        let cancel = self.cancel.subscribe();
        tokio::spawn(fetch(client, outbound, state, notify, cancel));
        Ok(())
    }

    fn status_and_headers(&self) -> Result<(u16, HeaderMap), SnapshotError> {
        let state = self
            .state
            .lock()
            .map_err(|_| SnapshotError("source state poisoned".into()))?;
        Ok((state.status, state.headers.clone()))
    }

    fn content(&self) -> Result<RawContent, SnapshotError> {
        let state = self
            .state
            .lock()
            .map_err(|_| SnapshotError("source state poisoned".into()))?;
        Ok(RawContent::Binary(Bytes::copy_from_slice(&state.buf)))
    }

    fn abort(&mut self) {
        // Teardown failures are not a problem; the exchange is over.
        let _ = self.cancel.send(());
    }
}

async fn fetch(
    client: Client<HttpConnector, Body>,
    outbound: Request<Body>,
    state: Arc<Mutex<BufferedState>>,
    notify: mpsc::Sender<ReadinessEvent>,
    mut cancel: broadcast::Receiver<()>,
) {
    let response = tokio::select! {
        result = client.request(outbound) => result,
        _ = cancel.recv() => return,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let _ = notify
                .send(ReadinessEvent::Failed(TransportFault::new(e.to_string())))
                .await;
            return;
        }
    };

    let (parts, incoming) = response.into_parts();
    if let Ok(mut state) = state.lock() {
        state.status = parts.status.as_u16();
        state.headers = parts.headers;
    }
    if notify
        .send(ReadinessEvent::State(ReadyState::HeadersReceived))
        .await
        .is_err()
    {
        return;
    }

    let mut frames = Body::new(incoming).into_data_stream();
    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(chunk)) => {
                    if let Ok(mut state) = state.lock() {
                        state.buf.extend_from_slice(&chunk);
                    }
                    if notify
                        .send(ReadinessEvent::State(ReadyState::Loading))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Some(Err(e)) => {
                    let _ = notify
                        .send(ReadinessEvent::Failed(TransportFault::new(e.to_string())))
                        .await;
                    return;
                }
                None => {
                    let _ = notify.send(ReadinessEvent::State(ReadyState::Done)).await;
                    return;
                }
            },
            _ = cancel.recv() => return,
        }
    }
}
