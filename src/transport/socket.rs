//! Socket-streaming transport backend.
//!
//! # Responsibilities
//! - Issue the upstream request over the shared hyper client
//! - Forward the inbound request body as it becomes available
//! - Emit response headers, then each body frame as it arrives
//!
//! # Design Decisions
//! - Request bodies stream straight through; nothing is buffered beyond
//!   what the transport itself requires
//! - Abort races the in-flight request and the frame loop; whichever
//!   side loses is simply dropped, which releases the upstream socket

use axum::body::Body;
use axum::http::Request;
use futures_util::StreamExt;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::sync::{broadcast, mpsc};

use crate::error::TransportFault;
use crate::transport::{OutboundRequest, TransportBackend, TransportEvent, TransportStream};

/// Shared hyper client for upstream requests.
pub(crate) fn http_client() -> Client<HttpConnector, Body> {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Push-streaming backend for environments with direct socket access.
pub struct SocketBackend {
    client: Client<HttpConnector, Body>,
}

impl SocketBackend {
    pub fn new() -> Self {
        Self {
            client: http_client(),
        }
    }
}

impl Default for SocketBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportBackend for SocketBackend {
    fn open(&self, request: OutboundRequest) -> TransportStream {
        let (events, abort, stream) = TransportStream::channel();
        let client = self.client.clone();
        tokio::spawn(run(client, request, events, abort));
        stream
    }

    fn name(&self) -> &'static str {
        "socket"
    }
}

async fn run(
    client: Client<HttpConnector, Body>,
    request: OutboundRequest,
    events: mpsc::Sender<TransportEvent>,
    mut abort: broadcast::Receiver<()>,
) {
    let uri = match request.uri() {
        Ok(uri) => uri,
        Err(fault) => {
            let _ = events.send(TransportEvent::Error(fault)).await;
            return;
        }
    };

    let mut builder = Request::builder().method(request.method.clone()).uri(uri);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &request.headers {
            headers.append(name, value.clone());
        }
    }

    let body = match request.body {
        Some(stream) => Body::from_stream(stream),
        None => Body::empty(),
    };
    let outbound = match builder.body(body) {
        Ok(outbound) => outbound,
        Err(e) => {
            let _ = events
                .send(TransportEvent::Error(TransportFault::new(e.to_string())))
                .await;
            return;
        }
    };

    let response = tokio::select! {
        result = client.request(outbound) => result,
        _ = abort.recv() => {
            tracing::debug!("socket transport aborted before response");
            return;
        }
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            let _ = events
                .send(TransportEvent::Error(TransportFault::new(e.to_string())))
                .await;
            return;
        }
    };

    let (parts, incoming) = response.into_parts();
    tracing::debug!(status = %parts.status, "upstream headers received");
    if events
        .send(TransportEvent::HeadersReady {
            status: parts.status,
            headers: parts.headers,
        })
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
                    if events.send(TransportEvent::Data(chunk)).await.is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    let _ = events
                        .send(TransportEvent::Error(TransportFault::new(e.to_string())))
                        .await;
                    return;
                }
                None => {
                    let _ = events.send(TransportEvent::Complete).await;
                    return;
                }
            },
            _ = abort.recv() => {
                tracing::debug!("socket transport aborted mid-stream");
                return;
            }
        }
    }
}
