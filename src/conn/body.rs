//! Byte stream halves used for request and response bodies.
//!
//! # Responsibilities
//! - Bounded producer/consumer channel of body chunks
//! - Clean close, error termination, and early termination on drop
//!
//! # Design Decisions
//! - Bounded channel; the core never buffers a body unboundedly
//! - Error termination is an in-band item so the consumer can tell a
//!   faulted body apart from a clean close
//! - `BodyStream` implements `futures_util::Stream` so it can feed
//!   `axum::body::Body::from_stream` for streaming uploads

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::TransportFault;

/// Default chunk capacity for body channels.
pub const DEFAULT_BODY_CAPACITY: usize = 16;

/// The consumer dropped its end of the body stream.
#[derive(Debug, Error)]
#[error("body stream closed by consumer")]
pub struct BodyClosed;

/// Create a linked sink/stream pair with the given chunk capacity.
pub fn channel(capacity: usize) -> (BodySink, BodyStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BodySink { tx }, BodyStream { rx })
}

/// Producer half of a body.
#[derive(Debug, Clone)]
pub struct BodySink {
    tx: mpsc::Sender<Result<Bytes, TransportFault>>,
}

impl BodySink {
    /// Deliver a chunk, waiting for channel capacity.
    pub async fn write(&self, chunk: Bytes) -> Result<(), BodyClosed> {
        self.tx.send(Ok(chunk)).await.map_err(|_| BodyClosed)
    }

    /// Terminate the body in an error state.
    pub async fn fail(&self, fault: TransportFault) {
        // The consumer may already be gone; either way the body is over.
        let _ = self.tx.send(Err(fault)).await;
    }

    /// Close the body cleanly.
    pub fn close(self) {}
}

/// Consumer half of a body.
#[derive(Debug)]
pub struct BodyStream {
    rx: mpsc::Receiver<Result<Bytes, TransportFault>>,
}

impl BodyStream {
    /// A body that is already closed with no content.
    pub fn empty() -> Self {
        let (_, stream) = channel(1);
        stream
    }

    /// A body pre-filled with one chunk, then closed.
    pub fn from_bytes(content: impl Into<Bytes>) -> Self {
        let (sink, stream) = channel(1);
        // Capacity 1 guarantees room for the single chunk.
        let _ = sink.tx.try_send(Ok(content.into()));
        stream
    }

    /// Next chunk, `None` after a clean close.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportFault>> {
        self.rx.recv().await
    }

    /// Read the stream to completion into one buffer.
    pub async fn collect(mut self) -> Result<Bytes, TransportFault> {
        let mut all = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
            all.extend_from_slice(&chunk?);
        }
        Ok(all.freeze())
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, TransportFault>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
