//! Duplicate-free extraction of new bytes from a growing response buffer.
//!
//! # Responsibilities
//! - Track how many bytes of a request's response were already delivered
//! - Turn "everything received so far" into "only the new suffix"
//!
//! # Design Decisions
//! - Offsets count bytes for both binary and textual content
//! - The offset never decreases, even if a snapshot shrinks; shrunk
//!   snapshots yield nothing rather than re-delivering old bytes

use bytes::Bytes;

/// Content snapshot handed over by a transport.
///
/// Binary and textual buffers are handled on separate paths; one is never
/// reinterpreted as the other.
#[derive(Debug, Clone)]
pub enum RawContent {
    Binary(Bytes),
    Text(String),
}

impl RawContent {
    /// Length of the snapshot in bytes.
    pub fn len(&self) -> usize {
        match self {
            RawContent::Binary(buf) => buf.len(),
            RawContent::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-request extraction state.
///
/// Each call receives the whole buffer accumulated so far (the typical
/// shape for a polling transport, which has no delta view) and produces
/// only the suffix that has not been delivered yet.
#[derive(Debug, Default)]
pub struct ContentPipe {
    offset: usize,
}

impl ContentPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes already delivered for this request.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Extract the bytes beyond the current offset, advancing it to
    /// `max(offset, content.len())`. Returns `None` when nothing new is
    /// available.
    pub fn extract(&mut self, content: &RawContent) -> Option<Bytes> {
        let total = content.len();
        if total <= self.offset {
            return None;
        }

        let fresh = match content {
            RawContent::Binary(buf) => buf.slice(self.offset..),
            RawContent::Text(text) => Bytes::copy_from_slice(&text.as_bytes()[self.offset..]),
        };
        self.offset = total;
        Some(fresh)
    }
}
