//! Adaptive capability flags for incremental extraction.
//!
//! # Responsibilities
//! - Remember, for the process lifetime, whether the headers-received and
//!   loading stages of the polling transport can be read incrementally
//!
//! # Design Decisions
//! - One-way degradation: a flag flips to false the first time extraction
//!   at its stage fails and is never reset
//! - Held behind an injectable `Arc` so tests get fresh flags per case;
//!   `process_wide()` is the shared production instance

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static PROCESS_WIDE: OnceLock<Arc<Capabilities>> = OnceLock::new();

/// Which polling stages are still usable for incremental extraction.
#[derive(Debug)]
pub struct Capabilities {
    headers_stage: AtomicBool,
    loading_stage: AtomicBool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::new()
    }
}

impl Capabilities {
    /// Fresh flags, both stages usable.
    pub fn new() -> Self {
        Self {
            headers_stage: AtomicBool::new(true),
            loading_stage: AtomicBool::new(true),
        }
    }

    /// The flags shared by every polling request in this process.
    pub fn process_wide() -> Arc<Capabilities> {
        PROCESS_WIDE.get_or_init(|| Arc::new(Capabilities::new())).clone()
    }

    pub fn headers_stage_usable(&self) -> bool {
        self.headers_stage.load(Ordering::Relaxed)
    }

    pub fn loading_stage_usable(&self) -> bool {
        self.loading_stage.load(Ordering::Relaxed)
    }

    /// Permanently stop reading headers at the headers-received stage.
    pub fn disable_headers_stage(&self) {
        if self.headers_stage.swap(false, Ordering::Relaxed) {
            tracing::warn!("headers-stage extraction failed; disabled for this process");
        }
    }

    /// Permanently stop incremental extraction at the loading stage.
    pub fn disable_loading_stage(&self) {
        if self.loading_stage.swap(false, Ordering::Relaxed) {
            tracing::warn!("loading-stage extraction failed; disabled for this process");
        }
    }
}
