//! Single-settlement promise with cooperative cancellation.
//!
//! # Responsibilities
//! - Carry exactly one terminal outcome (resolved, rejected, or aborted)
//! - Run registered abort handlers exactly once, in registration order
//! - Treat abort as a resolution, not an error
//!
//! # Design Decisions
//! - Abort after settlement still fires the handlers (the transport must
//!   be released) but never changes the settled outcome
//! - `resolve`/`reject` after the first terminal transition are no-ops
//! - Handlers registered after the handlers already fired run immediately

mod promise;

pub use promise::{AbortHandle, AbortablePromise, Settlement, Settler};
