//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`; every proxy call carries its
//!   call ID as a field
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` overrides the configured level

pub mod logging;

pub use logging::init_logging;
