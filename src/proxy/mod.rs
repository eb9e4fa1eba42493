//! Proxying subsystem.
//!
//! # Data Flow
//! ```text
//! proxy(connection, target)
//!     → backend.open(outbound request)
//!     → HeadersReady: status + headers onto connection,
//!       promise resolves with the connection
//!     → Data*: chunks into connection.response.body
//!     → Complete: body closed | Error: rejection or body failure
//!     → abort(): backend torn down, pending promise resolves empty
//! ```

pub mod orchestrator;

pub use orchestrator::ProxyOrchestrator;
