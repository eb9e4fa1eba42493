//! Cancellable streaming request-proxy core.
//!
//! Forwards an inbound connection to a target location through one of
//! two interchangeable transport backends and streams the upstream
//! response back incrementally, with mid-flight cancellation.
//!
//! ```no_run
//! use stream_relay::conn::{Connection, UriParts};
//! use stream_relay::{ProxyOrchestrator, Settlement};
//! use axum::http::Method;
//!
//! # async fn example() -> Result<(), stream_relay::ProxyError> {
//! let orchestrator = ProxyOrchestrator::socket();
//! let conn = Connection::new(Method::GET, UriParts::parse("http://in.example/a?x=1")?);
//! let target = UriParts::parse("http://127.0.0.1:9000/")?;
//!
//! let promise = orchestrator.proxy(conn, &target);
//! match promise.await? {
//!     Settlement::Resolved(mut conn) => {
//!         // Headers have arrived; the body keeps streaming.
//!         let body = conn.response.body.take().unwrap();
//!         let bytes = body.collect().await.map_err(stream_relay::ProxyError::from)?;
//!         println!("{} -> {} bytes", conn.status, bytes.len());
//!     }
//!     Settlement::Aborted => {}
//! }
//! # Ok(())
//! # }
//! ```

pub mod abort;
pub mod config;
pub mod conn;
pub mod error;
pub mod observability;
pub mod pipe;
pub mod proxy;
pub mod transport;

pub use abort::{AbortHandle, AbortablePromise, Settlement, Settler};
pub use config::RelayConfig;
pub use conn::Connection;
pub use error::{ProxyError, TransportFault};
pub use proxy::ProxyOrchestrator;
