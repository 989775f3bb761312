//! Embeddable HTTPS-intercepting forward proxy.
//!
//! A client configures this as its HTTP/HTTPS upstream; the proxy mints a
//! per-host TLS certificate from an in-process CA, terminates the client's
//! TLS session, parses the intercepted request, and forwards it to the true
//! origin. Application code supplies a [`ProxyHandler`] per connection to
//! observe or mutate the request and response in flight.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mitm_https_proxy::{start_proxy_server, ForwardingHandler, TlsStore, config::{CaSubject, ProxyConfig}};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let tls_store = Arc::new(TlsStore::generate_ca(&CaSubject::default())?);
//! let handle = start_proxy_server(
//!     Arc::new(|| Box::new(ForwardingHandler)),
//!     &ProxyConfig::default(),
//!     tls_store,
//! ).await?;
//! handle.join().await?;
//! # Ok(())
//! # }
//! ```

pub mod acceptor;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod handler;
pub mod http_message;
pub mod io_util;
pub mod server;
pub mod stream;
pub mod tls_store;

pub use error::{ForwardError, HttpParseError, ProxyError, Result, TlsStoreError};
pub use forwarder::{forward, ForwardingHandler};
pub use handler::{ConnectionContext, ProxyHandler, RequestBodyReader};
pub use http_message::{Headers, Request, Response};
pub use server::{start_proxy_server, ProxyServerHandle};
pub use tls_store::{LeafRecord, TlsStore};
