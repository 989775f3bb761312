//! The embedding entry point.
//!
//! Mirrors the original implementation's `start_proxy_server`/
//! `asyncio.start_server`: bind, then hand back a handle while the accept
//! loop runs in the background, spawning one task per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::acceptor::{run_connection, HandlerFactory};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::tls_store::TlsStore;

/// A running proxy server. Dropping this does not stop the accept loop;
/// call [`ProxyServerHandle::abort`] or await [`ProxyServerHandle::join`] to
/// manage its lifetime explicitly.
pub struct ProxyServerHandle {
    local_addr: SocketAddr,
    accept_loop: JoinHandle<()>,
}

impl ProxyServerHandle {
    /// The address the listener actually bound to (useful when `port: 0`
    /// was requested).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the accept loop. In-flight connections are not interrupted.
    pub fn abort(&self) {
        self.accept_loop.abort();
    }

    /// Awaits the accept loop. Under normal operation this never returns.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.accept_loop.await
    }
}

/// Binds a `TcpListener` at `config.host:config.port` and spawns the accept
/// loop in the background, returning once bound. Each accepted connection
/// gets its own Tokio task running the acceptor state machine against a
/// fresh handler from `handler_factory`; a second, supervising task awaits
/// that handle so a handler panic is logged rather than silently dropped.
pub async fn start_proxy_server(
    handler_factory: HandlerFactory,
    config: &ProxyConfig,
    tls_store: Arc<TlsStore>,
) -> Result<ProxyServerHandle, ProxyError> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "proxy server listening");

    let accept_loop = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    let tls_store = tls_store.clone();
                    let handler_factory = handler_factory.clone();
                    let conn_task = tokio::spawn(async move {
                        run_connection(socket, peer_addr, tls_store, handler_factory).await;
                    });
                    tokio::spawn(async move {
                        if let Err(err) = conn_task.await {
                            if err.is_panic() {
                                warn!(peer = %peer_addr, error = %err, "connection task panicked");
                            }
                        }
                    });
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                }
            }
        }
    });

    Ok(ProxyServerHandle {
        local_addr,
        accept_loop,
    })
}
