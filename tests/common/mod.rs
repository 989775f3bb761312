//! Shared scaffolding for the end-to-end tests: a minimal stub origin server
//! and a running test proxy instance, both bound to ephemeral ports.

use std::net::SocketAddr;
use std::sync::Arc;

use mitm_https_proxy::config::{CaSubject, ProxyConfig};
use mitm_https_proxy::{ForwardingHandler, ProxyHandler, ProxyServerHandle, TlsStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Spawns a one-shot TCP origin: accepts a single connection, reads and
/// discards bytes until it has seen `\r\n\r\n`, writes `response`, then
/// closes. Returns the address it bound to.
pub async fn spawn_stub_origin(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = socket.read(&mut byte).await.unwrap();
            if n == 0 {
                return;
            }
            buf.push(byte[0]);
            if buf.ends_with(b"\r\n\r\n") {
                break;
            }
        }
        socket.write_all(response).await.unwrap();
        let _ = socket.shutdown().await;
    });

    addr
}

/// Starts the proxy core on an ephemeral loopback port with the given
/// per-connection handler factory, returning the handle and the CA it
/// minted leaves from.
pub async fn start_test_proxy(
    handler_factory: Arc<dyn Fn() -> Box<dyn ProxyHandler> + Send + Sync>,
) -> (ProxyServerHandle, Arc<TlsStore>) {
    let tls_store = Arc::new(TlsStore::generate_ca(&CaSubject::default()).unwrap());
    let config = ProxyConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
    };
    let handle = mitm_https_proxy::start_proxy_server(handler_factory, &config, tls_store.clone())
        .await
        .unwrap();
    (handle, tls_store)
}

/// Convenience: a test proxy using the plain default forwarding handler.
pub async fn start_forwarding_test_proxy() -> (ProxyServerHandle, Arc<TlsStore>) {
    start_test_proxy(Arc::new(|| Box::new(ForwardingHandler) as Box<dyn ProxyHandler>)).await
}
