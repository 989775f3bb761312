//! The per-connection MITM state machine.
//!
//! Reads the first request line and headers, branches on `CONNECT` vs.
//! direct-form requests, performs the client-facing TLS upgrade for
//! `CONNECT`, and hands a fresh, boxed handler the parsed request and
//! socket. Grounded on `server.py`'s `start_proxy_server` read-then-dispatch
//! shape and on the teacher's per-connection task + ALPN/TLS handling in
//! `proxy.rs`, reworked around the hand-rolled HTTP model here instead of
//! hyper/h2.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

use crate::error::ProxyError;
use crate::handler::{ConnectionContext, ProxyHandler};
use crate::http_message::{Headers, Request};
use crate::io_util::{read_crlf_line, read_header_block};
use crate::stream::ClientStream;
use crate::tls_store::TlsStore;

/// Zero-argument constructor producing a fresh handler per connection.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn ProxyHandler> + Send + Sync>;

/// Runs the full per-connection state machine to completion, never
/// propagating an error past this call: every failure is logged and the
/// socket is dropped. Intended to be the body of one `tokio::spawn`ed task
/// per accepted connection.
#[instrument(skip_all, fields(peer = %peer_addr))]
pub async fn run_connection(
    socket: TcpStream,
    peer_addr: SocketAddr,
    tls_store: Arc<TlsStore>,
    handler_factory: HandlerFactory,
) {
    if let Err(err) = drive(socket, tls_store, handler_factory).await {
        warn!(error = %err, "connection ended with an error");
    }
}

async fn drive(
    mut socket: TcpStream,
    tls_store: Arc<TlsStore>,
    handler_factory: HandlerFactory,
) -> Result<(), ProxyError> {
    // NEW -> PARSED
    let Some(request_line) = read_crlf_line(&mut socket).await? else {
        debug!("client disconnected before sending a request line");
        return Ok(());
    };
    let mut request = Request::parse_request_line(&request_line)?;
    let header_block = read_header_block(&mut socket).await?;
    request.headers = Headers::parse(&header_block)?;

    let client_stream = if request.method.eq_ignore_ascii_case("CONNECT") {
        match upgrade_to_tls(socket, &tls_store, &mut request).await? {
            Some(stream) => stream,
            None => return Ok(()),
        }
    } else {
        ClientStream::Plain(socket)
    };

    info!(method = %request.method, host = %request.host, port = request.port, "request ready");

    let mut ctx = ConnectionContext::new(request, client_stream);
    let mut handler = handler_factory();
    let result = handler.on_client_connected(&mut ctx).await;
    if let Err(err) = &result {
        handler.on_error(err).await;
    }
    let _ = ctx.flush_response().await;
    result
}

/// Handles `PARSED → TUNNEL_ACK → TLS_UPGRADE → INNER → READY`. Returns
/// `Ok(None)` if the client disconnects before the inner request line, which
/// the caller treats as a silent, successful close.
async fn upgrade_to_tls(
    mut socket: TcpStream,
    tls_store: &Arc<TlsStore>,
    request: &mut Request,
) -> Result<Option<ClientStream>, ProxyError> {
    // PARSED -> TUNNEL_ACK
    socket
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    socket.flush().await?;

    // TUNNEL_ACK -> TLS_UPGRADE
    let server_config = tls_store.get_tls_config(&request.host).await?;
    let acceptor = tokio_rustls::TlsAcceptor::from(server_config);
    let mut tls_stream = acceptor
        .accept(socket)
        .await
        .map_err(|e| ProxyError::ClientTls(e.to_string()))?;

    let connect_host = request.host.clone();
    let connect_port = request.port;

    // INNER -> READY
    let Some(inner_line) = read_crlf_line(&mut tls_stream).await? else {
        debug!("client disconnected before the inner request line");
        return Ok(None);
    };
    let mut inner_request = Request::parse_request_line(&inner_line)?;
    let inner_header_block = read_header_block(&mut tls_stream).await?;
    inner_request.headers = Headers::parse(&inner_header_block)?;

    // Invariant (iv): host/port come from the CONNECT target, never from the
    // inner request line or its Host header.
    inner_request.host = connect_host;
    inner_request.port = connect_port;
    inner_request.scheme = "https".to_string();

    *request = inner_request;
    Ok(Some(ClientStream::Tls(Box::new(tls_stream))))
}
