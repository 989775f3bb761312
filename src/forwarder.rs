//! The default forwarding handler: opens an upstream connection and relays
//! the request/response pair across both `Content-Length` and chunked
//! framing, invoking the handler's hooks at each stage. Grounded on the
//! original implementation's `HTTPSForwardProxyHandler.forward_http_request`
//! / `_forward_response_body` / `_forward_chunked_response` split, reworked
//! around `ConnectionContext` and `ProxyHandler`.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::MAX_CHUNK_SIZE;
use crate::error::{ForwardError, ProxyError};
use crate::handler::{ConnectionContext, ProxyHandler};
use crate::http_message::Response;
use crate::io_util::{read_crlf_line, read_header_block};
use crate::stream::UpstreamStream;

fn client_tls_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();
    CONFIG
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        })
        .clone()
}

/// The handler an embedder gets by default: forward the request to its
/// origin untouched. Application handlers typically wrap or delegate to this
/// rather than reimplementing `forward()`.
#[derive(Debug, Default)]
pub struct ForwardingHandler;

#[async_trait]
impl ProxyHandler for ForwardingHandler {
    async fn on_request_received(&mut self, ctx: &mut ConnectionContext) -> Result<(), ProxyError> {
        forward(self, ctx).await
    }
}

/// Opens a connection to `ctx.request.host:ctx.request.port`, streams the
/// request, then relays the response back through `handler`'s hooks. See
/// SPEC_FULL.md §4.E for the step-by-step contract this implements.
pub async fn forward(
    handler: &mut dyn ProxyHandler,
    ctx: &mut ConnectionContext,
) -> Result<(), ProxyError> {
    let host = ctx.request.host.clone();
    let port = ctx.request.port;
    let https = ctx.request.scheme == "https";

    let mut upstream = match connect_upstream(&host, port, https).await {
        Ok(stream) => stream,
        Err(err) => {
            let err = ProxyError::from(err);
            handler.on_error(&err).await;
            return Ok(());
        }
    };

    let mut completed = false;
    let result = drive_forward(handler, ctx, &mut upstream, &mut completed).await;

    if !completed {
        handler.on_response_complete().await;
    }

    let _ = upstream.shutdown().await;

    if let Err(err) = &result {
        handler.on_error(err).await;
    }
    result
}

async fn connect_upstream(host: &str, port: u16, https: bool) -> Result<UpstreamStream, ForwardError> {
    debug!(host, port, https, "connecting to upstream");
    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|source| ForwardError::UpstreamConnect {
            host: host.to_string(),
            port,
            source,
        })?;

    if !https {
        return Ok(UpstreamStream::Plain(tcp));
    }

    let connector = TlsConnector::from(client_tls_config());
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ForwardError::UpstreamTls {
            host: host.to_string(),
            source: e.to_string(),
        })?;
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| ForwardError::UpstreamTls {
            host: host.to_string(),
            source: e.to_string(),
        })?;
    Ok(UpstreamStream::Tls(Box::new(tls)))
}

async fn drive_forward(
    handler: &mut dyn ProxyHandler,
    ctx: &mut ConnectionContext,
    upstream: &mut UpstreamStream,
    completed: &mut bool,
) -> Result<(), ProxyError> {
    write_request(ctx, upstream).await?;

    let Some(status_line) = read_crlf_line(upstream)
        .await
        .map_err(ForwardError::UpstreamRead)?
    else {
        return Err(ForwardError::UpstreamClosed.into());
    };
    let mut response = Response::parse_status_line(&status_line).map_err(ForwardError::from)?;
    let header_block = read_header_block(upstream)
        .await
        .map_err(ForwardError::UpstreamRead)?;
    response.headers = crate::http_message::Headers::parse(&header_block).map_err(ForwardError::from)?;

    handler.on_response_received(ctx, &mut response).await?;

    ctx.write_response(response.status_line().as_bytes())
        .await
        .map_err(ForwardError::ClientWrite)?;
    ctx.write_response(&response.headers.serialize())
        .await
        .map_err(ForwardError::ClientWrite)?;

    relay_body(handler, ctx, upstream, &response).await?;

    ctx.flush_response().await.map_err(ForwardError::ClientWrite)?;
    handler.on_response_complete().await;
    *completed = true;

    info!(
        status = response.status_code,
        host = %ctx.request.host,
        "forwarded response"
    );
    Ok(())
}

async fn write_request(
    ctx: &mut ConnectionContext,
    upstream: &mut UpstreamStream,
) -> Result<(), ForwardError> {
    let mut out = Vec::new();
    out.extend_from_slice(ctx.request.request_line().as_bytes());
    out.extend_from_slice(&ctx.request.headers.serialize());
    upstream
        .write_all(&out)
        .await
        .map_err(ForwardError::UpstreamWrite)?;

    let mut body = ctx.read_request_body();
    while let Some(chunk) = body
        .next_chunk(MAX_CHUNK_SIZE)
        .await
        .map_err(ForwardError::UpstreamRead)?
    {
        upstream
            .write_all(&chunk)
            .await
            .map_err(ForwardError::UpstreamWrite)?;
    }
    upstream.flush().await.map_err(ForwardError::UpstreamWrite)?;
    Ok(())
}

async fn relay_body(
    handler: &mut dyn ProxyHandler,
    ctx: &mut ConnectionContext,
    upstream: &mut UpstreamStream,
    response: &Response,
) -> Result<(), ProxyError> {
    let transfer_encoding = response.headers.first("transfer-encoding");
    let is_chunked = transfer_encoding
        .map(|v| v.to_ascii_lowercase().contains("chunked"))
        .unwrap_or(false);

    if is_chunked {
        relay_chunked(handler, ctx, upstream).await
    } else if let Some(len) = response.headers.first("content-length").and_then(|v| v.parse::<u64>().ok())
    {
        relay_fixed_length(handler, ctx, upstream, len).await
    } else {
        relay_until_close(handler, ctx, upstream).await
    }
}

async fn relay_fixed_length(
    handler: &mut dyn ProxyHandler,
    ctx: &mut ConnectionContext,
    upstream: &mut UpstreamStream,
    mut remaining: u64,
) -> Result<(), ProxyError> {
    while remaining > 0 {
        let take = remaining.min(MAX_CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; take];
        upstream
            .read_exact(&mut buf)
            .await
            .map_err(ForwardError::UpstreamRead)?;
        remaining -= take as u64;

        if let Some(chunk) = handler.on_response_chunk(Bytes::from(buf)).await {
            ctx.write_response(&chunk)
                .await
                .map_err(ForwardError::ClientWrite)?;
        }
    }
    Ok(())
}

async fn relay_until_close(
    handler: &mut dyn ProxyHandler,
    ctx: &mut ConnectionContext,
    upstream: &mut UpstreamStream,
) -> Result<(), ProxyError> {
    let mut buf = vec![0u8; MAX_CHUNK_SIZE];
    loop {
        let n = upstream
            .read(&mut buf)
            .await
            .map_err(ForwardError::UpstreamRead)?;
        if n == 0 {
            break;
        }
        if let Some(chunk) = handler.on_response_chunk(Bytes::copy_from_slice(&buf[..n])).await {
            ctx.write_response(&chunk)
                .await
                .map_err(ForwardError::ClientWrite)?;
        }
    }
    Ok(())
}

async fn relay_chunked(
    handler: &mut dyn ProxyHandler,
    ctx: &mut ConnectionContext,
    upstream: &mut UpstreamStream,
) -> Result<(), ProxyError> {
    loop {
        let Some(size_line) = read_crlf_line(upstream)
            .await
            .map_err(ForwardError::UpstreamRead)?
        else {
            return Err(ForwardError::UpstreamClosed.into());
        };

        let hex_part = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(hex_part, 16)
            .map_err(|_| ForwardError::MalformedChunkSize(size_line.clone()))?;

        ctx.write_response(size_line.as_bytes())
            .await
            .map_err(ForwardError::ClientWrite)?;
        ctx.write_response(b"\r\n")
            .await
            .map_err(ForwardError::ClientWrite)?;

        if size == 0 {
            // Trailer section: forward lines verbatim until the bare CRLF.
            loop {
                let Some(trailer_line) = read_crlf_line(upstream)
                    .await
                    .map_err(ForwardError::UpstreamRead)?
                else {
                    return Err(ForwardError::UpstreamClosed.into());
                };
                ctx.write_response(trailer_line.as_bytes())
                    .await
                    .map_err(ForwardError::ClientWrite)?;
                ctx.write_response(b"\r\n")
                    .await
                    .map_err(ForwardError::ClientWrite)?;
                if trailer_line.is_empty() {
                    break;
                }
            }
            return Ok(());
        }

        let mut data = BytesMut::zeroed(size);
        upstream
            .read_exact(&mut data)
            .await
            .map_err(ForwardError::UpstreamRead)?;
        let mut crlf = [0u8; 2];
        upstream
            .read_exact(&mut crlf)
            .await
            .map_err(ForwardError::UpstreamRead)?;
        if &crlf != b"\r\n" {
            warn!("chunk data not followed by CRLF");
        }

        if let Some(processed) = handler.on_response_chunk(data.freeze()).await {
            ctx.write_response(&processed)
                .await
                .map_err(ForwardError::ClientWrite)?;
        }
        ctx.write_response(b"\r\n")
            .await
            .map_err(ForwardError::ClientWrite)?;
    }
}
