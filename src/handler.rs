//! The per-connection handler contract.
//!
//! A handler is attached by the acceptor once a request (and, for CONNECT,
//! the TLS upgrade) is ready, and owns the client socket and parsed request
//! for the rest of the connection's life. Mirrors the `async-trait`
//! lifecycle-callback shape used elsewhere in this codebase's proxy tooling,
//! generalized from one fixed (gRPC) protocol to the HTTP/1.1 model here.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufStream};

use crate::error::ProxyError;
use crate::http_message::{Request, Response};
use crate::stream::ClientStream;

/// Reads a request body bounded by `Content-Length`, one chunk at a time.
/// Absent `Content-Length` yields no chunks, matching the spec's
/// "absent ⇒ empty body" rule — this core has no chunked *request* bodies.
pub struct RequestBodyReader<'a> {
    stream: &'a mut BufStream<ClientStream>,
    remaining: u64,
}

impl<'a> RequestBodyReader<'a> {
    fn new(stream: &'a mut BufStream<ClientStream>, content_length: u64) -> Self {
        Self {
            stream,
            remaining: content_length,
        }
    }

    /// Returns the next chunk (at most `max_len` bytes), or `None` once the
    /// declared length has been fully consumed.
    pub async fn next_chunk(&mut self, max_len: usize) -> io::Result<Option<Bytes>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let take = self.remaining.min(max_len as u64) as usize;
        let mut buf = vec![0u8; take];
        self.stream.read_exact(&mut buf).await?;
        self.remaining -= take as u64;
        Ok(Some(Bytes::from(buf)))
    }
}

/// Owns the client socket and the parsed (possibly handler-mutated) request
/// for one connection, bound by the acceptor before any callback runs.
/// Reads and buffered writes share the one underlying socket since a
/// connection's I/O here is always sequential (read the request, then write
/// the response), never full-duplex.
pub struct ConnectionContext {
    pub request: Request,
    stream: BufStream<ClientStream>,
}

impl ConnectionContext {
    pub fn new(request: Request, stream: ClientStream) -> Self {
        Self {
            request,
            stream: BufStream::new(stream),
        }
    }

    /// Yields the request body as bounded by the request's `Content-Length`
    /// header (0 if absent).
    pub fn read_request_body(&mut self) -> RequestBodyReader<'_> {
        let content_length = self
            .request
            .headers
            .first("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        RequestBodyReader::new(&mut self.stream, content_length)
    }

    /// Appends bytes to the buffered client writer without flushing.
    pub async fn write_response(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await
    }

    /// Commits pending buffered bytes to the client socket.
    pub async fn flush_response(&mut self) -> io::Result<()> {
        self.stream.flush().await
    }
}

/// Per-connection lifecycle callbacks. The acceptor constructs one handler
/// per accepted connection via the embedder's handler factory and drives it
/// through these callbacks; see SPEC_FULL.md §4.D for the state machine that
/// calls into it.
#[async_trait]
pub trait ProxyHandler: Send {
    /// Invoked once the request (and any TLS upgrade) is ready. The default
    /// immediately awaits [`Self::on_request_received`], matching the
    /// original implementation's `client_connected` → `forward_http_request`
    /// chain.
    async fn on_client_connected(&mut self, ctx: &mut ConnectionContext) -> Result<(), ProxyError> {
        self.on_request_received(ctx).await
    }

    /// Invoked with the request available to application code and before any
    /// bytes are sent upstream. Handlers that want to mutate the request
    /// before forwarding do so here, then delegate forwarding themselves
    /// (the default forwarding handler in `forwarder` does exactly this).
    async fn on_request_received(&mut self, ctx: &mut ConnectionContext) -> Result<(), ProxyError>;

    /// Invoked after the upstream status line and headers are parsed, before
    /// anything is written to the client. Default: no-op.
    async fn on_response_received(
        &mut self,
        _ctx: &mut ConnectionContext,
        _response: &mut Response,
    ) -> Result<(), ProxyError> {
        Ok(())
    }

    /// Invoked per body chunk from upstream. Returning `None` drops the
    /// chunk from the client stream (chunked framing is still preserved by
    /// the caller). Default: pass through unchanged.
    async fn on_response_chunk(&mut self, chunk: Bytes) -> Option<Bytes> {
        Some(chunk)
    }

    /// Invoked exactly once per forwarded response, even on failure after
    /// forwarding has begun. Default: no-op.
    async fn on_response_complete(&mut self) {}

    /// Invoked on any transport or TLS error encountered while forwarding.
    /// Default: no-op.
    async fn on_error(&mut self, _err: &ProxyError) {}
}
