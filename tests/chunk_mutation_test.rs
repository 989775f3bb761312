//! End-to-end scenario 3 from SPEC_FULL.md §8: a handler that uppercases
//! response chunks sees the mutation reflected at the client while
//! `Content-Length` stays untouched.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mitm_https_proxy::{forward, ConnectionContext, ProxyError, ProxyHandler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Default)]
struct UppercasingHandler;

#[async_trait]
impl ProxyHandler for UppercasingHandler {
    async fn on_request_received(&mut self, ctx: &mut ConnectionContext) -> Result<(), ProxyError> {
        forward(self, ctx).await
    }

    async fn on_response_chunk(&mut self, chunk: Bytes) -> Option<Bytes> {
        Some(Bytes::from(chunk.to_ascii_uppercase()))
    }
}

#[tokio::test]
async fn uppercases_response_body_and_preserves_content_length() {
    let origin_response = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
    let origin_addr = common::spawn_stub_origin(origin_response).await;
    let (proxy, _ca) = common::start_test_proxy(Arc::new(|| {
        Box::new(UppercasingHandler) as Box<dyn ProxyHandler>
    }))
    .await;

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let request = format!("GET http://{origin_addr}/ HTTP/1.1\r\nHost: {origin_addr}\r\n\r\n");
    client.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();

    assert!(response.contains("Content-Length: 5"));
    assert!(response.ends_with("HELLO"));
    proxy.abort();
}
