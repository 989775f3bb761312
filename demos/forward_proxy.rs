//! Logging forward proxy, mirroring `forward_proxy_usage.py` from the
//! original implementation: a handler that logs the request, response
//! headers, and per-chunk sizes, delegating the actual forwarding to
//! [`ForwardingHandler`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mitm_https_proxy::config::{CaSubject, ProxyConfig};
use mitm_https_proxy::{
    forward, ConnectionContext, ProxyError, ProxyHandler, Response, TlsStore,
};

#[derive(Default)]
struct LoggingForwardProxyHandler {
    response_size: usize,
}

#[async_trait]
impl ProxyHandler for LoggingForwardProxyHandler {
    async fn on_request_received(&mut self, ctx: &mut ConnectionContext) -> Result<(), ProxyError> {
        println!("request: {} {}", ctx.request.method, ctx.request.url);
        for (name, value) in ctx.request.headers.iter() {
            println!("  {name}: {value}");
        }
        self.response_size = 0;
        forward(self, ctx).await
    }

    async fn on_response_received(
        &mut self,
        _ctx: &mut ConnectionContext,
        response: &mut Response,
    ) -> Result<(), ProxyError> {
        println!("response: {} {}", response.status_code, response.reason_phrase);
        Ok(())
    }

    async fn on_response_chunk(&mut self, chunk: Bytes) -> Option<Bytes> {
        self.response_size += chunk.len();
        println!("  chunk: {} bytes, total so far: {} bytes", chunk.len(), self.response_size);
        Some(chunk)
    }

    async fn on_response_complete(&mut self) {
        println!("response forwarding completed, total {} bytes", self.response_size);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ProxyConfig::default();

    println!("starting HTTPS forward proxy on {}:{}", config.host, config.port);
    println!(
        "test with: curl --insecure --proxy http://{}:{} https://example.com",
        config.host, config.port
    );

    let tls_store = Arc::new(TlsStore::generate_ca(&CaSubject::default())?);

    let handle = mitm_https_proxy::start_proxy_server(
        Arc::new(|| Box::<LoggingForwardProxyHandler>::default() as Box<dyn ProxyHandler>),
        &config,
        tls_store,
    )
    .await?;

    handle.join().await?;
    Ok(())
}
