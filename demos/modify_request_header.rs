//! Mutates a request header before forwarding, to demonstrate that a
//! handler may inspect and change `ctx.request` inside `on_request_received`
//! before calling [`forward`].

use std::sync::Arc;

use async_trait::async_trait;
use mitm_https_proxy::config::{CaSubject, ProxyConfig};
use mitm_https_proxy::{forward, ConnectionContext, ProxyError, ProxyHandler, TlsStore};

#[derive(Default)]
struct HeaderRewritingHandler;

#[async_trait]
impl ProxyHandler for HeaderRewritingHandler {
    async fn on_request_received(&mut self, ctx: &mut ConnectionContext) -> Result<(), ProxyError> {
        ctx.request.headers.push("X-Proxied-By", "mitm-https-proxy");
        println!("forwarding {} {} with an added header", ctx.request.method, ctx.request.url);
        forward(self, ctx).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ProxyConfig::default();
    let tls_store = Arc::new(TlsStore::generate_ca(&CaSubject::default())?);

    println!("starting header-rewriting proxy on {}:{}", config.host, config.port);
    let handle = mitm_https_proxy::start_proxy_server(
        Arc::new(|| Box::<HeaderRewritingHandler>::default() as Box<dyn ProxyHandler>),
        &config,
        tls_store,
    )
    .await?;

    handle.join().await?;
    Ok(())
}
