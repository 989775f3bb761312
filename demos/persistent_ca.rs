//! Reuses a CA across runs, mirroring `persistent_ca_usage.py`: load the CA
//! from disk if both files exist, otherwise generate one and save it for
//! next time.

use std::path::Path;
use std::sync::Arc;

use mitm_https_proxy::config::{CaSubject, ProxyConfig};
use mitm_https_proxy::{ForwardingHandler, ProxyHandler, TlsStore};

const CA_KEY_FILE: &str = "ca_private_key.pem";
const CA_CERT_FILE: &str = "ca_certificate.pem";

fn get_or_create_ca() -> anyhow::Result<TlsStore> {
    if Path::new(CA_KEY_FILE).exists() && Path::new(CA_CERT_FILE).exists() {
        println!("loading existing CA from disk");
        let key_pem = std::fs::read_to_string(CA_KEY_FILE)?;
        let cert_pem = std::fs::read_to_string(CA_CERT_FILE)?;
        return Ok(TlsStore::load_ca(&key_pem, &cert_pem)?);
    }

    println!("no existing CA files found, generating one");
    let store = TlsStore::generate_ca(&CaSubject::default())?;
    store.save_ca(CA_KEY_FILE, CA_CERT_FILE)?;
    println!("CA key saved to {CA_KEY_FILE}, cert saved to {CA_CERT_FILE}");
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ProxyConfig::default();
    let tls_store = Arc::new(get_or_create_ca()?);

    println!("starting proxy with persistent CA on {}:{}", config.host, config.port);
    println!(
        "curl --cacert {CA_CERT_FILE} --proxy http://{}:{} https://example.com",
        config.host, config.port
    );

    let handle = mitm_https_proxy::start_proxy_server(
        Arc::new(|| Box::new(ForwardingHandler) as Box<dyn ProxyHandler>),
        &config,
        tls_store,
    )
    .await?;

    handle.join().await?;
    Ok(())
}
