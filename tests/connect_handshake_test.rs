//! End-to-end scenario 2 from SPEC_FULL.md §8, proxy-facing half: a client
//! that sends `CONNECT` gets the literal `200 Connection Established` reply
//! and can then complete a TLS handshake against a leaf minted by the
//! proxy's CA for the CONNECT target's host.

mod common;

use std::sync::Arc;

use rustls::RootCertStore;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

#[tokio::test]
async fn connect_request_gets_tunnel_ack_and_tls_upgrade_succeeds() {
    let (proxy, tls_store) = common::start_forwarding_test_proxy().await;

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    client
        .write_all(b"CONNECT example.test:443 HTTP/1.1\r\n\r\n")
        .await
        .unwrap();

    let mut ack = [0u8; 39];
    client.read_exact(&mut ack).await.unwrap();
    assert_eq!(&ack, b"HTTP/1.1 200 Connection Established\r\n\r\n");

    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut tls_store.ca_pem().as_bytes()) {
        roots.add(cert.unwrap()).unwrap();
    }
    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(client_config));
    let server_name = ServerName::try_from("example.test").unwrap();

    let tls_stream = connector.connect(server_name, client).await;
    assert!(tls_stream.is_ok(), "TLS handshake against the minted leaf should succeed");
}
