//! Error taxonomy for the proxy core.
//!
//! Each layer gets its own variant set so callers can match on the failure
//! mode that matters to them (a parse error and an upstream TLS failure
//! should never look the same to a handler's `on_error`).

use thiserror::Error;

/// Failures parsing the HTTP/1.1 request line, status line, or header block.
#[derive(Error, Debug)]
pub enum HttpParseError {
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),

    #[error("CONNECT target missing a port: {0:?}")]
    ConnectMissingPort(String),

    #[error("CONNECT target has an invalid port: {0:?}")]
    ConnectInvalidPort(String),

    #[error("malformed absolute-form target: {0:?}")]
    MalformedTarget(String),

    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeaderLine(String),
}

/// Failures owning or minting certificates in the [`crate::tls_store::TlsStore`].
#[derive(Error, Debug)]
pub enum TlsStoreError {
    #[error("failed to parse CA private key PEM: {0}")]
    InvalidCaKeyPem(String),

    #[error("CA private key is not an EC (P-256) key")]
    CaKeyNotEc,

    #[error("failed to parse CA certificate PEM: {0}")]
    InvalidCaCertPem(String),

    #[error("failed to sign leaf certificate for {host:?}: {source}")]
    LeafSigningFailed { host: String, source: String },

    #[error("invalid DNS name for certificate: {0:?}")]
    InvalidDnsName(String),

    #[error("I/O error persisting CA material: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures encountered while forwarding a request/response pair upstream.
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("failed to connect to upstream {host}:{port}: {source}")]
    UpstreamConnect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("upstream TLS handshake with {host} failed: {source}")]
    UpstreamTls { host: String, source: String },

    #[error("upstream closed the connection before sending a status line")]
    UpstreamClosed,

    #[error("malformed chunk size line: {0:?}")]
    MalformedChunkSize(String),

    #[error("error writing to client: {0}")]
    ClientWrite(#[source] std::io::Error),

    #[error("error reading from upstream: {0}")]
    UpstreamRead(#[source] std::io::Error),

    #[error("error writing to upstream: {0}")]
    UpstreamWrite(#[source] std::io::Error),

    #[error(transparent)]
    Parse(#[from] HttpParseError),
}

/// Top-level error aggregating every layer, used at the acceptor's outer
/// boundary so one connection's failure never escapes its task.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error(transparent)]
    Parse(#[from] HttpParseError),

    #[error(transparent)]
    TlsStore(#[from] TlsStoreError),

    #[error(transparent)]
    Forward(#[from] ForwardError),

    #[error("client TLS handshake failed: {0}")]
    ClientTls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;
