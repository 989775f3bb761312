//! Small, explicit configuration surface.
//!
//! This is a library embedded into a host application, not a daemon with its
//! own config file, so there is no TOML/JSON loader here — just the handful
//! of constants and defaults the core depends on, gathered in one typed
//! place instead of scattered as literals through the acceptor and
//! forwarder.

use serde::{Deserialize, Serialize};

/// Maximum size of a single body chunk relayed between client and upstream.
pub const MAX_CHUNK_SIZE: usize = 4096;

/// Certificate validity window used for both the CA and minted leaves.
pub const CERTIFICATE_VALIDITY_DAYS: i64 = 365 * 100;

/// Subject DN fields used by [`crate::tls_store::TlsStore::generate_ca`]
/// when the caller doesn't supply its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaSubject {
    pub country: String,
    pub state: String,
    pub locality: String,
    pub organization: String,
    pub common_name: String,
}

impl Default for CaSubject {
    fn default() -> Self {
        Self {
            country: "US".to_string(),
            state: "California".to_string(),
            locality: "San Francisco".to_string(),
            organization: "Embedded MITM Proxy".to_string(),
            common_name: "Embedded MITM Proxy CA".to_string(),
        }
    }
}

/// Bind configuration for [`crate::server::start_proxy_server`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ca_subject_is_non_empty() {
        let subject = CaSubject::default();
        assert!(!subject.common_name.is_empty());
        assert!(!subject.organization.is_empty());
    }

    #[test]
    fn default_proxy_config_binds_loopback() {
        let config = ProxyConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8888);
    }
}
