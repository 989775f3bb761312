//! On-the-fly TLS certificate minting store.
//!
//! Owns a self-signed CA and mints/caches per-host leaf certificates signed
//! by that CA, the way a MITM proxy has to in order to terminate a client's
//! TLS session without the client seeing a cert mismatch. The signing
//! algorithm mirrors `generate_cert_for_domain`/`load_ca`/`generate_ca` from
//! this codebase's cursor interception tooling, and the cache/eviction shape
//! mirrors the `CertManager` pattern used by comparable local MITM proxies:
//! a map guarded so minting one host never blocks lookups for another.

use std::sync::Arc;

use dashmap::DashMap;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyPair, KeyUsagePurpose, SanType,
};
use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use time::{Duration, OffsetDateTime};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{CaSubject, CERTIFICATE_VALIDITY_DAYS};
use crate::error::TlsStoreError;

/// A minted leaf certificate together with the server TLS config built from
/// it. Cached per host for the process lifetime.
pub struct LeafRecord {
    pub cert_der: CertificateDer<'static>,
    pub server_config: Arc<ServerConfig>,
}

/// Owns the CA identity and the per-host leaf certificate cache.
pub struct TlsStore {
    ca_cert_pem: String,
    ca_cert: Certificate,
    ca_key: KeyPair,
    cache: DashMap<String, Arc<OnceCell<Arc<LeafRecord>>>>,
}

impl TlsStore {
    /// Generates a fresh CA identity with the given Subject DN.
    pub fn generate_ca(subject: &CaSubject) -> Result<Self, TlsStoreError> {
        let key_pair = KeyPair::generate().map_err(|e| TlsStoreError::LeafSigningFailed {
            host: "<ca>".to_string(),
            source: e.to_string(),
        })?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CountryName, subject.country.clone());
        dn.push(DnType::StateOrProvinceName, subject.state.clone());
        dn.push(DnType::LocalityName, subject.locality.clone());
        dn.push(DnType::OrganizationName, subject.organization.clone());
        dn.push(DnType::CommonName, subject.common_name.clone());

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(CERTIFICATE_VALIDITY_DAYS);

        let ca_cert = params
            .self_signed(&key_pair)
            .map_err(|e| TlsStoreError::LeafSigningFailed {
                host: "<ca>".to_string(),
                source: e.to_string(),
            })?;

        info!("generated fresh CA: {}", subject.common_name);

        let ca_cert_pem = ca_cert.pem();
        Ok(Self {
            ca_cert_pem,
            ca_cert,
            ca_key: key_pair,
            cache: DashMap::new(),
        })
    }

    /// Loads a CA identity from a PKCS#8 PEM key and a PEM certificate.
    /// Fails if the key isn't an EC (P-256) key or either PEM fails to
    /// parse.
    pub fn load_ca(key_pem: &str, cert_pem: &str) -> Result<Self, TlsStoreError> {
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| TlsStoreError::InvalidCaKeyPem(e.to_string()))?;

        if !key_pair.is_compatible(&rcgen::PKCS_ECDSA_P256_SHA256) {
            return Err(TlsStoreError::CaKeyNotEc);
        }

        // Reconstruct an rcgen `Certificate` object from the stored params so
        // we can sign leaves against it. The *returned* `ca_pem()` is always
        // the verbatim bytes passed in here, not a re-signed reconstruction,
        // so round-tripping through save/load is byte-identical even though
        // ECDSA signing itself is randomized.
        let params = CertificateParams::from_ca_cert_pem(cert_pem)
            .map_err(|e| TlsStoreError::InvalidCaCertPem(e.to_string()))?;
        let ca_cert = params
            .self_signed(&key_pair)
            .map_err(|e| TlsStoreError::InvalidCaCertPem(e.to_string()))?;

        info!("loaded CA from PEM");

        Ok(Self {
            ca_cert_pem: cert_pem.to_string(),
            ca_cert,
            ca_key: key_pair,
            cache: DashMap::new(),
        })
    }

    /// Writes the CA private key (PKCS#8 PEM, unencrypted) and certificate
    /// (PEM) to disk.
    pub fn save_ca(
        &self,
        key_path: impl AsRef<std::path::Path>,
        cert_path: impl AsRef<std::path::Path>,
    ) -> Result<(), TlsStoreError> {
        std::fs::write(key_path, self.ca_key.serialize_pem())?;
        std::fs::write(cert_path, &self.ca_cert_pem)?;
        Ok(())
    }

    /// Returns the CA certificate in PEM.
    pub fn ca_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// Returns a server-side TLS configuration presenting the leaf
    /// certificate for `host`, minting and caching it on first call. Minting
    /// is at-most-once per host: concurrent callers for the same host
    /// converge on a single mint, while callers for different hosts never
    /// block each other.
    pub async fn get_tls_config(&self, host: &str) -> Result<Arc<ServerConfig>, TlsStoreError> {
        Ok(self.leaf_record(host).await?.server_config.clone())
    }

    /// Like [`Self::get_tls_config`] but also exposes the minted leaf's DER
    /// bytes, mainly useful for tests that want to inspect the certificate
    /// itself.
    pub async fn leaf_record(&self, host: &str) -> Result<Arc<LeafRecord>, TlsStoreError> {
        let cell = self
            .cache
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        cell.get_or_try_init(|| async { self.mint_leaf(host) })
            .await
            .cloned()
    }

    fn mint_leaf(&self, host: &str) -> Result<Arc<LeafRecord>, TlsStoreError> {
        debug!(host, "minting leaf certificate");

        let dns_name = Ia5String::try_from(host)
            .map_err(|_| TlsStoreError::InvalidDnsName(host.to_string()))?;

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);

        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.is_ca = IsCa::NoCa;
        params.subject_alt_names = vec![SanType::DnsName(dns_name)];
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::CrlSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + Duration::days(CERTIFICATE_VALIDITY_DAYS);

        let leaf_key = KeyPair::generate().map_err(|e| TlsStoreError::LeafSigningFailed {
            host: host.to_string(),
            source: e.to_string(),
        })?;
        let leaf_cert = params
            .signed_by(&leaf_key, &self.ca_cert, &self.ca_key)
            .map_err(|e| TlsStoreError::LeafSigningFailed {
                host: host.to_string(),
                source: e.to_string(),
            })?;

        let cert_der = leaf_cert.der().clone();
        let chain = vec![cert_der.clone()];
        let key_der: PrivateKeyDer<'static> =
            PrivatePkcs8KeyDer::from(leaf_key.serialize_der()).into();

        let mut server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(chain, key_der)
            .map_err(|e| TlsStoreError::LeafSigningFailed {
                host: host.to_string(),
                source: e.to_string(),
            })?;
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        info!(host, "minted leaf certificate");

        Ok(Arc::new(LeafRecord {
            cert_der,
            server_config: Arc::new(server_config),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_subject() -> CaSubject {
        CaSubject {
            country: "US".into(),
            state: "California".into(),
            locality: "San Francisco".into(),
            organization: "Test CA Org".into(),
            common_name: "Test CA".into(),
        }
    }

    #[tokio::test]
    async fn mints_leaf_lazily_and_caches_it() {
        let store = TlsStore::generate_ca(&test_subject()).unwrap();
        let first = store.leaf_record("example.com").await.unwrap();
        let second = store.leaf_record("example.com").await.unwrap();
        assert_eq!(first.cert_der, second.cert_der);
    }

    #[tokio::test]
    async fn different_hosts_get_different_leaves() {
        let store = TlsStore::generate_ca(&test_subject()).unwrap();
        let a = store.leaf_record("a.example.com").await.unwrap();
        let b = store.leaf_record("b.example.com").await.unwrap();
        assert_ne!(a.cert_der, b.cert_der);
    }

    #[tokio::test]
    async fn leaf_contains_requested_san() {
        let store = TlsStore::generate_ca(&test_subject()).unwrap();
        let leaf = store.leaf_record("my-host.example").await.unwrap();
        let (_, cert) = x509_parser::parse_x509_certificate(leaf.cert_der.as_ref()).unwrap();
        let san = cert
            .subject_alternative_name()
            .unwrap()
            .expect("SAN extension present")
            .value
            .general_names
            .iter()
            .find_map(|name| match name {
                x509_parser::extensions::GeneralName::DNSName(dns) => Some(*dns),
                _ => None,
            });
        assert_eq!(san, Some("my-host.example"));
    }

    #[test]
    fn save_and_load_round_trips_ca_pem() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("ca-key.pem");
        let cert_path = dir.path().join("ca-cert.pem");

        let original = TlsStore::generate_ca(&test_subject()).unwrap();
        original.save_ca(&key_path, &cert_path).unwrap();

        let key_pem = std::fs::read_to_string(&key_path).unwrap();
        let cert_pem = std::fs::read_to_string(&cert_path).unwrap();
        let loaded = TlsStore::load_ca(&key_pem, &cert_pem).unwrap();

        assert_eq!(original.ca_pem(), loaded.ca_pem());
    }

    #[test]
    fn load_ca_rejects_non_ec_key() {
        // An RSA key (not EC) should be rejected outright.
        let rsa_key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_RSA_SHA256);
        let Ok(rsa_key_pair) = rsa_key_pair else {
            // Some builds may not support RSA keygen; skip rather than false-fail.
            return;
        };
        let key_pem = rsa_key_pair.serialize_pem();

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "RSA CA");
        let mut params = CertificateParams::default();
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&rsa_key_pair).unwrap();
        let cert_pem = cert.pem();

        assert!(TlsStore::load_ca(&key_pem, &cert_pem).is_err());
    }
}
