//! Per-role configuration records and the chain-validation boundary.
//!
//! X.509 parsing and path building stay outside the engine: a
//! [`ChainVerifier`] receives the peer's raw chain and answers with the
//! leaf public key the handshake signature checks will use, or a
//! rejection reason. [`PinnedKeyVerifier`] covers tests and key-pinning
//! deployments without pulling in a certificate stack.

use std::fmt;
use std::sync::Arc;

use ferrotls_crypto::{PublicKey, SigningKey};
use ferrotls_types::TlsError;

use crate::crypt::{NamedGroup, SignatureScheme};
use crate::session::{NoopSessionManager, SessionData, SessionManager};
use crate::{CipherSuite, TlsRole, TlsVersion};

/// NSS-format key log sink (one line per secret).
pub type KeyLogCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Validates a peer certificate chain.
pub trait ChainVerifier: Send + Sync {
    /// Validate `chain` (DER, leaf first) and return the leaf public key.
    ///
    /// An implementation may accept a chain the engine could not have
    /// validated itself; the CertificateVerify signature check still
    /// runs against the returned key and closes the connection on
    /// mismatch.
    fn verify_chain(
        &self,
        chain: &[Vec<u8>],
        server_name: Option<&str>,
    ) -> Result<PublicKey, TlsError>;
}

/// Accepts any chain whose claimed leaf key equals the pinned key.
pub struct PinnedKeyVerifier {
    key: PublicKey,
}

impl PinnedKeyVerifier {
    pub fn new(key: PublicKey) -> Self {
        Self { key }
    }
}

impl ChainVerifier for PinnedKeyVerifier {
    fn verify_chain(
        &self,
        chain: &[Vec<u8>],
        _server_name: Option<&str>,
    ) -> Result<PublicKey, TlsError> {
        if chain.is_empty() {
            return Err(TlsError::CertificateInvalid("empty chain".into()));
        }
        Ok(self.key.clone())
    }
}

/// Debug-only knobs: deterministic randomness and key logging.
#[derive(Clone, Default)]
pub struct DebugOptions {
    /// Seed the handshake RNG for reproducible runs. Never set this on
    /// a real connection.
    pub rng_seed: Option<[u8; 32]>,
    /// NSS key log callback (SSLKEYLOGFILE lines).
    pub key_log: Option<KeyLogCallback>,
}

impl fmt::Debug for DebugOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugOptions")
            .field("rng_seed", &self.rng_seed.is_some())
            .field("key_log", &self.key_log.is_some())
            .finish()
    }
}

fn default_versions() -> Vec<TlsVersion> {
    vec![TlsVersion::Tls13, TlsVersion::Tls12]
}

fn default_cipher_suites() -> Vec<CipherSuite> {
    vec![
        CipherSuite::TLS_AES_128_GCM_SHA256,
        CipherSuite::TLS_AES_256_GCM_SHA384,
        CipherSuite::TLS_CHACHA20_POLY1305_SHA256,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
        CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
    ]
}

fn default_groups() -> Vec<NamedGroup> {
    vec![NamedGroup::X25519, NamedGroup::SECP256R1]
}

fn default_signature_schemes() -> Vec<SignatureScheme> {
    vec![
        SignatureScheme::ED25519,
        SignatureScheme::ECDSA_SECP256R1_SHA256,
    ]
}

/// Client-side parameters.
#[derive(Clone)]
pub struct ClientConfig {
    /// Supported versions, preference order.
    pub versions: Vec<TlsVersion>,
    /// Cipher suite preference order (1.3 and 1.2 suites mixed).
    pub cipher_suites: Vec<CipherSuite>,
    pub supported_groups: Vec<NamedGroup>,
    pub signature_schemes: Vec<SignatureScheme>,
    /// SNI host name, also passed to the chain verifier.
    pub server_name: Option<String>,
    /// ALPN protocols, preference order.
    pub alpn: Vec<Vec<u8>>,
    /// Server chain validation. `None` with `verify_peer` set fails the
    /// handshake at Certificate time.
    pub verifier: Option<Arc<dyn ChainVerifier>>,
    /// Whether to authenticate the server at all.
    pub verify_peer: bool,
    /// Client certificate chain for mTLS (DER, leaf first).
    pub certificate_chain: Vec<Vec<u8>>,
    /// Signing key matching the chain's leaf.
    pub signing_key: Option<Arc<SigningKey>>,
    pub session_manager: Arc<dyn SessionManager>,
    /// Session to offer for resumption: lookup key (ID or ticket) plus data.
    pub resume_session: Option<(Vec<u8>, SessionData)>,
    /// Offer the extended master secret extension (RFC 7627) on TLS 1.2.
    pub extended_master_secret: bool,
    pub debug: DebugOptions,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("versions", &self.versions)
            .field("cipher_suites", &self.cipher_suites)
            .field("server_name", &self.server_name)
            .field("verify_peer", &self.verify_peer)
            .field("resume_session", &self.resume_session.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self {
            config: ClientConfig {
                versions: default_versions(),
                cipher_suites: default_cipher_suites(),
                supported_groups: default_groups(),
                signature_schemes: default_signature_schemes(),
                server_name: None,
                alpn: Vec::new(),
                verifier: None,
                verify_peer: true,
                certificate_chain: Vec::new(),
                signing_key: None,
                session_manager: Arc::new(NoopSessionManager),
                resume_session: None,
                extended_master_secret: true,
                debug: DebugOptions::default(),
            },
        }
    }
}

impl ClientConfigBuilder {
    pub fn versions(mut self, versions: &[TlsVersion]) -> Self {
        self.config.versions = versions.to_vec();
        self
    }

    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.config.cipher_suites = suites.to_vec();
        self
    }

    pub fn supported_groups(mut self, groups: &[NamedGroup]) -> Self {
        self.config.supported_groups = groups.to_vec();
        self
    }

    pub fn signature_schemes(mut self, schemes: &[SignatureScheme]) -> Self {
        self.config.signature_schemes = schemes.to_vec();
        self
    }

    pub fn server_name(mut self, name: &str) -> Self {
        self.config.server_name = Some(name.to_string());
        self
    }

    pub fn alpn(mut self, protocols: &[&[u8]]) -> Self {
        self.config.alpn = protocols.iter().map(|p| p.to_vec()).collect();
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn ChainVerifier>) -> Self {
        self.config.verifier = Some(verifier);
        self
    }

    /// Skip server authentication entirely. Test harnesses only.
    pub fn danger_disable_verification(mut self) -> Self {
        self.config.verify_peer = false;
        self
    }

    pub fn client_identity(mut self, chain: Vec<Vec<u8>>, key: SigningKey) -> Self {
        self.config.certificate_chain = chain;
        self.config.signing_key = Some(Arc::new(key));
        self
    }

    pub fn session_manager(mut self, manager: Arc<dyn SessionManager>) -> Self {
        self.config.session_manager = manager;
        self
    }

    pub fn resume_session(mut self, id: Vec<u8>, data: SessionData) -> Self {
        self.config.resume_session = Some((id, data));
        self
    }

    pub fn extended_master_secret(mut self, enabled: bool) -> Self {
        self.config.extended_master_secret = enabled;
        self
    }

    pub fn rng_seed(mut self, seed: [u8; 32]) -> Self {
        self.config.debug.rng_seed = Some(seed);
        self
    }

    pub fn key_log(mut self, callback: KeyLogCallback) -> Self {
        self.config.debug.key_log = Some(callback);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Server-side parameters.
#[derive(Clone)]
pub struct ServerConfig {
    pub versions: Vec<TlsVersion>,
    /// Cipher suite preference order; the server's order wins.
    pub cipher_suites: Vec<CipherSuite>,
    pub supported_groups: Vec<NamedGroup>,
    pub signature_schemes: Vec<SignatureScheme>,
    /// Certificate chain presented to clients (DER, leaf first).
    pub certificate_chain: Vec<Vec<u8>>,
    /// Signing key matching the chain's leaf.
    pub signing_key: Arc<SigningKey>,
    pub alpn: Vec<Vec<u8>>,
    /// Request and validate client certificates.
    pub client_cert_verifier: Option<Arc<dyn ChainVerifier>>,
    /// Refuse clients that present no certificate.
    pub require_client_cert: bool,
    pub session_manager: Arc<dyn SessionManager>,
    pub extended_master_secret: bool,
    /// TLS 1.3 session tickets issued after each handshake.
    pub tickets_issued: u8,
    pub debug: DebugOptions,
}

impl ServerConfig {
    /// A server needs at least an identity; everything else has defaults.
    pub fn builder(certificate_chain: Vec<Vec<u8>>, signing_key: SigningKey) -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: ServerConfig {
                versions: default_versions(),
                cipher_suites: default_cipher_suites(),
                supported_groups: default_groups(),
                signature_schemes: default_signature_schemes(),
                certificate_chain,
                signing_key: Arc::new(signing_key),
                alpn: Vec::new(),
                client_cert_verifier: None,
                require_client_cert: false,
                session_manager: Arc::new(NoopSessionManager),
                extended_master_secret: true,
                tickets_issued: 1,
                debug: DebugOptions::default(),
            },
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("versions", &self.versions)
            .field("cipher_suites", &self.cipher_suites)
            .field("certificate_chain", &self.certificate_chain.len())
            .field("require_client_cert", &self.require_client_cert)
            .field("tickets_issued", &self.tickets_issued)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ServerConfig`].
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn versions(mut self, versions: &[TlsVersion]) -> Self {
        self.config.versions = versions.to_vec();
        self
    }

    pub fn cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.config.cipher_suites = suites.to_vec();
        self
    }

    pub fn supported_groups(mut self, groups: &[NamedGroup]) -> Self {
        self.config.supported_groups = groups.to_vec();
        self
    }

    pub fn signature_schemes(mut self, schemes: &[SignatureScheme]) -> Self {
        self.config.signature_schemes = schemes.to_vec();
        self
    }

    pub fn alpn(mut self, protocols: &[&[u8]]) -> Self {
        self.config.alpn = protocols.iter().map(|p| p.to_vec()).collect();
        self
    }

    pub fn client_cert_verifier(mut self, verifier: Arc<dyn ChainVerifier>) -> Self {
        self.config.client_cert_verifier = Some(verifier);
        self
    }

    pub fn require_client_cert(mut self, required: bool) -> Self {
        self.config.require_client_cert = required;
        self
    }

    pub fn session_manager(mut self, manager: Arc<dyn SessionManager>) -> Self {
        self.config.session_manager = manager;
        self
    }

    pub fn extended_master_secret(mut self, enabled: bool) -> Self {
        self.config.extended_master_secret = enabled;
        self
    }

    pub fn tickets_issued(mut self, count: u8) -> Self {
        self.config.tickets_issued = count;
        self
    }

    pub fn rng_seed(mut self, seed: [u8; 32]) -> Self {
        self.config.debug.rng_seed = Some(seed);
        self
    }

    pub fn key_log(mut self, callback: KeyLogCallback) -> Self {
        self.config.debug.key_log = Some(callback);
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Role-tagged parameters handed to `TlsContext::new`.
#[derive(Clone, Debug)]
pub enum TlsParams {
    Client(Arc<ClientConfig>),
    Server(Arc<ServerConfig>),
}

impl TlsParams {
    pub fn role(&self) -> TlsRole {
        match self {
            TlsParams::Client(_) => TlsRole::Client,
            TlsParams::Server(_) => TlsRole::Server,
        }
    }

    pub fn debug(&self) -> &DebugOptions {
        match self {
            TlsParams::Client(c) => &c.debug,
            TlsParams::Server(s) => &s.debug,
        }
    }

    pub fn session_manager(&self) -> &Arc<dyn SessionManager> {
        match self {
            TlsParams::Client(c) => &c.session_manager,
            TlsParams::Server(s) => &s.session_manager,
        }
    }
}

impl From<ClientConfig> for TlsParams {
    fn from(config: ClientConfig) -> Self {
        TlsParams::Client(Arc::new(config))
    }
}

impl From<ServerConfig> for TlsParams {
    fn from(config: ServerConfig) -> Self {
        TlsParams::Server(Arc::new(config))
    }
}
