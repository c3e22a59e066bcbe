//! Cryptographic plumbing for the protocol engine.
//!
//! Bridges the state machines to the `ferrotls-crypto` provider: cipher
//! suite parameter tables, the two key schedules, transcript hash,
//! traffic-key derivation, exporters, and key logging.

pub mod export;
pub mod hkdf;
pub mod key_schedule;
pub mod key_schedule12;
pub mod keylog;
pub mod prf;
pub mod traffic_keys;
pub mod transcript;

use ferrotls_crypto::{AeadAlgorithm, HashAlgorithm, KexGroup};
use ferrotls_types::TlsError;

use crate::CipherSuite;

/// TLS named group identifiers (for key exchange).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedGroup(pub u16);

impl NamedGroup {
    pub const SECP256R1: Self = Self(0x0017);
    pub const SECP384R1: Self = Self(0x0018);
    pub const X25519: Self = Self(0x001D);
    pub const X448: Self = Self(0x001E);

    /// Map to the provider group, if this engine can run it.
    pub fn kex_group(&self) -> Option<KexGroup> {
        match *self {
            NamedGroup::X25519 => Some(KexGroup::X25519),
            NamedGroup::SECP256R1 => Some(KexGroup::Secp256r1),
            _ => None,
        }
    }
}

/// TLS signature scheme identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureScheme(pub u16);

impl SignatureScheme {
    pub const RSA_PKCS1_SHA256: Self = Self(0x0401);
    pub const ECDSA_SECP256R1_SHA256: Self = Self(0x0403);
    pub const RSA_PSS_RSAE_SHA256: Self = Self(0x0804);
    pub const ED25519: Self = Self(0x0807);
}

/// Parameters of a TLS 1.3 cipher suite: AEAD plus hash.
#[derive(Debug, Clone, Copy)]
pub struct CipherSuiteParams {
    pub suite: CipherSuite,
    pub hash: HashAlgorithm,
    pub aead: AeadAlgorithm,
}

impl CipherSuiteParams {
    /// Look up parameters for a TLS 1.3 cipher suite.
    pub fn from_suite(suite: CipherSuite) -> Result<Self, TlsError> {
        let (hash, aead) = match suite {
            CipherSuite::TLS_AES_128_GCM_SHA256 => {
                (HashAlgorithm::Sha256, AeadAlgorithm::Aes128Gcm)
            }
            CipherSuite::TLS_AES_256_GCM_SHA384 => {
                (HashAlgorithm::Sha384, AeadAlgorithm::Aes256Gcm)
            }
            CipherSuite::TLS_CHACHA20_POLY1305_SHA256 => {
                (HashAlgorithm::Sha256, AeadAlgorithm::ChaCha20Poly1305)
            }
            _ => {
                return Err(TlsError::HandshakeFailure(format!(
                    "not a TLS 1.3 cipher suite: 0x{:04x}",
                    suite.0
                )))
            }
        };
        Ok(Self { suite, hash, aead })
    }

    pub fn hash_len(&self) -> usize {
        self.hash.output_len()
    }
}

/// Peer authentication algorithm of a TLS 1.2 ECDHE suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlg {
    Rsa,
    Ecdsa,
}

/// Parameters of a TLS 1.2 cipher suite.
///
/// Only forward-secret ECDHE AEAD suites are supported; `mac_key_len`
/// stays in the key-block partitioning for the general layout but is 0
/// for every suite this engine runs.
#[derive(Debug, Clone, Copy)]
pub struct Tls12CipherSuiteParams {
    pub suite: CipherSuite,
    pub auth: AuthAlg,
    pub hash: HashAlgorithm,
    pub aead: AeadAlgorithm,
    pub mac_key_len: usize,
    /// Fixed IV portion from the key block (4 for GCM/ChaCha20 here).
    pub fixed_iv_len: usize,
    /// Explicit per-record nonce length (8 for GCM, 0 for ChaCha20).
    pub record_iv_len: usize,
}

impl Tls12CipherSuiteParams {
    /// Look up parameters for a TLS 1.2 cipher suite.
    pub fn from_suite(suite: CipherSuite) -> Result<Self, TlsError> {
        let (auth, hash, aead, fixed_iv_len, record_iv_len) = match suite {
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256 => (
                AuthAlg::Rsa,
                HashAlgorithm::Sha256,
                AeadAlgorithm::Aes128Gcm,
                4,
                8,
            ),
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256 => (
                AuthAlg::Ecdsa,
                HashAlgorithm::Sha256,
                AeadAlgorithm::Aes128Gcm,
                4,
                8,
            ),
            CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384 => (
                AuthAlg::Rsa,
                HashAlgorithm::Sha384,
                AeadAlgorithm::Aes256Gcm,
                4,
                8,
            ),
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384 => (
                AuthAlg::Ecdsa,
                HashAlgorithm::Sha384,
                AeadAlgorithm::Aes256Gcm,
                4,
                8,
            ),
            CipherSuite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256 => (
                AuthAlg::Rsa,
                HashAlgorithm::Sha256,
                AeadAlgorithm::ChaCha20Poly1305,
                12,
                0,
            ),
            CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256 => (
                AuthAlg::Ecdsa,
                HashAlgorithm::Sha256,
                AeadAlgorithm::ChaCha20Poly1305,
                12,
                0,
            ),
            _ => {
                return Err(TlsError::HandshakeFailure(format!(
                    "not a supported TLS 1.2 cipher suite: 0x{:04x}",
                    suite.0
                )))
            }
        };
        Ok(Self {
            suite,
            auth,
            hash,
            aead,
            mac_key_len: 0,
            fixed_iv_len,
            record_iv_len,
        })
    }

    pub fn key_len(&self) -> usize {
        self.aead.key_len()
    }

    /// Total key material needed from the key block:
    /// `2*mac_key + 2*enc_key + 2*fixed_iv`.
    pub fn key_block_len(&self) -> usize {
        2 * self.mac_key_len + 2 * self.key_len() + 2 * self.fixed_iv_len
    }
}

/// Returns true if the cipher suite is a TLS 1.3 suite.
pub fn is_tls13_suite(suite: CipherSuite) -> bool {
    CipherSuiteParams::from_suite(suite).is_ok()
}

/// Returns true if the cipher suite is a supported TLS 1.2 suite.
pub fn is_tls12_suite(suite: CipherSuite) -> bool {
    Tls12CipherSuiteParams::from_suite(suite).is_ok()
}
