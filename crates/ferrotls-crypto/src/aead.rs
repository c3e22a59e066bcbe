//! AEAD ciphers behind a common trait.
//!
//! Backed by `aes-gcm` and `chacha20poly1305`. Sealing returns
//! `ciphertext || tag`; opening expects the same layout.

use aes_gcm::aead::{Aead as _, KeyInit, Payload};
use ferrotls_types::CryptoError;

/// AEAD algorithms used by TLS cipher suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    pub fn key_len(&self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm => 16,
            AeadAlgorithm::Aes256Gcm | AeadAlgorithm::ChaCha20Poly1305 => 32,
        }
    }

    pub fn tag_len(&self) -> usize {
        16
    }

    pub fn nonce_len(&self) -> usize {
        12
    }
}

/// TLS record-layer AEAD operations.
pub trait Aead: Send + Sync {
    /// Encrypt `plaintext`, returning `ciphertext || tag`.
    fn seal(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt `ciphertext || tag`, returning the plaintext.
    fn open(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn tag_len(&self) -> usize;
}

struct Aes128GcmAead(aes_gcm::Aes128Gcm);
struct Aes256GcmAead(aes_gcm::Aes256Gcm);
struct ChaCha20Poly1305Aead(chacha20poly1305::ChaCha20Poly1305);

macro_rules! impl_aead {
    ($ty:ty, $nonce:path) => {
        impl Aead for $ty {
            fn seal(
                &self,
                nonce: &[u8],
                aad: &[u8],
                plaintext: &[u8],
            ) -> Result<Vec<u8>, CryptoError> {
                if nonce.len() != 12 {
                    return Err(CryptoError::InvalidKeyLength {
                        expected: 12,
                        got: nonce.len(),
                    });
                }
                self.0
                    .encrypt(<$nonce>::from_slice(nonce), Payload { msg: plaintext, aad })
                    .map_err(|_| CryptoError::AeadTagMismatch)
            }

            fn open(
                &self,
                nonce: &[u8],
                aad: &[u8],
                ciphertext: &[u8],
            ) -> Result<Vec<u8>, CryptoError> {
                if nonce.len() != 12 {
                    return Err(CryptoError::InvalidKeyLength {
                        expected: 12,
                        got: nonce.len(),
                    });
                }
                self.0
                    .decrypt(<$nonce>::from_slice(nonce), Payload { msg: ciphertext, aad })
                    .map_err(|_| CryptoError::AeadTagMismatch)
            }

            fn tag_len(&self) -> usize {
                16
            }
        }
    };
}

impl_aead!(Aes128GcmAead, aes_gcm::Nonce<aes_gcm::aead::consts::U12>);
impl_aead!(Aes256GcmAead, aes_gcm::Nonce<aes_gcm::aead::consts::U12>);
impl_aead!(ChaCha20Poly1305Aead, chacha20poly1305::Nonce);

/// Instantiate an AEAD cipher for the given algorithm and key.
pub fn new_aead(algorithm: AeadAlgorithm, key: &[u8]) -> Result<Box<dyn Aead>, CryptoError> {
    if key.len() != algorithm.key_len() {
        return Err(CryptoError::InvalidKeyLength {
            expected: algorithm.key_len(),
            got: key.len(),
        });
    }
    Ok(match algorithm {
        AeadAlgorithm::Aes128Gcm => Box::new(Aes128GcmAead(
            aes_gcm::Aes128Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
                expected: 16,
                got: key.len(),
            })?,
        )),
        AeadAlgorithm::Aes256Gcm => Box::new(Aes256GcmAead(
            aes_gcm::Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                got: key.len(),
            })?,
        )),
        AeadAlgorithm::ChaCha20Poly1305 => Box::new(ChaCha20Poly1305Aead(
            chacha20poly1305::ChaCha20Poly1305::new_from_slice(key).map_err(|_| {
                CryptoError::InvalidKeyLength {
                    expected: 32,
                    got: key.len(),
                }
            })?,
        )),
    })
}
