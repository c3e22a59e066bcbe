//! Handshake signatures: Ed25519 and ECDSA-P256.
//!
//! Ed25519 signs the raw message; ECDSA-P256 signs the SHA-256 digest
//! and uses ASN.1 DER signature encoding, matching the TLS
//! `ecdsa_secp256r1_sha256` scheme.

use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier as _;
use ferrotls_types::CryptoError;
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use zeroize::Zeroize;

use crate::rand::RngSource;

/// A private signing key for CertificateVerify / ServerKeyExchange.
pub enum SigningKey {
    Ed25519(ed25519_dalek::SigningKey),
    EcdsaP256(p256::ecdsa::SigningKey),
}

/// The matching public key, in its wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// 32-byte Ed25519 point.
    Ed25519([u8; 32]),
    /// Uncompressed SEC1 point (65 bytes).
    EcdsaP256(Vec<u8>),
}

impl SigningKey {
    /// Build an Ed25519 key from its 32-byte seed.
    pub fn ed25519_from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            got: seed.len(),
        })?;
        Ok(SigningKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
            &seed,
        )))
    }

    /// Build an ECDSA-P256 key from its 32-byte big-endian scalar.
    pub fn ecdsa_p256_from_bytes(scalar: &[u8]) -> Result<Self, CryptoError> {
        let key = p256::ecdsa::SigningKey::from_slice(scalar)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(SigningKey::EcdsaP256(key))
    }

    /// Generate a fresh Ed25519 key.
    pub fn generate_ed25519(rng: &RngSource) -> Result<Self, CryptoError> {
        let mut seed: [u8; 32] = rng.random_array()?;
        let key = SigningKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed));
        seed.zeroize();
        Ok(key)
    }

    /// Generate a fresh ECDSA-P256 key.
    pub fn generate_ecdsa_p256(rng: &RngSource) -> Result<Self, CryptoError> {
        loop {
            let mut seed: [u8; 32] = rng.random_array()?;
            let candidate = p256::ecdsa::SigningKey::from_slice(&seed);
            seed.zeroize();
            if let Ok(key) = candidate {
                return Ok(SigningKey::EcdsaP256(key));
            }
        }
    }

    /// The corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            SigningKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key().to_bytes()),
            SigningKey::EcdsaP256(key) => {
                use p256::elliptic_curve::sec1::ToEncodedPoint;
                let point = key.verifying_key().to_encoded_point(false);
                PublicKey::EcdsaP256(point.as_bytes().to_vec())
            }
        }
    }

    /// Sign `message`, returning the signature's wire encoding.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SigningKey::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
            SigningKey::EcdsaP256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(message);
                sig.to_der().as_bytes().to_vec()
            }
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SigningKey::Ed25519(_) => f.write_str("SigningKey::Ed25519"),
            SigningKey::EcdsaP256(_) => f.write_str("SigningKey::EcdsaP256"),
        }
    }
}

impl PublicKey {
    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        match self {
            PublicKey::Ed25519(point) => {
                let key = ed25519_dalek::VerifyingKey::from_bytes(point)
                    .map_err(|_| CryptoError::InvalidPublicKey)?;
                let sig_bytes: [u8; 64] = signature
                    .try_into()
                    .map_err(|_| CryptoError::InvalidSignature)?;
                let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
                key.verify(message, &sig)
                    .map_err(|_| CryptoError::VerifyFailed)
            }
            PublicKey::EcdsaP256(point) => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
                    .map_err(|_| CryptoError::InvalidPublicKey)?;
                let sig = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| CryptoError::InvalidSignature)?;
                key.verify(message, &sig)
                    .map_err(|_| CryptoError::VerifyFailed)
            }
        }
    }
}
