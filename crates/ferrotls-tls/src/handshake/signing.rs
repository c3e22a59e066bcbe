//! Handshake signing dispatch: CertificateVerify (TLS 1.3) and
//! ServerKeyExchange (TLS 1.2).

use ferrotls_crypto::{PublicKey, SigningKey};
use ferrotls_types::TlsError;

use crate::crypt::SignatureScheme;

use super::verify::build_verify_content;

/// The scheme a private key signs under.
pub fn scheme_for_signing_key(key: &SigningKey) -> SignatureScheme {
    match key {
        SigningKey::Ed25519(_) => SignatureScheme::ED25519,
        SigningKey::EcdsaP256(_) => SignatureScheme::ECDSA_SECP256R1_SHA256,
    }
}

/// Pick the scheme for our key, constrained by the peer's offered list.
pub fn select_signature_scheme(
    key: &SigningKey,
    peer_schemes: &[SignatureScheme],
) -> Result<SignatureScheme, TlsError> {
    let scheme = scheme_for_signing_key(key);
    if peer_schemes.contains(&scheme) {
        Ok(scheme)
    } else {
        Err(TlsError::HandshakeFailure(
            "no common signature scheme".into(),
        ))
    }
}

/// Sign TLS 1.3 CertificateVerify content for the given role.
pub fn sign_certificate_verify(
    key: &SigningKey,
    transcript_hash: &[u8],
    is_server: bool,
) -> Vec<u8> {
    key.sign(&build_verify_content(transcript_hash, is_server))
}

/// Sign TLS 1.2 ServerKeyExchange data
/// (`client_random || server_random || params`, pre-assembled).
pub fn sign_ske_data(key: &SigningKey, signed_data: &[u8]) -> Vec<u8> {
    key.sign(signed_data)
}

/// Verify a TLS 1.2 ServerKeyExchange signature. Failure is a
/// handshake_failure: the server failed to prove possession.
pub fn verify_ske_signature(
    key: &PublicKey,
    scheme: SignatureScheme,
    signed_data: &[u8],
    signature: &[u8],
) -> Result<(), TlsError> {
    if scheme != super::verify::scheme_for_key(key) {
        return Err(TlsError::HandshakeFailure(format!(
            "SKE scheme 0x{:04x} does not match server key",
            scheme.0
        )));
    }
    key.verify(signed_data, signature)
        .map_err(|_| TlsError::HandshakeFailure("ServerKeyExchange signature invalid".into()))
}
