//! CertificateVerify signature checking (RFC 8446 §4.4.3).

use ferrotls_crypto::PublicKey;
use ferrotls_types::TlsError;

use crate::crypt::SignatureScheme;

const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";
const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

/// The signed content: 64 spaces || context string || 0x00 || transcript hash.
pub fn build_verify_content(transcript_hash: &[u8], is_server: bool) -> Vec<u8> {
    let context = if is_server {
        SERVER_CONTEXT
    } else {
        CLIENT_CONTEXT
    };
    let mut content = Vec::with_capacity(64 + context.len() + 1 + transcript_hash.len());
    content.extend_from_slice(&[0x20u8; 64]);
    content.extend_from_slice(context);
    content.push(0x00);
    content.extend_from_slice(transcript_hash);
    content
}

/// The scheme a key signs under, or None if the engine cannot use it.
pub fn scheme_for_key(key: &PublicKey) -> SignatureScheme {
    match key {
        PublicKey::Ed25519(_) => SignatureScheme::ED25519,
        PublicKey::EcdsaP256(_) => SignatureScheme::ECDSA_SECP256R1_SHA256,
    }
}

/// Verify a CertificateVerify signature against the peer's leaf key.
///
/// A mismatched scheme or a bad signature is a decrypt_error (alert 51).
pub fn verify_certificate_verify(
    key: &PublicKey,
    scheme: SignatureScheme,
    signature: &[u8],
    transcript_hash: &[u8],
    is_server: bool,
) -> Result<(), TlsError> {
    if scheme != scheme_for_key(key) {
        return Err(TlsError::DecryptError(format!(
            "CertificateVerify scheme 0x{:04x} does not match key",
            scheme.0
        )));
    }
    let content = build_verify_content(transcript_hash, is_server);
    key.verify(&content, signature)
        .map_err(|_| TlsError::DecryptError("CertificateVerify signature invalid".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrotls_crypto::{RngSource, SigningKey};

    #[test]
    fn test_verify_content_layout() {
        let content = build_verify_content(&[0xAB; 32], true);
        assert_eq!(&content[..64], &[0x20; 64]);
        assert_eq!(&content[64..64 + SERVER_CONTEXT.len()], SERVER_CONTEXT);
        assert_eq!(content[64 + SERVER_CONTEXT.len()], 0x00);
        assert_eq!(&content[64 + SERVER_CONTEXT.len() + 1..], &[0xAB; 32]);
    }

    #[test]
    fn test_sign_verify_roundtrip_ed25519() {
        let key = SigningKey::generate_ed25519(&RngSource::seeded([5; 32])).unwrap();
        let hash = [0xCD; 32];
        let sig = key.sign(&build_verify_content(&hash, true));
        verify_certificate_verify(&key.public_key(), SignatureScheme::ED25519, &sig, &hash, true)
            .unwrap();

        // Wrong role context fails.
        let err = verify_certificate_verify(
            &key.public_key(),
            SignatureScheme::ED25519,
            &sig,
            &hash,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::DecryptError(_)));
    }

    #[test]
    fn test_sign_verify_roundtrip_ecdsa() {
        let key = SigningKey::generate_ecdsa_p256(&RngSource::system()).unwrap();
        let hash = [0x11; 32];
        let sig = key.sign(&build_verify_content(&hash, false));
        verify_certificate_verify(
            &key.public_key(),
            SignatureScheme::ECDSA_SECP256R1_SHA256,
            &sig,
            &hash,
            false,
        )
        .unwrap();
    }

    #[test]
    fn test_scheme_mismatch_is_decrypt_error() {
        let key = SigningKey::generate_ed25519(&RngSource::seeded([6; 32])).unwrap();
        let err = verify_certificate_verify(
            &key.public_key(),
            SignatureScheme::ECDSA_SECP256R1_SHA256,
            &[0; 64],
            &[0; 32],
            true,
        )
        .unwrap_err();
        assert_eq!(err.alert_code(), Some(51));
    }

    #[test]
    fn test_tampered_signature_is_decrypt_error() {
        let key = SigningKey::generate_ed25519(&RngSource::seeded([7; 32])).unwrap();
        let hash = [0xEE; 32];
        let mut sig = key.sign(&build_verify_content(&hash, true));
        sig[10] ^= 0x01;
        let err = verify_certificate_verify(
            &key.public_key(),
            SignatureScheme::ED25519,
            &sig,
            &hash,
            true,
        )
        .unwrap_err();
        assert_eq!(err.alert_code(), Some(51));
    }
}
