//! HMAC and HKDF primitives (RFC 2104, RFC 5869, RFC 8446 §7.1).
//!
//! Implemented inline over the provider digest so one code path serves
//! both SHA-256 and SHA-384 suites.

use ferrotls_crypto::{Digest, HashAlgorithm};
use ferrotls_types::TlsError;
use zeroize::Zeroize;

/// Prepare the HMAC key block: hash if longer than the block size,
/// zero-pad otherwise.
fn prepare_key_block(hash: HashAlgorithm, key: &[u8]) -> Vec<u8> {
    let mut key_block = vec![0u8; hash.block_len()];
    if key.len() > hash.block_len() {
        let digest = hash.digest(key);
        key_block[..digest.len()].copy_from_slice(&digest);
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }
    key_block
}

/// One-shot HMAC: `HMAC(key, data)`.
pub fn hmac(hash: HashAlgorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut key_block = prepare_key_block(hash, key);

    // Inner: H((K XOR ipad) || data)
    let mut inner = Digest::new(hash);
    let ipad_key: Vec<u8> = key_block.iter().map(|b| b ^ 0x36).collect();
    inner.update(&ipad_key);
    inner.update(data);
    let mut inner_hash = inner.finish();

    // Outer: H((K XOR opad) || inner_hash)
    let mut outer = Digest::new(hash);
    let opad_key: Vec<u8> = key_block.iter().map(|b| b ^ 0x5c).collect();
    outer.update(&opad_key);
    outer.update(&inner_hash);
    let out = outer.finish();

    key_block.zeroize();
    inner_hash.zeroize();
    out
}

/// HKDF-Extract(salt, IKM) → PRK. Empty salt means `hash_len` zero bytes.
pub fn hkdf_extract(hash: HashAlgorithm, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
    if salt.is_empty() {
        let zero_salt = vec![0u8; hash.output_len()];
        hmac(hash, &zero_salt, ikm)
    } else {
        hmac(hash, salt, ikm)
    }
}

/// HKDF-Expand(PRK, info, length) → OKM, per RFC 5869.
pub fn hkdf_expand(
    hash: HashAlgorithm,
    prk: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, TlsError> {
    let hash_len = hash.output_len();
    let n = length.div_ceil(hash_len);
    if n > 255 {
        return Err(TlsError::InternalError(
            "HKDF-Expand: output length too large".into(),
        ));
    }

    let mut okm = Vec::with_capacity(length);
    let mut t_prev: Vec<u8> = Vec::new();
    for i in 1..=n {
        let mut block_input = Vec::with_capacity(t_prev.len() + info.len() + 1);
        block_input.extend_from_slice(&t_prev);
        block_input.extend_from_slice(info);
        block_input.push(i as u8);
        t_prev = hmac(hash, prk, &block_input);
        okm.extend_from_slice(&t_prev);
    }
    okm.truncate(length);
    Ok(okm)
}

/// Encode the HkdfLabel structure (RFC 8446 §7.1):
///
/// ```text
/// struct {
///     uint16 length;
///     opaque label<7..255>;   // "tls13 " + label
///     opaque context<0..255>;
/// } HkdfLabel;
/// ```
fn encode_hkdf_label(length: u16, label: &[u8], context: &[u8]) -> Vec<u8> {
    let full_label_len = 6 + label.len();
    let mut buf = Vec::with_capacity(4 + full_label_len + context.len());
    buf.extend_from_slice(&length.to_be_bytes());
    buf.push(full_label_len as u8);
    buf.extend_from_slice(b"tls13 ");
    buf.extend_from_slice(label);
    buf.push(context.len() as u8);
    buf.extend_from_slice(context);
    buf
}

/// HKDF-Expand-Label(Secret, Label, Context, Length).
pub fn hkdf_expand_label(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    length: usize,
) -> Result<Vec<u8>, TlsError> {
    let info = encode_hkdf_label(length as u16, label, context);
    hkdf_expand(hash, secret, &info, length)
}

/// Derive-Secret(Secret, Label, TranscriptHash) =
/// HKDF-Expand-Label(Secret, Label, TranscriptHash, Hash.length).
pub fn derive_secret(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>, TlsError> {
    hkdf_expand_label(hash, secret, label, transcript_hash, hash.output_len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    // RFC 5869 Test Case 1 (SHA-256)
    #[test]
    fn test_hkdf_extract_sha256() {
        let ikm = hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let salt = hex("000102030405060708090a0b0c");
        let prk = hkdf_extract(HashAlgorithm::Sha256, &salt, &ikm);
        assert_eq!(
            to_hex(&prk),
            "077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5"
        );
    }

    #[test]
    fn test_hkdf_expand_sha256() {
        let prk = hex("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5");
        let info = hex("f0f1f2f3f4f5f6f7f8f9");
        let okm = hkdf_expand(HashAlgorithm::Sha256, &prk, &info, 42).unwrap();
        assert_eq!(
            to_hex(&okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865"
        );
    }

    // RFC 5869 Test Case 3 (zero-length salt)
    #[test]
    fn test_hkdf_extract_empty_salt() {
        let ikm = hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let prk = hkdf_extract(HashAlgorithm::Sha256, &[], &ikm);
        assert_eq!(
            to_hex(&prk),
            "19ef24a32c717b167f33a91d6f648bdf96596776afdb6377ac434c1c293ccb04"
        );
    }

    // RFC 4231 Test Case 2
    #[test]
    fn test_hmac_sha256_vector() {
        let out = hmac(HashAlgorithm::Sha256, b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            to_hex(&out),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_long_key_is_hashed() {
        // Key longer than the 64-byte SHA-256 block gets hashed first.
        let long_key = vec![0xAA; 131];
        let out = hmac(HashAlgorithm::Sha256, &long_key, b"data");
        let hashed_key = HashAlgorithm::Sha256.digest(&long_key);
        assert_eq!(out, hmac(HashAlgorithm::Sha256, &hashed_key, b"data"));
    }

    #[test]
    fn test_encode_hkdf_label() {
        let label = encode_hkdf_label(16, b"key", b"");
        assert_eq!(label[..2], [0x00, 0x10]);
        assert_eq!(label[2], 0x09); // len("tls13 key")
        assert_eq!(&label[3..12], b"tls13 key");
        assert_eq!(label[12], 0x00);
        assert_eq!(label.len(), 13);
    }

    #[test]
    fn test_hkdf_expand_label_context_binding() {
        let secret = vec![0xAA; 32];
        let a = hkdf_expand_label(HashAlgorithm::Sha256, &secret, b"key", b"ctx-a", 16).unwrap();
        let b = hkdf_expand_label(HashAlgorithm::Sha256, &secret, b"key", b"ctx-b", 16).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_hkdf_expand_too_large() {
        let prk = vec![0x42; 32];
        assert!(hkdf_expand(HashAlgorithm::Sha256, &prk, b"", 255 * 32 + 1).is_err());
    }

    #[test]
    fn test_derive_secret_length_follows_hash() {
        let secret = vec![0xBB; 48];
        let transcript = vec![0xCC; 48];
        let out = derive_secret(HashAlgorithm::Sha384, &secret, b"c hs traffic", &transcript)
            .unwrap();
        assert_eq!(out.len(), 48);
    }
}
