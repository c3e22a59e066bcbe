//! TLS 1.2 PRF (RFC 5246 §5).
//!
//! ```text
//! PRF(secret, label, seed) = P_<hash>(secret, label + seed)
//!
//! P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) ||
//!                        HMAC_hash(secret, A(2) + seed) || ...
//! A(0) = seed
//! A(i) = HMAC_hash(secret, A(i-1))
//! ```

use ferrotls_crypto::HashAlgorithm;

use super::hkdf::hmac;

/// TLS 1.2 PRF: derive `output_len` bytes from `secret`, `label`, `seed`.
pub fn prf(
    hash: HashAlgorithm,
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
) -> Vec<u8> {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label.as_bytes());
    label_seed.extend_from_slice(seed);
    p_hash(hash, secret, &label_seed, output_len)
}

fn p_hash(hash: HashAlgorithm, secret: &[u8], seed: &[u8], output_len: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(output_len);
    let mut a = seed.to_vec(); // A(0)

    while result.len() < output_len {
        a = hmac(hash, secret, &a); // A(i)
        let mut ai_seed = Vec::with_capacity(a.len() + seed.len());
        ai_seed.extend_from_slice(&a);
        ai_seed.extend_from_slice(seed);
        result.extend_from_slice(&hmac(hash, secret, &ai_seed));
    }

    result.truncate(output_len);
    result
}
