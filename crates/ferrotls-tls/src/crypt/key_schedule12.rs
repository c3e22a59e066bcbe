//! TLS 1.2 key derivation (RFC 5246 §6.3, §8.1; RFC 7627).

use ferrotls_crypto::HashAlgorithm;
use zeroize::Zeroize;

use super::prf::prf;
use super::Tls12CipherSuiteParams;

/// TLS 1.2 key block, partitioned per direction.
///
/// MAC keys come first per RFC 5246 §6.3; they are empty for the AEAD
/// suites this engine runs.
pub struct Tls12KeyBlock {
    pub client_write_mac_key: Vec<u8>,
    pub server_write_mac_key: Vec<u8>,
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: Vec<u8>,
    pub server_write_iv: Vec<u8>,
}

impl Drop for Tls12KeyBlock {
    fn drop(&mut self) {
        self.client_write_mac_key.zeroize();
        self.server_write_mac_key.zeroize();
        self.client_write_key.zeroize();
        self.server_write_key.zeroize();
        self.client_write_iv.zeroize();
        self.server_write_iv.zeroize();
    }
}

/// `master_secret = PRF(pms, "master secret", client_random || server_random, 48)`.
pub fn derive_master_secret(
    hash: HashAlgorithm,
    pre_master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Vec<u8> {
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    prf(hash, pre_master_secret, "master secret", &seed, 48)
}

/// Extended master secret (RFC 7627):
/// `master_secret = PRF(pms, "extended master secret", session_hash, 48)`.
///
/// `session_hash` covers every handshake message up to and including
/// the ClientKeyExchange.
pub fn derive_extended_master_secret(
    hash: HashAlgorithm,
    pre_master_secret: &[u8],
    session_hash: &[u8],
) -> Vec<u8> {
    prf(hash, pre_master_secret, "extended master secret", session_hash, 48)
}

/// `key_block = PRF(master, "key expansion", server_random || client_random)`,
/// partitioned MAC keys → write keys → IVs.
pub fn derive_key_block(
    master_secret: &[u8],
    server_random: &[u8; 32],
    client_random: &[u8; 32],
    params: &Tls12CipherSuiteParams,
) -> Tls12KeyBlock {
    // Seed order is reversed relative to master-secret derivation.
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    let mut key_block = prf(
        params.hash,
        master_secret,
        "key expansion",
        &seed,
        params.key_block_len(),
    );

    let mut offset = 0;
    let mut take = |len: usize| {
        let part = key_block[offset..offset + len].to_vec();
        offset += len;
        part
    };
    let client_write_mac_key = take(params.mac_key_len);
    let server_write_mac_key = take(params.mac_key_len);
    let client_write_key = take(params.key_len());
    let server_write_key = take(params.key_len());
    let client_write_iv = take(params.fixed_iv_len);
    let server_write_iv = take(params.fixed_iv_len);
    key_block.zeroize();

    Tls12KeyBlock {
        client_write_mac_key,
        server_write_mac_key,
        client_write_key,
        server_write_key,
        client_write_iv,
        server_write_iv,
    }
}

/// Finished verify_data (12 bytes):
/// `PRF(master, "client finished" | "server finished", handshake_hash, 12)`.
pub fn compute_verify_data(
    hash: HashAlgorithm,
    master_secret: &[u8],
    label: &str,
    handshake_hash: &[u8],
) -> Vec<u8> {
    prf(hash, master_secret, label, handshake_hash, 12)
}
