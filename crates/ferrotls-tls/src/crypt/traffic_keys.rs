//! TLS 1.3 traffic key derivation: AEAD key + static IV from a traffic secret.

use ferrotls_types::TlsError;
use zeroize::Zeroize;

use super::hkdf::hkdf_expand_label;
use super::CipherSuiteParams;

/// Concrete traffic keys derived from a traffic secret.
#[derive(Debug)]
pub struct TrafficKeys {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl Drop for TrafficKeys {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

impl TrafficKeys {
    /// ```text
    /// key = HKDF-Expand-Label(secret, "key", "", key_length)
    /// iv  = HKDF-Expand-Label(secret, "iv", "", iv_length)
    /// ```
    pub fn derive(params: &CipherSuiteParams, traffic_secret: &[u8]) -> Result<Self, TlsError> {
        let key = hkdf_expand_label(
            params.hash,
            traffic_secret,
            b"key",
            b"",
            params.aead.key_len(),
        )?;
        let iv = hkdf_expand_label(
            params.hash,
            traffic_secret,
            b"iv",
            b"",
            params.aead.nonce_len(),
        )?;
        Ok(TrafficKeys { key, iv })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CipherSuite;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn to_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    // RFC 8448 Section 3: server handshake traffic keys.
    #[test]
    fn test_rfc8448_server_handshake_keys() {
        let params = CipherSuiteParams::from_suite(CipherSuite::TLS_AES_128_GCM_SHA256).unwrap();
        let secret = hex("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38");
        let tk = TrafficKeys::derive(&params, &secret).unwrap();
        assert_eq!(to_hex(&tk.key), "3fce516009c21727d0f2e4e86ee403bc");
        assert_eq!(to_hex(&tk.iv), "5d313eb2671276ee13000b30");
    }

    #[test]
    fn test_key_sizes_follow_suite() {
        let params =
            CipherSuiteParams::from_suite(CipherSuite::TLS_CHACHA20_POLY1305_SHA256).unwrap();
        let tk = TrafficKeys::derive(&params, &[0x42; 32]).unwrap();
        assert_eq!(tk.key.len(), 32);
        assert_eq!(tk.iv.len(), 12);
    }
}
