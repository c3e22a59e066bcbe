//! TLS 1.3 key schedule (RFC 8446 §7.1).
//!
//! Early Secret → Handshake Secret → Master Secret, with the stage
//! secrets derived from transcript snapshots at the transitions the
//! handshake drivers request.

use ferrotls_crypto::HashAlgorithm;
use ferrotls_types::TlsError;
use zeroize::Zeroize;

use super::hkdf::{derive_secret, hkdf_expand_label, hkdf_extract, hmac};
use super::CipherSuiteParams;

/// Current stage of the derivation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheduleStage {
    Initial,
    EarlySecret,
    HandshakeSecret,
    MasterSecret,
}

/// TLS 1.3 key schedule state. Secret material is zeroized on drop.
pub struct KeySchedule {
    hash: HashAlgorithm,
    stage: KeyScheduleStage,
    current_secret: Vec<u8>,
}

impl Drop for KeySchedule {
    fn drop(&mut self) {
        self.current_secret.zeroize();
    }
}

impl KeySchedule {
    pub fn new(params: &CipherSuiteParams) -> Self {
        Self {
            hash: params.hash,
            stage: KeyScheduleStage::Initial,
            current_secret: Vec::new(),
        }
    }

    pub fn stage(&self) -> KeyScheduleStage {
        self.stage
    }

    pub fn hash_len(&self) -> usize {
        self.hash.output_len()
    }

    fn expect_stage(&self, stage: KeyScheduleStage, op: &str) -> Result<(), TlsError> {
        if self.stage != stage {
            return Err(TlsError::InternalError(format!("{op}: wrong stage")));
        }
        Ok(())
    }

    /// Early Secret = HKDF-Extract(0, PSK-or-zero).
    ///
    /// Transitions Initial → EarlySecret.
    pub fn derive_early_secret(&mut self, psk: Option<&[u8]>) -> Result<(), TlsError> {
        self.expect_stage(KeyScheduleStage::Initial, "derive_early_secret")?;
        let zero_psk = vec![0u8; self.hash.output_len()];
        let ikm = psk.unwrap_or(&zero_psk);
        self.current_secret = hkdf_extract(self.hash, &[], ikm);
        self.stage = KeyScheduleStage::EarlySecret;
        Ok(())
    }

    /// Binder key: `Derive-Secret(ES, "res binder" | "ext binder", "")`.
    pub fn derive_binder_key(&self, external: bool) -> Result<Vec<u8>, TlsError> {
        self.expect_stage(KeyScheduleStage::EarlySecret, "derive_binder_key")?;
        let label: &[u8] = if external { b"ext binder" } else { b"res binder" };
        derive_secret(
            self.hash,
            &self.current_secret,
            label,
            &self.hash.digest(b""),
        )
    }

    /// Client early traffic secret: `Derive-Secret(ES, "c e traffic", H(CH))`.
    pub fn derive_early_traffic_secret(
        &self,
        transcript_hash: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        self.expect_stage(KeyScheduleStage::EarlySecret, "derive_early_traffic_secret")?;
        derive_secret(self.hash, &self.current_secret, b"c e traffic", transcript_hash)
    }

    /// Early exporter master secret: `Derive-Secret(ES, "e exp master", H(CH))`.
    pub fn derive_early_exporter_master_secret(
        &self,
        transcript_hash: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        self.expect_stage(
            KeyScheduleStage::EarlySecret,
            "derive_early_exporter_master_secret",
        )?;
        derive_secret(self.hash, &self.current_secret, b"e exp master", transcript_hash)
    }

    /// Handshake Secret = HKDF-Extract(Derive-Secret(ES, "derived", ""), DHE).
    ///
    /// Transitions EarlySecret → HandshakeSecret.
    pub fn derive_handshake_secret(&mut self, dhe_shared_secret: &[u8]) -> Result<(), TlsError> {
        self.expect_stage(KeyScheduleStage::EarlySecret, "derive_handshake_secret")?;
        let mut salt = derive_secret(
            self.hash,
            &self.current_secret,
            b"derived",
            &self.hash.digest(b""),
        )?;
        self.current_secret.zeroize();
        self.current_secret = hkdf_extract(self.hash, &salt, dhe_shared_secret);
        salt.zeroize();
        self.stage = KeyScheduleStage::HandshakeSecret;
        Ok(())
    }

    /// `(c hs traffic, s hs traffic)` from `H(CH..SH)`.
    pub fn derive_handshake_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), TlsError> {
        self.expect_stage(
            KeyScheduleStage::HandshakeSecret,
            "derive_handshake_traffic_secrets",
        )?;
        let client = derive_secret(self.hash, &self.current_secret, b"c hs traffic", transcript_hash)?;
        let server = derive_secret(self.hash, &self.current_secret, b"s hs traffic", transcript_hash)?;
        Ok((client, server))
    }

    /// Master Secret = HKDF-Extract(Derive-Secret(HS, "derived", ""), 0).
    ///
    /// Transitions HandshakeSecret → MasterSecret.
    pub fn derive_master_secret(&mut self) -> Result<(), TlsError> {
        self.expect_stage(KeyScheduleStage::HandshakeSecret, "derive_master_secret")?;
        let mut salt = derive_secret(
            self.hash,
            &self.current_secret,
            b"derived",
            &self.hash.digest(b""),
        )?;
        let zero_ikm = vec![0u8; self.hash.output_len()];
        self.current_secret.zeroize();
        self.current_secret = hkdf_extract(self.hash, &salt, &zero_ikm);
        salt.zeroize();
        self.stage = KeyScheduleStage::MasterSecret;
        Ok(())
    }

    /// `(c ap traffic, s ap traffic)` from `H(CH..server Finished)`.
    pub fn derive_app_traffic_secrets(
        &self,
        transcript_hash: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), TlsError> {
        self.expect_stage(KeyScheduleStage::MasterSecret, "derive_app_traffic_secrets")?;
        let client = derive_secret(self.hash, &self.current_secret, b"c ap traffic", transcript_hash)?;
        let server = derive_secret(self.hash, &self.current_secret, b"s ap traffic", transcript_hash)?;
        Ok((client, server))
    }

    /// `exp master` from `H(CH..server Finished)`.
    pub fn derive_exporter_master_secret(
        &self,
        transcript_hash: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        self.expect_stage(
            KeyScheduleStage::MasterSecret,
            "derive_exporter_master_secret",
        )?;
        derive_secret(self.hash, &self.current_secret, b"exp master", transcript_hash)
    }

    /// `res master` from `H(CH..client Finished)`.
    pub fn derive_resumption_master_secret(
        &self,
        transcript_hash: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        self.expect_stage(
            KeyScheduleStage::MasterSecret,
            "derive_resumption_master_secret",
        )?;
        derive_secret(self.hash, &self.current_secret, b"res master", transcript_hash)
    }

    /// `finished_key = HKDF-Expand-Label(base_key, "finished", "", hash_len)`.
    pub fn derive_finished_key(&self, base_key: &[u8]) -> Result<Vec<u8>, TlsError> {
        hkdf_expand_label(self.hash, base_key, b"finished", b"", self.hash.output_len())
    }

    /// `verify_data = HMAC(finished_key, transcript_hash)`.
    pub fn compute_finished_verify_data(
        &self,
        finished_key: &[u8],
        transcript_hash: &[u8],
    ) -> Vec<u8> {
        hmac(self.hash, finished_key, transcript_hash)
    }

    /// Resumption PSK:
    /// `HKDF-Expand-Label(res_master, "resumption", ticket_nonce, hash_len)`.
    pub fn derive_resumption_psk(&self, rms: &[u8], nonce: &[u8]) -> Result<Vec<u8>, TlsError> {
        hkdf_expand_label(self.hash, rms, b"resumption", nonce, self.hash.output_len())
    }

    /// Post-handshake traffic-secret rotation:
    /// `HKDF-Expand-Label(secret, "traffic upd", "", hash_len)`.
    pub fn update_traffic_secret(&self, current_secret: &[u8]) -> Result<Vec<u8>, TlsError> {
        hkdf_expand_label(self.hash, current_secret, b"traffic upd", b"", self.hash.output_len())
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

    fn sha256_schedule() -> KeySchedule {
        let params = CipherSuiteParams::from_suite(CipherSuite::TLS_AES_128_GCM_SHA256).unwrap();
        KeySchedule::new(&params)
    }

    // RFC 8448 Section 3: Simple 1-RTT handshake, TLS_AES_128_GCM_SHA256.
    #[test]
    fn test_full_chain_rfc8448() {
        let mut ks = sha256_schedule();

        ks.derive_early_secret(None).unwrap();
        assert_eq!(
            to_hex(&ks.current_secret),
            "33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a"
        );

        let dhe = hex("8bd4054fb55b9d63fdfbacf9f04b9f0d35e6d63f537563efd46272900f89492d");
        ks.derive_handshake_secret(&dhe).unwrap();
        assert_eq!(
            to_hex(&ks.current_secret),
            "1dc826e93606aa6fdc0aadc12f741b01046aa6b99f691ed221a9f0ca043fbeac"
        );

        let transcript_ch_sh =
            hex("860c06edc07858ee8e78f0e7428c58edd6b43f2ca3e6e95f02ed063cf0e1cad8");
        let (client_hs, server_hs) = ks
            .derive_handshake_traffic_secrets(&transcript_ch_sh)
            .unwrap();
        assert_eq!(
            to_hex(&client_hs),
            "b3eddb126e067f35a780b3abf45e2d8f3b1a950738f52e9600746a0e27a55a21"
        );
        assert_eq!(
            to_hex(&server_hs),
            "b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38"
        );

        ks.derive_master_secret().unwrap();
        assert_eq!(
            to_hex(&ks.current_secret),
            "18df06843d13a08bf2a449844c5f8a478001bc4d4c627984d5a41da8d0402919"
        );

        let transcript_ch_sf =
            hex("9608102a0f1ccc6db6250b7b7e417b1a000eaada3daae4777a7686c9ff83df13");
        let (client_app, server_app) = ks.derive_app_traffic_secrets(&transcript_ch_sf).unwrap();
        assert_eq!(
            to_hex(&client_app),
            "9e40646ce79a7f9dc05af8889bce6552875afa0b06df0087f792ebb7c17504a5"
        );
        assert_eq!(
            to_hex(&server_app),
            "a11af9f05531f856ad47116b45a950328204b4f44bfb6b3a4b4f1f3fcb631643"
        );
    }

    #[test]
    fn test_stage_enforcement() {
        let mut ks = sha256_schedule();
        assert!(ks.derive_handshake_secret(b"x").is_err());
        assert!(ks.derive_master_secret().is_err());
        assert!(ks.derive_handshake_traffic_secrets(&[0u8; 32]).is_err());
        assert!(ks.derive_app_traffic_secrets(&[0u8; 32]).is_err());
        assert!(ks.derive_binder_key(false).is_err());

        ks.derive_early_secret(None).unwrap();
        assert!(ks.derive_early_secret(None).is_err());
        ks.derive_handshake_secret(b"shared").unwrap();
        ks.derive_master_secret().unwrap();
        assert_eq!(ks.stage(), KeyScheduleStage::MasterSecret);
    }

    #[test]
    fn test_finished_key_deterministic() {
        let ks = sha256_schedule();
        let base = hex("b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38");
        let k1 = ks.derive_finished_key(&base).unwrap();
        let k2 = ks.derive_finished_key(&base).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 32);

        let vd = ks.compute_finished_verify_data(&k1, &[0xAA; 32]);
        assert_eq!(vd.len(), 32);
    }

    #[test]
    fn test_early_stage_labels() {
        let mut ks = sha256_schedule();
        ks.derive_early_secret(Some(&[0x11; 32])).unwrap();
        let binder = ks.derive_binder_key(false).unwrap();
        let ext_binder = ks.derive_binder_key(true).unwrap();
        assert_ne!(binder, ext_binder);

        let ch_hash = [0x22; 32];
        let early_traffic = ks.derive_early_traffic_secret(&ch_hash).unwrap();
        let early_exporter = ks.derive_early_exporter_master_secret(&ch_hash).unwrap();
        assert_ne!(early_traffic, early_exporter);
    }

    #[test]
    fn test_resumption_psk_and_update() {
        let ks = sha256_schedule();
        let rms = [0x33; 32];
        let psk_a = ks.derive_resumption_psk(&rms, &[0]).unwrap();
        let psk_b = ks.derive_resumption_psk(&rms, &[1]).unwrap();
        assert_ne!(psk_a, psk_b);

        let secret = [0x44; 32];
        let updated = ks.update_traffic_secret(&secret).unwrap();
        assert_eq!(updated.len(), 32);
        assert_ne!(updated, secret.to_vec());
    }

    #[test]
    fn test_sha384_lengths() {
        let params = CipherSuiteParams::from_suite(CipherSuite::TLS_AES_256_GCM_SHA384).unwrap();
        let mut ks = KeySchedule::new(&params);
        assert_eq!(ks.hash_len(), 48);
        ks.derive_early_secret(None).unwrap();
        ks.derive_handshake_secret(&[0u8; 48]).unwrap();
        let (c, s) = ks.derive_handshake_traffic_secrets(&[0u8; 48]).unwrap();
        assert_eq!(c.len(), 48);
        assert_eq!(s.len(), 48);
    }
}
