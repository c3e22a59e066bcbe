//! TLS 1.2 server handshake state machine (ECDHE suites).
//!
//! Full: ClientHello → ServerHello, Certificate, ServerKeyExchange,
//! [CertificateRequest], ServerHelloDone → [client Certificate] →
//! ClientKeyExchange → [CertificateVerify] → CCS → Finished →
//! [NewSessionTicket], CCS, Finished → Connected.
//!
//! Abbreviated: ClientHello (known session ID or ticket) → ServerHello,
//! CCS, Finished → client CCS → Finished → Connected.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ferrotls_crypto::{PublicKey, RngSource};
use ferrotls_types::TlsError;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::config::ServerConfig;
use crate::crypt::key_schedule12::{
    compute_verify_data, derive_extended_master_secret, derive_key_block, derive_master_secret,
};
use crate::crypt::keylog;
use crate::crypt::transcript::TranscriptHash;
use crate::crypt::{is_tls12_suite, AuthAlg, NamedGroup, Tls12CipherSuiteParams};
use crate::extensions::{find, Extension, ExtensionType};
use crate::session::SessionData;
use crate::TlsVersion;

use super::client12::Tls12Keys;
use super::codec::{
    decode_client_hello, encode_server_hello, ClientHello, ServerHello, DOWNGRADE_SENTINEL_TLS12,
};
use super::codec12::{
    build_ske_params, build_ske_signed_data, decode_certificate12, decode_certificate_verify12,
    decode_client_key_exchange, decode_finished12, encode_certificate12,
    encode_certificate_request12, encode_finished12, encode_new_session_ticket12,
    encode_server_hello_done, encode_server_key_exchange, Certificate12, CertificateRequest12,
    NewSessionTicket12, ServerKeyExchange,
};
use super::extensions_codec::{
    build_alpn, build_extended_master_secret, build_session_ticket, parse_alpn_list,
    parse_signature_algorithms, parse_supported_groups,
};
use super::key_exchange::KeyExchange;
use super::signing::{scheme_for_signing_key, sign_ske_data};

/// Server handshake states (TLS 1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tls12ServerState {
    WaitClientHello,
    WaitClientCertificate,
    WaitClientKeyExchange,
    WaitCertificateVerify,
    WaitChangeCipherSpec,
    WaitFinished,
    Connected,
}

/// The server's first flight for a full handshake, all unprotected.
pub struct ServerFlight12 {
    /// ServerHello, Certificate, ServerKeyExchange,
    /// [CertificateRequest], ServerHelloDone.
    pub messages: Vec<Vec<u8>>,
}

/// Abbreviated-resumption flight: ServerHello unprotected, then CCS and
/// Finished under the restored keys.
pub struct AbbreviatedFlight12 {
    pub server_hello_msg: Vec<u8>,
    pub finished_msg: Vec<u8>,
    pub keys: Tls12Keys,
    pub local_finished: Vec<u8>,
}

/// Outcome of processing a ClientHello.
pub enum ServerHello12Outcome {
    Full(ServerFlight12),
    Abbreviated(AbbreviatedFlight12),
}

/// Outcome of the client Finished in the full flow.
pub struct ServerFinished12Result {
    /// NewSessionTicket to send before CCS, when in ticket mode.
    pub nst_msg: Option<Vec<u8>>,
    /// Our Finished, to send under the new write keys after CCS.
    pub finished_msg: Vec<u8>,
    pub local_finished: Vec<u8>,
    pub peer_finished: Vec<u8>,
}

/// TLS 1.2 server driver.
pub struct Tls12ServerHandshake {
    config: Arc<ServerConfig>,
    rng: Arc<RngSource>,
    state: Tls12ServerState,
    transcript: TranscriptHash,
    client_random: [u8; 32],
    server_random: [u8; 32],
    session_id: Vec<u8>,
    abbreviated: bool,
    resumed_key: Option<Vec<u8>>,
    ems: bool,
    ticket_mode: bool,
    params: Option<Tls12CipherSuiteParams>,
    key_exchange: Option<KeyExchange>,
    cert_requested: bool,
    client_certs: Vec<Vec<u8>>,
    client_key: Option<PublicKey>,
    master_secret: Vec<u8>,
    negotiated_alpn: Option<Vec<u8>>,
}

impl Drop for Tls12ServerHandshake {
    fn drop(&mut self) {
        self.master_secret.zeroize();
    }
}

impl Tls12ServerHandshake {
    pub fn new(config: Arc<ServerConfig>, rng: Arc<RngSource>) -> Self {
        Self {
            config,
            rng,
            state: Tls12ServerState::WaitClientHello,
            transcript: TranscriptHash::new(ferrotls_crypto::HashAlgorithm::Sha256),
            client_random: [0u8; 32],
            server_random: [0u8; 32],
            session_id: Vec::new(),
            abbreviated: false,
            resumed_key: None,
            ems: false,
            ticket_mode: false,
            params: None,
            key_exchange: None,
            cert_requested: false,
            client_certs: Vec::new(),
            client_key: None,
            master_secret: Vec::new(),
            negotiated_alpn: None,
        }
    }

    pub fn state(&self) -> Tls12ServerState {
        self.state
    }

    pub fn is_abbreviated(&self) -> bool {
        self.abbreviated
    }

    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        self.negotiated_alpn.as_deref()
    }

    pub fn client_certs(&self) -> &[Vec<u8>] {
        &self.client_certs
    }

    pub fn client_random(&self) -> &[u8; 32] {
        &self.client_random
    }

    pub fn server_random(&self) -> &[u8; 32] {
        &self.server_random
    }

    pub fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    pub fn params(&self) -> Option<&Tls12CipherSuiteParams> {
        self.params.as_ref()
    }

    /// The session key we resumed from, for invalidation on failure.
    pub fn resumed_session_key(&self) -> Option<&[u8]> {
        self.resumed_key.as_deref()
    }

    fn expect_state(&self, state: Tls12ServerState, what: &str) -> Result<(), TlsError> {
        if self.state != state {
            return Err(TlsError::UnexpectedMessage(format!(
                "{what} in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    fn select_suite(&self, ch: &ClientHello) -> Result<Tls12CipherSuiteParams, TlsError> {
        // Only suites whose authentication matches our signing key.
        self.config
            .cipher_suites
            .iter()
            .copied()
            .filter(|s| is_tls12_suite(*s) && ch.cipher_suites.contains(s))
            .filter_map(|s| Tls12CipherSuiteParams::from_suite(s).ok())
            .find(|p| p.auth == AuthAlg::Ecdsa)
            .ok_or_else(|| TlsError::HandshakeFailure("no shared cipher suite".into()))
    }

    fn select_group(&self, ch: &ClientHello) -> Result<NamedGroup, TlsError> {
        let client_groups = find(&ch.extensions, ExtensionType::SUPPORTED_GROUPS)
            .map(|e| parse_supported_groups(&e.data))
            .transpose()?;
        self.config
            .supported_groups
            .iter()
            .copied()
            .filter(|g| g.kex_group().is_some())
            .find(|g| match &client_groups {
                Some(groups) => groups.contains(g),
                // No extension: the client takes any curve (RFC 4492).
                None => true,
            })
            .ok_or_else(|| TlsError::HandshakeFailure("no common key-exchange group".into()))
    }

    fn select_alpn(&mut self, ch: &ClientHello) -> Result<Option<Extension>, TlsError> {
        let offered = match find(
            &ch.extensions,
            ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION,
        ) {
            Some(ext) => parse_alpn_list(&ext.data)?,
            None => return Ok(None),
        };
        if self.config.alpn.is_empty() {
            return Ok(None);
        }
        let selected = self
            .config
            .alpn
            .iter()
            .find(|p| offered.contains(p))
            .cloned()
            .ok_or_else(|| TlsError::HandshakeFailure("no common ALPN protocol".into()))?;
        self.negotiated_alpn = Some(selected.clone());
        Ok(Some(build_alpn(&[selected])))
    }

    fn server_random_with_sentinel(&self) -> Result<[u8; 32], TlsError> {
        let mut random: [u8; 32] = self.rng.random_array()?;
        // A 1.3-capable server marks every negotiated-1.2 hello.
        if self.config.versions.contains(&TlsVersion::Tls13) {
            random[24..].copy_from_slice(&DOWNGRADE_SENTINEL_TLS12);
        }
        Ok(random)
    }

    /// Look up resumable state offered by the ClientHello, checking the
    /// offer is still compatible.
    fn try_resume(&self, ch: &ClientHello) -> Option<(Vec<u8>, SessionData)> {
        let manager = &self.config.session_manager;
        let candidate = if !ch.legacy_session_id.is_empty() {
            manager
                .resume(&ch.legacy_session_id)
                .map(|d| (ch.legacy_session_id.clone(), d))
        } else {
            None
        };
        let candidate = candidate.or_else(|| {
            let ticket = find(&ch.extensions, ExtensionType::SESSION_TICKET)?;
            if ticket.data.is_empty() {
                return None;
            }
            manager.resume(&ticket.data).map(|d| (ticket.data.clone(), d))
        });

        let (id, data) = candidate?;
        if data.version != TlsVersion::Tls12 || !ch.cipher_suites.contains(&data.cipher_suite) {
            return None;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > data.issued_at.saturating_add(data.lifetime as u64) {
            return None;
        }
        Some((id, data))
    }

    fn derive_keys(&self) -> Result<Tls12Keys, TlsError> {
        let params = self
            .params
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        let kb = derive_key_block(
            &self.master_secret,
            &self.server_random,
            &self.client_random,
            &params,
        );
        Ok(Tls12Keys {
            params,
            client_write_key: kb.client_write_key.clone(),
            client_write_iv: kb.client_write_iv.clone(),
            server_write_key: kb.server_write_key.clone(),
            server_write_iv: kb.server_write_iv.clone(),
        })
    }

    /// Process the ClientHello and build the server's first flight.
    pub fn process_client_hello(&mut self, msg: &[u8]) -> Result<ServerHello12Outcome, TlsError> {
        self.expect_state(Tls12ServerState::WaitClientHello, "ClientHello")?;
        if !self.config.versions.contains(&TlsVersion::Tls12) {
            return Err(TlsError::ProtocolVersion);
        }
        let ch = decode_client_hello(body_of(msg)?)?;
        self.client_random = ch.random;

        let params = self.select_suite(&ch)?;
        self.params = Some(params);
        self.transcript.migrate(params.hash);
        self.transcript.update(msg);

        self.ems = self.config.extended_master_secret
            && find(&ch.extensions, ExtensionType::EXTENDED_MASTER_SECRET).is_some();
        let client_offers_ticket =
            find(&ch.extensions, ExtensionType::SESSION_TICKET).is_some();
        self.ticket_mode = client_offers_ticket && self.config.session_manager.use_tickets();
        let alpn_ext = self.select_alpn(&ch)?;

        // Resumption path.
        if let Some((id, data)) = self.try_resume(&ch) {
            return self.build_abbreviated_flight(&ch, id, data, alpn_ext);
        }

        // Full handshake.
        self.server_random = self.server_random_with_sentinel()?;
        self.session_id = self.rng.random_array::<32>()?.to_vec();

        let mut extensions = Vec::new();
        if self.ems {
            extensions.push(build_extended_master_secret());
        }
        if self.ticket_mode {
            extensions.push(build_session_ticket(&[]));
        }
        if let Some(ext) = alpn_ext {
            extensions.push(ext);
        }

        let sh_msg = encode_server_hello(&ServerHello {
            random: self.server_random,
            legacy_session_id: self.session_id.clone(),
            cipher_suite: params.suite,
            extensions,
        });
        self.transcript.update(&sh_msg);
        let mut messages = vec![sh_msg];

        let cert_msg = encode_certificate12(&Certificate12 {
            certificate_list: self.config.certificate_chain.clone(),
        });
        self.transcript.update(&cert_msg);
        messages.push(cert_msg);

        // Ephemeral key + signed parameters.
        let group = self.select_group(&ch)?;
        let key_exchange = KeyExchange::generate(group, &self.rng)?;
        let scheme = scheme_for_signing_key(&self.config.signing_key);
        if let Some(ext) = find(&ch.extensions, ExtensionType::SIGNATURE_ALGORITHMS) {
            if !parse_signature_algorithms(&ext.data)?.contains(&scheme) {
                return Err(TlsError::HandshakeFailure(
                    "client does not accept our signature scheme".into(),
                ));
            }
        }
        let ske_params = build_ske_params(3, group.0, key_exchange.public_key_bytes());
        let signed_data =
            build_ske_signed_data(&self.client_random, &self.server_random, &ske_params);
        let signature = sign_ske_data(&self.config.signing_key, &signed_data);
        let ske_msg = encode_server_key_exchange(&ServerKeyExchange {
            curve_type: 3,
            named_curve: group.0,
            public_key: key_exchange.public_key_bytes().to_vec(),
            signature_algorithm: scheme,
            signature,
        });
        self.transcript.update(&ske_msg);
        messages.push(ske_msg);
        self.key_exchange = Some(key_exchange);

        if self.config.client_cert_verifier.is_some() {
            let cr_msg = encode_certificate_request12(&CertificateRequest12 {
                certificate_types: vec![64], // ecdsa_sign
                signature_algorithms: self.config.signature_schemes.clone(),
            });
            self.transcript.update(&cr_msg);
            messages.push(cr_msg);
            self.cert_requested = true;
        }

        let shd_msg = encode_server_hello_done();
        self.transcript.update(&shd_msg);
        messages.push(shd_msg);

        self.state = if self.cert_requested {
            Tls12ServerState::WaitClientCertificate
        } else {
            Tls12ServerState::WaitClientKeyExchange
        };
        Ok(ServerHello12Outcome::Full(ServerFlight12 { messages }))
    }

    fn build_abbreviated_flight(
        &mut self,
        ch: &ClientHello,
        id: Vec<u8>,
        data: SessionData,
        alpn_ext: Option<Extension>,
    ) -> Result<ServerHello12Outcome, TlsError> {
        let params = Tls12CipherSuiteParams::from_suite(data.cipher_suite)?;
        self.params = Some(params);
        self.transcript.migrate(params.hash);

        self.server_random = self.server_random_with_sentinel()?;
        // Echo the client's session ID (or, for a ticket offer, the
        // marker ID it sent) to signal acceptance.
        self.session_id = ch.legacy_session_id.clone();
        self.master_secret = data.secret.clone();
        self.abbreviated = true;
        self.resumed_key = Some(id.clone());
        keylog::log_master_secret(
            self.config.debug.key_log.as_ref(),
            &self.client_random,
            &self.master_secret,
        );

        let mut extensions = Vec::new();
        if self.ems {
            extensions.push(build_extended_master_secret());
        }
        if let Some(ext) = alpn_ext {
            extensions.push(ext);
        }
        let sh_msg = encode_server_hello(&ServerHello {
            random: self.server_random,
            legacy_session_id: self.session_id.clone(),
            cipher_suite: params.suite,
            extensions,
        });
        self.transcript.update(&sh_msg);

        let keys = self.derive_keys()?;
        let local_finished = compute_verify_data(
            params.hash,
            &self.master_secret,
            "server finished",
            &self.transcript.current_hash(),
        );
        let finished_msg = encode_finished12(&local_finished);
        self.transcript.update(&finished_msg);

        // Refresh the stored state.
        let _ = self.config.session_manager.establish(&id, data);

        self.state = Tls12ServerState::WaitChangeCipherSpec;
        Ok(ServerHello12Outcome::Abbreviated(AbbreviatedFlight12 {
            server_hello_msg: sh_msg,
            finished_msg,
            keys,
            local_finished,
        }))
    }

    /// Process the client Certificate (mTLS).
    pub fn process_client_certificate(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.expect_state(Tls12ServerState::WaitClientCertificate, "client Certificate")?;
        let cert = decode_certificate12(body_of(msg)?)?;
        self.client_certs = cert.certificate_list;
        self.transcript.update(msg);

        if self.client_certs.is_empty() {
            if self.config.require_client_cert {
                return Err(TlsError::CertificateInvalid(
                    "client certificate required but not presented".into(),
                ));
            }
        } else {
            let verifier = self.config.client_cert_verifier.as_ref().ok_or_else(|| {
                TlsError::InternalError("certificate request without verifier".into())
            })?;
            self.client_key = Some(verifier.verify_chain(&self.client_certs, None)?);
        }
        self.state = Tls12ServerState::WaitClientKeyExchange;
        Ok(())
    }

    /// Process the ClientKeyExchange and derive the connection keys.
    pub fn process_client_key_exchange(&mut self, msg: &[u8]) -> Result<Tls12Keys, TlsError> {
        self.expect_state(Tls12ServerState::WaitClientKeyExchange, "ClientKeyExchange")?;
        let cke = decode_client_key_exchange(body_of(msg)?)?;
        self.transcript.update(msg);

        let kex = self
            .key_exchange
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no key exchange state".into()))?;
        let mut pms = kex.compute_shared_secret(&cke.public_key)?;
        let params = self
            .params
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        // EMS binds the master secret to the session hash through CKE.
        self.master_secret = if self.ems {
            derive_extended_master_secret(params.hash, &pms, &self.transcript.current_hash())
        } else {
            derive_master_secret(params.hash, &pms, &self.client_random, &self.server_random)
        };
        pms.zeroize();
        keylog::log_master_secret(
            self.config.debug.key_log.as_ref(),
            &self.client_random,
            &self.master_secret,
        );

        self.state = if self.client_key.is_some() {
            Tls12ServerState::WaitCertificateVerify
        } else {
            Tls12ServerState::WaitChangeCipherSpec
        };
        self.derive_keys()
    }

    /// Process the client CertificateVerify (mTLS).
    pub fn process_certificate_verify(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.expect_state(Tls12ServerState::WaitCertificateVerify, "CertificateVerify")?;
        let (scheme, signature) = decode_certificate_verify12(body_of(msg)?)?;
        let key = self
            .client_key
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no client key".into()))?;
        if scheme != super::verify::scheme_for_key(key) {
            return Err(TlsError::DecryptError(
                "CertificateVerify scheme does not match client key".into(),
            ));
        }
        // The signature covers the raw handshake messages so far.
        key.verify(self.transcript.raw_messages(), &signature)
            .map_err(|_| TlsError::DecryptError("client CertificateVerify invalid".into()))?;
        self.transcript.update(msg);
        self.state = Tls12ServerState::WaitChangeCipherSpec;
        Ok(())
    }

    /// The client's ChangeCipherSpec arrived; the context swaps the RX
    /// epoch after this returns.
    pub fn process_change_cipher_spec(&mut self) -> Result<(), TlsError> {
        self.expect_state(Tls12ServerState::WaitChangeCipherSpec, "ChangeCipherSpec")?;
        self.state = Tls12ServerState::WaitFinished;
        Ok(())
    }

    /// Process the client Finished. In the full flow, builds the
    /// server's closing flight and stores the session.
    pub fn process_finished(&mut self, msg: &[u8]) -> Result<ServerFinished12Result, TlsError> {
        self.expect_state(Tls12ServerState::WaitFinished, "Finished")?;
        let params = self
            .params
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        let peer_vd = decode_finished12(body_of(msg)?)?;
        let expected = compute_verify_data(
            params.hash,
            &self.master_secret,
            "client finished",
            &self.transcript.current_hash(),
        );
        if !bool::from(peer_vd.ct_eq(&expected)) {
            return Err(TlsError::DecryptError(
                "client Finished verify_data mismatch".into(),
            ));
        }
        self.transcript.update(msg);

        if self.abbreviated {
            // Resumption: our Finished already went out.
            self.state = Tls12ServerState::Connected;
            return Ok(ServerFinished12Result {
                nst_msg: None,
                finished_msg: Vec::new(),
                local_finished: Vec::new(),
                peer_finished: peer_vd,
            });
        }

        // Store the session; ticket mode turns the stored key into a
        // NewSessionTicket sent before our CCS.
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let data = SessionData {
            version: TlsVersion::Tls12,
            cipher_suite: params.suite,
            secret: self.master_secret.clone(),
            client_cert: (!self.client_certs.is_empty()).then(|| self.client_certs.clone()),
            alpn: self.negotiated_alpn.clone(),
            max_early_data: 0,
            issued_at,
            lifetime: 7200,
            age_add: 0,
        };
        let ticket = self.config.session_manager.establish(&self.session_id, data);
        let nst_msg = if self.ticket_mode {
            let ticket = ticket.ok_or_else(|| {
                TlsError::InternalError("ticket mode without a ticket from the manager".into())
            })?;
            let nst = encode_new_session_ticket12(&NewSessionTicket12 {
                ticket_lifetime: 7200,
                ticket,
            });
            self.transcript.update(&nst);
            Some(nst)
        } else {
            None
        };

        let local_finished = compute_verify_data(
            params.hash,
            &self.master_secret,
            "server finished",
            &self.transcript.current_hash(),
        );
        let finished_msg = encode_finished12(&local_finished);
        self.transcript.update(&finished_msg);

        self.state = Tls12ServerState::Connected;
        Ok(ServerFinished12Result {
            nst_msg,
            finished_msg,
            local_finished,
            peer_finished: peer_vd,
        })
    }
}

fn body_of(msg: &[u8]) -> Result<&[u8], TlsError> {
    if msg.len() < 4 {
        return Err(TlsError::Decode("handshake message too short".into()));
    }
    Ok(&msg[4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::handshake::codec::encode_client_hello;
    use crate::handshake::extensions_codec::{
        build_signature_algorithms, build_supported_groups, build_supported_versions_ch,
    };
    use crate::crypt::SignatureScheme;
    use crate::CipherSuite;
    use ferrotls_crypto::SigningKey;

    fn test_config() -> Arc<ServerConfig> {
        let key = SigningKey::generate_ed25519(&RngSource::seeded([1; 32])).unwrap();
        Arc::new(
            ServerConfig::builder(vec![vec![0x30, 0x82, 0x01, 0x00]], key)
                .versions(&[TlsVersion::Tls12])
                .build(),
        )
    }

    fn basic_client_hello() -> Vec<u8> {
        encode_client_hello(&ClientHello {
            random: [7; 32],
            legacy_session_id: vec![],
            cipher_suites: vec![CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256],
            extensions: vec![
                build_supported_versions_ch(&[TlsVersion::Tls12]),
                build_supported_groups(&[NamedGroup::X25519]),
                build_signature_algorithms(&[SignatureScheme::ED25519]),
            ],
        })
    }

    #[test]
    fn test_full_flight_shape() {
        let mut hs = Tls12ServerHandshake::new(test_config(), Arc::new(RngSource::seeded([2; 32])));
        let outcome = hs.process_client_hello(&basic_client_hello()).unwrap();
        let flight = match outcome {
            ServerHello12Outcome::Full(f) => f,
            _ => panic!("expected full handshake"),
        };
        // SH, Certificate, SKE, SHD
        assert_eq!(flight.messages.len(), 4);
        assert_eq!(flight.messages[0][0], 2);
        assert_eq!(flight.messages[1][0], 11);
        assert_eq!(flight.messages[2][0], 12);
        assert_eq!(flight.messages[3][0], 14);
        assert_eq!(hs.state(), Tls12ServerState::WaitClientKeyExchange);
        assert!(!hs.is_abbreviated());
    }

    #[test]
    fn test_no_ecdsa_suite_offered_fails() {
        let mut hs = Tls12ServerHandshake::new(test_config(), Arc::new(RngSource::system()));
        let ch = encode_client_hello(&ClientHello {
            random: [7; 32],
            legacy_session_id: vec![],
            // RSA-auth suite only: our Ed25519 identity cannot serve it.
            cipher_suites: vec![CipherSuite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256],
            extensions: vec![build_supported_versions_ch(&[TlsVersion::Tls12])],
        });
        assert!(matches!(
            hs.process_client_hello(&ch),
            Err(TlsError::HandshakeFailure(_))
        ));
    }

    #[test]
    fn test_client_rejecting_our_signature_scheme_fails() {
        let mut hs = Tls12ServerHandshake::new(test_config(), Arc::new(RngSource::system()));
        let ch = encode_client_hello(&ClientHello {
            random: [7; 32],
            legacy_session_id: vec![],
            cipher_suites: vec![CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256],
            extensions: vec![
                build_supported_versions_ch(&[TlsVersion::Tls12]),
                build_supported_groups(&[NamedGroup::X25519]),
                // Client only takes P-256 signatures; our key is Ed25519.
                build_signature_algorithms(&[SignatureScheme::ECDSA_SECP256R1_SHA256]),
            ],
        });
        assert!(hs.process_client_hello(&ch).is_err());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut hs = Tls12ServerHandshake::new(test_config(), Arc::new(RngSource::system()));
        assert!(hs.process_client_key_exchange(&[16, 0, 0, 2, 1, 4]).is_err());
        assert!(hs.process_change_cipher_spec().is_err());
        assert!(hs
            .process_finished(&[20, 0, 0, 12, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0])
            .is_err());
    }

    #[test]
    fn test_sentinel_applied_when_13_capable() {
        let key = SigningKey::generate_ed25519(&RngSource::seeded([1; 32])).unwrap();
        let config = Arc::new(
            ServerConfig::builder(vec![vec![0x30]], key)
                .versions(&[TlsVersion::Tls13, TlsVersion::Tls12])
                .build(),
        );
        let mut hs = Tls12ServerHandshake::new(config, Arc::new(RngSource::seeded([3; 32])));
        let outcome = hs.process_client_hello(&basic_client_hello()).unwrap();
        match outcome {
            ServerHello12Outcome::Full(_) => {}
            _ => panic!("expected full handshake"),
        }
        assert_eq!(&hs.server_random()[24..], &DOWNGRADE_SENTINEL_TLS12);
    }
}
