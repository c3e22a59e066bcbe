//! TLS 1.2 client handshake state machine (ECDHE suites).
//!
//! Full: ClientHello → ServerHello → Certificate → ServerKeyExchange →
//! [CertificateRequest] → ServerHelloDone → client flight ([Certificate],
//! ClientKeyExchange, [CertificateVerify], CCS, Finished) → server CCS →
//! Finished → Connected.
//!
//! Abbreviated (session ID or ticket): ClientHello → ServerHello →
//! [NewSessionTicket] → CCS → Finished → client CCS → Finished →
//! Connected.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ferrotls_crypto::{PublicKey, RngSource};
use ferrotls_types::TlsError;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::config::ClientConfig;
use crate::crypt::key_schedule12::{
    compute_verify_data, derive_extended_master_secret, derive_key_block, derive_master_secret,
};
use crate::crypt::keylog;
use crate::crypt::transcript::TranscriptHash;
use crate::crypt::{is_tls12_suite, NamedGroup, Tls12CipherSuiteParams};
use crate::extensions::{find, ExtensionType};
use crate::session::SessionData;
use crate::TlsVersion;

use super::client::{check_downgrade_sentinel, ClientHelloOffer};
use super::codec::decode_server_hello;
use super::codec12::{
    decode_certificate12, decode_certificate_request12, decode_finished12,
    decode_new_session_ticket12, decode_server_key_exchange, encode_certificate12,
    encode_certificate_verify12, encode_client_key_exchange, encode_finished12,
    build_ske_signed_data, Certificate12, CertificateRequest12, ClientKeyExchange,
};
use super::extensions_codec::parse_alpn_selected;
use super::key_exchange::KeyExchange;
use super::signing::{select_signature_scheme, verify_ske_signature};

/// Client handshake states (TLS 1.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tls12ClientState {
    WaitServerHello,
    WaitCertificate,
    WaitServerKeyExchange,
    WaitHelloDone,
    WaitNewSessionTicket,
    WaitChangeCipherSpec,
    WaitFinished,
    Connected,
}

/// Per-direction record keys derived from the key block.
#[derive(Debug)]
pub struct Tls12Keys {
    pub params: Tls12CipherSuiteParams,
    pub client_write_key: Vec<u8>,
    pub client_write_iv: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub server_write_iv: Vec<u8>,
}

impl Drop for Tls12Keys {
    fn drop(&mut self) {
        self.client_write_key.zeroize();
        self.client_write_iv.zeroize();
        self.server_write_key.zeroize();
        self.server_write_iv.zeroize();
    }
}

/// Outcome of the ServerHello: proceed with a full handshake, or keys
/// for the abbreviated resumption flow.
#[derive(Debug)]
pub enum ServerHello12Outcome {
    Full,
    Abbreviated(Tls12Keys),
}

/// The client's second flight for a full handshake.
pub struct ClientFlight12 {
    /// Messages before ChangeCipherSpec: [Certificate], ClientKeyExchange,
    /// [CertificateVerify].
    pub pre_ccs: Vec<Vec<u8>>,
    /// Finished, to send under the new write keys after CCS.
    pub finished_msg: Vec<u8>,
    pub keys: Tls12Keys,
    pub local_finished: Vec<u8>,
}

/// Outcome of the server Finished.
pub struct Finished12Outcome {
    pub peer_finished: Vec<u8>,
    /// Abbreviated flow only: our Finished to send after our CCS.
    pub reply_finished_msg: Option<Vec<u8>>,
    pub local_finished: Vec<u8>,
}

/// TLS 1.2 client driver.
pub struct Tls12ClientHandshake {
    config: Arc<ClientConfig>,
    rng: Arc<RngSource>,
    state: Tls12ClientState,
    transcript: TranscriptHash,
    client_hello_msg: Vec<u8>,
    client_random: [u8; 32],
    server_random: [u8; 32],
    offered_session_id: Vec<u8>,
    offered_resume: Option<(Vec<u8>, SessionData)>,
    server_session_id: Vec<u8>,
    abbreviated: bool,
    ems: bool,
    ticket_expected: bool,
    received_ticket: Option<(Vec<u8>, u32)>,
    params: Option<Tls12CipherSuiteParams>,
    server_certs: Vec<Vec<u8>>,
    server_key: Option<PublicKey>,
    server_kex_point: Vec<u8>,
    key_exchange: Option<KeyExchange>,
    cert_request: Option<CertificateRequest12>,
    master_secret: Vec<u8>,
    negotiated_alpn: Option<Vec<u8>>,
}

impl Drop for Tls12ClientHandshake {
    fn drop(&mut self) {
        self.master_secret.zeroize();
    }
}

impl Tls12ClientHandshake {
    /// Continue from a sent ClientHello offer.
    pub fn new(config: Arc<ClientConfig>, rng: Arc<RngSource>, offer: ClientHelloOffer) -> Self {
        Self {
            config,
            rng,
            state: Tls12ClientState::WaitServerHello,
            transcript: TranscriptHash::new(ferrotls_crypto::HashAlgorithm::Sha256),
            client_hello_msg: offer.msg,
            client_random: offer.random,
            server_random: [0u8; 32],
            offered_session_id: offer.session_id,
            offered_resume: offer.tls12_resume,
            server_session_id: Vec::new(),
            abbreviated: false,
            ems: false,
            ticket_expected: false,
            received_ticket: None,
            params: None,
            server_certs: Vec::new(),
            server_key: None,
            server_kex_point: Vec::new(),
            key_exchange: None,
            cert_request: None,
            master_secret: Vec::new(),
            negotiated_alpn: None,
        }
    }

    pub fn state(&self) -> Tls12ClientState {
        self.state
    }

    pub fn is_abbreviated(&self) -> bool {
        self.abbreviated
    }

    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        self.negotiated_alpn.as_deref()
    }

    pub fn server_certs(&self) -> &[Vec<u8>] {
        &self.server_certs
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
        if self.abbreviated {
            self.offered_resume.as_ref().map(|(id, _)| id.as_slice())
        } else {
            None
        }
    }

    fn expect_state(&self, state: Tls12ClientState, what: &str) -> Result<(), TlsError> {
        if self.state != state {
            return Err(TlsError::UnexpectedMessage(format!(
                "{what} in state {:?}",
                self.state
            )));
        }
        Ok(())
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

    /// Process the ServerHello.
    pub fn process_server_hello(&mut self, msg: &[u8]) -> Result<ServerHello12Outcome, TlsError> {
        self.expect_state(Tls12ClientState::WaitServerHello, "ServerHello")?;
        let body = body_of(msg)?;
        let sh = decode_server_hello(body)?;

        // The body's leading version field is the negotiated version here.
        let version = u16::from_be_bytes([body[0], body[1]]);
        if version != 0x0303 || !self.config.versions.contains(&TlsVersion::Tls12) {
            return Err(TlsError::ProtocolVersion);
        }
        // A 1.3-capable client must refuse a sentinel-marked downgrade.
        if self.config.versions.contains(&TlsVersion::Tls13) {
            check_downgrade_sentinel(&sh.random)?;
        }

        if !self.config.cipher_suites.contains(&sh.cipher_suite)
            || !is_tls12_suite(sh.cipher_suite)
        {
            return Err(TlsError::HandshakeFailure(format!(
                "server selected unoffered cipher suite 0x{:04x}",
                sh.cipher_suite.0
            )));
        }
        self.params = Some(Tls12CipherSuiteParams::from_suite(sh.cipher_suite)?);
        let params = self.params.expect("just set");
        self.transcript.migrate(params.hash);
        self.transcript.update(&self.client_hello_msg);
        self.transcript.update(msg);

        self.server_random = sh.random;
        self.server_session_id = sh.legacy_session_id.clone();
        self.ems = self.config.extended_master_secret
            && find(&sh.extensions, ExtensionType::EXTENDED_MASTER_SECRET).is_some();
        self.ticket_expected = find(&sh.extensions, ExtensionType::SESSION_TICKET).is_some();
        if let Some(alpn) = find(
            &sh.extensions,
            ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION,
        ) {
            let selected = parse_alpn_selected(&alpn.data)?;
            if !self.config.alpn.contains(&selected) {
                return Err(TlsError::HandshakeFailure(
                    "server selected unoffered ALPN protocol".into(),
                ));
            }
            self.negotiated_alpn = Some(selected);
        }

        // Resumption accept: the server echoed our non-empty session ID.
        let resumed = !self.offered_session_id.is_empty()
            && sh.legacy_session_id == self.offered_session_id
            && self.offered_resume.is_some();
        if resumed {
            let (_, data) = self.offered_resume.as_ref().expect("checked");
            if data.cipher_suite != sh.cipher_suite {
                return Err(TlsError::HandshakeFailure(
                    "resumed session cipher suite mismatch".into(),
                ));
            }
            self.abbreviated = true;
            self.master_secret = data.secret.clone();
            keylog::log_master_secret(
                self.config.debug.key_log.as_ref(),
                &self.client_random,
                &self.master_secret,
            );
            let keys = self.derive_keys()?;
            self.state = if self.ticket_expected {
                Tls12ClientState::WaitNewSessionTicket
            } else {
                Tls12ClientState::WaitChangeCipherSpec
            };
            return Ok(ServerHello12Outcome::Abbreviated(keys));
        }

        self.state = Tls12ClientState::WaitCertificate;
        Ok(ServerHello12Outcome::Full)
    }

    /// Process the server Certificate.
    pub fn process_certificate(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.expect_state(Tls12ClientState::WaitCertificate, "Certificate")?;
        let cert = decode_certificate12(body_of(msg)?)?;
        if cert.certificate_list.is_empty() {
            return Err(TlsError::CertificateInvalid("empty certificate list".into()));
        }
        self.server_certs = cert.certificate_list;

        if self.config.verify_peer {
            let verifier = self.config.verifier.as_ref().ok_or_else(|| {
                TlsError::CertificateUnknown("no chain verifier configured".into())
            })?;
            self.server_key = Some(
                verifier.verify_chain(&self.server_certs, self.config.server_name.as_deref())?,
            );
        }

        self.transcript.update(msg);
        self.state = Tls12ClientState::WaitServerKeyExchange;
        Ok(())
    }

    /// Process the ServerKeyExchange: check the signature over the
    /// ephemeral parameters and set up our side of the exchange.
    pub fn process_server_key_exchange(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.expect_state(Tls12ClientState::WaitServerKeyExchange, "ServerKeyExchange")?;
        let ske = decode_server_key_exchange(body_of(msg)?)?;

        let group = NamedGroup(ske.named_curve);
        if !self.config.supported_groups.contains(&group) {
            return Err(TlsError::HandshakeFailure(format!(
                "server chose unoffered group 0x{:04x}",
                ske.named_curve
            )));
        }

        if let Some(server_key) = &self.server_key {
            let params = super::codec12::build_ske_params(
                ske.curve_type,
                ske.named_curve,
                &ske.public_key,
            );
            let signed_data =
                build_ske_signed_data(&self.client_random, &self.server_random, &params);
            verify_ske_signature(
                server_key,
                ske.signature_algorithm,
                &signed_data,
                &ske.signature,
            )?;
        }

        self.key_exchange = Some(KeyExchange::generate(group, &self.rng)?);
        self.server_kex_point = ske.public_key;
        self.transcript.update(msg);
        self.state = Tls12ClientState::WaitHelloDone;
        Ok(())
    }

    /// Process a CertificateRequest (mTLS); ServerHelloDone follows.
    pub fn process_certificate_request(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.expect_state(Tls12ClientState::WaitHelloDone, "CertificateRequest")?;
        if self.cert_request.is_some() {
            return Err(TlsError::UnexpectedMessage(
                "second CertificateRequest".into(),
            ));
        }
        self.cert_request = Some(decode_certificate_request12(body_of(msg)?)?);
        self.transcript.update(msg);
        Ok(())
    }

    /// Process ServerHelloDone and build the client's second flight.
    pub fn process_server_hello_done(&mut self, msg: &[u8]) -> Result<ClientFlight12, TlsError> {
        self.expect_state(Tls12ClientState::WaitHelloDone, "ServerHelloDone")?;
        if !body_of(msg)?.is_empty() {
            return Err(TlsError::Decode("ServerHelloDone body must be empty".into()));
        }
        self.transcript.update(msg);

        let mut pre_ccs = Vec::new();

        // Client Certificate, possibly empty, if requested.
        if self.cert_request.is_some() {
            let cert_msg = encode_certificate12(&Certificate12 {
                certificate_list: self.config.certificate_chain.clone(),
            });
            self.transcript.update(&cert_msg);
            pre_ccs.push(cert_msg);
        }

        // ClientKeyExchange.
        let kex = self
            .key_exchange
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no key exchange state".into()))?;
        let cke_msg = encode_client_key_exchange(&ClientKeyExchange {
            public_key: kex.public_key_bytes().to_vec(),
        });
        self.transcript.update(&cke_msg);

        // Master secret, bound to the session hash when EMS is active.
        let mut pms = kex.compute_shared_secret(&self.server_kex_point)?;
        let params = self
            .params
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
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
        pre_ccs.push(cke_msg);

        // CertificateVerify over every handshake message so far.
        if self.cert_request.is_some()
            && !self.config.certificate_chain.is_empty()
        {
            let key = self.config.signing_key.as_ref().ok_or_else(|| {
                TlsError::HandshakeFailure("client certificate without signing key".into())
            })?;
            let request = self.cert_request.as_ref().expect("checked");
            let scheme = select_signature_scheme(key, &request.signature_algorithms)?;
            let signature = key.sign(self.transcript.raw_messages());
            let cv_msg = encode_certificate_verify12(scheme, &signature);
            self.transcript.update(&cv_msg);
            pre_ccs.push(cv_msg);
        }

        let keys = self.derive_keys()?;

        let local_finished = compute_verify_data(
            params.hash,
            &self.master_secret,
            "client finished",
            &self.transcript.current_hash(),
        );
        let finished_msg = encode_finished12(&local_finished);
        self.transcript.update(&finished_msg);

        self.state = Tls12ClientState::WaitChangeCipherSpec;
        Ok(ClientFlight12 {
            pre_ccs,
            finished_msg,
            keys,
            local_finished,
        })
    }

    /// Process a NewSessionTicket (RFC 5077), full or abbreviated flow.
    pub fn process_new_session_ticket(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        match self.state {
            Tls12ClientState::WaitNewSessionTicket => {}
            // Full handshake: the ticket comes between our Finished and
            // the server's ChangeCipherSpec.
            Tls12ClientState::WaitChangeCipherSpec if self.ticket_expected => {}
            _ => {
                return Err(TlsError::UnexpectedMessage(format!(
                    "NewSessionTicket in state {:?}",
                    self.state
                )))
            }
        }
        let nst = decode_new_session_ticket12(body_of(msg)?)?;
        self.received_ticket = Some((nst.ticket, nst.ticket_lifetime));
        self.transcript.update(msg);
        if self.state == Tls12ClientState::WaitNewSessionTicket {
            self.state = Tls12ClientState::WaitChangeCipherSpec;
        }
        Ok(())
    }

    /// The server's ChangeCipherSpec arrived; the context swaps the RX
    /// epoch after this returns.
    pub fn process_change_cipher_spec(&mut self) -> Result<(), TlsError> {
        self.expect_state(Tls12ClientState::WaitChangeCipherSpec, "ChangeCipherSpec")?;
        self.state = Tls12ClientState::WaitFinished;
        Ok(())
    }

    /// Process the server Finished. In the abbreviated flow this also
    /// builds our Finished reply and registers the refreshed session.
    pub fn process_finished(&mut self, msg: &[u8]) -> Result<Finished12Outcome, TlsError> {
        self.expect_state(Tls12ClientState::WaitFinished, "Finished")?;
        let params = self
            .params
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        let peer_vd = decode_finished12(body_of(msg)?)?;
        let expected = compute_verify_data(
            params.hash,
            &self.master_secret,
            "server finished",
            &self.transcript.current_hash(),
        );
        if !bool::from(peer_vd.ct_eq(&expected)) {
            return Err(TlsError::DecryptError(
                "server Finished verify_data mismatch".into(),
            ));
        }
        self.transcript.update(msg);

        let (reply, local_finished) = if self.abbreviated {
            let vd = compute_verify_data(
                params.hash,
                &self.master_secret,
                "client finished",
                &self.transcript.current_hash(),
            );
            let fin = encode_finished12(&vd);
            self.transcript.update(&fin);
            (Some(fin), vd)
        } else {
            // Full flow: our Finished already went out; its verify_data
            // is echoed back to the caller by the context.
            (None, Vec::new())
        };

        self.state = Tls12ClientState::Connected;
        self.store_session();

        Ok(Finished12Outcome {
            peer_finished: peer_vd,
            reply_finished_msg: reply,
            local_finished,
        })
    }

    /// Register the established session with the session manager.
    fn store_session(&self) {
        let params = match self.params {
            Some(p) => p,
            None => return,
        };
        // Prefer a fresh ticket over the server's session ID.
        let (id, lifetime) = match (&self.received_ticket, self.server_session_id.is_empty()) {
            (Some((ticket, lifetime)), _) => (ticket.clone(), *lifetime),
            (None, false) => (self.server_session_id.clone(), 7200),
            (None, true) => return,
        };
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let data = SessionData {
            version: TlsVersion::Tls12,
            cipher_suite: params.suite,
            secret: self.master_secret.clone(),
            client_cert: None,
            alpn: self.negotiated_alpn.clone(),
            max_early_data: 0,
            issued_at,
            lifetime,
            age_add: 0,
        };
        let _ = self.config.session_manager.establish(&id, data);
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
    use crate::config::ClientConfig;
    use crate::CipherSuite;

    fn driver_for(config: ClientConfig) -> Tls12ClientHandshake {
        let rng = Arc::new(RngSource::seeded([4; 32]));
        let offer = ClientHelloOffer::build(&config, &rng).unwrap();
        Tls12ClientHandshake::new(Arc::new(config), rng, offer)
    }

    #[test]
    fn test_initial_state() {
        let hs = driver_for(ClientConfig::builder().build());
        assert_eq!(hs.state(), Tls12ClientState::WaitServerHello);
        assert!(!hs.is_abbreviated());
        assert!(hs.resumed_session_key().is_none());
    }

    #[test]
    fn test_out_of_order_messages_rejected() {
        let mut hs = driver_for(ClientConfig::builder().build());
        assert!(hs.process_certificate(&[11, 0, 0, 3, 0, 0, 0]).is_err());
        assert!(hs.process_server_hello_done(&[14, 0, 0, 0]).is_err());
        assert!(hs.process_change_cipher_spec().is_err());
        assert!(hs
            .process_finished(&[20, 0, 0, 12, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0])
            .is_err());
    }

    #[test]
    fn test_server_hello_wrong_version_rejected() {
        use crate::handshake::codec::{encode_server_hello, ServerHello};

        let mut hs = driver_for(ClientConfig::builder().build());
        let sh = ServerHello {
            random: [1; 32],
            legacy_session_id: vec![],
            cipher_suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            extensions: vec![],
        };
        let mut msg = encode_server_hello(&sh);
        // Rewrite the negotiated version to TLS 1.1.
        msg[4] = 0x03;
        msg[5] = 0x02;
        assert!(matches!(
            hs.process_server_hello(&msg),
            Err(TlsError::ProtocolVersion)
        ));
    }

    #[test]
    fn test_server_hello_downgrade_sentinel_rejected() {
        use crate::handshake::codec::{
            encode_server_hello, ServerHello, DOWNGRADE_SENTINEL_TLS12,
        };

        let mut hs = driver_for(ClientConfig::builder().build());
        let mut random = [1u8; 32];
        random[24..].copy_from_slice(&DOWNGRADE_SENTINEL_TLS12);
        let sh = ServerHello {
            random,
            legacy_session_id: vec![],
            cipher_suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            extensions: vec![],
        };
        let msg = encode_server_hello(&sh);
        let err = hs.process_server_hello(&msg).unwrap_err();
        assert_eq!(err.alert_code(), Some(71));
    }

    #[test]
    fn test_tls12_only_client_accepts_sentinel() {
        use crate::handshake::codec::{
            encode_server_hello, ServerHello, DOWNGRADE_SENTINEL_TLS12,
        };

        // A client that never offered 1.3 ignores the sentinel.
        let mut hs = driver_for(
            ClientConfig::builder()
                .versions(&[TlsVersion::Tls12])
                .build(),
        );
        let mut random = [1u8; 32];
        random[24..].copy_from_slice(&DOWNGRADE_SENTINEL_TLS12);
        let sh = ServerHello {
            random,
            legacy_session_id: vec![],
            cipher_suite: CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            extensions: vec![],
        };
        let msg = encode_server_hello(&sh);
        assert!(matches!(
            hs.process_server_hello(&msg),
            Ok(ServerHello12Outcome::Full)
        ));
        assert_eq!(hs.state(), Tls12ClientState::WaitCertificate);
    }

    #[test]
    fn test_unoffered_suite_rejected() {
        use crate::handshake::codec::{encode_server_hello, ServerHello};

        let mut hs = driver_for(
            ClientConfig::builder()
                .versions(&[TlsVersion::Tls12])
                .cipher_suites(&[CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256])
                .build(),
        );
        let sh = ServerHello {
            random: [1; 32],
            legacy_session_id: vec![],
            cipher_suite: CipherSuite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            extensions: vec![],
        };
        assert!(hs.process_server_hello(&encode_server_hello(&sh)).is_err());
    }
}
