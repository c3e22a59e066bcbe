//! TLS 1.3 client handshake state machine.
//!
//! ClientHello → ServerHello (→ HelloRetryRequest → ClientHello2 →
//! ServerHello) → EncryptedExtensions → [CertificateRequest] →
//! [Certificate → CertificateVerify] → Finished → client flight →
//! Connected. Handshake keys install right after ServerHello;
//! application keys after the client Finished is built.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ferrotls_crypto::{PublicKey, RngSource};
use ferrotls_types::TlsError;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::config::ClientConfig;
use crate::crypt::key_schedule::KeySchedule;
use crate::crypt::keylog;
use crate::crypt::traffic_keys::TrafficKeys;
use crate::crypt::transcript::TranscriptHash;
use crate::crypt::{is_tls12_suite, is_tls13_suite, CipherSuiteParams, NamedGroup};
use crate::extensions::{find, ExtensionType};
use crate::session::SessionData;
use crate::{CipherSuite, TlsVersion};

use super::codec::{
    decode_certificate, decode_certificate_request, decode_certificate_verify,
    decode_encrypted_extensions, decode_finished, decode_new_session_ticket, decode_server_hello,
    encode_certificate, encode_certificate_verify, encode_client_hello, encode_finished,
    CertificateEntry, CertificateMsg, CertificateVerifyMsg, ClientHello, ServerHello,
};
use super::extensions_codec::{
    binders_list_len, build_alpn, build_cookie, build_extended_master_secret, build_key_share_ch,
    build_pre_shared_key_ch, build_psk_key_exchange_modes, build_server_name,
    build_session_ticket, build_signature_algorithms, build_supported_groups,
    build_supported_versions_ch, parse_alpn_selected, parse_cookie, parse_early_data_nst,
    parse_key_share_hrr, parse_key_share_sh, parse_pre_shared_key_sh,
    parse_supported_versions_sh, KeyShareEntry, PskIdentity,
};
use super::key_exchange::KeyExchange;
use super::signing::{select_signature_scheme, sign_certificate_verify};
use super::verify::verify_certificate_verify;

/// Client handshake states (TLS 1.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tls13ClientState {
    WaitServerHello,
    WaitEncryptedExtensions,
    WaitCertOrCertReq,
    WaitCertificate,
    WaitCertVerify,
    WaitFinished,
    Connected,
}

/// A PSK offered in the ClientHello for resumption.
pub struct OfferedPsk {
    pub id: Vec<u8>,
    pub psk: Vec<u8>,
    pub suite: CipherSuite,
}

impl Drop for OfferedPsk {
    fn drop(&mut self) {
        self.psk.zeroize();
    }
}

/// Everything established by building the ClientHello, shared by the
/// TLS 1.3 and TLS 1.2 continuations.
pub struct ClientHelloOffer {
    /// Full ClientHello handshake message bytes.
    pub msg: Vec<u8>,
    pub random: [u8; 32],
    /// Offered legacy session ID (TLS 1.2 resumption), possibly empty.
    pub session_id: Vec<u8>,
    pub key_exchange: KeyExchange,
    /// TLS 1.3 resumption offer.
    pub psk: Option<OfferedPsk>,
    /// TLS 1.2 resumption offer: lookup key plus stored state.
    pub tls12_resume: Option<(Vec<u8>, SessionData)>,
}

impl ClientHelloOffer {
    /// Build the ClientHello for this configuration.
    pub fn build(config: &ClientConfig, rng: &RngSource) -> Result<Self, TlsError> {
        if config.versions.is_empty() {
            return Err(TlsError::HandshakeFailure("no versions configured".into()));
        }
        let offers_13 = config.versions.contains(&TlsVersion::Tls13);
        let offers_12 = config.versions.contains(&TlsVersion::Tls12);

        let group = config
            .supported_groups
            .first()
            .copied()
            .unwrap_or(NamedGroup::X25519);
        let key_exchange = KeyExchange::generate(group, rng)?;
        let random: [u8; 32] = rng.random_array()?;

        // Split the configured resumption offer by protocol version.
        let mut psk_offer: Option<OfferedPsk> = None;
        let mut tls12_resume: Option<(Vec<u8>, SessionData)> = None;
        let mut session_id = Vec::new();
        let mut tls12_ticket: Option<Vec<u8>> = None;
        if let Some((id, data)) = &config.resume_session {
            match data.version {
                TlsVersion::Tls13 if offers_13 => {
                    psk_offer = Some(OfferedPsk {
                        id: id.clone(),
                        psk: data.secret.clone(),
                        suite: data.cipher_suite,
                    });
                }
                TlsVersion::Tls12 if offers_12 => {
                    // Short keys are session IDs; anything longer rides
                    // the session_ticket extension (RFC 5077), with a
                    // random session-ID marker so the server's echo
                    // signals acceptance.
                    if id.len() <= 32 {
                        session_id = id.clone();
                    } else {
                        tls12_ticket = Some(id.clone());
                        session_id = rng.random_array::<32>()?.to_vec();
                    }
                    tls12_resume = Some((id.clone(), data.clone()));
                }
                _ => {}
            }
        }

        let mut extensions = vec![
            build_supported_versions_ch(&config.versions),
            build_supported_groups(&config.supported_groups),
            build_signature_algorithms(&config.signature_schemes),
        ];
        if offers_13 {
            extensions.push(build_key_share_ch(&[KeyShareEntry {
                group,
                key_exchange: key_exchange.public_key_bytes().to_vec(),
            }]));
        }
        if let Some(name) = &config.server_name {
            extensions.push(build_server_name(name));
        }
        if !config.alpn.is_empty() {
            extensions.push(build_alpn(&config.alpn));
        }
        if offers_12 && config.extended_master_secret {
            extensions.push(build_extended_master_secret());
        }
        if offers_12 {
            extensions.push(build_session_ticket(
                tls12_ticket.as_deref().unwrap_or(&[]),
            ));
        }
        // pre_shared_key must be last (RFC 8446 §4.2.11).
        if psk_offer.is_some() {
            extensions.push(build_psk_key_exchange_modes());
        }
        let psk_params = match &psk_offer {
            Some(offer) => {
                let params = CipherSuiteParams::from_suite(offer.suite)?;
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                let data = &config
                    .resume_session
                    .as_ref()
                    .expect("psk offer implies resume_session")
                    .1;
                let age_ms = now.saturating_sub(data.issued_at).saturating_mul(1000);
                let obfuscated_age = (age_ms as u32).wrapping_add(data.age_add);
                extensions.push(build_pre_shared_key_ch(
                    &[PskIdentity {
                        identity: offer.id.clone(),
                        obfuscated_ticket_age: obfuscated_age,
                    }],
                    &[vec![0u8; params.hash_len()]],
                ));
                Some(params)
            }
            None => None,
        };

        let ch = ClientHello {
            random,
            legacy_session_id: session_id.clone(),
            cipher_suites: config.cipher_suites.clone(),
            extensions,
        };
        let mut msg = encode_client_hello(&ch);

        // Patch the real binder over the truncated ClientHello.
        if let (Some(offer), Some(params)) = (&psk_offer, &psk_params) {
            let binder_tail = binders_list_len(&[params.hash_len()]);
            let truncated_hash = params.hash.digest(&msg[..msg.len() - binder_tail]);

            let mut ks = KeySchedule::new(params);
            ks.derive_early_secret(Some(&offer.psk))?;
            let binder_key = ks.derive_binder_key(false)?;
            let finished_key = ks.derive_finished_key(&binder_key)?;
            let binder = ks.compute_finished_verify_data(&finished_key, &truncated_hash);

            let start = msg.len() - params.hash_len();
            msg[start..].copy_from_slice(&binder);
        }

        Ok(Self {
            msg,
            random,
            session_id,
            key_exchange,
            psk: psk_offer,
            tls12_resume,
        })
    }
}

/// Keys to install after processing ServerHello.
pub struct ServerHelloActions {
    pub client_hs_keys: TrafficKeys,
    pub server_hs_keys: TrafficKeys,
    pub params: CipherSuiteParams,
}

/// HelloRetryRequest: a new ClientHello is needed.
pub struct RetryActions {
    pub selected_group: NamedGroup,
    pub cookie: Option<Vec<u8>>,
    pub suite: CipherSuite,
}

/// Outcome of processing a ServerHello.
pub enum ServerHelloOutcome {
    Actions(ServerHelloActions),
    Retry(RetryActions),
}

/// Everything produced by processing the server Finished.
pub struct ClientFinishedActions {
    /// Messages to send under the handshake keys, in order:
    /// [Certificate], [CertificateVerify], Finished.
    pub flight: Vec<Vec<u8>>,
    pub client_app_keys: TrafficKeys,
    pub server_app_keys: TrafficKeys,
    pub client_app_secret: Vec<u8>,
    pub server_app_secret: Vec<u8>,
    pub params: CipherSuiteParams,
    pub exporter_master_secret: Vec<u8>,
    pub resumption_master_secret: Vec<u8>,
    /// Our Finished verify_data.
    pub local_finished: Vec<u8>,
    /// The server's Finished verify_data.
    pub peer_finished: Vec<u8>,
}

/// TLS 1.3 client driver.
pub struct Tls13ClientHandshake {
    config: Arc<ClientConfig>,
    rng: Arc<RngSource>,
    state: Tls13ClientState,
    transcript: TranscriptHash,
    key_exchange: KeyExchange,
    client_hello_msg: Vec<u8>,
    client_random: [u8; 32],
    session_id: Vec<u8>,
    psk: Option<OfferedPsk>,
    psk_mode: bool,
    hrr_done: bool,
    params: Option<CipherSuiteParams>,
    key_schedule: Option<KeySchedule>,
    client_hs_secret: Vec<u8>,
    server_hs_secret: Vec<u8>,
    server_certs: Vec<Vec<u8>>,
    server_key: Option<PublicKey>,
    cert_request_context: Option<Vec<u8>>,
    cert_request_schemes: Vec<crate::crypt::SignatureScheme>,
    negotiated_alpn: Option<Vec<u8>>,
    negotiated_group: Option<NamedGroup>,
}

impl Drop for Tls13ClientHandshake {
    fn drop(&mut self) {
        self.client_hs_secret.zeroize();
        self.server_hs_secret.zeroize();
    }
}

impl Tls13ClientHandshake {
    /// Continue from a sent ClientHello offer.
    pub fn new(config: Arc<ClientConfig>, rng: Arc<RngSource>, offer: ClientHelloOffer) -> Self {
        // The transcript hash migrates if the negotiated suite picks SHA-384.
        let transcript = TranscriptHash::new(ferrotls_crypto::HashAlgorithm::Sha256);
        Self {
            config,
            rng,
            state: Tls13ClientState::WaitServerHello,
            transcript,
            key_exchange: offer.key_exchange,
            client_hello_msg: offer.msg,
            client_random: offer.random,
            session_id: offer.session_id,
            psk: offer.psk,
            psk_mode: false,
            hrr_done: false,
            params: None,
            key_schedule: None,
            client_hs_secret: Vec::new(),
            server_hs_secret: Vec::new(),
            server_certs: Vec::new(),
            server_key: None,
            cert_request_context: None,
            cert_request_schemes: Vec::new(),
            negotiated_alpn: None,
            negotiated_group: None,
        }
    }

    pub fn state(&self) -> Tls13ClientState {
        self.state
    }

    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        self.negotiated_alpn.as_deref()
    }

    pub fn server_certs(&self) -> &[Vec<u8>] {
        &self.server_certs
    }

    pub fn negotiated_group(&self) -> Option<NamedGroup> {
        self.negotiated_group
    }

    pub fn is_psk_mode(&self) -> bool {
        self.psk_mode
    }

    fn expect_state(&self, state: Tls13ClientState, what: &str) -> Result<(), TlsError> {
        if self.state != state {
            return Err(TlsError::UnexpectedMessage(format!(
                "{what} in state {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Process a ServerHello (or HelloRetryRequest) message.
    pub fn process_server_hello(&mut self, msg: &[u8]) -> Result<ServerHelloOutcome, TlsError> {
        self.expect_state(Tls13ClientState::WaitServerHello, "ServerHello")?;
        let sh = decode_server_hello(body_of(msg)?)?;

        let versions_ext = find(&sh.extensions, ExtensionType::SUPPORTED_VERSIONS)
            .ok_or(TlsError::ProtocolVersion)?;
        if parse_supported_versions_sh(&versions_ext.data)? != TlsVersion::Tls13.wire() {
            return Err(TlsError::ProtocolVersion);
        }
        if !self.config.cipher_suites.contains(&sh.cipher_suite)
            || !is_tls13_suite(sh.cipher_suite)
        {
            return Err(TlsError::HandshakeFailure(format!(
                "server selected unoffered cipher suite 0x{:04x}",
                sh.cipher_suite.0
            )));
        }
        if sh.legacy_session_id != self.session_id {
            return Err(TlsError::HandshakeFailure(
                "ServerHello session_id echo mismatch".into(),
            ));
        }

        if sh.is_hello_retry_request() {
            return self.process_hello_retry_request(msg, &sh);
        }

        let params = CipherSuiteParams::from_suite(sh.cipher_suite)?;
        self.transcript.migrate(params.hash);
        if !self.hrr_done {
            self.transcript.update(&self.client_hello_msg);
        }
        self.transcript.update(msg);

        let ks_ext = find(&sh.extensions, ExtensionType::KEY_SHARE)
            .ok_or_else(|| TlsError::HandshakeFailure("missing key_share in ServerHello".into()))?;
        let share = parse_key_share_sh(&ks_ext.data)?;
        if share.group != self.key_exchange.group() {
            return Err(TlsError::HandshakeFailure(
                "server key_share group mismatch".into(),
            ));
        }
        self.negotiated_group = Some(share.group);
        let mut shared_secret = self.key_exchange.compute_shared_secret(&share.key_exchange)?;

        // PSK acceptance.
        let selected_psk = find(&sh.extensions, ExtensionType::PRE_SHARED_KEY)
            .map(|e| parse_pre_shared_key_sh(&e.data))
            .transpose()?;
        if let Some(index) = selected_psk {
            if index != 0 || self.psk.is_none() {
                return Err(TlsError::HandshakeFailure(
                    "server selected a PSK we did not offer".into(),
                ));
            }
            // The PSK binds the hash; the selected suite must match it.
            let offered_suite = self.psk.as_ref().expect("checked").suite;
            if CipherSuiteParams::from_suite(offered_suite)?.hash != params.hash {
                return Err(TlsError::HandshakeFailure(
                    "PSK hash does not match selected suite".into(),
                ));
            }
            self.psk_mode = true;
        }

        let mut ks = KeySchedule::new(&params);
        let psk_secret = if self.psk_mode {
            self.psk.as_ref().map(|p| p.psk.clone())
        } else {
            None
        };
        ks.derive_early_secret(psk_secret.as_deref())?;
        ks.derive_handshake_secret(&shared_secret)?;
        shared_secret.zeroize();

        let transcript_hash = self.transcript.current_hash();
        let (client_hs_secret, server_hs_secret) =
            ks.derive_handshake_traffic_secrets(&transcript_hash)?;
        let key_log = self.config.debug.key_log.as_ref();
        keylog::log_key(
            key_log,
            "CLIENT_HANDSHAKE_TRAFFIC_SECRET",
            &self.client_random,
            &client_hs_secret,
        );
        keylog::log_key(
            key_log,
            "SERVER_HANDSHAKE_TRAFFIC_SECRET",
            &self.client_random,
            &server_hs_secret,
        );

        let client_hs_keys = TrafficKeys::derive(&params, &client_hs_secret)?;
        let server_hs_keys = TrafficKeys::derive(&params, &server_hs_secret)?;

        self.client_hs_secret = client_hs_secret;
        self.server_hs_secret = server_hs_secret;
        self.key_schedule = Some(ks);
        self.params = Some(params);
        self.state = Tls13ClientState::WaitEncryptedExtensions;

        Ok(ServerHelloOutcome::Actions(ServerHelloActions {
            client_hs_keys,
            server_hs_keys,
            params,
        }))
    }

    fn process_hello_retry_request(
        &mut self,
        msg: &[u8],
        sh: &ServerHello,
    ) -> Result<ServerHelloOutcome, TlsError> {
        if self.hrr_done {
            return Err(TlsError::UnexpectedMessage(
                "second HelloRetryRequest".into(),
            ));
        }
        let params = CipherSuiteParams::from_suite(sh.cipher_suite)?;
        self.transcript.migrate(params.hash);
        self.transcript.update(&self.client_hello_msg);
        self.transcript.replace_with_message_hash();
        self.transcript.update(msg);

        let ks_ext = find(&sh.extensions, ExtensionType::KEY_SHARE)
            .ok_or_else(|| TlsError::HandshakeFailure("missing key_share in HRR".into()))?;
        let selected_group = parse_key_share_hrr(&ks_ext.data)?;
        if selected_group == self.key_exchange.group() {
            return Err(TlsError::HandshakeFailure(
                "HRR selected the group we already offered".into(),
            ));
        }
        if !self.config.supported_groups.contains(&selected_group) {
            return Err(TlsError::HandshakeFailure(
                "HRR selected an unsupported group".into(),
            ));
        }
        let cookie = find(&sh.extensions, ExtensionType::COOKIE)
            .map(|e| parse_cookie(&e.data))
            .transpose()?;

        self.params = Some(params);
        self.hrr_done = true;
        Ok(ServerHelloOutcome::Retry(RetryActions {
            selected_group,
            cookie,
            suite: sh.cipher_suite,
        }))
    }

    /// Build the retried ClientHello after a HelloRetryRequest.
    ///
    /// The PSK offer is dropped on retry; the handshake continues as a
    /// full one.
    pub fn build_retry_client_hello(&mut self, retry: &RetryActions) -> Result<Vec<u8>, TlsError> {
        let key_exchange = KeyExchange::generate(retry.selected_group, &self.rng)?;

        let mut extensions = vec![
            build_supported_versions_ch(&self.config.versions),
            build_supported_groups(&self.config.supported_groups),
            build_signature_algorithms(&self.config.signature_schemes),
            build_key_share_ch(&[KeyShareEntry {
                group: retry.selected_group,
                key_exchange: key_exchange.public_key_bytes().to_vec(),
            }]),
        ];
        if let Some(name) = &self.config.server_name {
            extensions.push(build_server_name(name));
        }
        if !self.config.alpn.is_empty() {
            extensions.push(build_alpn(&self.config.alpn));
        }
        if let Some(cookie) = &retry.cookie {
            extensions.push(build_cookie(cookie));
        }

        let ch = ClientHello {
            random: self.client_random,
            legacy_session_id: self.session_id.clone(),
            cipher_suites: self.config.cipher_suites.clone(),
            extensions,
        };
        let msg = encode_client_hello(&ch);
        self.transcript.update(&msg);
        self.key_exchange = key_exchange;
        self.psk = None;
        self.state = Tls13ClientState::WaitServerHello;
        Ok(msg)
    }

    /// Process EncryptedExtensions.
    pub fn process_encrypted_extensions(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.expect_state(Tls13ClientState::WaitEncryptedExtensions, "EncryptedExtensions")?;
        let ee = decode_encrypted_extensions(body_of(msg)?)?;

        if let Some(alpn) = find(&ee.extensions, ExtensionType::APPLICATION_LAYER_PROTOCOL_NEGOTIATION)
        {
            let selected = parse_alpn_selected(&alpn.data)?;
            if !self.config.alpn.contains(&selected) {
                return Err(TlsError::HandshakeFailure(
                    "server selected unoffered ALPN protocol".into(),
                ));
            }
            self.negotiated_alpn = Some(selected);
        }

        self.transcript.update(msg);
        self.state = if self.psk_mode {
            Tls13ClientState::WaitFinished
        } else {
            Tls13ClientState::WaitCertOrCertReq
        };
        Ok(())
    }

    /// Process a CertificateRequest (mTLS).
    pub fn process_certificate_request(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.expect_state(Tls13ClientState::WaitCertOrCertReq, "CertificateRequest")?;
        let cr = decode_certificate_request(body_of(msg)?)?;
        let schemes = find(&cr.extensions, ExtensionType::SIGNATURE_ALGORITHMS)
            .map(|e| super::extensions_codec::parse_signature_algorithms(&e.data))
            .transpose()?
            .unwrap_or_default();
        self.cert_request_context = Some(cr.certificate_request_context);
        self.cert_request_schemes = schemes;
        self.transcript.update(msg);
        self.state = Tls13ClientState::WaitCertificate;
        Ok(())
    }

    /// Process the server Certificate.
    pub fn process_certificate(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        if self.state != Tls13ClientState::WaitCertOrCertReq
            && self.state != Tls13ClientState::WaitCertificate
        {
            return Err(TlsError::UnexpectedMessage(format!(
                "Certificate in state {:?}",
                self.state
            )));
        }
        let cert = decode_certificate(body_of(msg)?)?;
        if cert.certificate_list.is_empty() {
            return Err(TlsError::CertificateInvalid("empty certificate list".into()));
        }
        self.server_certs = cert
            .certificate_list
            .iter()
            .map(|e| e.cert_data.clone())
            .collect();

        if self.config.verify_peer {
            let verifier = self.config.verifier.as_ref().ok_or_else(|| {
                TlsError::CertificateUnknown("no chain verifier configured".into())
            })?;
            let key =
                verifier.verify_chain(&self.server_certs, self.config.server_name.as_deref())?;
            self.server_key = Some(key);
        }

        self.transcript.update(msg);
        self.state = Tls13ClientState::WaitCertVerify;
        Ok(())
    }

    /// Process the server CertificateVerify.
    pub fn process_certificate_verify(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        self.expect_state(Tls13ClientState::WaitCertVerify, "CertificateVerify")?;
        let cv: CertificateVerifyMsg = decode_certificate_verify(body_of(msg)?)?;

        // The signature covers the transcript up to (not including) this message.
        let transcript_hash = self.transcript.current_hash();
        if let Some(key) = &self.server_key {
            verify_certificate_verify(key, cv.algorithm, &cv.signature, &transcript_hash, true)?;
        }

        self.transcript.update(msg);
        self.state = Tls13ClientState::WaitFinished;
        Ok(())
    }

    /// Process the server Finished and build the client flight.
    pub fn process_finished(&mut self, msg: &[u8]) -> Result<ClientFinishedActions, TlsError> {
        self.expect_state(Tls13ClientState::WaitFinished, "Finished")?;
        let params = self
            .params
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        let ks = self
            .key_schedule
            .as_mut()
            .ok_or_else(|| TlsError::InternalError("no key schedule".into()))?;

        let fin = decode_finished(body_of(msg)?, params.hash_len())?;
        let server_finished_key = ks.derive_finished_key(&self.server_hs_secret)?;
        let expected =
            ks.compute_finished_verify_data(&server_finished_key, &self.transcript.current_hash());
        if !bool::from(fin.verify_data.ct_eq(&expected)) {
            return Err(TlsError::DecryptError(
                "server Finished verify_data mismatch".into(),
            ));
        }
        self.transcript.update(msg);

        // Application secrets cover CH..server Finished only.
        ks.derive_master_secret()?;
        let sf_hash = self.transcript.current_hash();
        let (client_app_secret, server_app_secret) = ks.derive_app_traffic_secrets(&sf_hash)?;
        let exporter_master_secret = ks.derive_exporter_master_secret(&sf_hash)?;
        let key_log = self.config.debug.key_log.as_ref();
        keylog::log_key(
            key_log,
            "CLIENT_TRAFFIC_SECRET_0",
            &self.client_random,
            &client_app_secret,
        );
        keylog::log_key(
            key_log,
            "SERVER_TRAFFIC_SECRET_0",
            &self.client_random,
            &server_app_secret,
        );
        keylog::log_key(
            key_log,
            "EXPORTER_SECRET",
            &self.client_random,
            &exporter_master_secret,
        );
        let client_app_keys = TrafficKeys::derive(&params, &client_app_secret)?;
        let server_app_keys = TrafficKeys::derive(&params, &server_app_secret)?;

        // Client authentication flight, if requested.
        let mut flight = Vec::new();
        if let Some(context) = self.cert_request_context.clone() {
            let cert_msg = encode_certificate(&CertificateMsg {
                certificate_request_context: context,
                certificate_list: self
                    .config
                    .certificate_chain
                    .iter()
                    .map(|c| CertificateEntry {
                        cert_data: c.clone(),
                        extensions: vec![],
                    })
                    .collect(),
            });
            self.transcript.update(&cert_msg);
            flight.push(cert_msg);

            if !self.config.certificate_chain.is_empty() {
                let key = self.config.signing_key.as_ref().ok_or_else(|| {
                    TlsError::HandshakeFailure("client certificate without signing key".into())
                })?;
                let scheme = select_signature_scheme(key, &self.cert_request_schemes)?;
                let signature =
                    sign_certificate_verify(key, &self.transcript.current_hash(), false);
                let cv_msg = encode_certificate_verify(&CertificateVerifyMsg {
                    algorithm: scheme,
                    signature,
                });
                self.transcript.update(&cv_msg);
                flight.push(cv_msg);
            }
        }

        // Client Finished over CH..server Finished [.. client auth].
        let client_finished_key = ks.derive_finished_key(&self.client_hs_secret)?;
        let local_finished = ks
            .compute_finished_verify_data(&client_finished_key, &self.transcript.current_hash());
        let finished_msg = encode_finished(&local_finished);
        self.transcript.update(&finished_msg);
        flight.push(finished_msg);

        let resumption_master_secret =
            ks.derive_resumption_master_secret(&self.transcript.current_hash())?;

        self.state = Tls13ClientState::Connected;
        Ok(ClientFinishedActions {
            flight,
            client_app_keys,
            server_app_keys,
            client_app_secret,
            server_app_secret,
            params,
            exporter_master_secret,
            resumption_master_secret,
            local_finished,
            peer_finished: fin.verify_data,
        })
    }
}

/// Derive a resumable session from a post-handshake NewSessionTicket.
///
/// Returns the lookup key (the ticket) and the session data carrying
/// the derived PSK.
pub fn session_from_new_session_ticket(
    params: &CipherSuiteParams,
    suite: CipherSuite,
    resumption_master_secret: &[u8],
    alpn: Option<&[u8]>,
    msg_body: &[u8],
) -> Result<(Vec<u8>, SessionData), TlsError> {
    let nst = decode_new_session_ticket(msg_body)?;
    let ks = KeySchedule::new(params);
    let psk = ks.derive_resumption_psk(resumption_master_secret, &nst.ticket_nonce)?;
    let max_early_data = find(&nst.extensions, ExtensionType::EARLY_DATA)
        .map(|e| parse_early_data_nst(&e.data))
        .transpose()?
        .unwrap_or(0);
    let issued_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    Ok((
        nst.ticket.clone(),
        SessionData {
            version: TlsVersion::Tls13,
            cipher_suite: suite,
            secret: psk,
            client_cert: None,
            alpn: alpn.map(|a| a.to_vec()),
            max_early_data,
            issued_at,
            lifetime: nst.ticket_lifetime,
            age_add: nst.ticket_age_add,
        },
    ))
}

/// Check a negotiated-TLS 1.2 ServerHello for the TLS 1.3 downgrade
/// sentinel (RFC 8446 §4.1.3). Called by the TLS 1.2 continuation when
/// this client also offered 1.3.
pub fn check_downgrade_sentinel(server_random: &[u8; 32]) -> Result<(), TlsError> {
    if server_random[24..] == super::codec::DOWNGRADE_SENTINEL_TLS12 {
        return Err(TlsError::InsufficientSecurity(
            "TLS 1.3 downgrade sentinel in ServerHello random".into(),
        ));
    }
    Ok(())
}

fn body_of(msg: &[u8]) -> Result<&[u8], TlsError> {
    if msg.len() < 4 {
        return Err(TlsError::Decode("handshake message too short".into()));
    }
    Ok(&msg[4..])
}

/// A suite usable for the offered versions must exist.
pub fn check_offer_has_usable_suite(config: &ClientConfig) -> Result<(), TlsError> {
    let usable = config.cipher_suites.iter().any(|&s| {
        (config.versions.contains(&TlsVersion::Tls13) && is_tls13_suite(s))
            || (config.versions.contains(&TlsVersion::Tls12) && is_tls12_suite(s))
    });
    if usable {
        Ok(())
    } else {
        Err(TlsError::HandshakeFailure(
            "no cipher suite usable with the configured versions".into(),
        ))
    }
}
