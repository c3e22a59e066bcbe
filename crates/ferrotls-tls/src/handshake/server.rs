//! TLS 1.3 server handshake state machine.
//!
//! ClientHello → (HelloRetryRequest →) ServerHello + encrypted flight
//! (EncryptedExtensions, [CertificateRequest], [Certificate,
//! CertificateVerify], Finished) → [client Certificate →
//! CertificateVerify] → client Finished → Connected. The server's
//! application TX keys install after its Finished is sent; RX stays on
//! handshake keys until the client Finished verifies.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ferrotls_crypto::{PublicKey, RngSource};
use ferrotls_types::TlsError;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::config::ServerConfig;
use crate::crypt::key_schedule::KeySchedule;
use crate::crypt::keylog;
use crate::crypt::traffic_keys::TrafficKeys;
use crate::crypt::transcript::TranscriptHash;
use crate::crypt::{is_tls13_suite, CipherSuiteParams, NamedGroup};
use crate::extensions::{find, Extension, ExtensionType};
use crate::session::SessionData;
use crate::{CipherSuite, TlsVersion};

use super::codec::{
    decode_certificate, decode_certificate_verify, decode_client_hello, decode_finished,
    encode_certificate, encode_certificate_request, encode_certificate_verify,
    encode_encrypted_extensions, encode_finished, encode_new_session_ticket, encode_server_hello,
    CertificateEntry, CertificateMsg, CertificateRequestMsg, CertificateVerifyMsg, ClientHello,
    EncryptedExtensions, NewSessionTicketMsg, ServerHello, HELLO_RETRY_REQUEST_RANDOM,
};
use super::extensions_codec::{
    binders_list_len, build_alpn, build_key_share_hrr, build_key_share_sh,
    build_pre_shared_key_sh, build_signature_algorithms, build_supported_versions_sh,
    parse_alpn_list, parse_key_share_ch, parse_pre_shared_key_ch, parse_psk_key_exchange_modes,
    parse_supported_groups, parse_supported_versions_ch, KeyShareEntry,
};
use super::key_exchange::KeyExchange;
use super::signing::{select_signature_scheme, sign_certificate_verify};
use super::verify::verify_certificate_verify;

/// Server handshake states (TLS 1.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tls13ServerState {
    WaitClientHello,
    WaitClientHelloRetry,
    WaitClientCertificate,
    WaitClientCertVerify,
    WaitClientFinished,
    Connected,
}

/// The server's complete first flight plus the keys around it.
#[derive(Debug)]
pub struct ServerFlight {
    /// ServerHello, sent unprotected.
    pub server_hello_msg: Vec<u8>,
    /// EncryptedExtensions .. Finished, sent under the handshake keys.
    pub encrypted_flight: Vec<Vec<u8>>,
    pub client_hs_keys: TrafficKeys,
    pub server_hs_keys: TrafficKeys,
    pub client_app_keys: TrafficKeys,
    pub server_app_keys: TrafficKeys,
    pub client_app_secret: Vec<u8>,
    pub server_app_secret: Vec<u8>,
    pub params: CipherSuiteParams,
    pub exporter_master_secret: Vec<u8>,
    /// Our Finished verify_data.
    pub local_finished: Vec<u8>,
}

/// Outcome of processing a ClientHello.
#[derive(Debug)]
pub enum ClientHelloOutcome {
    Flight(Box<ServerFlight>),
    /// HelloRetryRequest message to send unprotected.
    Retry(Vec<u8>),
}

/// Outcome of the client Finished.
pub struct ClientFinishedResult {
    pub peer_finished: Vec<u8>,
}

/// TLS 1.3 server driver.
pub struct Tls13ServerHandshake {
    config: Arc<ServerConfig>,
    rng: Arc<RngSource>,
    state: Tls13ServerState,
    transcript: TranscriptHash,
    params: Option<CipherSuiteParams>,
    suite: Option<CipherSuite>,
    client_random: [u8; 32],
    client_hs_secret: Vec<u8>,
    psk_mode: bool,
    resumed_session_key: Option<Vec<u8>>,
    client_certs: Vec<Vec<u8>>,
    client_key: Option<PublicKey>,
    cert_requested: bool,
    negotiated_alpn: Option<Vec<u8>>,
    negotiated_group: Option<NamedGroup>,
    resumption_master_secret: Vec<u8>,
    key_schedule: Option<KeySchedule>,
}

impl Drop for Tls13ServerHandshake {
    fn drop(&mut self) {
        self.client_hs_secret.zeroize();
        self.resumption_master_secret.zeroize();
    }
}

impl Tls13ServerHandshake {
    pub fn new(config: Arc<ServerConfig>, rng: Arc<RngSource>) -> Self {
        Self {
            config,
            rng,
            state: Tls13ServerState::WaitClientHello,
            transcript: TranscriptHash::new(ferrotls_crypto::HashAlgorithm::Sha256),
            params: None,
            suite: None,
            client_random: [0u8; 32],
            client_hs_secret: Vec::new(),
            psk_mode: false,
            resumed_session_key: None,
            client_certs: Vec::new(),
            client_key: None,
            cert_requested: false,
            negotiated_alpn: None,
            negotiated_group: None,
            resumption_master_secret: Vec::new(),
            key_schedule: None,
        }
    }

    pub fn state(&self) -> Tls13ServerState {
        self.state
    }

    pub fn negotiated_alpn(&self) -> Option<&[u8]> {
        self.negotiated_alpn.as_deref()
    }

    pub fn negotiated_group(&self) -> Option<NamedGroup> {
        self.negotiated_group
    }

    pub fn client_certs(&self) -> &[Vec<u8>] {
        &self.client_certs
    }

    pub fn is_psk_mode(&self) -> bool {
        self.psk_mode
    }

    fn select_suite(&self, ch: &ClientHello) -> Result<CipherSuite, TlsError> {
        self.config
            .cipher_suites
            .iter()
            .copied()
            .find(|s| is_tls13_suite(*s) && ch.cipher_suites.contains(s))
            .ok_or_else(|| TlsError::HandshakeFailure("no shared cipher suite".into()))
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

    /// Try to accept an offered PSK for resumption. Returns the PSK on
    /// success; a malformed or unverifiable binder is fatal, an unknown
    /// or incompatible identity just falls back to a full handshake.
    fn try_accept_psk(
        &mut self,
        ch: &ClientHello,
        ch_msg: &[u8],
        params: &CipherSuiteParams,
    ) -> Result<Option<Vec<u8>>, TlsError> {
        let psk_ext = match find(&ch.extensions, ExtensionType::PRE_SHARED_KEY) {
            Some(ext) => ext,
            None => return Ok(None),
        };
        // RFC 8446 §4.2.11: pre_shared_key must be the last extension.
        if ch
            .extensions
            .last()
            .map(|e| e.extension_type != ExtensionType::PRE_SHARED_KEY)
            .unwrap_or(true)
        {
            return Err(TlsError::Decode(
                "pre_shared_key is not the last extension".into(),
            ));
        }
        let modes_ext = find(&ch.extensions, ExtensionType::PSK_KEY_EXCHANGE_MODES)
            .ok_or_else(|| {
                TlsError::Decode("pre_shared_key without psk_key_exchange_modes".into())
            })?;
        if !parse_psk_key_exchange_modes(&modes_ext.data)?.contains(&1) {
            // Only psk_dhe_ke is supported; ignore the offer.
            return Ok(None);
        }

        let (identities, binders) = parse_pre_shared_key_ch(&psk_ext.data)?;
        let identity = &identities[0];
        let binder = &binders[0];

        // 0-RTT offers consume their session state on first use.
        let offered_early_data = find(&ch.extensions, ExtensionType::EARLY_DATA).is_some();
        let manager = &self.config.session_manager;
        let data = if offered_early_data {
            manager.resume_once(&identity.identity)
        } else {
            manager.resume(&identity.identity)
        };
        let data = match data {
            Some(d) => d,
            None => return Ok(None),
        };
        if data.version != TlsVersion::Tls13 {
            return Ok(None);
        }
        let session_params = CipherSuiteParams::from_suite(data.cipher_suite)?;
        if session_params.hash != params.hash {
            return Ok(None);
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > data.issued_at.saturating_add(data.lifetime as u64) {
            return Ok(None);
        }

        // Verify the binder over the truncated ClientHello.
        let binder_tail = binders_list_len(&binders.iter().map(|b| b.len()).collect::<Vec<_>>());
        if ch_msg.len() < binder_tail {
            return Err(TlsError::Decode("ClientHello shorter than binders".into()));
        }
        let truncated_hash = params.hash.digest(&ch_msg[..ch_msg.len() - binder_tail]);
        let mut ks = KeySchedule::new(params);
        ks.derive_early_secret(Some(&data.secret))?;
        let binder_key = ks.derive_binder_key(false)?;
        let finished_key = ks.derive_finished_key(&binder_key)?;
        let expected = ks.compute_finished_verify_data(&finished_key, &truncated_hash);
        if !bool::from(binder.ct_eq(&expected)) {
            return Err(TlsError::DecryptError("PSK binder mismatch".into()));
        }

        self.psk_mode = true;
        self.resumed_session_key = Some(identity.identity.clone());
        Ok(Some(data.secret.clone()))
    }

    /// Process a ClientHello (initial or post-HRR retry).
    pub fn process_client_hello(&mut self, msg: &[u8]) -> Result<ClientHelloOutcome, TlsError> {
        let retry = match self.state {
            Tls13ServerState::WaitClientHello => false,
            Tls13ServerState::WaitClientHelloRetry => true,
            _ => {
                return Err(TlsError::UnexpectedMessage(format!(
                    "ClientHello in state {:?}",
                    self.state
                )))
            }
        };
        let ch = decode_client_hello(body_of(msg)?)?;
        self.client_random = ch.random;

        let versions_ext = find(&ch.extensions, ExtensionType::SUPPORTED_VERSIONS)
            .ok_or(TlsError::ProtocolVersion)?;
        if !parse_supported_versions_ch(&versions_ext.data)?
            .contains(&TlsVersion::Tls13.wire())
        {
            return Err(TlsError::ProtocolVersion);
        }

        let suite = self.select_suite(&ch)?;
        let params = CipherSuiteParams::from_suite(suite)?;
        self.transcript.migrate(params.hash);

        // Group selection: prefer a group the client sent a share for.
        let client_groups = find(&ch.extensions, ExtensionType::SUPPORTED_GROUPS)
            .map(|e| parse_supported_groups(&e.data))
            .transpose()?
            .unwrap_or_default();
        let shares = find(&ch.extensions, ExtensionType::KEY_SHARE)
            .map(|e| parse_key_share_ch(&e.data))
            .transpose()?
            .unwrap_or_default();
        let usable_share: Option<&KeyShareEntry> = shares.iter().find(|s| {
            s.group.kex_group().is_some() && self.config.supported_groups.contains(&s.group)
        });

        let share = match usable_share {
            Some(share) => share,
            None => {
                if retry {
                    return Err(TlsError::HandshakeFailure(
                        "retried ClientHello still has no usable key share".into(),
                    ));
                }
                // A mutually supported group without a share: retry.
                let group = self
                    .config
                    .supported_groups
                    .iter()
                    .copied()
                    .find(|g| g.kex_group().is_some() && client_groups.contains(g))
                    .ok_or_else(|| {
                        TlsError::HandshakeFailure("no common key-exchange group".into())
                    })?;
                return self.build_hello_retry_request(msg, &ch, suite, group, params);
            }
        };
        self.negotiated_group = Some(share.group);

        // After a retry the transcript already holds message_hash(CH1) + HRR.
        self.transcript.update(msg);

        // PSK resumption (dropped by clients on retry).
        let psk = if retry {
            None
        } else {
            self.try_accept_psk(&ch, msg, &params)?
        };

        // ECDHE.
        let key_exchange = KeyExchange::generate(share.group, &self.rng)?;
        let mut shared_secret = key_exchange.compute_shared_secret(&share.key_exchange)?;

        // ServerHello.
        let server_random: [u8; 32] = self.rng.random_array()?;
        let mut sh_extensions = vec![
            build_supported_versions_sh(TlsVersion::Tls13),
            build_key_share_sh(&KeyShareEntry {
                group: share.group,
                key_exchange: key_exchange.public_key_bytes().to_vec(),
            }),
        ];
        if self.psk_mode {
            sh_extensions.push(build_pre_shared_key_sh(0));
        }
        let sh_msg = encode_server_hello(&ServerHello {
            random: server_random,
            legacy_session_id: ch.legacy_session_id.clone(),
            cipher_suite: suite,
            extensions: sh_extensions,
        });
        self.transcript.update(&sh_msg);

        // Key schedule through the handshake stage.
        let mut ks = KeySchedule::new(&params);
        ks.derive_early_secret(psk.as_deref())?;
        ks.derive_handshake_secret(&shared_secret)?;
        shared_secret.zeroize();
        let hs_hash = self.transcript.current_hash();
        let (client_hs_secret, server_hs_secret) = ks.derive_handshake_traffic_secrets(&hs_hash)?;
        keylog::log_key(
            self.config.debug.key_log.as_ref(),
            "CLIENT_HANDSHAKE_TRAFFIC_SECRET",
            &self.client_random,
            &client_hs_secret,
        );
        keylog::log_key(
            self.config.debug.key_log.as_ref(),
            "SERVER_HANDSHAKE_TRAFFIC_SECRET",
            &self.client_random,
            &server_hs_secret,
        );
        let client_hs_keys = TrafficKeys::derive(&params, &client_hs_secret)?;
        let server_hs_keys = TrafficKeys::derive(&params, &server_hs_secret)?;

        // Encrypted flight.
        let mut encrypted_flight = Vec::new();

        let mut ee_extensions = Vec::new();
        if let Some(alpn_ext) = self.select_alpn(&ch)? {
            ee_extensions.push(alpn_ext);
        }
        let ee_msg = encode_encrypted_extensions(&EncryptedExtensions {
            extensions: ee_extensions,
        });
        self.transcript.update(&ee_msg);
        encrypted_flight.push(ee_msg);

        if !self.psk_mode {
            if self.config.client_cert_verifier.is_some() {
                let cr_msg = encode_certificate_request(&CertificateRequestMsg {
                    certificate_request_context: Vec::new(),
                    extensions: vec![build_signature_algorithms(&self.config.signature_schemes)],
                });
                self.transcript.update(&cr_msg);
                encrypted_flight.push(cr_msg);
                self.cert_requested = true;
            }

            let cert_msg = encode_certificate(&CertificateMsg {
                certificate_request_context: Vec::new(),
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
            encrypted_flight.push(cert_msg);

            let scheme = select_signature_scheme(
                &self.config.signing_key,
                // The client's signature_algorithms constrain us.
                &find(&ch.extensions, ExtensionType::SIGNATURE_ALGORITHMS)
                    .map(|e| super::extensions_codec::parse_signature_algorithms(&e.data))
                    .transpose()?
                    .unwrap_or_default(),
            )?;
            let signature = sign_certificate_verify(
                &self.config.signing_key,
                &self.transcript.current_hash(),
                true,
            );
            let cv_msg = encode_certificate_verify(&CertificateVerifyMsg {
                algorithm: scheme,
                signature,
            });
            self.transcript.update(&cv_msg);
            encrypted_flight.push(cv_msg);
        }

        let server_finished_key = ks.derive_finished_key(&server_hs_secret)?;
        let local_finished = ks
            .compute_finished_verify_data(&server_finished_key, &self.transcript.current_hash());
        let fin_msg = encode_finished(&local_finished);
        self.transcript.update(&fin_msg);
        encrypted_flight.push(fin_msg);

        // Application secrets cover CH..server Finished.
        ks.derive_master_secret()?;
        let sf_hash = self.transcript.current_hash();
        let (client_app_secret, server_app_secret) = ks.derive_app_traffic_secrets(&sf_hash)?;
        let exporter_master_secret = ks.derive_exporter_master_secret(&sf_hash)?;
        keylog::log_key(
            self.config.debug.key_log.as_ref(),
            "CLIENT_TRAFFIC_SECRET_0",
            &self.client_random,
            &client_app_secret,
        );
        keylog::log_key(
            self.config.debug.key_log.as_ref(),
            "SERVER_TRAFFIC_SECRET_0",
            &self.client_random,
            &server_app_secret,
        );
        keylog::log_key(
            self.config.debug.key_log.as_ref(),
            "EXPORTER_SECRET",
            &self.client_random,
            &exporter_master_secret,
        );
        let client_app_keys = TrafficKeys::derive(&params, &client_app_secret)?;
        let server_app_keys = TrafficKeys::derive(&params, &server_app_secret)?;

        self.client_hs_secret = client_hs_secret;
        self.key_schedule = Some(ks);
        self.params = Some(params);
        self.suite = Some(suite);
        self.state = if self.cert_requested {
            Tls13ServerState::WaitClientCertificate
        } else {
            Tls13ServerState::WaitClientFinished
        };

        Ok(ClientHelloOutcome::Flight(Box::new(ServerFlight {
            server_hello_msg: sh_msg,
            encrypted_flight,
            client_hs_keys,
            server_hs_keys,
            client_app_keys,
            server_app_keys,
            client_app_secret,
            server_app_secret,
            params,
            exporter_master_secret,
            local_finished,
        })))
    }

    fn build_hello_retry_request(
        &mut self,
        ch_msg: &[u8],
        ch: &ClientHello,
        suite: CipherSuite,
        group: NamedGroup,
        params: CipherSuiteParams,
    ) -> Result<ClientHelloOutcome, TlsError> {
        self.transcript.migrate(params.hash);
        self.transcript.update(ch_msg);
        self.transcript.replace_with_message_hash();

        let hrr_msg = encode_server_hello(&ServerHello {
            random: HELLO_RETRY_REQUEST_RANDOM,
            legacy_session_id: ch.legacy_session_id.clone(),
            cipher_suite: suite,
            extensions: vec![
                build_supported_versions_sh(TlsVersion::Tls13),
                build_key_share_hrr(group),
            ],
        });
        self.transcript.update(&hrr_msg);
        self.state = Tls13ServerState::WaitClientHelloRetry;
        Ok(ClientHelloOutcome::Retry(hrr_msg))
    }

    /// Process the client Certificate (mTLS).
    pub fn process_client_certificate(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        if self.state != Tls13ServerState::WaitClientCertificate {
            return Err(TlsError::UnexpectedMessage(format!(
                "client Certificate in state {:?}",
                self.state
            )));
        }
        let cert = decode_certificate(body_of(msg)?)?;
        self.client_certs = cert
            .certificate_list
            .iter()
            .map(|e| e.cert_data.clone())
            .collect();
        self.transcript.update(msg);

        if self.client_certs.is_empty() {
            if self.config.require_client_cert {
                return Err(TlsError::CertificateInvalid(
                    "client certificate required but not presented".into(),
                ));
            }
            self.state = Tls13ServerState::WaitClientFinished;
            return Ok(());
        }

        let verifier = self
            .config
            .client_cert_verifier
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("certificate request without verifier".into()))?;
        self.client_key = Some(verifier.verify_chain(&self.client_certs, None)?);
        self.state = Tls13ServerState::WaitClientCertVerify;
        Ok(())
    }

    /// Process the client CertificateVerify (mTLS).
    pub fn process_client_certificate_verify(&mut self, msg: &[u8]) -> Result<(), TlsError> {
        if self.state != Tls13ServerState::WaitClientCertVerify {
            return Err(TlsError::UnexpectedMessage(format!(
                "client CertificateVerify in state {:?}",
                self.state
            )));
        }
        let cv = decode_certificate_verify(body_of(msg)?)?;
        let transcript_hash = self.transcript.current_hash();
        let key = self
            .client_key
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no client key".into()))?;
        verify_certificate_verify(key, cv.algorithm, &cv.signature, &transcript_hash, false)?;
        self.transcript.update(msg);
        self.state = Tls13ServerState::WaitClientFinished;
        Ok(())
    }

    /// Process the client Finished.
    pub fn process_client_finished(
        &mut self,
        msg: &[u8],
    ) -> Result<ClientFinishedResult, TlsError> {
        if self.state != Tls13ServerState::WaitClientFinished {
            return Err(TlsError::UnexpectedMessage(format!(
                "client Finished in state {:?}",
                self.state
            )));
        }
        let params = self
            .params
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        let ks = self
            .key_schedule
            .as_mut()
            .ok_or_else(|| TlsError::InternalError("no key schedule".into()))?;

        let fin = decode_finished(body_of(msg)?, params.hash_len())?;
        let client_finished_key = ks.derive_finished_key(&self.client_hs_secret)?;
        let expected =
            ks.compute_finished_verify_data(&client_finished_key, &self.transcript.current_hash());
        if !bool::from(fin.verify_data.ct_eq(&expected)) {
            return Err(TlsError::DecryptError(
                "client Finished verify_data mismatch".into(),
            ));
        }
        self.transcript.update(msg);
        self.resumption_master_secret =
            ks.derive_resumption_master_secret(&self.transcript.current_hash())?;

        self.state = Tls13ServerState::Connected;
        Ok(ClientFinishedResult {
            peer_finished: fin.verify_data,
        })
    }

    /// Build NewSessionTicket messages for the completed handshake and
    /// register the sessions with the session manager.
    pub fn build_session_tickets(&self) -> Result<Vec<Vec<u8>>, TlsError> {
        if self.state != Tls13ServerState::Connected {
            return Err(TlsError::InternalError(
                "session tickets before handshake completion".into(),
            ));
        }
        let params = self
            .params
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        let suite = self
            .suite
            .ok_or_else(|| TlsError::InternalError("no negotiated suite".into()))?;
        let ks = KeySchedule::new(&params);

        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let mut messages = Vec::new();
        for i in 0..self.config.tickets_issued {
            let nonce = (i as u64).to_be_bytes().to_vec();
            let psk = ks.derive_resumption_psk(&self.resumption_master_secret, &nonce)?;
            let age_add = u32::from_be_bytes(self.rng.random_array()?);
            let id: [u8; 32] = self.rng.random_array()?;

            let data = SessionData {
                version: TlsVersion::Tls13,
                cipher_suite: suite,
                secret: psk,
                client_cert: (!self.client_certs.is_empty()).then(|| self.client_certs.clone()),
                alpn: self.negotiated_alpn.clone(),
                max_early_data: 0,
                issued_at,
                lifetime: 7200,
                age_add,
            };
            let ticket = self
                .config
                .session_manager
                .establish(&id, data)
                .unwrap_or_else(|| id.to_vec());

            messages.push(encode_new_session_ticket(&NewSessionTicketMsg {
                ticket_lifetime: 7200,
                ticket_age_add: age_add,
                ticket_nonce: nonce,
                ticket,
                extensions: vec![],
            }));
        }
        Ok(messages)
    }
}

fn body_of(msg: &[u8]) -> Result<&[u8], TlsError> {
    if msg.len() < 4 {
        return Err(TlsError::Decode("handshake message too short".into()));
    }
    Ok(&msg[4..])
}
