//! The per-connection context: record pump, lock discipline, lifecycle.
//!
//! Three independent locks guard the context, acquired in the fixed
//! order state → read → write:
//!
//! - the read lock serializes record reassembly and the RX epoch,
//! - the write lock serializes outgoing records and the TX epoch,
//! - the state lock guards everything owned by neither half (hooks
//!   table, establishment, the pending post-handshake action queue,
//!   negotiated parameters).
//!
//! A handshake takes all three for its duration. Sequence numbers live
//! inside their half's epoch state, so no atomics are needed for them.

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ferrotls_crypto::{HashAlgorithm, RngSource};
use ferrotls_types::TlsError;

use crate::alert::{Alert, AlertDescription, AlertLevel};
use crate::config::TlsParams;
use crate::crypt::export::{tls12_export_keying_material, tls13_export_keying_material};
use crate::crypt::key_schedule::KeySchedule;
use crate::crypt::traffic_keys::TrafficKeys;
use crate::crypt::CipherSuiteParams;
use crate::handshake::client::{
    check_offer_has_usable_suite, session_from_new_session_ticket, ClientHelloOffer,
    ServerHelloOutcome, Tls13ClientHandshake, Tls13ClientState,
};
use crate::handshake::client12::{
    ServerHello12Outcome, Tls12ClientHandshake, Tls12ClientState,
};
use crate::handshake::codec::{
    decode_key_update, decode_server_hello, encode_key_update, parse_handshake_header,
    KeyUpdateRequest,
};
use crate::handshake::codec12::encode_change_cipher_spec;
use crate::handshake::extensions_codec::parse_supported_versions_sh;
use crate::handshake::server::{
    ClientHelloOutcome, Tls13ServerHandshake, Tls13ServerState,
};
use crate::handshake::server12::{
    ServerHello12Outcome as Server12Outcome, Tls12ServerHandshake, Tls12ServerState,
};
use crate::handshake::{HandshakeMessage, HandshakeType};
use crate::hooks::{Hooks, WireDirection};
use crate::record::encryption::{Tls13Opener, Tls13Sealer};
use crate::record::encryption12::{Tls12Opener, Tls12Sealer};
use crate::record::{parse_record, ContentType, Open, Seal};
use crate::session::SessionManager;
use crate::transport::Transport;
use crate::{CipherSuite, Established, TlsRole, TlsVersion};

/// Exporter inputs retained after the handshake.
enum ExporterSecret {
    Tls13 {
        params: CipherSuiteParams,
        secret: Vec<u8>,
    },
    Tls12 {
        hash: HashAlgorithm,
        master_secret: Vec<u8>,
        client_random: [u8; 32],
        server_random: [u8; 32],
    },
}

/// TLS 1.3 resumption inputs retained for post-handshake tickets.
struct ResumptionState {
    params: CipherSuiteParams,
    suite: CipherSuite,
    resumption_master_secret: Vec<u8>,
    alpn: Option<Vec<u8>>,
}

/// Deferred actions emitted after establishment.
enum PendingAction {
    SendHandshakeMessages(Vec<Vec<u8>>),
    SendKeyUpdate { request_peer: bool },
}

/// State guarded by the state lock.
struct Shared {
    established: Established,
    version: Option<TlsVersion>,
    suite: Option<CipherSuite>,
    hooks: Arc<Hooks>,
    pending: VecDeque<PendingAction>,
    local_finished: Vec<u8>,
    peer_finished: Vec<u8>,
    peer_certs: Vec<Vec<u8>>,
    negotiated_alpn: Option<Vec<u8>>,
    exporter: Option<ExporterSecret>,
    resumption: Option<Arc<ResumptionState>>,
}

/// State guarded by the read lock.
struct ReadHalf {
    open: Open,
    pending_open: Option<Open>,
    /// Raw bytes from the transport, not yet framed.
    buf: Vec<u8>,
    /// Reassembled handshake stream.
    hs_buf: Vec<u8>,
    /// Decrypted application bytes not yet delivered.
    app_buf: Vec<u8>,
    /// Transport half-closed or close_notify received.
    eof: bool,
    /// TLS 1.3 RX traffic secret, for KeyUpdate rotation.
    traffic_secret: Option<Vec<u8>>,
    params13: Option<CipherSuiteParams>,
}

/// State guarded by the write lock.
struct WriteHalf {
    seal: Seal,
    pending_seal: Option<Seal>,
    closed: bool,
    close_notify_sent: bool,
    traffic_secret: Option<Vec<u8>>,
    params13: Option<CipherSuiteParams>,
}

impl ReadHalf {
    fn install(&mut self, open: Open) -> Result<(), TlsError> {
        if !self.hs_buf.is_empty() {
            return Err(TlsError::UnexpectedMessage(
                "epoch change inside a handshake message".into(),
            ));
        }
        self.open = open;
        Ok(())
    }

    fn arm(&mut self, open: Open) {
        self.pending_open = Some(open);
    }

    fn swap(&mut self) -> Result<(), TlsError> {
        let open = self.pending_open.take().ok_or_else(|| {
            TlsError::UnexpectedMessage("epoch swap without pending keys".into())
        })?;
        self.install(open)
    }

    /// Read one record from the transport and unprotect it.
    fn recv_record<T: Transport>(
        &mut self,
        transport: &T,
        hooks: &Hooks,
    ) -> Result<(ContentType, Vec<u8>), TlsError> {
        loop {
            if let Some((record, consumed)) = parse_record(&self.buf)? {
                if let Some(log) = &hooks.logging {
                    log(WireDirection::Recv, &self.buf[..consumed]);
                }
                self.buf.drain(..consumed);
                return self.open.open(record);
            }
            let chunk = transport.recv(16 * 1024)?;
            if chunk.is_empty() {
                self.eof = true;
                return Err(TlsError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&chunk);
        }
    }

    /// Rotate the TLS 1.3 RX epoch (post-handshake KeyUpdate).
    fn rotate_tls13(&mut self) -> Result<(), TlsError> {
        let params = self
            .params13
            .ok_or_else(|| TlsError::UnexpectedMessage("KeyUpdate outside TLS 1.3".into()))?;
        let secret = self
            .traffic_secret
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no RX traffic secret".into()))?;
        let ks = KeySchedule::new(&params);
        let next = ks.update_traffic_secret(secret)?;
        let keys = TrafficKeys::derive(&params, &next)?;
        self.install(Open::Tls13(Tls13Opener::new(&params, &keys)?))?;
        self.traffic_secret = Some(next);
        Ok(())
    }
}

impl WriteHalf {
    fn arm(&mut self, seal: Seal) {
        self.pending_seal = Some(seal);
    }

    fn swap(&mut self) -> Result<(), TlsError> {
        self.seal = self.pending_seal.take().ok_or_else(|| {
            TlsError::InternalError("epoch swap without pending keys".into())
        })?;
        Ok(())
    }

    fn send<T: Transport>(
        &mut self,
        transport: &T,
        hooks: &Hooks,
        content_type: ContentType,
        payload: &[u8],
    ) -> Result<(), TlsError> {
        let wire = self.seal.seal_stream(content_type, payload)?;
        if let Some(log) = &hooks.logging {
            log(WireDirection::Send, &wire);
        }
        transport.send(&wire)
    }

    /// Rotate the TLS 1.3 TX epoch.
    fn rotate_tls13(&mut self) -> Result<(), TlsError> {
        let params = self
            .params13
            .ok_or_else(|| TlsError::UnexpectedMessage("KeyUpdate outside TLS 1.3".into()))?;
        let secret = self
            .traffic_secret
            .as_ref()
            .ok_or_else(|| TlsError::InternalError("no TX traffic secret".into()))?;
        let ks = KeySchedule::new(&params);
        let next = ks.update_traffic_secret(secret)?;
        let keys = TrafficKeys::derive(&params, &next)?;
        self.seal = Seal::Tls13(Tls13Sealer::new(&params, &keys)?);
        self.traffic_secret = Some(next);
        Ok(())
    }
}

/// An event from the handshake record pump.
enum HandshakeEvent {
    /// A whole handshake message (header included), after receive hooks.
    Message(Vec<u8>),
    ChangeCipherSpec,
}

/// A TLS 1.2 / 1.3 connection over a caller-supplied transport.
pub struct TlsContext<T: Transport> {
    transport: T,
    params: TlsParams,
    rng: Arc<RngSource>,
    fatal: AtomicBool,
    state: Mutex<Shared>,
    read: Mutex<ReadHalf>,
    write: Mutex<WriteHalf>,
}

impl<T: Transport> TlsContext<T> {
    /// Create a connection context: null record epochs, sequence
    /// numbers zero, state machine at its initial state.
    pub fn new(transport: T, params: impl Into<TlsParams>) -> Self {
        let params = params.into();
        let rng = Arc::new(match params.debug().rng_seed {
            Some(seed) => RngSource::seeded(seed),
            None => RngSource::system(),
        });
        Self {
            transport,
            params,
            rng,
            fatal: AtomicBool::new(false),
            state: Mutex::new(Shared {
                established: Established::NotEstablished,
                version: None,
                suite: None,
                hooks: Arc::new(Hooks::default()),
                pending: VecDeque::new(),
                local_finished: Vec::new(),
                peer_finished: Vec::new(),
                peer_certs: Vec::new(),
                negotiated_alpn: None,
                exporter: None,
                resumption: None,
            }),
            read: Mutex::new(ReadHalf {
                open: Open::Plain,
                pending_open: None,
                buf: Vec::with_capacity(16 * 1024),
                hs_buf: Vec::new(),
                app_buf: Vec::new(),
                eof: false,
                traffic_secret: None,
                params13: None,
            }),
            write: Mutex::new(WriteHalf {
                seal: Seal::Plain,
                pending_seal: None,
                closed: false,
                close_notify_sent: false,
                traffic_secret: None,
                params13: None,
            }),
        }
    }

    pub fn role(&self) -> TlsRole {
        self.params.role()
    }

    fn lock_state(&self) -> MutexGuard<'_, Shared> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_read(&self) -> MutexGuard<'_, ReadHalf> {
        self.read.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_write(&self) -> MutexGuard<'_, WriteHalf> {
        self.write.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_fatal(&self) -> Result<(), TlsError> {
        if self.fatal.load(Ordering::SeqCst) {
            return Err(TlsError::ConnectionClosed);
        }
        Ok(())
    }

    /// Install the hooks table atomically.
    pub fn set_hooks(&self, hooks: Hooks) {
        self.lock_state().hooks = Arc::new(hooks);
    }

    pub fn negotiated_version(&self) -> Option<TlsVersion> {
        self.lock_state().version
    }

    pub fn negotiated_cipher_suite(&self) -> Option<CipherSuite> {
        self.lock_state().suite
    }

    pub fn negotiated_alpn(&self) -> Option<Vec<u8>> {
        self.lock_state().negotiated_alpn.clone()
    }

    pub fn peer_certificates(&self) -> Vec<Vec<u8>> {
        self.lock_state().peer_certs.clone()
    }

    pub fn is_established(&self) -> bool {
        self.lock_state().established == Established::Established
    }

    /// Our Finished verify_data, for channel binding.
    pub fn get_finished(&self) -> Vec<u8> {
        self.lock_state().local_finished.clone()
    }

    /// The peer's Finished verify_data.
    pub fn get_peer_finished(&self) -> Vec<u8> {
        self.lock_state().peer_finished.clone()
    }

    /// RFC 5705 / RFC 8446 §7.5 keying-material export.
    pub fn get_tls_exporter(
        &self,
        label: &[u8],
        context: &[u8],
        length: usize,
    ) -> Result<Vec<u8>, TlsError> {
        let state = self.lock_state();
        match state.exporter.as_ref() {
            Some(ExporterSecret::Tls13 { params, secret }) => {
                tls13_export_keying_material(params.hash, secret, label, context, length)
            }
            Some(ExporterSecret::Tls12 {
                hash,
                master_secret,
                client_random,
                server_random,
            }) => tls12_export_keying_material(
                *hash,
                master_secret,
                client_random,
                server_random,
                label,
                Some(context),
                length,
            ),
            None => Err(TlsError::HandshakeFailure(
                "exporter unavailable before establishment".into(),
            )),
        }
    }

    /// Run the handshake to completion.
    pub fn handshake(&self) -> Result<(), TlsError> {
        self.handshake_inner(None)
    }

    /// Run the handshake, with `prefix` treated as bytes already read
    /// from the transport (e.g. a sniffed ClientHello).
    pub fn handshake_with(&self, prefix: &[u8]) -> Result<(), TlsError> {
        self.handshake_inner(Some(prefix))
    }

    fn handshake_inner(&self, prefix: Option<&[u8]>) -> Result<(), TlsError> {
        self.check_fatal()?;
        // Lock order: state → read → write, held for the duration.
        let mut state = self.lock_state();
        if state.established != Established::NotEstablished {
            return Err(TlsError::UnexpectedMessage(
                "handshake already completed".into(),
            ));
        }
        let mut read = self.lock_read();
        let mut write = self.lock_write();
        if let Some(prefix) = prefix {
            read.buf.extend_from_slice(prefix);
        }

        let mut resumed_key: Option<Vec<u8>> = None;
        let result = match &self.params {
            TlsParams::Client(config) => {
                let config = config.clone();
                self.client_handshake(&config, &mut state, &mut read, &mut write)
            }
            TlsParams::Server(config) => {
                let config = config.clone();
                self.server_handshake(&config, &mut state, &mut read, &mut write, &mut resumed_key)
            }
        };

        match result {
            Ok(()) => {
                let _ = self.transport.flush();
                // Emit queued post-handshake actions (session tickets).
                if let Err(err) = self.drain_pending_locked(&mut state, &mut write) {
                    self.fatal.store(true, Ordering::SeqCst);
                    return Err(err);
                }
                Ok(())
            }
            Err(err) => {
                // A failed resumption invalidates the accepted session.
                if let Some(key) = resumed_key {
                    self.params.session_manager().invalidate(&key);
                }
                self.fail(&mut write, &state.hooks.clone(), &err);
                Err(err)
            }
        }
    }

    /// Best-effort fatal alert, then poison the context.
    fn fail(&self, write: &mut WriteHalf, hooks: &Hooks, err: &TlsError) {
        if let Some(alert) = Alert::for_error(err) {
            if !err.is_warning() {
                let _ = write.send(&self.transport, hooks, ContentType::Alert, &alert.encode());
                let _ = self.transport.flush();
            }
        }
        self.fatal.store(true, Ordering::SeqCst);
        write.closed = true;
    }

    // -----------------------------------------------------------------
    // Handshake record pump
    // -----------------------------------------------------------------

    /// Pull the next handshake event. TLS 1.3 swallows compatibility
    /// ChangeCipherSpec records; TLS 1.2 delivers them to the driver.
    fn next_handshake_event(
        &self,
        read: &mut ReadHalf,
        hooks: &Hooks,
        tls13: bool,
    ) -> Result<HandshakeEvent, TlsError> {
        loop {
            // A complete message may already be buffered.
            if read.hs_buf.len() >= 4 {
                let len = ((read.hs_buf[1] as usize) << 16)
                    | ((read.hs_buf[2] as usize) << 8)
                    | (read.hs_buf[3] as usize);
                if read.hs_buf.len() >= 4 + len {
                    let mut msg: Vec<u8> = read.hs_buf.drain(..4 + len).collect();
                    let hook = if tls13 {
                        hooks.on_recv_handshake13.as_ref()
                    } else {
                        hooks.on_recv_handshake.as_ref()
                    };
                    if let Some(hook) = hook {
                        msg = hook(HandshakeMessage::parse(&msg)?).encode();
                    }
                    return Ok(HandshakeEvent::Message(msg));
                }
            }

            let (content_type, payload) = read.recv_record(&self.transport, hooks)?;
            match content_type {
                ContentType::Handshake => {
                    if payload.is_empty() {
                        return Err(TlsError::Decode("empty handshake record".into()));
                    }
                    read.hs_buf.extend_from_slice(&payload);
                }
                ContentType::ChangeCipherSpec => {
                    if payload != [0x01] {
                        return Err(TlsError::Decode("malformed ChangeCipherSpec".into()));
                    }
                    if tls13 {
                        continue; // middlebox compatibility
                    }
                    if !read.hs_buf.is_empty() {
                        return Err(TlsError::UnexpectedMessage(
                            "ChangeCipherSpec inside a handshake message".into(),
                        ));
                    }
                    return Ok(HandshakeEvent::ChangeCipherSpec);
                }
                ContentType::Alert => {
                    let alert = Alert::decode(&payload)?;
                    match (alert.level, alert.description) {
                        (_, AlertDescription::CloseNotify) => {
                            read.eof = true;
                            return Err(TlsError::CloseNotify);
                        }
                        (AlertLevel::Warning, _) => continue,
                        (AlertLevel::Fatal, desc) => {
                            read.eof = true;
                            return Err(TlsError::PeerAlert(desc as u8));
                        }
                    }
                }
                ContentType::ApplicationData => {
                    return Err(TlsError::UnexpectedMessage(
                        "application data during handshake".into(),
                    ));
                }
            }
        }
    }

    fn expect_message(
        &self,
        read: &mut ReadHalf,
        hooks: &Hooks,
        tls13: bool,
    ) -> Result<Vec<u8>, TlsError> {
        match self.next_handshake_event(read, hooks, tls13)? {
            HandshakeEvent::Message(msg) => Ok(msg),
            HandshakeEvent::ChangeCipherSpec => Err(TlsError::UnexpectedMessage(
                "unexpected ChangeCipherSpec".into(),
            )),
        }
    }

    // -----------------------------------------------------------------
    // Client handshake
    // -----------------------------------------------------------------

    fn client_handshake(
        &self,
        config: &Arc<crate::config::ClientConfig>,
        state: &mut Shared,
        read: &mut ReadHalf,
        write: &mut WriteHalf,
    ) -> Result<(), TlsError> {
        check_offer_has_usable_suite(config)?;
        let hooks = state.hooks.clone();
        let offer = ClientHelloOffer::build(config, &self.rng)?;
        write.send(&self.transport, &hooks, ContentType::Handshake, &offer.msg)?;
        let _ = self.transport.flush();

        let sh_msg = self.expect_message(read, &hooks, true)?;
        let (msg_type, sh_body, _) = parse_handshake_header(&sh_msg)?;
        if msg_type != HandshakeType::ServerHello {
            return Err(TlsError::UnexpectedMessage(format!(
                "expected ServerHello, got {msg_type:?}"
            )));
        }

        // Version dispatch on the ServerHello's supported_versions.
        let sh = decode_server_hello(sh_body)?;
        let negotiated_13 = crate::extensions::find(
            &sh.extensions,
            crate::extensions::ExtensionType::SUPPORTED_VERSIONS,
        )
        .map(|e| parse_supported_versions_sh(&e.data))
        .transpose()?
        .map(|v| v == TlsVersion::Tls13.wire())
        .unwrap_or(false);

        if negotiated_13 {
            if !config.versions.contains(&TlsVersion::Tls13) {
                return Err(TlsError::ProtocolVersion);
            }
            self.client_handshake_13(config, state, read, write, offer, sh_msg)
        } else {
            if !config.versions.contains(&TlsVersion::Tls12) {
                return Err(TlsError::ProtocolVersion);
            }
            self.client_handshake_12(config, state, read, write, offer, sh_msg)
        }
    }

    fn client_handshake_13(
        &self,
        config: &Arc<crate::config::ClientConfig>,
        state: &mut Shared,
        read: &mut ReadHalf,
        write: &mut WriteHalf,
        offer: ClientHelloOffer,
        sh_msg: Vec<u8>,
    ) -> Result<(), TlsError> {
        let hooks = state.hooks.clone();
        let mut driver = Tls13ClientHandshake::new(config.clone(), self.rng.clone(), offer);

        let actions = match driver.process_server_hello(&sh_msg)? {
            ServerHelloOutcome::Actions(actions) => actions,
            ServerHelloOutcome::Retry(retry) => {
                let retry_msg = driver.build_retry_client_hello(&retry)?;
                write.send(&self.transport, &hooks, ContentType::Handshake, &retry_msg)?;
                let _ = self.transport.flush();
                let sh2 = self.expect_message(read, &hooks, true)?;
                let (msg_type, _, _) = parse_handshake_header(&sh2)?;
                if msg_type != HandshakeType::ServerHello {
                    return Err(TlsError::UnexpectedMessage(format!(
                        "expected ServerHello after retry, got {msg_type:?}"
                    )));
                }
                match driver.process_server_hello(&sh2)? {
                    ServerHelloOutcome::Actions(actions) => actions,
                    ServerHelloOutcome::Retry(_) => {
                        return Err(TlsError::UnexpectedMessage(
                            "second HelloRetryRequest".into(),
                        ))
                    }
                }
            }
        };

        // Handshake keys both directions.
        read.install(Open::Tls13(Tls13Opener::new(
            &actions.params,
            &actions.server_hs_keys,
        )?))?;
        write.seal = Seal::Tls13(Tls13Sealer::new(&actions.params, &actions.client_hs_keys)?);

        // Server's encrypted flight.
        let finished = loop {
            let msg = self.expect_message(read, &hooks, true)?;
            let (msg_type, _, _) = parse_handshake_header(&msg)?;
            match (driver.state(), msg_type) {
                (Tls13ClientState::WaitEncryptedExtensions, HandshakeType::EncryptedExtensions) => {
                    driver.process_encrypted_extensions(&msg)?;
                }
                (Tls13ClientState::WaitCertOrCertReq, HandshakeType::CertificateRequest) => {
                    driver.process_certificate_request(&msg)?;
                }
                (
                    Tls13ClientState::WaitCertOrCertReq | Tls13ClientState::WaitCertificate,
                    HandshakeType::Certificate,
                ) => {
                    driver.process_certificate(&msg)?;
                    if let Some(hook) = &hooks.on_recv_certificate_chain {
                        hook(driver.server_certs());
                    }
                }
                (Tls13ClientState::WaitCertVerify, HandshakeType::CertificateVerify) => {
                    driver.process_certificate_verify(&msg)?;
                }
                (Tls13ClientState::WaitFinished, HandshakeType::Finished) => {
                    break driver.process_finished(&msg)?;
                }
                (_, other) => {
                    return Err(TlsError::UnexpectedMessage(format!(
                        "{other:?} in state {:?}",
                        driver.state()
                    )))
                }
            }
        };

        // RX switches to application keys now that the server Finished
        // is processed; our flight still goes out under handshake keys.
        read.install(Open::Tls13(Tls13Opener::new(
            &finished.params,
            &finished.server_app_keys,
        )?))?;
        read.traffic_secret = Some(finished.server_app_secret.clone());
        read.params13 = Some(finished.params);

        for msg in &finished.flight {
            write.send(&self.transport, &hooks, ContentType::Handshake, msg)?;
        }
        write.seal = Seal::Tls13(Tls13Sealer::new(&finished.params, &finished.client_app_keys)?);
        write.traffic_secret = Some(finished.client_app_secret.clone());
        write.params13 = Some(finished.params);

        state.established = Established::Established;
        state.version = Some(TlsVersion::Tls13);
        state.suite = Some(finished.params.suite);
        state.local_finished = finished.local_finished.clone();
        state.peer_finished = finished.peer_finished.clone();
        state.peer_certs = driver.server_certs().to_vec();
        state.negotiated_alpn = driver.negotiated_alpn().map(|a| a.to_vec());
        state.exporter = Some(ExporterSecret::Tls13 {
            params: finished.params,
            secret: finished.exporter_master_secret.clone(),
        });
        state.resumption = Some(Arc::new(ResumptionState {
            params: finished.params,
            suite: finished.params.suite,
            resumption_master_secret: finished.resumption_master_secret.clone(),
            alpn: driver.negotiated_alpn().map(|a| a.to_vec()),
        }));
        Ok(())
    }

    fn client_handshake_12(
        &self,
        config: &Arc<crate::config::ClientConfig>,
        state: &mut Shared,
        read: &mut ReadHalf,
        write: &mut WriteHalf,
        offer: ClientHelloOffer,
        sh_msg: Vec<u8>,
    ) -> Result<(), TlsError> {
        let hooks = state.hooks.clone();
        let mut driver = Tls12ClientHandshake::new(config.clone(), self.rng.clone(), offer);

        let abbreviated_keys = match driver.process_server_hello(&sh_msg)? {
            ServerHello12Outcome::Abbreviated(keys) => Some(keys),
            ServerHello12Outcome::Full => None,
        };

        let local_finished;
        let peer_finished;

        if let Some(keys) = abbreviated_keys {
            // Abbreviated: server CCS + Finished, then ours.
            read.arm(Open::Tls12(Tls12Opener::new(
                &keys.params,
                &keys.server_write_key,
                &keys.server_write_iv,
            )?));
            let outcome = loop {
                match self.next_handshake_event(read, &hooks, false)? {
                    HandshakeEvent::ChangeCipherSpec => {
                        driver.process_change_cipher_spec()?;
                        read.swap()?;
                    }
                    HandshakeEvent::Message(msg) => {
                        let (msg_type, _, _) = parse_handshake_header(&msg)?;
                        match msg_type {
                            HandshakeType::NewSessionTicket => {
                                driver.process_new_session_ticket(&msg)?;
                            }
                            HandshakeType::Finished => break driver.process_finished(&msg)?,
                            other => {
                                return Err(TlsError::UnexpectedMessage(format!(
                                    "{other:?} during abbreviated handshake"
                                )))
                            }
                        }
                    }
                }
            };
            write.send(
                &self.transport,
                &hooks,
                ContentType::ChangeCipherSpec,
                &encode_change_cipher_spec(),
            )?;
            write.seal = Seal::Tls12(Tls12Sealer::new(
                &keys.params,
                &keys.client_write_key,
                &keys.client_write_iv,
            )?);
            let reply = outcome.reply_finished_msg.as_ref().ok_or_else(|| {
                TlsError::InternalError("abbreviated flow without Finished reply".into())
            })?;
            write.send(&self.transport, &hooks, ContentType::Handshake, reply)?;
            local_finished = outcome.local_finished;
            peer_finished = outcome.peer_finished;
        } else {
            // Full handshake: server flight down to ServerHelloDone.
            let flight = loop {
                let msg = self.expect_message(read, &hooks, false)?;
                let (msg_type, _, _) = parse_handshake_header(&msg)?;
                match (driver.state(), msg_type) {
                    (Tls12ClientState::WaitCertificate, HandshakeType::Certificate) => {
                        driver.process_certificate(&msg)?;
                        if let Some(hook) = &hooks.on_recv_certificate_chain {
                            hook(driver.server_certs());
                        }
                    }
                    (Tls12ClientState::WaitServerKeyExchange, HandshakeType::ServerKeyExchange) => {
                        driver.process_server_key_exchange(&msg)?;
                    }
                    (Tls12ClientState::WaitHelloDone, HandshakeType::CertificateRequest) => {
                        driver.process_certificate_request(&msg)?;
                    }
                    (Tls12ClientState::WaitHelloDone, HandshakeType::ServerHelloDone) => {
                        break driver.process_server_hello_done(&msg)?;
                    }
                    (_, other) => {
                        return Err(TlsError::UnexpectedMessage(format!(
                            "{other:?} in state {:?}",
                            driver.state()
                        )))
                    }
                }
            };

            for msg in &flight.pre_ccs {
                write.send(&self.transport, &hooks, ContentType::Handshake, msg)?;
            }
            write.send(
                &self.transport,
                &hooks,
                ContentType::ChangeCipherSpec,
                &encode_change_cipher_spec(),
            )?;
            write.seal = Seal::Tls12(Tls12Sealer::new(
                &flight.keys.params,
                &flight.keys.client_write_key,
                &flight.keys.client_write_iv,
            )?);
            write.send(
                &self.transport,
                &hooks,
                ContentType::Handshake,
                &flight.finished_msg,
            )?;
            let _ = self.transport.flush();
            read.arm(Open::Tls12(Tls12Opener::new(
                &flight.keys.params,
                &flight.keys.server_write_key,
                &flight.keys.server_write_iv,
            )?));

            // Server: [NewSessionTicket], CCS, Finished.
            let outcome = loop {
                match self.next_handshake_event(read, &hooks, false)? {
                    HandshakeEvent::ChangeCipherSpec => {
                        driver.process_change_cipher_spec()?;
                        read.swap()?;
                    }
                    HandshakeEvent::Message(msg) => {
                        let (msg_type, _, _) = parse_handshake_header(&msg)?;
                        match msg_type {
                            HandshakeType::NewSessionTicket => {
                                driver.process_new_session_ticket(&msg)?;
                            }
                            HandshakeType::Finished => break driver.process_finished(&msg)?,
                            other => {
                                return Err(TlsError::UnexpectedMessage(format!(
                                    "{other:?} while waiting for server Finished"
                                )))
                            }
                        }
                    }
                }
            };
            local_finished = flight.local_finished;
            peer_finished = outcome.peer_finished;
        }

        let params = *driver
            .params()
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        state.established = Established::Established;
        state.version = Some(TlsVersion::Tls12);
        state.suite = Some(params.suite);
        state.local_finished = local_finished;
        state.peer_finished = peer_finished;
        state.peer_certs = driver.server_certs().to_vec();
        state.negotiated_alpn = driver.negotiated_alpn().map(|a| a.to_vec());
        state.exporter = Some(ExporterSecret::Tls12 {
            hash: params.hash,
            master_secret: driver.master_secret().to_vec(),
            client_random: *driver.client_random(),
            server_random: *driver.server_random(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Server handshake
    // -----------------------------------------------------------------

    fn server_handshake(
        &self,
        config: &Arc<crate::config::ServerConfig>,
        state: &mut Shared,
        read: &mut ReadHalf,
        write: &mut WriteHalf,
        resumed_key: &mut Option<Vec<u8>>,
    ) -> Result<(), TlsError> {
        let hooks = state.hooks.clone();
        let ch_msg = self.expect_message(read, &hooks, false)?;
        let (msg_type, ch_body, _) = parse_handshake_header(&ch_msg)?;
        if msg_type != HandshakeType::ClientHello {
            return Err(TlsError::UnexpectedMessage(format!(
                "expected ClientHello, got {msg_type:?}"
            )));
        }

        // Version dispatch on the offered supported_versions.
        let ch = crate::handshake::codec::decode_client_hello(ch_body)?;
        let offers_13 = crate::extensions::find(
            &ch.extensions,
            crate::extensions::ExtensionType::SUPPORTED_VERSIONS,
        )
        .map(|e| crate::handshake::extensions_codec::parse_supported_versions_ch(&e.data))
        .transpose()?
        .map(|versions| versions.contains(&TlsVersion::Tls13.wire()))
        .unwrap_or(false);

        // Negotiate 1.3 only when we can actually run it; otherwise a
        // 1.3-capable server falls back to 1.2 and marks the hello with
        // the downgrade sentinel.
        let can_run_13 = config.versions.contains(&TlsVersion::Tls13)
            && config
                .cipher_suites
                .iter()
                .any(|&s| crate::crypt::is_tls13_suite(s));
        if offers_13 && can_run_13 {
            self.server_handshake_13(config, state, read, write, ch_msg)
        } else {
            self.server_handshake_12(config, state, read, write, ch_msg, resumed_key)
        }
    }

    fn server_handshake_13(
        &self,
        config: &Arc<crate::config::ServerConfig>,
        state: &mut Shared,
        read: &mut ReadHalf,
        write: &mut WriteHalf,
        ch_msg: Vec<u8>,
    ) -> Result<(), TlsError> {
        let hooks = state.hooks.clone();
        let mut driver = Tls13ServerHandshake::new(config.clone(), self.rng.clone());

        let flight = match driver.process_client_hello(&ch_msg)? {
            ClientHelloOutcome::Flight(flight) => flight,
            ClientHelloOutcome::Retry(hrr_msg) => {
                write.send(&self.transport, &hooks, ContentType::Handshake, &hrr_msg)?;
                let _ = self.transport.flush();
                let ch2 = self.expect_message(read, &hooks, true)?;
                let (msg_type, _, _) = parse_handshake_header(&ch2)?;
                if msg_type != HandshakeType::ClientHello {
                    return Err(TlsError::UnexpectedMessage(format!(
                        "expected retried ClientHello, got {msg_type:?}"
                    )));
                }
                match driver.process_client_hello(&ch2)? {
                    ClientHelloOutcome::Flight(flight) => flight,
                    ClientHelloOutcome::Retry(_) => {
                        return Err(TlsError::InternalError("second HelloRetryRequest".into()))
                    }
                }
            }
        };

        write.send(
            &self.transport,
            &hooks,
            ContentType::Handshake,
            &flight.server_hello_msg,
        )?;
        write.seal = Seal::Tls13(Tls13Sealer::new(&flight.params, &flight.server_hs_keys)?);
        for msg in &flight.encrypted_flight {
            write.send(&self.transport, &hooks, ContentType::Handshake, msg)?;
        }
        let _ = self.transport.flush();

        // TX moves to application keys after our Finished; RX keeps the
        // handshake keys until the client's Finished verifies.
        write.seal = Seal::Tls13(Tls13Sealer::new(&flight.params, &flight.server_app_keys)?);
        write.traffic_secret = Some(flight.server_app_secret.clone());
        write.params13 = Some(flight.params);
        read.install(Open::Tls13(Tls13Opener::new(
            &flight.params,
            &flight.client_hs_keys,
        )?))?;

        let finished = loop {
            let msg = self.expect_message(read, &hooks, true)?;
            let (msg_type, _, _) = parse_handshake_header(&msg)?;
            match (driver.state(), msg_type) {
                (Tls13ServerState::WaitClientCertificate, HandshakeType::Certificate) => {
                    driver.process_client_certificate(&msg)?;
                    if let Some(hook) = &hooks.on_recv_certificate_chain {
                        hook(driver.client_certs());
                    }
                }
                (Tls13ServerState::WaitClientCertVerify, HandshakeType::CertificateVerify) => {
                    driver.process_client_certificate_verify(&msg)?;
                }
                (Tls13ServerState::WaitClientFinished, HandshakeType::Finished) => {
                    break driver.process_client_finished(&msg)?;
                }
                (_, other) => {
                    return Err(TlsError::UnexpectedMessage(format!(
                        "{other:?} in state {:?}",
                        driver.state()
                    )))
                }
            }
        };

        read.install(Open::Tls13(Tls13Opener::new(
            &flight.params,
            &flight.client_app_keys,
        )?))?;
        read.traffic_secret = Some(flight.client_app_secret.clone());
        read.params13 = Some(flight.params);

        state.established = Established::Established;
        state.version = Some(TlsVersion::Tls13);
        state.suite = Some(flight.params.suite);
        state.local_finished = flight.local_finished.clone();
        state.peer_finished = finished.peer_finished;
        state.peer_certs = driver.client_certs().to_vec();
        state.negotiated_alpn = driver.negotiated_alpn().map(|a| a.to_vec());
        state.exporter = Some(ExporterSecret::Tls13 {
            params: flight.params,
            secret: flight.exporter_master_secret.clone(),
        });

        // Queue NewSessionTickets for emission after establishment.
        if config.tickets_issued > 0 {
            let tickets = driver.build_session_tickets()?;
            if !tickets.is_empty() {
                state
                    .pending
                    .push_back(PendingAction::SendHandshakeMessages(tickets));
            }
        }
        Ok(())
    }

    fn server_handshake_12(
        &self,
        config: &Arc<crate::config::ServerConfig>,
        state: &mut Shared,
        read: &mut ReadHalf,
        write: &mut WriteHalf,
        ch_msg: Vec<u8>,
        resumed_key: &mut Option<Vec<u8>>,
    ) -> Result<(), TlsError> {
        if !config.versions.contains(&TlsVersion::Tls12) {
            return Err(TlsError::ProtocolVersion);
        }
        let hooks = state.hooks.clone();
        let mut driver = Tls12ServerHandshake::new(config.clone(), self.rng.clone());

        let local_finished;
        let peer_finished;

        match driver.process_client_hello(&ch_msg)? {
            Server12Outcome::Abbreviated(flight) => {
                *resumed_key = driver.resumed_session_key().map(|k| k.to_vec());
                write.send(
                    &self.transport,
                    &hooks,
                    ContentType::Handshake,
                    &flight.server_hello_msg,
                )?;
                write.send(
                    &self.transport,
                    &hooks,
                    ContentType::ChangeCipherSpec,
                    &encode_change_cipher_spec(),
                )?;
                write.seal = Seal::Tls12(Tls12Sealer::new(
                    &flight.keys.params,
                    &flight.keys.server_write_key,
                    &flight.keys.server_write_iv,
                )?);
                write.send(
                    &self.transport,
                    &hooks,
                    ContentType::Handshake,
                    &flight.finished_msg,
                )?;
                let _ = self.transport.flush();
                read.arm(Open::Tls12(Tls12Opener::new(
                    &flight.keys.params,
                    &flight.keys.client_write_key,
                    &flight.keys.client_write_iv,
                )?));

                let outcome = loop {
                    match self.next_handshake_event(read, &hooks, false)? {
                        HandshakeEvent::ChangeCipherSpec => {
                            driver.process_change_cipher_spec()?;
                            read.swap()?;
                        }
                        HandshakeEvent::Message(msg) => {
                            let (msg_type, _, _) = parse_handshake_header(&msg)?;
                            match msg_type {
                                HandshakeType::Finished => break driver.process_finished(&msg)?,
                                other => {
                                    return Err(TlsError::UnexpectedMessage(format!(
                                        "{other:?} during abbreviated handshake"
                                    )))
                                }
                            }
                        }
                    }
                };
                local_finished = flight.local_finished;
                peer_finished = outcome.peer_finished;
            }
            Server12Outcome::Full(flight) => {
                for msg in &flight.messages {
                    write.send(&self.transport, &hooks, ContentType::Handshake, msg)?;
                }
                let _ = self.transport.flush();

                let outcome = loop {
                    match self.next_handshake_event(read, &hooks, false)? {
                        HandshakeEvent::ChangeCipherSpec => {
                            driver.process_change_cipher_spec()?;
                            read.swap()?;
                        }
                        HandshakeEvent::Message(msg) => {
                            let (msg_type, _, _) = parse_handshake_header(&msg)?;
                            match (driver.state(), msg_type) {
                                (
                                    Tls12ServerState::WaitClientCertificate,
                                    HandshakeType::Certificate,
                                ) => {
                                    driver.process_client_certificate(&msg)?;
                                    if let Some(hook) = &hooks.on_recv_certificate_chain {
                                        hook(driver.client_certs());
                                    }
                                }
                                (
                                    Tls12ServerState::WaitClientKeyExchange,
                                    HandshakeType::ClientKeyExchange,
                                ) => {
                                    let keys = driver.process_client_key_exchange(&msg)?;
                                    read.arm(Open::Tls12(Tls12Opener::new(
                                        &keys.params,
                                        &keys.client_write_key,
                                        &keys.client_write_iv,
                                    )?));
                                    write.arm(Seal::Tls12(Tls12Sealer::new(
                                        &keys.params,
                                        &keys.server_write_key,
                                        &keys.server_write_iv,
                                    )?));
                                }
                                (
                                    Tls12ServerState::WaitCertificateVerify,
                                    HandshakeType::CertificateVerify,
                                ) => {
                                    driver.process_certificate_verify(&msg)?;
                                }
                                (Tls12ServerState::WaitFinished, HandshakeType::Finished) => {
                                    break driver.process_finished(&msg)?;
                                }
                                (_, other) => {
                                    return Err(TlsError::UnexpectedMessage(format!(
                                        "{other:?} in state {:?}",
                                        driver.state()
                                    )))
                                }
                            }
                        }
                    }
                };

                // [NewSessionTicket], CCS, Finished.
                if let Some(nst) = &outcome.nst_msg {
                    write.send(&self.transport, &hooks, ContentType::Handshake, nst)?;
                }
                write.send(
                    &self.transport,
                    &hooks,
                    ContentType::ChangeCipherSpec,
                    &encode_change_cipher_spec(),
                )?;
                write.swap()?;
                write.send(
                    &self.transport,
                    &hooks,
                    ContentType::Handshake,
                    &outcome.finished_msg,
                )?;
                local_finished = outcome.local_finished;
                peer_finished = outcome.peer_finished;
            }
        }

        let params = *driver
            .params()
            .ok_or_else(|| TlsError::InternalError("no negotiated params".into()))?;
        state.established = Established::Established;
        state.version = Some(TlsVersion::Tls12);
        state.suite = Some(params.suite);
        state.local_finished = local_finished;
        state.peer_finished = peer_finished;
        state.peer_certs = driver.client_certs().to_vec();
        state.negotiated_alpn = driver.negotiated_alpn().map(|a| a.to_vec());
        state.exporter = Some(ExporterSecret::Tls12 {
            hash: params.hash,
            master_secret: driver.master_secret().to_vec(),
            client_random: *driver.client_random(),
            server_random: *driver.server_random(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Application data
    // -----------------------------------------------------------------

    /// Encrypt and send application bytes.
    pub fn send_app(&self, buf: &[u8]) -> Result<(), TlsError> {
        self.check_fatal()?;
        let hooks = {
            let state = self.lock_state();
            if state.established == Established::NotEstablished {
                return Err(TlsError::UnexpectedMessage(
                    "send_app before establishment".into(),
                ));
            }
            state.hooks.clone()
        };
        self.drain_pending()?;

        let mut write = self.lock_write();
        if write.closed {
            return Err(TlsError::ConnectionClosed);
        }
        match write.send(&self.transport, &hooks, ContentType::ApplicationData, buf) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail(&mut write, &hooks, &err);
                Err(err)
            }
        }
    }

    /// Receive decrypted application bytes (up to `max`). An empty
    /// result means the peer closed the channel (close_notify).
    pub fn recv_app(&self, max: usize) -> Result<Vec<u8>, TlsError> {
        self.check_fatal()?;
        let (hooks, version, resumption) = {
            let state = self.lock_state();
            if state.established == Established::NotEstablished {
                return Err(TlsError::UnexpectedMessage(
                    "recv_app before establishment".into(),
                ));
            }
            (
                state.hooks.clone(),
                state.version,
                state.resumption.clone(),
            )
        };
        self.drain_pending()?;

        let mut read = self.lock_read();
        loop {
            if !read.app_buf.is_empty() {
                let n = read.app_buf.len().min(max);
                let out: Vec<u8> = read.app_buf.drain(..n).collect();
                return Ok(out);
            }
            if read.eof {
                return Ok(Vec::new());
            }

            let (content_type, payload) = match read.recv_record(&self.transport, &hooks) {
                Ok(result) => result,
                Err(err) => {
                    self.fatal.store(true, Ordering::SeqCst);
                    return Err(err);
                }
            };
            match content_type {
                ContentType::ApplicationData => read.app_buf.extend_from_slice(&payload),
                ContentType::Alert => {
                    let alert = Alert::decode(&payload)?;
                    match (alert.level, alert.description) {
                        (_, AlertDescription::CloseNotify) => {
                            read.eof = true;
                            return Ok(Vec::new());
                        }
                        (AlertLevel::Warning, _) => continue,
                        (AlertLevel::Fatal, desc) => {
                            read.eof = true;
                            self.fatal.store(true, Ordering::SeqCst);
                            return Err(TlsError::PeerAlert(desc as u8));
                        }
                    }
                }
                ContentType::Handshake => {
                    if let Err(err) = self.handle_post_handshake_message(
                        &mut read,
                        &hooks,
                        version,
                        resumption.as_deref(),
                        &payload,
                    ) {
                        let mut write = self.lock_write();
                        self.fail(&mut write, &hooks, &err);
                        return Err(err);
                    }
                }
                ContentType::ChangeCipherSpec => {
                    let err =
                        TlsError::UnexpectedMessage("ChangeCipherSpec after establishment".into());
                    let mut write = self.lock_write();
                    self.fail(&mut write, &hooks, &err);
                    return Err(err);
                }
            }
        }
    }

    /// Post-handshake handshake messages: NewSessionTicket, KeyUpdate,
    /// and refusal of TLS 1.2 renegotiation.
    fn handle_post_handshake_message(
        &self,
        read: &mut ReadHalf,
        hooks: &Hooks,
        version: Option<TlsVersion>,
        resumption: Option<&ResumptionState>,
        payload: &[u8],
    ) -> Result<(), TlsError> {
        read.hs_buf.extend_from_slice(payload);
        while read.hs_buf.len() >= 4 {
            let len = ((read.hs_buf[1] as usize) << 16)
                | ((read.hs_buf[2] as usize) << 8)
                | (read.hs_buf[3] as usize);
            if read.hs_buf.len() < 4 + len {
                break;
            }
            let msg: Vec<u8> = read.hs_buf.drain(..4 + len).collect();
            let (msg_type, body, _) = parse_handshake_header(&msg)?;
            match (version, msg_type) {
                (Some(TlsVersion::Tls13), HandshakeType::NewSessionTicket) => {
                    if let Some(resumption) = resumption {
                        let (ticket, data) = session_from_new_session_ticket(
                            &resumption.params,
                            resumption.suite,
                            &resumption.resumption_master_secret,
                            resumption.alpn.as_deref(),
                            body,
                        )?;
                        let _ = self.params.session_manager().establish(&ticket, data);
                    }
                }
                (Some(TlsVersion::Tls13), HandshakeType::KeyUpdate) => {
                    let request = decode_key_update(body)?;
                    read.rotate_tls13()?;
                    if request == KeyUpdateRequest::UpdateRequested {
                        // Read is held; taking write after it follows
                        // the lock order.
                        let mut write = self.lock_write();
                        let reply = encode_key_update(KeyUpdateRequest::UpdateNotRequested);
                        write.send(&self.transport, hooks, ContentType::Handshake, &reply)?;
                        write.rotate_tls13()?;
                    }
                }
                // Renegotiation is refused: answer HelloRequest (server
                // → client) or ClientHello (client → server) with a
                // warning and carry on.
                (Some(TlsVersion::Tls12), HandshakeType::HelloRequest)
                | (Some(TlsVersion::Tls12), HandshakeType::ClientHello) => {
                    let mut write = self.lock_write();
                    let alert = Alert {
                        level: AlertLevel::Warning,
                        description: AlertDescription::NoRenegotiation,
                    };
                    write.send(&self.transport, hooks, ContentType::Alert, &alert.encode())?;
                }
                (_, other) => {
                    return Err(TlsError::UnexpectedMessage(format!(
                        "{other:?} after establishment"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Initiate a TLS 1.3 KeyUpdate on our TX direction.
    pub fn key_update(&self, request_peer: bool) -> Result<(), TlsError> {
        self.check_fatal()?;
        {
            let mut state = self.lock_state();
            if state.version != Some(TlsVersion::Tls13)
                || state.established != Established::Established
            {
                return Err(TlsError::UnexpectedMessage(
                    "KeyUpdate requires an established TLS 1.3 connection".into(),
                ));
            }
            state
                .pending
                .push_back(PendingAction::SendKeyUpdate { request_peer });
        }
        self.drain_pending()
    }

    fn drain_pending(&self) -> Result<(), TlsError> {
        let mut state = self.lock_state();
        if state.pending.is_empty() {
            return Ok(());
        }
        let mut write = self.lock_write();
        self.drain_pending_with(&mut state, &mut write)
    }

    fn drain_pending_locked(
        &self,
        state: &mut Shared,
        write: &mut WriteHalf,
    ) -> Result<(), TlsError> {
        self.drain_pending_with(state, write)
    }

    fn drain_pending_with(
        &self,
        state: &mut Shared,
        write: &mut WriteHalf,
    ) -> Result<(), TlsError> {
        let hooks = state.hooks.clone();
        while let Some(action) = state.pending.pop_front() {
            match action {
                PendingAction::SendHandshakeMessages(messages) => {
                    for msg in messages {
                        write.send(&self.transport, &hooks, ContentType::Handshake, &msg)?;
                    }
                }
                PendingAction::SendKeyUpdate { request_peer } => {
                    let request = if request_peer {
                        KeyUpdateRequest::UpdateRequested
                    } else {
                        KeyUpdateRequest::UpdateNotRequested
                    };
                    let msg = encode_key_update(request);
                    write.send(&self.transport, &hooks, ContentType::Handshake, &msg)?;
                    write.rotate_tls13()?;
                }
            }
        }
        let _ = self.transport.flush();
        Ok(())
    }

    /// Orderly shutdown: send close_notify once if the handshake
    /// completed and the peer has not already closed. Idempotent.
    pub fn close(&self) -> Result<(), TlsError> {
        let state = self.lock_state();
        let established = state.established == Established::Established;
        let hooks = state.hooks.clone();
        let peer_closed = self.lock_read().eof;
        let mut write = self.lock_write();
        if established && !write.close_notify_sent && !peer_closed && !write.closed {
            let _ = write.send(
                &self.transport,
                &hooks,
                ContentType::Alert,
                &Alert::CLOSE_NOTIFY.encode(),
            );
            let _ = self.transport.flush();
            write.close_notify_sent = true;
        }
        write.closed = true;
        Ok(())
    }
}

impl<T: Transport> Drop for TlsContext<T> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
