use std::sync::{Arc, Mutex};
use std::thread;

use ferrotls_crypto::{RngSource, SigningKey};
use ferrotls_types::TlsError;

use crate::config::{ChainVerifier, ClientConfig, PinnedKeyVerifier, ServerConfig};
use crate::crypt::NamedGroup;
use crate::handshake::HandshakeType;
use crate::hooks::Hooks;
use crate::session::{MemorySessionManager, SessionData, SessionManager};
use crate::transport::{duplex, DuplexTransport, Transport};
use crate::{CipherSuite, TlsContext, TlsVersion};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Ed25519 server identity: (signing key clone source, chain, verifier).
fn ed25519_identity(seed: [u8; 32]) -> (SigningKey, Vec<Vec<u8>>, Arc<dyn ChainVerifier>) {
    let key = SigningKey::generate_ed25519(&RngSource::seeded(seed)).unwrap();
    let verifier = Arc::new(PinnedKeyVerifier::new(key.public_key()));
    // The engine treats certificates opaquely; any bytes stand in for DER.
    let chain = vec![vec![0x30, 0x82, 0x01, 0x00, 0xAB, 0xCD]];
    (key, chain, verifier)
}

fn ecdsa_identity() -> (SigningKey, Vec<Vec<u8>>, Arc<dyn ChainVerifier>) {
    let key = SigningKey::generate_ecdsa_p256(&RngSource::system()).unwrap();
    let verifier = Arc::new(PinnedKeyVerifier::new(key.public_key()));
    let chain = vec![vec![0x30, 0x82, 0x02, 0x00]];
    (key, chain, verifier)
}

type Ctx = Arc<TlsContext<DuplexTransport>>;

/// Run both handshakes concurrently; panic on either failure.
fn handshake_pair(client_config: ClientConfig, server_config: ServerConfig) -> (Ctx, Ctx) {
    let (client, server, client_result, server_result) =
        try_handshake_pair(client_config, server_config);
    client_result.unwrap();
    server_result.unwrap();
    (client, server)
}

/// Run both handshakes concurrently and return both outcomes.
fn try_handshake_pair(
    client_config: ClientConfig,
    server_config: ServerConfig,
) -> (Ctx, Ctx, Result<(), TlsError>, Result<(), TlsError>) {
    let (a, b) = duplex();
    let client = Arc::new(TlsContext::new(a, client_config));
    let server = Arc::new(TlsContext::new(b, server_config));
    let c = client.clone();
    let handle = thread::spawn(move || c.handshake());
    let server_result = server.handshake();
    let client_result = handle.join().unwrap();
    (client, server, client_result, server_result)
}

/// Receive exactly `len` bytes of application data.
fn recv_exact(ctx: &Ctx, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let chunk = ctx.recv_app(len - out.len()).unwrap();
        assert!(!chunk.is_empty(), "unexpected EOF");
        out.extend_from_slice(&chunk);
    }
    out
}

/// A session manager that records the last stored key, so tests can
/// resume with it.
struct RecordingManager {
    inner: MemorySessionManager,
    last: Mutex<Option<(Vec<u8>, SessionData)>>,
}

impl RecordingManager {
    fn new() -> Self {
        Self {
            inner: MemorySessionManager::new(),
            last: Mutex::new(None),
        }
    }

    fn with_tickets() -> Self {
        Self {
            inner: MemorySessionManager::with_tickets(),
            last: Mutex::new(None),
        }
    }

    fn last_session(&self) -> Option<(Vec<u8>, SessionData)> {
        self.last.lock().unwrap().clone()
    }
}

impl SessionManager for RecordingManager {
    fn resume(&self, id: &[u8]) -> Option<SessionData> {
        self.inner.resume(id)
    }

    fn resume_once(&self, id: &[u8]) -> Option<SessionData> {
        self.inner.resume_once(id)
    }

    fn establish(&self, id: &[u8], data: SessionData) -> Option<Vec<u8>> {
        *self.last.lock().unwrap() = Some((id.to_vec(), data.clone()));
        self.inner.establish(id, data)
    }

    fn invalidate(&self, id: &[u8]) {
        self.inner.invalidate(id)
    }

    fn use_tickets(&self) -> bool {
        self.inner.use_tickets()
    }
}

/// Rejects every chain: a handshake passing it proves no certificate
/// was processed (i.e. the PSK / abbreviated path ran).
struct RejectAllVerifier;

impl ChainVerifier for RejectAllVerifier {
    fn verify_chain(
        &self,
        _chain: &[Vec<u8>],
        _server_name: Option<&str>,
    ) -> Result<ferrotls_crypto::PublicKey, TlsError> {
        Err(TlsError::CertificateInvalid("rejects everything".into()))
    }
}

// ---------------------------------------------------------------------------
// TLS 1.3 end-to-end
// ---------------------------------------------------------------------------

/// Scenario S1: x25519 + Ed25519, both sides Established, exporter and
/// Finished agreement.
#[test]
fn test_tls13_handshake_x25519_ed25519() {
    let (key, chain, verifier) = ed25519_identity([42; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .supported_groups(&[NamedGroup::X25519])
        .server_name("test.example")
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain.clone(), key)
        .versions(&[TlsVersion::Tls13])
        .build();

    let (client, server) = handshake_pair(client_config, server_config);
    assert!(client.is_established());
    assert!(server.is_established());
    assert_eq!(client.negotiated_version(), Some(TlsVersion::Tls13));
    assert_eq!(server.negotiated_version(), Some(TlsVersion::Tls13));
    assert_eq!(client.peer_certificates(), chain);

    // Property 4: Finished cross-agreement.
    assert_eq!(client.get_finished(), server.get_peer_finished());
    assert_eq!(server.get_finished(), client.get_peer_finished());
    assert!(!client.get_finished().is_empty());

    // Property 7 / S1: exporter agreement.
    let client_export = client
        .get_tls_exporter(b"EXPORTER-Channel-Binding", b"", 32)
        .unwrap();
    let server_export = server
        .get_tls_exporter(b"EXPORTER-Channel-Binding", b"", 32)
        .unwrap();
    assert_eq!(client_export, server_export);
    assert_eq!(client_export.len(), 32);

    // Different label diverges.
    let other = client.get_tls_exporter(b"other-label", b"", 32).unwrap();
    assert_ne!(other, client_export);
}

#[test]
fn test_tls13_application_data_both_directions() {
    let (key, chain, verifier) = ed25519_identity([1; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);

    client.send_app(b"hello from client").unwrap();
    assert_eq!(recv_exact(&server, 17), b"hello from client");

    server.send_app(b"hello from server").unwrap();
    assert_eq!(recv_exact(&client, 17), b"hello from server");

    // Payload above one record: exercises fragmentation (≤ 2^14 chunks).
    let big: Vec<u8> = (0..40_000u32).map(|i| i as u8).collect();
    server.send_app(&big).unwrap();
    assert_eq!(recv_exact(&client, big.len()), big);
}

#[test]
fn test_tls13_secp256r1_group() {
    let (key, chain, verifier) = ed25519_identity([2; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .supported_groups(&[NamedGroup::SECP256R1])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);
    client.send_app(b"p256").unwrap();
    assert_eq!(recv_exact(&server, 4), b"p256");
}

/// The client's only share is P-256 but the server prefers nothing the
/// client shared... here: client shares X25519 only while the server
/// supports only P-256 → HelloRetryRequest → retry completes.
#[test]
fn test_tls13_hello_retry_request_roundtrip() {
    let (key, chain, verifier) = ed25519_identity([3; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        // First share is X25519; P-256 stays available for the retry.
        .supported_groups(&[NamedGroup::X25519, NamedGroup::SECP256R1])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .supported_groups(&[NamedGroup::SECP256R1])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);
    assert!(client.is_established());
    client.send_app(b"after hrr").unwrap();
    assert_eq!(recv_exact(&server, 9), b"after hrr");

    // Transcript substitution held: Finished values still agree.
    assert_eq!(client.get_finished(), server.get_peer_finished());
}

/// Scenario S5: the server's Finished is replaced with garbage; the
/// client fails with decrypt_error (51) and the server sees alert 51.
#[test]
fn test_tls13_tampered_finished_is_decrypt_error() {
    let (key, chain, verifier) = ed25519_identity([4; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();

    let (a, b) = duplex();
    let client = Arc::new(TlsContext::new(a, client_config));
    let server = Arc::new(TlsContext::new(b, server_config));

    // Corrupt the server Finished on receive.
    client.set_hooks(Hooks {
        on_recv_handshake13: Some(Arc::new(|mut msg| {
            if msg.msg_type == HandshakeType::Finished {
                msg.body = vec![0x5A; msg.body.len()];
            }
            msg
        })),
        ..Hooks::default()
    });

    let c = client.clone();
    let handle = thread::spawn(move || c.handshake());
    let server_result = server.handshake();
    let client_result = handle.join().unwrap();

    let client_err = client_result.unwrap_err();
    assert_eq!(client_err.alert_code(), Some(51));

    // The server learns of it as a fatal alert 51 from the peer.
    match server_result.unwrap_err() {
        TlsError::PeerAlert(51) => {}
        other => panic!("server saw {other:?}, expected alert 51"),
    }
}

// ---------------------------------------------------------------------------
// TLS 1.2 end-to-end
// ---------------------------------------------------------------------------

/// Scenario S2: ECDHE-ECDSA-AES128-GCM-SHA256 with a P-256 identity;
/// 12-byte Finished verify_data.
#[test]
fn test_tls12_handshake_ecdhe_ecdsa() {
    let (key, chain, verifier) = ecdsa_identity();
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .cipher_suites(&[CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256])
        .signature_schemes(&[crate::crypt::SignatureScheme::ECDSA_SECP256R1_SHA256])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls12])
        .signature_schemes(&[crate::crypt::SignatureScheme::ECDSA_SECP256R1_SHA256])
        .build();

    let (client, server) = handshake_pair(client_config, server_config);
    assert_eq!(client.negotiated_version(), Some(TlsVersion::Tls12));
    assert_eq!(
        client.negotiated_cipher_suite(),
        Some(CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256)
    );

    // verify_data length is fixed at 12 bytes in TLS 1.2.
    assert_eq!(client.get_finished().len(), 12);
    assert_eq!(server.get_finished().len(), 12);
    assert_eq!(client.get_finished(), server.get_peer_finished());
    assert_eq!(server.get_finished(), client.get_peer_finished());

    client.send_app(b"over 1.2").unwrap();
    assert_eq!(recv_exact(&server, 8), b"over 1.2");
    server.send_app(b"ack").unwrap();
    assert_eq!(recv_exact(&client, 3), b"ack");
}

#[test]
fn test_tls12_chacha20_suite() {
    let (key, chain, verifier) = ed25519_identity([5; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .cipher_suites(&[CipherSuite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls12])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);
    client.send_app(b"chacha").unwrap();
    assert_eq!(recv_exact(&server, 6), b"chacha");
}

#[test]
fn test_tls12_exporter_agreement() {
    let (key, chain, verifier) = ed25519_identity([6; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls12])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);

    let c = client.get_tls_exporter(b"EXPORTER-test", b"ctx", 48).unwrap();
    let s = server.get_tls_exporter(b"EXPORTER-test", b"ctx", 48).unwrap();
    assert_eq!(c, s);
    assert_eq!(c.len(), 48);
}

// ---------------------------------------------------------------------------
// Version negotiation / downgrade
// ---------------------------------------------------------------------------

#[test]
fn test_cross_version_client_negotiates_down_to_12() {
    let (key, chain, verifier) = ed25519_identity([7; 32]);
    // Client does both; server only 1.2 (and, being 1.2-only, sets no
    // downgrade sentinel).
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13, TlsVersion::Tls12])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls12])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);
    assert_eq!(client.negotiated_version(), Some(TlsVersion::Tls12));
    assert_eq!(server.negotiated_version(), Some(TlsVersion::Tls12));
}

/// Property 8 (flavor): a 1.3-only client refuses a 1.2-only server.
#[test]
fn test_tls13_only_client_refuses_tls12_server() {
    let (key, chain, verifier) = ed25519_identity([8; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls12])
        .build();
    let (_, _, client_result, server_result) =
        try_handshake_pair(client_config, server_config);
    assert!(matches!(
        client_result.unwrap_err(),
        TlsError::ProtocolVersion
    ));
    assert!(server_result.is_err());
}

/// Property 8: a dual-stack server negotiating 1.2 writes the downgrade
/// sentinel, and a dual-stack client (which should have gotten 1.3)
/// refuses it with insufficient_security.
#[test]
fn test_downgrade_sentinel_refused() {
    let (key, chain, verifier) = ed25519_identity([9; 32]);
    // The server claims both versions but its TLS 1.3 path is starved
    // of suites, forcing a 1.2 negotiation with the sentinel present.
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13, TlsVersion::Tls12])
        .cipher_suites(&[
            CipherSuite::TLS_AES_128_GCM_SHA256,
            CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
        ])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13, TlsVersion::Tls12])
        .cipher_suites(&[CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256])
        .build();

    let (_, _, client_result, _server_result) =
        try_handshake_pair(client_config, server_config);
    let err = client_result.unwrap_err();
    assert_eq!(err.alert_code(), Some(71), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Close semantics
// ---------------------------------------------------------------------------

/// Scenario S4: close_notify gives the peer EOF; the peer may keep
/// sending until it closes.
#[test]
fn test_close_notify_half_close() {
    let (key, chain, verifier) = ed25519_identity([10; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);

    client.close().unwrap();
    // Server drains to EOF.
    assert!(server.recv_app(1024).unwrap().is_empty());
    // ... but may still send.
    server.send_app(b"bye").unwrap();
    server.close().unwrap();

    // Close is idempotent.
    client.close().unwrap();
    server.close().unwrap();

    // The closed side cannot send anymore.
    assert!(client.send_app(b"nope").is_err());
}

/// Scenario S6: a record declaring length 17000 draws record_overflow
/// (alert 22) before any handshake progress.
#[test]
fn test_record_overflow_alerted() {
    let (key, chain, _) = ed25519_identity([11; 32]);
    let (a, b) = duplex();
    let server = TlsContext::new(b, ServerConfig::builder(chain, key).build());

    let handle = thread::spawn(move || server.handshake());
    let mut bogus = vec![22u8, 3, 3];
    bogus.extend_from_slice(&17000u16.to_be_bytes());
    a.send(&bogus).unwrap();

    let err = handle.join().unwrap().unwrap_err();
    assert!(matches!(err, TlsError::RecordOverflow));

    // The alert reaches the wire: fatal (2) record_overflow (22).
    let alert = a.recv(1024).unwrap();
    assert_eq!(alert[alert.len() - 2..], [2, 22]);
}

#[test]
fn test_handshake_with_prefixed_bytes() {
    let (key, chain, verifier) = ed25519_identity([12; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();

    let (a, b) = duplex();
    let client = Arc::new(TlsContext::new(a, client_config));
    let c = client.clone();
    let handle = thread::spawn(move || c.handshake());

    // The caller sniffs the first bytes off the transport, then hands
    // them back via handshake_with.
    let sniffed = b.recv(16).unwrap();
    assert!(!sniffed.is_empty());
    let server = Arc::new(TlsContext::new(b, server_config));
    server.handshake_with(&sniffed).unwrap();
    handle.join().unwrap().unwrap();

    client.send_app(b"sniffed ok").unwrap();
    assert_eq!(recv_exact(&server, 10), b"sniffed ok");
}

// ---------------------------------------------------------------------------
// Resumption
// ---------------------------------------------------------------------------

/// Property 5 (TLS 1.3): a NewSessionTicket from the first connection
/// resumes the second via PSK. The resumed client uses a verifier that
/// rejects every chain, so success proves the certificate path was
/// skipped.
#[test]
fn test_tls13_session_resumption() {
    let (key, chain, verifier) = ed25519_identity([13; 32]);
    let server_manager = Arc::new(RecordingManager::new());
    let client_manager = Arc::new(RecordingManager::new());

    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .session_manager(client_manager.clone())
        .build();
    let server_config = ServerConfig::builder(chain.clone(), key)
        .versions(&[TlsVersion::Tls13])
        .session_manager(server_manager.clone())
        .build();
    let (client, server) = handshake_pair(client_config, server_config);

    // The ticket rides ahead of this app record; receiving it stores
    // the session on the client.
    server.send_app(b"warm").unwrap();
    assert_eq!(recv_exact(&client, 4), b"warm");

    let (ticket, session) = client_manager.last_session().expect("ticket stored");
    let (_, server_session) = server_manager.last_session().expect("session stored");
    // Property 5: both ends derived the same resumption PSK.
    assert_eq!(session.secret, server_session.secret);

    // Second connection resumes; RejectAllVerifier proves PSK mode.
    let resume_client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(Arc::new(RejectAllVerifier))
        .resume_session(ticket, session)
        .build();
    let key2 = SigningKey::generate_ed25519(&RngSource::seeded([13; 32])).unwrap();
    let resume_server_config = ServerConfig::builder(chain, key2)
        .versions(&[TlsVersion::Tls13])
        .session_manager(server_manager)
        .build();
    let (client2, server2) = handshake_pair(resume_client_config, resume_server_config);
    assert!(client2.is_established());

    client2.send_app(b"resumed").unwrap();
    assert_eq!(recv_exact(&server2, 7), b"resumed");
}

/// Scenario S3 flavor: with a manager that remembers nothing, an
/// offered PSK falls back to a full handshake.
#[test]
fn test_tls13_unknown_psk_falls_back_to_full() {
    let (key, chain, verifier) = ed25519_identity([14; 32]);
    let stale = SessionData {
        version: TlsVersion::Tls13,
        cipher_suite: CipherSuite::TLS_AES_128_GCM_SHA256,
        secret: vec![0x77; 32],
        client_cert: None,
        alpn: None,
        max_early_data: 0,
        issued_at: 1,
        lifetime: u32::MAX,
        age_add: 0,
    };
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        // A full handshake must verify the chain: the pinned verifier
        // passing proves the certificate path ran.
        .verifier(verifier)
        .resume_session(b"unknown-ticket".to_vec(), stale)
        .build();
    // Default NoopSessionManager: the server cannot resume anything.
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);
    client.send_app(b"full again").unwrap();
    assert_eq!(recv_exact(&server, 10), b"full again");
}

/// Property 5 (TLS 1.2): session-ID resumption runs the abbreviated
/// flow with the stored master secret.
#[test]
fn test_tls12_session_id_resumption() {
    let (key, chain, verifier) = ed25519_identity([15; 32]);
    let server_manager = Arc::new(MemorySessionManager::new());
    let client_manager = Arc::new(RecordingManager::new());

    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .verifier(verifier)
        .session_manager(client_manager.clone())
        .build();
    let server_config = ServerConfig::builder(chain.clone(), key)
        .versions(&[TlsVersion::Tls12])
        .session_manager(server_manager.clone())
        .build();
    let _ = handshake_pair(client_config, server_config);

    let (session_id, session) = client_manager.last_session().expect("session stored");
    assert!(session_id.len() <= 32, "session ID resumption expected");

    // Resume: the reject-all verifier proves no Certificate flowed.
    let resume_client = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .verifier(Arc::new(RejectAllVerifier))
        .resume_session(session_id, session.clone())
        .build();
    let key2 = SigningKey::generate_ed25519(&RngSource::seeded([15; 32])).unwrap();
    let resume_server = ServerConfig::builder(chain, key2)
        .versions(&[TlsVersion::Tls12])
        .session_manager(server_manager)
        .build();
    let (client2, server2) = handshake_pair(resume_client, resume_server);

    // Matching master secret: exporters agree on both sides.
    let c = client2.get_tls_exporter(b"EXPORTER-resumed", b"", 32).unwrap();
    let s = server2.get_tls_exporter(b"EXPORTER-resumed", b"", 32).unwrap();
    assert_eq!(c, s);
}

/// TLS 1.2 ticket mode (RFC 5077): the server issues a ticket, the
/// client resumes with it.
#[test]
fn test_tls12_ticket_resumption() {
    let (key, chain, verifier) = ed25519_identity([16; 32]);
    let server_manager = Arc::new(MemorySessionManager::with_tickets());
    let client_manager = Arc::new(RecordingManager::new());

    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .verifier(verifier)
        .session_manager(client_manager.clone())
        .build();
    let server_config = ServerConfig::builder(chain.clone(), key)
        .versions(&[TlsVersion::Tls12])
        .session_manager(server_manager.clone())
        .build();
    let _ = handshake_pair(client_config, server_config);

    let (ticket, session) = client_manager.last_session().expect("ticket stored");
    assert!(ticket.len() > 32, "ticket resumption expected");

    let resume_client = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .verifier(Arc::new(RejectAllVerifier))
        .resume_session(ticket, session)
        .build();
    let key2 = SigningKey::generate_ed25519(&RngSource::seeded([16; 32])).unwrap();
    let resume_server = ServerConfig::builder(chain, key2)
        .versions(&[TlsVersion::Tls12])
        .session_manager(server_manager)
        .build();
    let (client2, server2) = handshake_pair(resume_client, resume_server);
    client2.send_app(b"ticketed").unwrap();
    assert_eq!(recv_exact(&server2, 8), b"ticketed");
}

// ---------------------------------------------------------------------------
// Mutual authentication
// ---------------------------------------------------------------------------

#[test]
fn test_tls13_mutual_authentication() {
    let (server_key, server_chain, server_verifier) = ed25519_identity([17; 32]);
    let (client_key, _, client_verifier) = ecdsa_identity();
    let client_chain = vec![vec![0x30, 0x82, 0x0C, 0x11]];

    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(server_verifier)
        .client_identity(client_chain.clone(), client_key)
        .build();
    let server_config = ServerConfig::builder(server_chain, server_key)
        .versions(&[TlsVersion::Tls13])
        .client_cert_verifier(client_verifier)
        .require_client_cert(true)
        .build();

    let (client, server) = handshake_pair(client_config, server_config);
    assert_eq!(server.peer_certificates(), client_chain);
    client.send_app(b"mtls").unwrap();
    assert_eq!(recv_exact(&server, 4), b"mtls");
}

#[test]
fn test_tls13_missing_client_cert_refused() {
    let (server_key, server_chain, server_verifier) = ed25519_identity([18; 32]);
    let (_, _, client_verifier) = ecdsa_identity();

    // Client has no identity configured.
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(server_verifier)
        .build();
    let server_config = ServerConfig::builder(server_chain, server_key)
        .versions(&[TlsVersion::Tls13])
        .client_cert_verifier(client_verifier)
        .require_client_cert(true)
        .build();

    let (client, _server, client_result, server_result) =
        try_handshake_pair(client_config, server_config);
    // The server refuses the empty Certificate.
    let err = server_result.unwrap_err();
    assert_eq!(err.alert_code(), Some(42));
    // A TLS 1.3 client is established once its Finished is sent; the
    // refusal surfaces as the peer's fatal alert on the next read.
    client_result.unwrap();
    match client.recv_app(16) {
        Err(TlsError::PeerAlert(42)) => {}
        other => panic!("client saw {other:?}, expected alert 42"),
    }
}

#[test]
fn test_tls12_mutual_authentication() {
    let (server_key, server_chain, server_verifier) = ed25519_identity([19; 32]);
    let (client_key, _, client_verifier) = ecdsa_identity();
    let client_chain = vec![vec![0x30, 0x82, 0x0C, 0x12]];

    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .verifier(server_verifier)
        .client_identity(client_chain.clone(), client_key)
        .build();
    let server_config = ServerConfig::builder(server_chain, server_key)
        .versions(&[TlsVersion::Tls12])
        .client_cert_verifier(client_verifier)
        .require_client_cert(true)
        .build();

    let (client, server) = handshake_pair(client_config, server_config);
    assert_eq!(server.peer_certificates(), client_chain);
    server.send_app(b"mtls12").unwrap();
    assert_eq!(recv_exact(&client, 6), b"mtls12");
}

// ---------------------------------------------------------------------------
// Post-handshake
// ---------------------------------------------------------------------------

#[test]
fn test_tls13_key_update_roundtrip() {
    let (key, chain, verifier) = ed25519_identity([20; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);

    // Rotate our TX and ask the peer to rotate as well.
    client.key_update(true).unwrap();
    client.send_app(b"fresh keys").unwrap();
    assert_eq!(recv_exact(&server, 10), b"fresh keys");

    // The server's reply KeyUpdate rotated its TX; traffic still flows.
    server.send_app(b"rotated too").unwrap();
    assert_eq!(recv_exact(&client, 11), b"rotated too");

    // Several updates in a row survive.
    client.key_update(false).unwrap();
    client.key_update(false).unwrap();
    client.send_app(b"thrice").unwrap();
    assert_eq!(recv_exact(&server, 6), b"thrice");
}

#[test]
fn test_key_update_rejected_on_tls12() {
    let (key, chain, verifier) = ed25519_identity([21; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls12])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls12])
        .build();
    let (client, _server) = handshake_pair(client_config, server_config);
    assert!(client.key_update(false).is_err());
}

#[test]
fn test_wire_logging_hook_sees_traffic() {
    let (key, chain, verifier) = ed25519_identity([22; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();

    let (a, b) = duplex();
    let client = Arc::new(TlsContext::new(a, client_config));
    let server = Arc::new(TlsContext::new(b, server_config));

    let events: Arc<Mutex<Vec<(crate::hooks::WireDirection, usize)>>> =
        Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    client.set_hooks(Hooks {
        logging: Some(Arc::new(move |dir, bytes| {
            sink.lock().unwrap().push((dir, bytes.len()));
        })),
        ..Hooks::default()
    });

    let c = client.clone();
    let handle = thread::spawn(move || c.handshake());
    server.handshake().unwrap();
    handle.join().unwrap().unwrap();

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|(d, _)| *d == crate::hooks::WireDirection::Send));
    assert!(events
        .iter()
        .any(|(d, _)| *d == crate::hooks::WireDirection::Recv));
}

#[test]
fn test_key_log_hook_emits_nss_lines() {
    let (key, chain, verifier) = ed25519_identity([23; 32]);
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();

    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .key_log(Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        }))
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .build();
    let _ = handshake_pair(client_config, server_config);

    let lines = lines.lock().unwrap();
    let labels: Vec<&str> = lines
        .iter()
        .map(|l| l.split(' ').next().unwrap())
        .collect();
    assert!(labels.contains(&"CLIENT_HANDSHAKE_TRAFFIC_SECRET"));
    assert!(labels.contains(&"SERVER_HANDSHAKE_TRAFFIC_SECRET"));
    assert!(labels.contains(&"CLIENT_TRAFFIC_SECRET_0"));
    assert!(labels.contains(&"SERVER_TRAFFIC_SECRET_0"));
    assert!(labels.contains(&"EXPORTER_SECRET"));
}

#[test]
fn test_alpn_negotiation() {
    let (key, chain, verifier) = ed25519_identity([24; 32]);
    let client_config = ClientConfig::builder()
        .versions(&[TlsVersion::Tls13])
        .verifier(verifier)
        .alpn(&[b"h2", b"http/1.1"])
        .build();
    let server_config = ServerConfig::builder(chain, key)
        .versions(&[TlsVersion::Tls13])
        .alpn(&[b"http/1.1"])
        .build();
    let (client, server) = handshake_pair(client_config, server_config);
    assert_eq!(client.negotiated_alpn(), Some(b"http/1.1".to_vec()));
    assert_eq!(server.negotiated_alpn(), Some(b"http/1.1".to_vec()));
}

#[test]
fn test_operations_fail_before_establishment() {
    let (a, _b) = duplex();
    let client = TlsContext::new(a, ClientConfig::builder().build());
    assert!(client.send_app(b"x").is_err());
    assert!(client.recv_app(10).is_err());
    assert!(client.get_tls_exporter(b"l", b"", 16).is_err());
    assert!(client.get_finished().is_empty());
}
