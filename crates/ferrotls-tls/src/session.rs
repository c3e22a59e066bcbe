//! Session resumption storage interface.
//!
//! The engine never stores sessions itself: lookups and stores go
//! through a caller-supplied [`SessionManager`]. Servers in ticket mode
//! return an opaque ticket from [`SessionManager::establish`]; the
//! engine forwards it to the peer in NewSessionTicket and hands it back
//! on resumption. Any at-rest format or encryption is the manager's
//! business.

use std::collections::HashMap;
use std::sync::Mutex;

use zeroize::Zeroize;

use crate::{CipherSuite, TlsVersion};

/// Resumable state for one session.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub version: TlsVersion,
    pub cipher_suite: CipherSuite,
    /// Master secret (TLS 1.2) or resumption PSK (TLS 1.3).
    pub secret: Vec<u8>,
    /// Client certificate chain presented during the original handshake.
    pub client_cert: Option<Vec<Vec<u8>>>,
    /// ALPN protocol negotiated in the original handshake.
    pub alpn: Option<Vec<u8>>,
    /// Maximum early data the server will accept under this session.
    pub max_early_data: u32,
    /// Unix seconds at ticket issue time.
    pub issued_at: u64,
    /// Validity in seconds.
    pub lifetime: u32,
    /// Ticket age obfuscation value (TLS 1.3).
    pub age_add: u32,
}

impl Drop for SessionData {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Pluggable lookup/store for session resumption.
pub trait SessionManager: Send + Sync {
    /// Look up (or decrypt) resumable state for a session ID or ticket.
    fn resume(&self, id: &[u8]) -> Option<SessionData>;

    /// Like [`resume`](Self::resume), but for PSKs advertised for 0-RTT:
    /// the state must be invalidated on first delivery, so a replayed
    /// offer cannot resume twice.
    fn resume_once(&self, id: &[u8]) -> Option<SessionData>;

    /// Store state under `id`. A server in ticket mode returns the
    /// opaque ticket to hand to the peer; clients store and return None.
    fn establish(&self, id: &[u8], data: SessionData) -> Option<Vec<u8>>;

    /// Drop state, e.g. after a handshake failure post-resumption-accept.
    fn invalidate(&self, id: &[u8]);

    /// Server: whether to issue NewSessionTicket in TLS 1.2 (RFC 5077).
    fn use_tickets(&self) -> bool {
        false
    }
}

/// Default manager: remembers nothing, resumes nothing.
#[derive(Debug, Default)]
pub struct NoopSessionManager;

impl SessionManager for NoopSessionManager {
    fn resume(&self, _id: &[u8]) -> Option<SessionData> {
        None
    }

    fn resume_once(&self, _id: &[u8]) -> Option<SessionData> {
        None
    }

    fn establish(&self, _id: &[u8], _data: SessionData) -> Option<Vec<u8>> {
        None
    }

    fn invalidate(&self, _id: &[u8]) {}
}

/// In-memory manager for tests and single-process callers.
pub struct MemorySessionManager {
    store: Mutex<HashMap<Vec<u8>, SessionData>>,
    tickets: bool,
}

impl MemorySessionManager {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            tickets: false,
        }
    }

    /// Ticket mode: `establish` answers with an opaque ticket derived
    /// from the lookup key.
    pub fn with_tickets() -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            tickets: true,
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager for MemorySessionManager {
    fn resume(&self, id: &[u8]) -> Option<SessionData> {
        self.store.lock().unwrap().get(id).cloned()
    }

    fn resume_once(&self, id: &[u8]) -> Option<SessionData> {
        self.store.lock().unwrap().remove(id)
    }

    fn establish(&self, id: &[u8], data: SessionData) -> Option<Vec<u8>> {
        if self.tickets {
            // A real ticket-mode manager would return encrypted session
            // state; here the ticket is a tagged copy of the key.
            let mut ticket = b"ticket:".to_vec();
            ticket.extend_from_slice(id);
            self.store.lock().unwrap().insert(ticket.clone(), data);
            Some(ticket)
        } else {
            self.store.lock().unwrap().insert(id.to_vec(), data);
            None
        }
    }

    fn invalidate(&self, id: &[u8]) {
        self.store.lock().unwrap().remove(id);
    }

    fn use_tickets(&self) -> bool {
        self.tickets
    }
}
