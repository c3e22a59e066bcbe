//! Observation hooks.
//!
//! Test harnesses and diagnostics attach here. Receive hooks may
//! rewrite a handshake message before the state machine sees it. The
//! hooks table is swapped atomically under the connection's state lock;
//! hook callbacks must not re-enter the same context.

use std::sync::Arc;

use crate::handshake::HandshakeMessage;

/// Rewrites (or just observes) a received handshake message.
pub type HandshakeHook = Arc<dyn Fn(HandshakeMessage) -> HandshakeMessage + Send + Sync>;

/// Observes a received peer certificate chain (DER, leaf first).
pub type CertificateChainHook = Arc<dyn Fn(&[Vec<u8>]) + Send + Sync>;

/// Direction of a raw wire event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireDirection {
    Send,
    Recv,
}

/// Observes raw record bytes as they cross the transport.
pub type WireLogHook = Arc<dyn Fn(WireDirection, &[u8]) + Send + Sync>;

/// The per-connection hooks table.
#[derive(Default, Clone)]
pub struct Hooks {
    /// Applied to TLS 1.2 handshake messages on receive.
    pub on_recv_handshake: Option<HandshakeHook>,
    /// Applied to TLS 1.3 handshake messages on receive.
    pub on_recv_handshake13: Option<HandshakeHook>,
    /// Fired when a peer certificate chain arrives.
    pub on_recv_certificate_chain: Option<CertificateChainHook>,
    /// Raw send/recv packet logging.
    pub logging: Option<WireLogHook>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("on_recv_handshake", &self.on_recv_handshake.is_some())
            .field("on_recv_handshake13", &self.on_recv_handshake13.is_some())
            .field(
                "on_recv_certificate_chain",
                &self.on_recv_certificate_chain.is_some(),
            )
            .field("logging", &self.logging.is_some())
            .finish()
    }
}
