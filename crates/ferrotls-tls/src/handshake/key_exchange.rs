//! Ephemeral key exchange for one handshake, keyed by TLS named group.

use ferrotls_crypto::{KexKeyPair, RngSource};
use ferrotls_types::TlsError;

use crate::crypt::NamedGroup;

/// Ephemeral key-exchange state.
pub struct KeyExchange {
    group: NamedGroup,
    keypair: KexKeyPair,
}

impl KeyExchange {
    /// Generate a fresh keypair for the given group.
    pub fn generate(group: NamedGroup, rng: &RngSource) -> Result<Self, TlsError> {
        let kex_group = group.kex_group().ok_or_else(|| {
            TlsError::HandshakeFailure(format!("unsupported named group 0x{:04x}", group.0))
        })?;
        let keypair = KexKeyPair::generate(kex_group, rng)?;
        Ok(Self { group, keypair })
    }

    pub fn group(&self) -> NamedGroup {
        self.group
    }

    /// The public share in key_share wire encoding.
    pub fn public_key_bytes(&self) -> &[u8] {
        self.keypair.public_bytes()
    }

    /// Agree with the peer's share.
    pub fn compute_shared_secret(&self, peer_public: &[u8]) -> Result<Vec<u8>, TlsError> {
        self.keypair
            .agree(peer_public)
            .map_err(|_| TlsError::HandshakeFailure("key agreement failed".into()))
    }
}
