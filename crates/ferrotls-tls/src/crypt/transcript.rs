//! Running transcript hash over handshake messages.
//!
//! Buffer-and-replay: `current_hash()` replays the buffered bytes into a
//! fresh digest, so snapshots (for CertificateVerify and Finished) never
//! disturb ongoing updates.

use ferrotls_crypto::{Digest, HashAlgorithm};

use crate::handshake::HandshakeType;

/// Running hash of every handshake message byte, in order.
pub struct TranscriptHash {
    hash: HashAlgorithm,
    message_buffer: Vec<u8>,
}

impl TranscriptHash {
    pub fn new(hash: HashAlgorithm) -> Self {
        Self {
            hash,
            message_buffer: Vec::new(),
        }
    }

    /// Restart with a different hash, keeping the buffered messages.
    ///
    /// Used when the negotiated suite selects SHA-384 after the
    /// ClientHello was already recorded.
    pub fn migrate(&mut self, hash: HashAlgorithm) {
        self.hash = hash;
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    pub fn hash_len(&self) -> usize {
        self.hash.output_len()
    }

    /// Append handshake message bytes.
    pub fn update(&mut self, data: &[u8]) {
        self.message_buffer.extend_from_slice(data);
    }

    /// The raw concatenated handshake messages. TLS 1.2
    /// CertificateVerify signs these bytes directly.
    pub fn raw_messages(&self) -> &[u8] {
        &self.message_buffer
    }

    /// Snapshot the current hash without disturbing the running state.
    pub fn current_hash(&self) -> Vec<u8> {
        let mut digest = Digest::new(self.hash);
        digest.update(&self.message_buffer);
        digest.finish()
    }

    /// Hash of the empty string, for `Derive-Secret(_, "derived", "")`.
    pub fn empty_hash(&self) -> Vec<u8> {
        self.hash.digest(b"")
    }

    /// HelloRetryRequest substitution (RFC 8446 §4.4.1): replace the
    /// buffered ClientHello1 with a synthetic `message_hash` message
    /// containing `Hash(ClientHello1)`.
    pub fn replace_with_message_hash(&mut self) {
        let ch1_hash = self.current_hash();
        self.message_buffer.clear();
        self.message_buffer.push(HandshakeType::MessageHash as u8);
        self.message_buffer.extend_from_slice(&[0, 0]);
        self.message_buffer.push(ch1_hash.len() as u8);
        self.message_buffer.extend_from_slice(&ch1_hash);
    }
}
