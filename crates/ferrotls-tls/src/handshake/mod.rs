//! Handshake protocol: message types, wire codecs, and the four
//! role×version state machine drivers.
//!
//! Drivers are sans-IO: they consume whole handshake messages and
//! return action structs (flights to send, keys to install). The
//! connection context owns the record pump and the epoch swaps.

pub mod client;
pub mod client12;
pub mod codec;
pub mod codec12;
pub mod extensions_codec;
pub mod key_exchange;
pub mod server;
pub mod server12;
pub mod signing;
pub mod verify;

use ferrotls_types::TlsError;

/// Handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    EndOfEarlyData = 5,
    EncryptedExtensions = 8,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
    KeyUpdate = 24,
    MessageHash = 254,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Result<Self, TlsError> {
        Ok(match v {
            0 => HandshakeType::HelloRequest,
            1 => HandshakeType::ClientHello,
            2 => HandshakeType::ServerHello,
            4 => HandshakeType::NewSessionTicket,
            5 => HandshakeType::EndOfEarlyData,
            8 => HandshakeType::EncryptedExtensions,
            11 => HandshakeType::Certificate,
            12 => HandshakeType::ServerKeyExchange,
            13 => HandshakeType::CertificateRequest,
            14 => HandshakeType::ServerHelloDone,
            15 => HandshakeType::CertificateVerify,
            16 => HandshakeType::ClientKeyExchange,
            20 => HandshakeType::Finished,
            24 => HandshakeType::KeyUpdate,
            254 => HandshakeType::MessageHash,
            _ => return Err(TlsError::Decode(format!("unknown handshake type {v}"))),
        })
    }
}

/// A parsed handshake message: type plus body, without the header.
#[derive(Debug, Clone)]
pub struct HandshakeMessage {
    pub msg_type: HandshakeType,
    pub body: Vec<u8>,
}

impl HandshakeMessage {
    /// Parse from full message bytes (header included).
    pub fn parse(msg: &[u8]) -> Result<Self, TlsError> {
        let (msg_type, body, total) = codec::parse_handshake_header(msg)?;
        if total != msg.len() {
            return Err(TlsError::Decode("trailing bytes after handshake message".into()));
        }
        Ok(Self {
            msg_type,
            body: body.to_vec(),
        })
    }

    /// Serialize with the 4-byte header.
    pub fn encode(&self) -> Vec<u8> {
        codec::wrap_handshake(self.msg_type, &self.body)
    }
}
