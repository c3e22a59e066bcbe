//! TLS 1.3 handshake message encoding/decoding (RFC 8446 §4).
//!
//! Decoders validate every length field and fail with a decode error
//! on short input or forbidden values; unrecognized extensions are
//! carried opaquely.

use ferrotls_types::TlsError;

use crate::crypt::SignatureScheme;
use crate::extensions::{Extension, ExtensionType};
use crate::CipherSuite;

use super::HandshakeType;

/// The magic ServerHello random marking a HelloRetryRequest (RFC 8446 §4.1.3).
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8,
    0x91, 0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8,
    0x33, 0x9C,
];

/// Downgrade sentinel a TLS 1.3-capable server writes into the last 8
/// bytes of its random when negotiating TLS 1.2 (RFC 8446 §4.1.3).
pub const DOWNGRADE_SENTINEL_TLS12: [u8; 8] = [0x44, 0x4F, 0x57, 0x4E, 0x47, 0x52, 0x44, 0x01];

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Bounds-checked cursor over a message body.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_done(&self) -> bool {
        self.pos == self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], TlsError> {
        if self.remaining() < n {
            return Err(TlsError::Decode(format!("short input reading {what}")));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u8(&mut self, what: &str) -> Result<u8, TlsError> {
        Ok(self.take(1, what)?[0])
    }

    pub fn u16(&mut self, what: &str) -> Result<u16, TlsError> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u24(&mut self, what: &str) -> Result<u32, TlsError> {
        let b = self.take(3, what)?;
        Ok(((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32))
    }

    pub fn u32(&mut self, what: &str) -> Result<u32, TlsError> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Vector with a one-byte length prefix.
    pub fn vec8(&mut self, what: &str) -> Result<&'a [u8], TlsError> {
        let len = self.u8(what)? as usize;
        self.take(len, what)
    }

    /// Vector with a two-byte length prefix.
    pub fn vec16(&mut self, what: &str) -> Result<&'a [u8], TlsError> {
        let len = self.u16(what)? as usize;
        self.take(len, what)
    }

    /// Vector with a three-byte length prefix.
    pub fn vec24(&mut self, what: &str) -> Result<&'a [u8], TlsError> {
        let len = self.u24(what)? as usize;
        self.take(len, what)
    }

    pub fn expect_done(&self, what: &str) -> Result<(), TlsError> {
        if !self.is_done() {
            return Err(TlsError::Decode(format!("trailing bytes in {what}")));
        }
        Ok(())
    }
}

pub(crate) fn put_u24(buf: &mut Vec<u8>, value: usize) {
    buf.push((value >> 16) as u8);
    buf.push((value >> 8) as u8);
    buf.push(value as u8);
}

// ---------------------------------------------------------------------------
// Handshake header
// ---------------------------------------------------------------------------

/// Parse a handshake header: msg_type(1) || length(3).
/// Returns (type, body, total bytes consumed).
pub fn parse_handshake_header(data: &[u8]) -> Result<(HandshakeType, &[u8], usize), TlsError> {
    if data.len() < 4 {
        return Err(TlsError::Decode("handshake header too short".into()));
    }
    let msg_type = HandshakeType::from_u8(data[0])?;
    let length = ((data[1] as usize) << 16) | ((data[2] as usize) << 8) | (data[3] as usize);
    let total = 4 + length;
    if data.len() < total {
        return Err(TlsError::Decode("handshake body truncated".into()));
    }
    Ok((msg_type, &data[4..total], total))
}

/// Wrap a body with the 4-byte handshake header.
pub fn wrap_handshake(msg_type: HandshakeType, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.push(msg_type as u8);
    put_u24(&mut out, body.len());
    out.extend_from_slice(body);
    out
}

// ---------------------------------------------------------------------------
// Extensions
// ---------------------------------------------------------------------------

/// Encode an extension list with its two-byte total length prefix.
pub fn encode_extensions(extensions: &[Extension]) -> Vec<u8> {
    let mut body = Vec::new();
    for ext in extensions {
        body.extend_from_slice(&ext.extension_type.0.to_be_bytes());
        body.extend_from_slice(&(ext.data.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext.data);
    }
    let mut out = Vec::with_capacity(2 + body.len());
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Parse a length-prefixed extension list.
pub(crate) fn parse_extensions(reader: &mut Reader<'_>) -> Result<Vec<Extension>, TlsError> {
    let block = reader.vec16("extensions")?;
    let mut inner = Reader::new(block);
    let mut extensions = Vec::new();
    while !inner.is_done() {
        let ty = ExtensionType(inner.u16("extension type")?);
        let data = inner.vec16("extension data")?.to_vec();
        extensions.push(Extension {
            extension_type: ty,
            data,
        });
    }
    Ok(extensions)
}

// ---------------------------------------------------------------------------
// ClientHello
// ---------------------------------------------------------------------------

/// ClientHello message.
#[derive(Debug, Clone)]
pub struct ClientHello {
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<CipherSuite>,
    pub extensions: Vec<Extension>,
}

/// Encode a ClientHello as a complete handshake message.
pub fn encode_client_hello(ch: &ClientHello) -> Vec<u8> {
    let mut body = Vec::with_capacity(256);
    body.extend_from_slice(&0x0303u16.to_be_bytes()); // legacy_version
    body.extend_from_slice(&ch.random);
    body.push(ch.legacy_session_id.len() as u8);
    body.extend_from_slice(&ch.legacy_session_id);
    body.extend_from_slice(&((ch.cipher_suites.len() * 2) as u16).to_be_bytes());
    for suite in &ch.cipher_suites {
        body.extend_from_slice(&suite.0.to_be_bytes());
    }
    body.push(1); // one compression method:
    body.push(0); // null
    body.extend_from_slice(&encode_extensions(&ch.extensions));
    wrap_handshake(HandshakeType::ClientHello, &body)
}

/// Decode a ClientHello body.
pub fn decode_client_hello(body: &[u8]) -> Result<ClientHello, TlsError> {
    let mut r = Reader::new(body);
    let legacy_version = r.u16("ClientHello version")?;
    if legacy_version != 0x0303 {
        return Err(TlsError::Decode(format!(
            "ClientHello legacy_version must be 0x0303, got 0x{legacy_version:04x}"
        )));
    }
    let mut random = [0u8; 32];
    random.copy_from_slice(r.take(32, "ClientHello random")?);
    let legacy_session_id = r.vec8("ClientHello session_id")?.to_vec();
    if legacy_session_id.len() > 32 {
        return Err(TlsError::Decode("session_id longer than 32 bytes".into()));
    }

    let suites_block = r.vec16("ClientHello cipher_suites")?;
    if suites_block.is_empty() || suites_block.len() % 2 != 0 {
        return Err(TlsError::Decode("malformed cipher_suites vector".into()));
    }
    let cipher_suites = suites_block
        .chunks_exact(2)
        .map(|c| CipherSuite(u16::from_be_bytes([c[0], c[1]])))
        .collect();

    let compressions = r.vec8("ClientHello compression_methods")?;
    if !compressions.contains(&0) {
        return Err(TlsError::Decode("null compression method missing".into()));
    }

    let extensions = if r.is_done() {
        Vec::new()
    } else {
        parse_extensions(&mut r)?
    };
    r.expect_done("ClientHello")?;

    Ok(ClientHello {
        random,
        legacy_session_id,
        cipher_suites,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// ServerHello
// ---------------------------------------------------------------------------

/// ServerHello message (also carries HelloRetryRequest, by magic random).
#[derive(Debug, Clone)]
pub struct ServerHello {
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suite: CipherSuite,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }
}

/// Encode a ServerHello as a complete handshake message.
pub fn encode_server_hello(sh: &ServerHello) -> Vec<u8> {
    let mut body = Vec::with_capacity(128);
    body.extend_from_slice(&0x0303u16.to_be_bytes());
    body.extend_from_slice(&sh.random);
    body.push(sh.legacy_session_id.len() as u8);
    body.extend_from_slice(&sh.legacy_session_id);
    body.extend_from_slice(&sh.cipher_suite.0.to_be_bytes());
    body.push(0); // null compression
    body.extend_from_slice(&encode_extensions(&sh.extensions));
    wrap_handshake(HandshakeType::ServerHello, &body)
}

/// Decode a ServerHello body.
pub fn decode_server_hello(body: &[u8]) -> Result<ServerHello, TlsError> {
    let mut r = Reader::new(body);
    let _legacy_version = r.u16("ServerHello version")?;
    let mut random = [0u8; 32];
    random.copy_from_slice(r.take(32, "ServerHello random")?);
    let legacy_session_id = r.vec8("ServerHello session_id")?.to_vec();
    let cipher_suite = CipherSuite(r.u16("ServerHello cipher_suite")?);
    let compression = r.u8("ServerHello compression")?;
    if compression != 0 {
        return Err(TlsError::Decode("ServerHello compression must be null".into()));
    }
    let extensions = if r.is_done() {
        Vec::new()
    } else {
        parse_extensions(&mut r)?
    };
    r.expect_done("ServerHello")?;

    Ok(ServerHello {
        random,
        legacy_session_id,
        cipher_suite,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// EncryptedExtensions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EncryptedExtensions {
    pub extensions: Vec<Extension>,
}

pub fn encode_encrypted_extensions(ee: &EncryptedExtensions) -> Vec<u8> {
    wrap_handshake(
        HandshakeType::EncryptedExtensions,
        &encode_extensions(&ee.extensions),
    )
}

pub fn decode_encrypted_extensions(body: &[u8]) -> Result<EncryptedExtensions, TlsError> {
    let mut r = Reader::new(body);
    let extensions = parse_extensions(&mut r)?;
    r.expect_done("EncryptedExtensions")?;
    Ok(EncryptedExtensions { extensions })
}

// ---------------------------------------------------------------------------
// Certificate
// ---------------------------------------------------------------------------

/// One entry in a TLS 1.3 Certificate message.
#[derive(Debug, Clone)]
pub struct CertificateEntry {
    pub cert_data: Vec<u8>,
    pub extensions: Vec<Extension>,
}

/// TLS 1.3 Certificate message.
#[derive(Debug, Clone)]
pub struct CertificateMsg {
    pub certificate_request_context: Vec<u8>,
    pub certificate_list: Vec<CertificateEntry>,
}

pub fn encode_certificate(msg: &CertificateMsg) -> Vec<u8> {
    let mut list = Vec::new();
    for entry in &msg.certificate_list {
        put_u24(&mut list, entry.cert_data.len());
        list.extend_from_slice(&entry.cert_data);
        list.extend_from_slice(&encode_extensions(&entry.extensions));
    }

    let mut body = Vec::with_capacity(4 + list.len());
    body.push(msg.certificate_request_context.len() as u8);
    body.extend_from_slice(&msg.certificate_request_context);
    put_u24(&mut body, list.len());
    body.extend_from_slice(&list);
    wrap_handshake(HandshakeType::Certificate, &body)
}

pub fn decode_certificate(body: &[u8]) -> Result<CertificateMsg, TlsError> {
    let mut r = Reader::new(body);
    let certificate_request_context = r.vec8("certificate_request_context")?.to_vec();
    let list = r.vec24("certificate_list")?;
    r.expect_done("Certificate")?;

    let mut inner = Reader::new(list);
    let mut certificate_list = Vec::new();
    while !inner.is_done() {
        let cert_data = inner.vec24("certificate entry")?.to_vec();
        let extensions = parse_extensions(&mut inner)?;
        certificate_list.push(CertificateEntry {
            cert_data,
            extensions,
        });
    }

    Ok(CertificateMsg {
        certificate_request_context,
        certificate_list,
    })
}

// ---------------------------------------------------------------------------
// CertificateRequest
// ---------------------------------------------------------------------------

/// TLS 1.3 CertificateRequest message.
#[derive(Debug, Clone)]
pub struct CertificateRequestMsg {
    pub certificate_request_context: Vec<u8>,
    pub extensions: Vec<Extension>,
}

pub fn encode_certificate_request(msg: &CertificateRequestMsg) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(msg.certificate_request_context.len() as u8);
    body.extend_from_slice(&msg.certificate_request_context);
    body.extend_from_slice(&encode_extensions(&msg.extensions));
    wrap_handshake(HandshakeType::CertificateRequest, &body)
}

pub fn decode_certificate_request(body: &[u8]) -> Result<CertificateRequestMsg, TlsError> {
    let mut r = Reader::new(body);
    let certificate_request_context = r.vec8("certificate_request_context")?.to_vec();
    let extensions = parse_extensions(&mut r)?;
    r.expect_done("CertificateRequest")?;
    Ok(CertificateRequestMsg {
        certificate_request_context,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// CertificateVerify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CertificateVerifyMsg {
    pub algorithm: SignatureScheme,
    pub signature: Vec<u8>,
}

pub fn encode_certificate_verify(msg: &CertificateVerifyMsg) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + msg.signature.len());
    body.extend_from_slice(&msg.algorithm.0.to_be_bytes());
    body.extend_from_slice(&(msg.signature.len() as u16).to_be_bytes());
    body.extend_from_slice(&msg.signature);
    wrap_handshake(HandshakeType::CertificateVerify, &body)
}

pub fn decode_certificate_verify(body: &[u8]) -> Result<CertificateVerifyMsg, TlsError> {
    let mut r = Reader::new(body);
    let algorithm = SignatureScheme(r.u16("CertificateVerify algorithm")?);
    let signature = r.vec16("CertificateVerify signature")?.to_vec();
    r.expect_done("CertificateVerify")?;
    Ok(CertificateVerifyMsg {
        algorithm,
        signature,
    })
}

// ---------------------------------------------------------------------------
// Finished / EndOfEarlyData
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FinishedMsg {
    pub verify_data: Vec<u8>,
}

pub fn encode_finished(verify_data: &[u8]) -> Vec<u8> {
    wrap_handshake(HandshakeType::Finished, verify_data)
}

pub fn decode_finished(body: &[u8], hash_len: usize) -> Result<FinishedMsg, TlsError> {
    if body.len() != hash_len {
        return Err(TlsError::Decode(format!(
            "Finished verify_data must be {hash_len} bytes, got {}",
            body.len()
        )));
    }
    Ok(FinishedMsg {
        verify_data: body.to_vec(),
    })
}

pub fn encode_end_of_early_data() -> Vec<u8> {
    wrap_handshake(HandshakeType::EndOfEarlyData, &[])
}

// ---------------------------------------------------------------------------
// NewSessionTicket
// ---------------------------------------------------------------------------

/// TLS 1.3 NewSessionTicket (RFC 8446 §4.6.1).
#[derive(Debug, Clone)]
pub struct NewSessionTicketMsg {
    pub ticket_lifetime: u32,
    pub ticket_age_add: u32,
    pub ticket_nonce: Vec<u8>,
    pub ticket: Vec<u8>,
    pub extensions: Vec<Extension>,
}

pub fn encode_new_session_ticket(msg: &NewSessionTicketMsg) -> Vec<u8> {
    let mut body = Vec::with_capacity(16 + msg.ticket.len());
    body.extend_from_slice(&msg.ticket_lifetime.to_be_bytes());
    body.extend_from_slice(&msg.ticket_age_add.to_be_bytes());
    body.push(msg.ticket_nonce.len() as u8);
    body.extend_from_slice(&msg.ticket_nonce);
    body.extend_from_slice(&(msg.ticket.len() as u16).to_be_bytes());
    body.extend_from_slice(&msg.ticket);
    body.extend_from_slice(&encode_extensions(&msg.extensions));
    wrap_handshake(HandshakeType::NewSessionTicket, &body)
}

pub fn decode_new_session_ticket(body: &[u8]) -> Result<NewSessionTicketMsg, TlsError> {
    let mut r = Reader::new(body);
    let ticket_lifetime = r.u32("ticket_lifetime")?;
    let ticket_age_add = r.u32("ticket_age_add")?;
    let ticket_nonce = r.vec8("ticket_nonce")?.to_vec();
    let ticket = r.vec16("ticket")?.to_vec();
    if ticket.is_empty() {
        return Err(TlsError::Decode("empty session ticket".into()));
    }
    let extensions = parse_extensions(&mut r)?;
    r.expect_done("NewSessionTicket")?;
    Ok(NewSessionTicketMsg {
        ticket_lifetime,
        ticket_age_add,
        ticket_nonce,
        ticket,
        extensions,
    })
}

// ---------------------------------------------------------------------------
// KeyUpdate
// ---------------------------------------------------------------------------

/// KeyUpdate request field (RFC 8446 §4.6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdateRequest {
    UpdateNotRequested,
    UpdateRequested,
}

pub fn encode_key_update(request: KeyUpdateRequest) -> Vec<u8> {
    let v = match request {
        KeyUpdateRequest::UpdateNotRequested => 0,
        KeyUpdateRequest::UpdateRequested => 1,
    };
    wrap_handshake(HandshakeType::KeyUpdate, &[v])
}

pub fn decode_key_update(body: &[u8]) -> Result<KeyUpdateRequest, TlsError> {
    if body.len() != 1 {
        return Err(TlsError::Decode("KeyUpdate body must be 1 byte".into()));
    }
    match body[0] {
        0 => Ok(KeyUpdateRequest::UpdateNotRequested),
        1 => Ok(KeyUpdateRequest::UpdateRequested),
        v => Err(TlsError::Decode(format!("invalid KeyUpdate request {v}"))),
    }
}
