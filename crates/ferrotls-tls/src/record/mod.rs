//! TLS record layer: framing, epoch state, fragmentation.
//!
//! One [`Seal`] and one [`Open`] exist per direction. Each is a
//! version-tagged epoch — plaintext before the first key install, then
//! TLS 1.3 or TLS 1.2 AEAD — holding cipher, static IV, and a 64-bit
//! sequence number. Epoch swaps happen under the owning Read/Write
//! lock; the replacement state starts at sequence 0.

pub mod encryption;
pub mod encryption12;

use ferrotls_types::TlsError;

use encryption::{Tls13Opener, Tls13Sealer};
use encryption12::{Tls12Opener, Tls12Sealer};

/// Maximum plaintext fragment size (2^14, RFC 8446 §5.1).
pub const MAX_PLAINTEXT_LEN: usize = 16384;

/// Maximum encryption overhead a record may add (RFC 8446 §5.2).
pub const MAX_CIPHERTEXT_OVERHEAD: usize = 256;

/// Maximum ciphertext fragment size.
pub const MAX_CIPHERTEXT_LEN: usize = MAX_PLAINTEXT_LEN + MAX_CIPHERTEXT_OVERHEAD;

/// Record header size: type(1) + version(2) + length(2).
pub const RECORD_HEADER_LEN: usize = 5;

/// The legacy record version both TLS 1.2 and 1.3 put on the wire.
pub const WIRE_VERSION: u16 = 0x0303;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_u8(v: u8) -> Result<Self, TlsError> {
        match v {
            20 => Ok(ContentType::ChangeCipherSpec),
            21 => Ok(ContentType::Alert),
            22 => Ok(ContentType::Handshake),
            23 => Ok(ContentType::ApplicationData),
            _ => Err(TlsError::Decode(format!("unknown content type {v}"))),
        }
    }
}

/// A parsed TLS record.
#[derive(Debug, Clone)]
pub struct Record {
    pub content_type: ContentType,
    pub version: u16,
    pub payload: Vec<u8>,
}

/// Try to parse one record from the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the record
/// and the number of bytes consumed. A declared length above
/// 2^14 + 256 is a `RecordOverflow`.
pub fn parse_record(buf: &[u8]) -> Result<Option<(Record, usize)>, TlsError> {
    if buf.len() < RECORD_HEADER_LEN {
        return Ok(None);
    }
    let content_type = ContentType::from_u8(buf[0])?;
    let version = u16::from_be_bytes([buf[1], buf[2]]);
    let length = u16::from_be_bytes([buf[3], buf[4]]) as usize;
    if length > MAX_CIPHERTEXT_LEN {
        return Err(TlsError::RecordOverflow);
    }
    if buf.len() < RECORD_HEADER_LEN + length {
        return Ok(None);
    }
    let payload = buf[RECORD_HEADER_LEN..RECORD_HEADER_LEN + length].to_vec();
    Ok(Some((
        Record {
            content_type,
            version,
            payload,
        },
        RECORD_HEADER_LEN + length,
    )))
}

/// Serialize a record to its wire bytes.
pub fn encode_record(record: &Record) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + record.payload.len());
    buf.push(record.content_type as u8);
    buf.extend_from_slice(&record.version.to_be_bytes());
    buf.extend_from_slice(&(record.payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(&record.payload);
    buf
}

/// Outgoing (TX) epoch state.
pub enum Seal {
    /// Pre-handshake: records go out unprotected.
    Plain,
    Tls13(Tls13Sealer),
    Tls12(Tls12Sealer),
}

impl Seal {
    /// Protect one fragment (≤ 2^14 bytes) and serialize the record.
    pub fn seal(&mut self, content_type: ContentType, fragment: &[u8]) -> Result<Vec<u8>, TlsError> {
        if fragment.len() > MAX_PLAINTEXT_LEN {
            return Err(TlsError::InternalError(
                "fragment exceeds maximum plaintext length".into(),
            ));
        }
        let record = match self {
            Seal::Plain => Record {
                content_type,
                version: WIRE_VERSION,
                payload: fragment.to_vec(),
            },
            Seal::Tls13(sealer) => sealer.seal(content_type, fragment)?,
            Seal::Tls12(sealer) => sealer.seal(content_type, fragment)?,
        };
        Ok(encode_record(&record))
    }

    /// Protect an arbitrarily long payload, fragmenting into ≤ 2^14-byte
    /// chunks, and return the concatenated wire bytes.
    pub fn seal_stream(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
    ) -> Result<Vec<u8>, TlsError> {
        let mut out = Vec::with_capacity(payload.len() + RECORD_HEADER_LEN);
        if payload.is_empty() {
            return self.seal(content_type, payload);
        }
        for chunk in payload.chunks(MAX_PLAINTEXT_LEN) {
            out.extend_from_slice(&self.seal(content_type, chunk)?);
        }
        Ok(out)
    }

    /// Current TX sequence number.
    pub fn sequence_number(&self) -> u64 {
        match self {
            Seal::Plain => 0,
            Seal::Tls13(s) => s.sequence_number(),
            Seal::Tls12(s) => s.sequence_number(),
        }
    }

    pub fn is_protecting(&self) -> bool {
        !matches!(self, Seal::Plain)
    }
}

/// Incoming (RX) epoch state.
pub enum Open {
    Plain,
    Tls13(Tls13Opener),
    Tls12(Tls12Opener),
}

impl Open {
    /// Unprotect a record, returning its true content type and plaintext.
    pub fn open(&mut self, record: Record) -> Result<(ContentType, Vec<u8>), TlsError> {
        match self {
            Open::Plain => {
                if record.payload.len() > MAX_PLAINTEXT_LEN {
                    return Err(TlsError::RecordOverflow);
                }
                Ok((record.content_type, record.payload))
            }
            // TLS 1.3 change_cipher_spec compatibility records arrive
            // unprotected between encrypted flights.
            Open::Tls13(_) if record.content_type == ContentType::ChangeCipherSpec => {
                Ok((ContentType::ChangeCipherSpec, record.payload))
            }
            Open::Tls13(opener) => opener.open(&record),
            Open::Tls12(opener) => opener.open(&record),
        }
    }

    /// Current RX sequence number.
    pub fn sequence_number(&self) -> u64 {
        match self {
            Open::Plain => 0,
            Open::Tls13(o) => o.sequence_number(),
            Open::Tls12(o) => o.sequence_number(),
        }
    }

    pub fn is_protecting(&self) -> bool {
        !matches!(self, Open::Plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_needs_more_data() {
        assert!(parse_record(&[]).unwrap().is_none());
        assert!(parse_record(&[22, 3, 3]).unwrap().is_none());
        // Header present, body incomplete
        assert!(parse_record(&[22, 3, 3, 0, 5, 1, 2]).unwrap().is_none());
    }

    #[test]
    fn test_parse_roundtrip() {
        let record = Record {
            content_type: ContentType::Handshake,
            version: WIRE_VERSION,
            payload: vec![1, 2, 3, 4],
        };
        let wire = encode_record(&record);
        assert_eq!(wire.len(), 9);
        let (parsed, consumed) = parse_record(&wire).unwrap().unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(parsed.content_type, ContentType::Handshake);
        assert_eq!(parsed.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_rejects_unknown_content_type() {
        assert!(parse_record(&[99, 3, 3, 0, 0]).is_err());
    }

    #[test]
    fn test_parse_rejects_overlong_record() {
        // Declared length 17000 > 2^14 + 256 (scenario S6)
        let mut wire = vec![23, 3, 3];
        wire.extend_from_slice(&17000u16.to_be_bytes());
        let err = parse_record(&wire).unwrap_err();
        assert!(matches!(err, TlsError::RecordOverflow));
    }

    #[test]
    fn test_plain_seal_open() {
        let mut seal = Seal::Plain;
        let wire = seal.seal(ContentType::Handshake, b"client hello").unwrap();
        assert_eq!(wire[0], 22);
        assert_eq!(seal.sequence_number(), 0);
        assert!(!seal.is_protecting());

        let (record, _) = parse_record(&wire).unwrap().unwrap();
        let mut open = Open::Plain;
        let (ct, payload) = open.open(record).unwrap();
        assert_eq!(ct, ContentType::Handshake);
        assert_eq!(payload, b"client hello");
    }

    #[test]
    fn test_seal_stream_fragments() {
        let mut seal = Seal::Plain;
        let payload = vec![0xAB; MAX_PLAINTEXT_LEN + 100];
        let wire = seal.seal_stream(ContentType::ApplicationData, &payload).unwrap();

        // Two records: 16384 + 100 bytes of payload
        let (first, consumed) = parse_record(&wire).unwrap().unwrap();
        assert_eq!(first.payload.len(), MAX_PLAINTEXT_LEN);
        let (second, rest) = parse_record(&wire[consumed..]).unwrap().unwrap();
        assert_eq!(second.payload.len(), 100);
        assert_eq!(consumed + rest, wire.len());
    }

    #[test]
    fn test_oversized_fragment_rejected() {
        let mut seal = Seal::Plain;
        assert!(seal
            .seal(ContentType::ApplicationData, &vec![0; MAX_PLAINTEXT_LEN + 1])
            .is_err());
    }
}
