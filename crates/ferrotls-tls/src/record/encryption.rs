//! TLS 1.3 record protection (RFC 8446 §5).
//!
//! Nonce = static IV XOR left-padded sequence number; the true content
//! type rides inside the AEAD plaintext, trailed by optional zero
//! padding; the outer type is always application_data.

use ferrotls_crypto::{new_aead, Aead};
use ferrotls_types::TlsError;
use zeroize::Zeroize;

use crate::crypt::traffic_keys::TrafficKeys;
use crate::crypt::CipherSuiteParams;

use super::{ContentType, Record, MAX_CIPHERTEXT_LEN, MAX_PLAINTEXT_LEN, WIRE_VERSION};

const NONCE_LEN: usize = 12;

/// RFC 8446 §5.3: `nonce = iv XOR pad_left(seq, iv_len)`.
fn build_nonce(iv: &[u8], seq: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[4..].copy_from_slice(&seq.to_be_bytes());
    for (n, v) in nonce.iter_mut().zip(iv) {
        *n ^= v;
    }
    nonce
}

/// RFC 8446 §5.2: AAD is the 5-byte record header of the ciphertext.
fn build_aad(ciphertext_len: u16) -> [u8; 5] {
    let len = ciphertext_len.to_be_bytes();
    [ContentType::ApplicationData as u8, 0x03, 0x03, len[0], len[1]]
}

/// `content || content_type || zeros`, RFC 8446 §5.4.
fn build_inner_plaintext(content_type: ContentType, plaintext: &[u8]) -> Vec<u8> {
    let mut inner = Vec::with_capacity(plaintext.len() + 1);
    inner.extend_from_slice(plaintext);
    inner.push(content_type as u8);
    inner
}

/// Strip padding: the last non-zero byte is the true content type.
fn parse_inner_plaintext(inner: &[u8]) -> Result<(ContentType, &[u8]), TlsError> {
    for i in (0..inner.len()).rev() {
        if inner[i] != 0 {
            let ct = ContentType::from_u8(inner[i])
                .map_err(|_| TlsError::Decode("unknown inner content type".into()))?;
            return Ok((ct, &inner[..i]));
        }
    }
    Err(TlsError::Decode("inner plaintext has no content type".into()))
}

/// TLS 1.3 TX epoch: AEAD, static IV, sequence number.
pub struct Tls13Sealer {
    aead: Box<dyn Aead>,
    iv: Vec<u8>,
    seq: u64,
}

impl Drop for Tls13Sealer {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl Tls13Sealer {
    pub fn new(params: &CipherSuiteParams, keys: &TrafficKeys) -> Result<Self, TlsError> {
        let aead = new_aead(params.aead, &keys.key)?;
        Ok(Self {
            aead,
            iv: keys.iv.clone(),
            seq: 0,
        })
    }

    pub fn seal(&mut self, content_type: ContentType, plaintext: &[u8]) -> Result<Record, TlsError> {
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(TlsError::InternalError("plaintext too long".into()));
        }
        if self.seq == u64::MAX {
            return Err(TlsError::SeqOverflow);
        }

        let mut inner = build_inner_plaintext(content_type, plaintext);
        let ciphertext_len = inner.len() + self.aead.tag_len();
        if ciphertext_len > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::InternalError("ciphertext too long".into()));
        }

        let nonce = build_nonce(&self.iv, self.seq);
        let aad = build_aad(ciphertext_len as u16);
        let ciphertext = self.aead.seal(&nonce, &aad, &inner)?;
        inner.zeroize();
        self.seq += 1;

        Ok(Record {
            content_type: ContentType::ApplicationData,
            version: WIRE_VERSION,
            payload: ciphertext,
        })
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }
}

/// TLS 1.3 RX epoch.
pub struct Tls13Opener {
    aead: Box<dyn Aead>,
    iv: Vec<u8>,
    seq: u64,
}

impl Drop for Tls13Opener {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl Tls13Opener {
    pub fn new(params: &CipherSuiteParams, keys: &TrafficKeys) -> Result<Self, TlsError> {
        let aead = new_aead(params.aead, &keys.key)?;
        Ok(Self {
            aead,
            iv: keys.iv.clone(),
            seq: 0,
        })
    }

    pub fn open(&mut self, record: &Record) -> Result<(ContentType, Vec<u8>), TlsError> {
        if record.content_type != ContentType::ApplicationData {
            return Err(TlsError::UnexpectedMessage(
                "protected record must carry application_data outer type".into(),
            ));
        }
        if record.payload.len() < self.aead.tag_len() + 1 {
            return Err(TlsError::Decode("encrypted record too short".into()));
        }
        if record.payload.len() > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::RecordOverflow);
        }
        if self.seq == u64::MAX {
            return Err(TlsError::SeqOverflow);
        }

        let nonce = build_nonce(&self.iv, self.seq);
        let aad = build_aad(record.payload.len() as u16);
        let inner = self
            .aead
            .open(&nonce, &aad, &record.payload)
            .map_err(|_| TlsError::BadRecordMac)?;

        let (ct, plaintext) = parse_inner_plaintext(&inner)?;
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(TlsError::RecordOverflow);
        }
        self.seq += 1;
        Ok((ct, plaintext.to_vec()))
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }
}
