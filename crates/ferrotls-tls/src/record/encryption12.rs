//! TLS 1.2 AEAD record protection (RFC 5246 §6.2.3.3, RFC 7905).
//!
//! GCM suites carry an 8-byte explicit nonce in the fragment and build
//! the AEAD nonce as `fixed_iv(4) || explicit(8)`. ChaCha20-Poly1305
//! suites (RFC 7905) have no explicit part: the nonce is the 12-byte IV
//! XOR the sequence number, as in TLS 1.3. The content type stays
//! visible on the wire — 1.2 does not hide it.

use ferrotls_crypto::{new_aead, Aead};
use ferrotls_types::TlsError;
use zeroize::Zeroize;

use crate::crypt::Tls12CipherSuiteParams;

use super::{ContentType, Record, MAX_CIPHERTEXT_LEN, MAX_PLAINTEXT_LEN, WIRE_VERSION};

/// 13-byte AAD: `seq(8) || type(1) || version(2) || plaintext_len(2)`.
fn build_aad(seq: u64, content_type: ContentType, plaintext_len: u16) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..8].copy_from_slice(&seq.to_be_bytes());
    aad[8] = content_type as u8;
    aad[9] = 0x03;
    aad[10] = 0x03;
    aad[11..].copy_from_slice(&plaintext_len.to_be_bytes());
    aad
}

fn build_nonce_explicit(fixed_iv: &[u8], explicit: &[u8; 8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(fixed_iv);
    nonce[4..].copy_from_slice(explicit);
    nonce
}

fn build_nonce_xor(iv: &[u8], seq: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&seq.to_be_bytes());
    for (n, v) in nonce.iter_mut().zip(iv) {
        *n ^= v;
    }
    nonce
}

/// TLS 1.2 TX epoch.
pub struct Tls12Sealer {
    aead: Box<dyn Aead>,
    iv: Vec<u8>,
    /// Explicit nonce length: 8 for GCM, 0 for ChaCha20.
    record_iv_len: usize,
    seq: u64,
}

impl Drop for Tls12Sealer {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl Tls12Sealer {
    pub fn new(
        params: &Tls12CipherSuiteParams,
        key: &[u8],
        write_iv: &[u8],
    ) -> Result<Self, TlsError> {
        let aead = new_aead(params.aead, key)?;
        Ok(Self {
            aead,
            iv: write_iv.to_vec(),
            record_iv_len: params.record_iv_len,
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

        let aad = build_aad(self.seq, content_type, plaintext.len() as u16);
        let payload = if self.record_iv_len == 8 {
            let explicit = self.seq.to_be_bytes();
            let nonce = build_nonce_explicit(&self.iv, &explicit);
            let ciphertext = self.aead.seal(&nonce, &aad, plaintext)?;
            let mut payload = Vec::with_capacity(8 + ciphertext.len());
            payload.extend_from_slice(&explicit);
            payload.extend_from_slice(&ciphertext);
            payload
        } else {
            let nonce = build_nonce_xor(&self.iv, self.seq);
            self.aead.seal(&nonce, &aad, plaintext)?
        };
        self.seq += 1;

        Ok(Record {
            content_type,
            version: WIRE_VERSION,
            payload,
        })
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }
}

/// TLS 1.2 RX epoch.
pub struct Tls12Opener {
    aead: Box<dyn Aead>,
    iv: Vec<u8>,
    record_iv_len: usize,
    seq: u64,
}

impl Drop for Tls12Opener {
    fn drop(&mut self) {
        self.iv.zeroize();
    }
}

impl Tls12Opener {
    pub fn new(
        params: &Tls12CipherSuiteParams,
        key: &[u8],
        read_iv: &[u8],
    ) -> Result<Self, TlsError> {
        let aead = new_aead(params.aead, key)?;
        Ok(Self {
            aead,
            iv: read_iv.to_vec(),
            record_iv_len: params.record_iv_len,
            seq: 0,
        })
    }

    pub fn open(&mut self, record: &Record) -> Result<(ContentType, Vec<u8>), TlsError> {
        if record.payload.len() > MAX_CIPHERTEXT_LEN {
            return Err(TlsError::RecordOverflow);
        }
        if record.payload.len() < self.record_iv_len + self.aead.tag_len() {
            return Err(TlsError::Decode("encrypted record too short".into()));
        }
        if self.seq == u64::MAX {
            return Err(TlsError::SeqOverflow);
        }

        let ciphertext = &record.payload[self.record_iv_len..];
        let plaintext_len = ciphertext.len() - self.aead.tag_len();
        let aad = build_aad(self.seq, record.content_type, plaintext_len as u16);
        let nonce = if self.record_iv_len == 8 {
            let explicit: [u8; 8] = record.payload[..8].try_into().expect("length checked");
            build_nonce_explicit(&self.iv, &explicit)
        } else {
            build_nonce_xor(&self.iv, self.seq)
        };

        let plaintext = self
            .aead
            .open(&nonce, &aad, ciphertext)
            .map_err(|_| TlsError::BadRecordMac)?;
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(TlsError::RecordOverflow);
        }
        self.seq += 1;
        Ok((record.content_type, plaintext))
    }

    pub fn sequence_number(&self) -> u64 {
        self.seq
    }
}
