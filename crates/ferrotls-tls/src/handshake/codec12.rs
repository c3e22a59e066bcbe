//! TLS 1.2 handshake message encoding/decoding (RFC 5246, RFC 8422,
//! RFC 5077).
//!
//! ClientHello/ServerHello share the TLS 1.3 codec; this module covers
//! the messages specific to 1.2: ServerKeyExchange, ClientKeyExchange,
//! the flat Certificate format, CertificateRequest, ServerHelloDone,
//! NewSessionTicket, and the 12-byte Finished.

use ferrotls_types::TlsError;

use crate::crypt::SignatureScheme;

use super::codec::{put_u24, wrap_handshake, Reader};
use super::HandshakeType;

/// ECDHE ServerKeyExchange (RFC 8422 §5.4).
#[derive(Debug, Clone)]
pub struct ServerKeyExchange {
    /// Always 3 (named_curve).
    pub curve_type: u8,
    pub named_curve: u16,
    /// Ephemeral public point, uncompressed.
    pub public_key: Vec<u8>,
    pub signature_algorithm: SignatureScheme,
    /// Signature over `client_random || server_random || params`.
    pub signature: Vec<u8>,
}

/// The `params` portion covered by the SKE signature:
/// `curve_type(1) || named_curve(2) || point_len(1) || point`.
pub fn build_ske_params(curve_type: u8, named_curve: u16, public_key: &[u8]) -> Vec<u8> {
    let mut params = Vec::with_capacity(4 + public_key.len());
    params.push(curve_type);
    params.extend_from_slice(&named_curve.to_be_bytes());
    params.push(public_key.len() as u8);
    params.extend_from_slice(public_key);
    params
}

/// The full signed input: `client_random || server_random || params`.
pub fn build_ske_signed_data(
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    ske_params: &[u8],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(64 + ske_params.len());
    data.extend_from_slice(client_random);
    data.extend_from_slice(server_random);
    data.extend_from_slice(ske_params);
    data
}

pub fn encode_server_key_exchange(ske: &ServerKeyExchange) -> Vec<u8> {
    let params = build_ske_params(ske.curve_type, ske.named_curve, &ske.public_key);
    let mut body = Vec::with_capacity(params.len() + 4 + ske.signature.len());
    body.extend_from_slice(&params);
    body.extend_from_slice(&ske.signature_algorithm.0.to_be_bytes());
    body.extend_from_slice(&(ske.signature.len() as u16).to_be_bytes());
    body.extend_from_slice(&ske.signature);
    wrap_handshake(HandshakeType::ServerKeyExchange, &body)
}

pub fn decode_server_key_exchange(body: &[u8]) -> Result<ServerKeyExchange, TlsError> {
    let mut r = Reader::new(body);
    let curve_type = r.u8("SKE curve_type")?;
    if curve_type != 3 {
        return Err(TlsError::Decode(format!(
            "SKE curve_type must be 3 (named_curve), got {curve_type}"
        )));
    }
    let named_curve = r.u16("SKE named_curve")?;
    let public_key = r.vec8("SKE public key")?.to_vec();
    if public_key.is_empty() {
        return Err(TlsError::Decode("SKE public key empty".into()));
    }
    let signature_algorithm = SignatureScheme(r.u16("SKE signature algorithm")?);
    let signature = r.vec16("SKE signature")?.to_vec();
    r.expect_done("ServerKeyExchange")?;
    Ok(ServerKeyExchange {
        curve_type,
        named_curve,
        public_key,
        signature_algorithm,
        signature,
    })
}

/// ECDHE ClientKeyExchange (RFC 8422 §5.7).
#[derive(Debug, Clone)]
pub struct ClientKeyExchange {
    pub public_key: Vec<u8>,
}

pub fn encode_client_key_exchange(cke: &ClientKeyExchange) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + cke.public_key.len());
    body.push(cke.public_key.len() as u8);
    body.extend_from_slice(&cke.public_key);
    wrap_handshake(HandshakeType::ClientKeyExchange, &body)
}

pub fn decode_client_key_exchange(body: &[u8]) -> Result<ClientKeyExchange, TlsError> {
    let mut r = Reader::new(body);
    let public_key = r.vec8("CKE public key")?.to_vec();
    if public_key.is_empty() {
        return Err(TlsError::Decode("CKE public key empty".into()));
    }
    r.expect_done("ClientKeyExchange")?;
    Ok(ClientKeyExchange { public_key })
}

/// TLS 1.2 Certificate message: a flat list, no contexts or per-entry
/// extensions.
#[derive(Debug, Clone)]
pub struct Certificate12 {
    pub certificate_list: Vec<Vec<u8>>,
}

pub fn encode_certificate12(cert: &Certificate12) -> Vec<u8> {
    let total: usize = cert.certificate_list.iter().map(|c| 3 + c.len()).sum();
    let mut body = Vec::with_capacity(3 + total);
    put_u24(&mut body, total);
    for cert_data in &cert.certificate_list {
        put_u24(&mut body, cert_data.len());
        body.extend_from_slice(cert_data);
    }
    wrap_handshake(HandshakeType::Certificate, &body)
}

pub fn decode_certificate12(body: &[u8]) -> Result<Certificate12, TlsError> {
    let mut r = Reader::new(body);
    let list = r.vec24("certificate_list")?;
    r.expect_done("Certificate")?;

    let mut inner = Reader::new(list);
    let mut certificate_list = Vec::new();
    while !inner.is_done() {
        certificate_list.push(inner.vec24("certificate entry")?.to_vec());
    }
    Ok(Certificate12 { certificate_list })
}

/// TLS 1.2 CertificateRequest (RFC 5246 §7.4.4), reduced to the fields
/// this engine acts on.
#[derive(Debug, Clone)]
pub struct CertificateRequest12 {
    pub certificate_types: Vec<u8>,
    pub signature_algorithms: Vec<SignatureScheme>,
}

pub fn encode_certificate_request12(msg: &CertificateRequest12) -> Vec<u8> {
    let mut body = Vec::new();
    body.push(msg.certificate_types.len() as u8);
    body.extend_from_slice(&msg.certificate_types);
    body.extend_from_slice(&((msg.signature_algorithms.len() * 2) as u16).to_be_bytes());
    for scheme in &msg.signature_algorithms {
        body.extend_from_slice(&scheme.0.to_be_bytes());
    }
    body.extend_from_slice(&0u16.to_be_bytes()); // no CA name constraints
    wrap_handshake(HandshakeType::CertificateRequest, &body)
}

pub fn decode_certificate_request12(body: &[u8]) -> Result<CertificateRequest12, TlsError> {
    let mut r = Reader::new(body);
    let certificate_types = r.vec8("certificate_types")?.to_vec();
    let sig_algs_block = r.vec16("supported_signature_algorithms")?;
    if sig_algs_block.len() % 2 != 0 {
        return Err(TlsError::Decode("odd signature_algorithms length".into()));
    }
    let signature_algorithms = sig_algs_block
        .chunks_exact(2)
        .map(|c| SignatureScheme(u16::from_be_bytes([c[0], c[1]])))
        .collect();
    let _certificate_authorities = r.vec16("certificate_authorities")?;
    r.expect_done("CertificateRequest")?;
    Ok(CertificateRequest12 {
        certificate_types,
        signature_algorithms,
    })
}

/// TLS 1.2 CertificateVerify: `algorithm(2) || signature<0..2^16-1>`.
pub fn encode_certificate_verify12(algorithm: SignatureScheme, signature: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(4 + signature.len());
    body.extend_from_slice(&algorithm.0.to_be_bytes());
    body.extend_from_slice(&(signature.len() as u16).to_be_bytes());
    body.extend_from_slice(signature);
    wrap_handshake(HandshakeType::CertificateVerify, &body)
}

pub fn decode_certificate_verify12(body: &[u8]) -> Result<(SignatureScheme, Vec<u8>), TlsError> {
    let mut r = Reader::new(body);
    let algorithm = SignatureScheme(r.u16("CertificateVerify algorithm")?);
    let signature = r.vec16("CertificateVerify signature")?.to_vec();
    r.expect_done("CertificateVerify")?;
    Ok((algorithm, signature))
}

pub fn encode_server_hello_done() -> Vec<u8> {
    wrap_handshake(HandshakeType::ServerHelloDone, &[])
}

/// TLS 1.2 NewSessionTicket (RFC 5077 §3.3).
#[derive(Debug, Clone)]
pub struct NewSessionTicket12 {
    pub ticket_lifetime: u32,
    pub ticket: Vec<u8>,
}

pub fn encode_new_session_ticket12(msg: &NewSessionTicket12) -> Vec<u8> {
    let mut body = Vec::with_capacity(6 + msg.ticket.len());
    body.extend_from_slice(&msg.ticket_lifetime.to_be_bytes());
    body.extend_from_slice(&(msg.ticket.len() as u16).to_be_bytes());
    body.extend_from_slice(&msg.ticket);
    wrap_handshake(HandshakeType::NewSessionTicket, &body)
}

pub fn decode_new_session_ticket12(body: &[u8]) -> Result<NewSessionTicket12, TlsError> {
    let mut r = Reader::new(body);
    let ticket_lifetime = r.u32("ticket_lifetime")?;
    let ticket = r.vec16("ticket")?.to_vec();
    r.expect_done("NewSessionTicket")?;
    Ok(NewSessionTicket12 {
        ticket_lifetime,
        ticket,
    })
}

/// TLS 1.2 Finished: fixed 12-byte verify_data.
pub fn encode_finished12(verify_data: &[u8]) -> Vec<u8> {
    wrap_handshake(HandshakeType::Finished, verify_data)
}

pub fn decode_finished12(body: &[u8]) -> Result<Vec<u8>, TlsError> {
    if body.len() != 12 {
        return Err(TlsError::Decode(format!(
            "Finished verify_data must be 12 bytes, got {}",
            body.len()
        )));
    }
    Ok(body.to_vec())
}

/// ChangeCipherSpec payload (its own content type, not a handshake message).
pub fn encode_change_cipher_spec() -> Vec<u8> {
    vec![0x01]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::codec::parse_handshake_header;

    #[test]
    fn test_server_key_exchange_roundtrip() {
        let ske = ServerKeyExchange {
            curve_type: 3,
            named_curve: 0x001D, // x25519
            public_key: vec![0x04; 32],
            signature_algorithm: SignatureScheme::ED25519,
            signature: vec![0xAA; 64],
        };
        let wire = encode_server_key_exchange(&ske);
        let (ty, body, _) = parse_handshake_header(&wire).unwrap();
        assert_eq!(ty, HandshakeType::ServerKeyExchange);

        let back = decode_server_key_exchange(body).unwrap();
        assert_eq!(back.named_curve, 0x001D);
        assert_eq!(back.public_key, ske.public_key);
        assert_eq!(back.signature_algorithm, SignatureScheme::ED25519);
        assert_eq!(back.signature, ske.signature);
    }

    #[test]
    fn test_ske_rejects_unnamed_curve() {
        assert!(decode_server_key_exchange(&[2, 0, 0x17, 1, 4, 4, 1, 0, 0]).is_err());
        assert!(decode_server_key_exchange(&[]).is_err());
    }

    #[test]
    fn test_ske_signed_data_layout() {
        let params = build_ske_params(3, 0x0017, &[0x04; 65]);
        let signed = build_ske_signed_data(&[1; 32], &[2; 32], &params);
        assert_eq!(signed.len(), 64 + 1 + 2 + 1 + 65);
        assert_eq!(&signed[..32], &[1; 32]);
        assert_eq!(&signed[32..64], &[2; 32]);
        assert_eq!(signed[64], 3);
        assert_eq!(&signed[65..67], &[0x00, 0x17]);
        assert_eq!(signed[67], 65);
    }

    #[test]
    fn test_client_key_exchange_roundtrip() {
        let cke = ClientKeyExchange {
            public_key: vec![0x04; 65],
        };
        let wire = encode_client_key_exchange(&cke);
        let (ty, body, _) = parse_handshake_header(&wire).unwrap();
        assert_eq!(ty, HandshakeType::ClientKeyExchange);
        assert_eq!(decode_client_key_exchange(body).unwrap().public_key, cke.public_key);
    }

    #[test]
    fn test_certificate12_roundtrip() {
        let cert = Certificate12 {
            certificate_list: vec![vec![0x30, 0x01], vec![0x30, 0x02, 0x03]],
        };
        let wire = encode_certificate12(&cert);
        let (ty, body, _) = parse_handshake_header(&wire).unwrap();
        assert_eq!(ty, HandshakeType::Certificate);
        let back = decode_certificate12(body).unwrap();
        assert_eq!(back.certificate_list, cert.certificate_list);

        // Empty list encodes and decodes (a client declining mTLS).
        let empty = Certificate12 {
            certificate_list: vec![],
        };
        let wire = encode_certificate12(&empty);
        let (_, body, _) = parse_handshake_header(&wire).unwrap();
        assert!(decode_certificate12(body).unwrap().certificate_list.is_empty());
    }

    #[test]
    fn test_certificate_request12_roundtrip() {
        let msg = CertificateRequest12 {
            certificate_types: vec![1, 64], // rsa_sign, ecdsa_sign
            signature_algorithms: vec![
                SignatureScheme::ED25519,
                SignatureScheme::ECDSA_SECP256R1_SHA256,
            ],
        };
        let wire = encode_certificate_request12(&msg);
        let (ty, body, _) = parse_handshake_header(&wire).unwrap();
        assert_eq!(ty, HandshakeType::CertificateRequest);
        let back = decode_certificate_request12(body).unwrap();
        assert_eq!(back.certificate_types, msg.certificate_types);
        assert_eq!(back.signature_algorithms, msg.signature_algorithms);
    }

    #[test]
    fn test_certificate_verify12_roundtrip() {
        let wire = encode_certificate_verify12(SignatureScheme::ECDSA_SECP256R1_SHA256, &[9; 70]);
        let (_, body, _) = parse_handshake_header(&wire).unwrap();
        let (alg, sig) = decode_certificate_verify12(body).unwrap();
        assert_eq!(alg, SignatureScheme::ECDSA_SECP256R1_SHA256);
        assert_eq!(sig.len(), 70);
    }

    #[test]
    fn test_server_hello_done() {
        let wire = encode_server_hello_done();
        let (ty, body, _) = parse_handshake_header(&wire).unwrap();
        assert_eq!(ty, HandshakeType::ServerHelloDone);
        assert!(body.is_empty());
    }

    #[test]
    fn test_new_session_ticket12_roundtrip() {
        let msg = NewSessionTicket12 {
            ticket_lifetime: 3600,
            ticket: vec![0x42; 32],
        };
        let wire = encode_new_session_ticket12(&msg);
        let (ty, body, _) = parse_handshake_header(&wire).unwrap();
        assert_eq!(ty, HandshakeType::NewSessionTicket);
        let back = decode_new_session_ticket12(body).unwrap();
        assert_eq!(back.ticket_lifetime, 3600);
        assert_eq!(back.ticket, msg.ticket);
    }

    #[test]
    fn test_finished12_length() {
        assert!(decode_finished12(&[0xAA; 12]).is_ok());
        assert!(decode_finished12(&[0xAA; 11]).is_err());
        assert!(decode_finished12(&[0xAA; 32]).is_err());
    }

    #[test]
    fn test_change_cipher_spec() {
        assert_eq!(encode_change_cipher_spec(), vec![0x01]);
    }
}
