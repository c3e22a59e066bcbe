/// Cryptographic provider errors.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
    #[error("invalid public key encoding")]
    InvalidPublicKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
    #[error("signature verification failed")]
    VerifyFailed,
    #[error("aead: tag verification failed")]
    AeadTagMismatch,
    #[error("randomness source failed")]
    RandomSource,
    #[error("kdf: requested output too long")]
    OutputTooLong,
}

/// TLS protocol errors.
///
/// Every fatal kind carries the TLS alert it is reported to the peer
/// with; see [`TlsError::alert_code`]. Alert codes follow RFC 8446 §6.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),
    #[error("bad record mac")]
    BadRecordMac,
    #[error("record overflow")]
    RecordOverflow,
    #[error("record sequence number overflow")]
    SeqOverflow,
    #[error("handshake failure: {0}")]
    HandshakeFailure(String),
    #[error("invalid certificate: {0}")]
    CertificateInvalid(String),
    #[error("certificate unknown: {0}")]
    CertificateUnknown(String),
    #[error("decrypt error: {0}")]
    DecryptError(String),
    #[error("unsupported protocol version")]
    ProtocolVersion,
    #[error("insufficient security: {0}")]
    InsufficientSecurity(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("user canceled")]
    UserCanceled,
    #[error("close notify")]
    CloseNotify,
    /// The peer sent a fatal alert with the given description code.
    #[error("fatal alert received from peer: {0}")]
    PeerAlert(u8),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl TlsError {
    /// The alert description this error is reported to the peer with.
    ///
    /// Returns `None` for local-only conditions (I/O failure, operating
    /// on a closed connection, an alert we already received).
    pub fn alert_code(&self) -> Option<u8> {
        match self {
            TlsError::CloseNotify => Some(0),
            TlsError::UnexpectedMessage(_) => Some(10),
            TlsError::BadRecordMac => Some(20),
            TlsError::RecordOverflow => Some(22),
            TlsError::HandshakeFailure(_) => Some(40),
            TlsError::CertificateInvalid(_) => Some(42),
            TlsError::CertificateUnknown(_) => Some(46),
            TlsError::Decode(_) => Some(50),
            TlsError::DecryptError(_) => Some(51),
            TlsError::ProtocolVersion => Some(70),
            TlsError::InsufficientSecurity(_) => Some(71),
            TlsError::SeqOverflow | TlsError::InternalError(_) | TlsError::Crypto(_) => Some(80),
            TlsError::UserCanceled => Some(90),
            TlsError::PeerAlert(_) | TlsError::ConnectionClosed | TlsError::Io(_) => None,
        }
    }

    /// Whether this error is a warning-level alert: the connection survives.
    pub fn is_warning(&self) -> bool {
        matches!(self, TlsError::UserCanceled | TlsError::CloseNotify)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_code_mapping() {
        // RFC 8446 §6 alert descriptions — wire values are load-bearing
        assert_eq!(TlsError::CloseNotify.alert_code(), Some(0));
        assert_eq!(TlsError::UnexpectedMessage("x".into()).alert_code(), Some(10));
        assert_eq!(TlsError::BadRecordMac.alert_code(), Some(20));
        assert_eq!(TlsError::RecordOverflow.alert_code(), Some(22));
        assert_eq!(TlsError::HandshakeFailure("x".into()).alert_code(), Some(40));
        assert_eq!(TlsError::CertificateInvalid("x".into()).alert_code(), Some(42));
        assert_eq!(TlsError::CertificateUnknown("x".into()).alert_code(), Some(46));
        assert_eq!(TlsError::Decode("x".into()).alert_code(), Some(50));
        assert_eq!(TlsError::DecryptError("x".into()).alert_code(), Some(51));
        assert_eq!(TlsError::ProtocolVersion.alert_code(), Some(70));
        assert_eq!(TlsError::InsufficientSecurity("x".into()).alert_code(), Some(71));
        assert_eq!(TlsError::InternalError("x".into()).alert_code(), Some(80));
        assert_eq!(TlsError::SeqOverflow.alert_code(), Some(80));
        assert_eq!(TlsError::UserCanceled.alert_code(), Some(90));
    }

    #[test]
    fn test_local_only_errors_have_no_alert() {
        assert_eq!(TlsError::ConnectionClosed.alert_code(), None);
        assert_eq!(TlsError::PeerAlert(40).alert_code(), None);
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(TlsError::Io(io).alert_code(), None);
    }

    #[test]
    fn test_warning_classification() {
        assert!(TlsError::UserCanceled.is_warning());
        assert!(TlsError::CloseNotify.is_warning());
        assert!(!TlsError::BadRecordMac.is_warning());
        assert!(!TlsError::HandshakeFailure("x".into()).is_warning());
    }

    #[test]
    fn test_display() {
        assert_eq!(TlsError::BadRecordMac.to_string(), "bad record mac");
        assert_eq!(
            TlsError::Decode("short input".into()).to_string(),
            "decode error: short input"
        );
        assert_eq!(
            TlsError::PeerAlert(51).to_string(),
            "fatal alert received from peer: 51"
        );
        let e = CryptoError::InvalidKeyLength { expected: 32, got: 16 };
        assert_eq!(e.to_string(), "invalid key length: expected 32, got 16");
    }

    #[test]
    fn test_from_crypto_error() {
        let tls: TlsError = CryptoError::AeadTagMismatch.into();
        assert_eq!(tls.alert_code(), Some(80));
        assert!(tls.to_string().contains("tag verification failed"));
    }

    #[test]
    fn test_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TlsError>();
        assert_send_sync::<CryptoError>();
    }
}
