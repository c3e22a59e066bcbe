//! TLS alert protocol.

use ferrotls_types::TlsError;

/// Alert severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    Warning = 1,
    Fatal = 2,
}

/// Alert description codes (RFC 8446 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    HandshakeFailure = 40,
    BadCertificate = 42,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    UserCanceled = 90,
    NoRenegotiation = 100,
    MissingExtension = 109,
    UnrecognizedName = 112,
    UnknownPskIdentity = 115,
    NoApplicationProtocol = 120,
}

/// A TLS alert.
#[derive(Debug, Clone, Copy)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub const CLOSE_NOTIFY: Alert = Alert {
        level: AlertLevel::Warning,
        description: AlertDescription::CloseNotify,
    };

    /// The two-byte alert record payload.
    pub fn encode(&self) -> [u8; 2] {
        [self.level as u8, self.description as u8]
    }

    /// Parse an alert record payload.
    pub fn decode(payload: &[u8]) -> Result<Alert, TlsError> {
        if payload.len() != 2 {
            return Err(TlsError::Decode("alert payload must be 2 bytes".into()));
        }
        let level = match payload[0] {
            1 => AlertLevel::Warning,
            2 => AlertLevel::Fatal,
            v => return Err(TlsError::Decode(format!("unknown alert level {v}"))),
        };
        let description = AlertDescription::from_u8(payload[1])
            .ok_or_else(|| TlsError::Decode(format!("unknown alert description {}", payload[1])))?;
        Ok(Alert { level, description })
    }

    /// Build the outgoing alert for a protocol error, if one applies.
    pub fn for_error(err: &TlsError) -> Option<Alert> {
        let code = err.alert_code()?;
        let description = AlertDescription::from_u8(code)?;
        let level = if err.is_warning() {
            AlertLevel::Warning
        } else {
            AlertLevel::Fatal
        };
        Some(Alert { level, description })
    }
}

impl AlertDescription {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            22 => AlertDescription::RecordOverflow,
            40 => AlertDescription::HandshakeFailure,
            42 => AlertDescription::BadCertificate,
            46 => AlertDescription::CertificateUnknown,
            47 => AlertDescription::IllegalParameter,
            50 => AlertDescription::DecodeError,
            51 => AlertDescription::DecryptError,
            70 => AlertDescription::ProtocolVersion,
            71 => AlertDescription::InsufficientSecurity,
            80 => AlertDescription::InternalError,
            90 => AlertDescription::UserCanceled,
            100 => AlertDescription::NoRenegotiation,
            109 => AlertDescription::MissingExtension,
            112 => AlertDescription::UnrecognizedName,
            115 => AlertDescription::UnknownPskIdentity,
            120 => AlertDescription::NoApplicationProtocol,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_wire_values() {
        assert_eq!(AlertDescription::CloseNotify as u8, 0);
        assert_eq!(AlertDescription::UnexpectedMessage as u8, 10);
        assert_eq!(AlertDescription::BadRecordMac as u8, 20);
        assert_eq!(AlertDescription::RecordOverflow as u8, 22);
        assert_eq!(AlertDescription::HandshakeFailure as u8, 40);
        assert_eq!(AlertDescription::BadCertificate as u8, 42);
        assert_eq!(AlertDescription::CertificateUnknown as u8, 46);
        assert_eq!(AlertDescription::DecodeError as u8, 50);
        assert_eq!(AlertDescription::DecryptError as u8, 51);
        assert_eq!(AlertDescription::ProtocolVersion as u8, 70);
        assert_eq!(AlertDescription::InsufficientSecurity as u8, 71);
        assert_eq!(AlertDescription::InternalError as u8, 80);
        assert_eq!(AlertDescription::UserCanceled as u8, 90);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let alert = Alert {
            level: AlertLevel::Fatal,
            description: AlertDescription::DecryptError,
        };
        let wire = alert.encode();
        assert_eq!(wire, [2, 51]);
        let back = Alert::decode(&wire).unwrap();
        assert_eq!(back.level, AlertLevel::Fatal);
        assert_eq!(back.description, AlertDescription::DecryptError);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Alert::decode(&[]).is_err());
        assert!(Alert::decode(&[1]).is_err());
        assert!(Alert::decode(&[3, 0]).is_err());
        assert!(Alert::decode(&[1, 7]).is_err());
        assert!(Alert::decode(&[1, 0, 0]).is_err());
    }

    #[test]
    fn test_for_error() {
        let alert = Alert::for_error(&TlsError::BadRecordMac).unwrap();
        assert_eq!(alert.level, AlertLevel::Fatal);
        assert_eq!(alert.description, AlertDescription::BadRecordMac);

        let alert = Alert::for_error(&TlsError::UserCanceled).unwrap();
        assert_eq!(alert.level, AlertLevel::Warning);

        assert!(Alert::for_error(&TlsError::ConnectionClosed).is_none());
    }

    #[test]
    fn test_close_notify_constant() {
        assert_eq!(Alert::CLOSE_NOTIFY.encode(), [1, 0]);
    }
}
