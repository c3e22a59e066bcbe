//! Keying-material export (RFC 5705 / RFC 8446 §7.5).

use ferrotls_crypto::HashAlgorithm;
use ferrotls_types::TlsError;

use super::hkdf::{derive_secret, hkdf_expand_label};
use super::prf::prf;

/// Labels that MUST NOT be used with key export (RFC 5705 §4).
const RESERVED_LABELS: &[&str] = &[
    "client finished",
    "server finished",
    "master secret",
    "extended master secret",
    "key expansion",
];

fn validate_label(label: &[u8]) -> Result<(), TlsError> {
    if let Ok(label_str) = std::str::from_utf8(label) {
        if RESERVED_LABELS.contains(&label_str) {
            return Err(TlsError::InternalError(format!(
                "reserved exporter label: {label_str}"
            )));
        }
    }
    Ok(())
}

/// TLS 1.3 exporter:
///
/// ```text
/// tmp = Derive-Secret(exporter_master_secret, label, "")
/// out = HKDF-Expand-Label(tmp, "exporter", Hash(context), length)
/// ```
pub fn tls13_export_keying_material(
    hash: HashAlgorithm,
    exporter_master_secret: &[u8],
    label: &[u8],
    context: &[u8],
    length: usize,
) -> Result<Vec<u8>, TlsError> {
    validate_label(label)?;
    let tmp = derive_secret(hash, exporter_master_secret, label, &hash.digest(b""))?;
    hkdf_expand_label(hash, &tmp, b"exporter", &hash.digest(context), length)
}

/// TLS 1.2 exporter (RFC 5705):
///
/// ```text
/// seed = client_random || server_random [|| u16(len(context)) || context]
/// out  = PRF(master_secret, label, seed, length)
/// ```
pub fn tls12_export_keying_material(
    hash: HashAlgorithm,
    master_secret: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    label: &[u8],
    context: Option<&[u8]>,
    length: usize,
) -> Result<Vec<u8>, TlsError> {
    validate_label(label)?;
    let label_str = std::str::from_utf8(label)
        .map_err(|_| TlsError::InternalError("exporter label must be UTF-8".into()))?;

    let mut seed = Vec::with_capacity(64 + context.map_or(0, |c| 2 + c.len()));
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);
    if let Some(ctx) = context {
        seed.extend_from_slice(&(ctx.len() as u16).to_be_bytes());
        seed.extend_from_slice(ctx);
    }
    Ok(prf(hash, master_secret, label_str, &seed, length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_labels_rejected() {
        for label in RESERVED_LABELS {
            assert!(tls13_export_keying_material(
                HashAlgorithm::Sha256,
                &[0xAA; 32],
                label.as_bytes(),
                b"",
                32
            )
            .is_err());
        }
        assert!(tls13_export_keying_material(
            HashAlgorithm::Sha256,
            &[0xAA; 32],
            b"EXPORTER-Channel-Binding",
            b"",
            32
        )
        .is_ok());
    }

    #[test]
    fn test_tls13_export_deterministic_and_bound() {
        let ems = [0xAA; 32];
        let a = tls13_export_keying_material(HashAlgorithm::Sha256, &ems, b"label", b"ctx", 32)
            .unwrap();
        let b = tls13_export_keying_material(HashAlgorithm::Sha256, &ems, b"label", b"ctx", 32)
            .unwrap();
        assert_eq!(a, b);

        let c = tls13_export_keying_material(HashAlgorithm::Sha256, &ems, b"label", b"other", 32)
            .unwrap();
        assert_ne!(a, c);
        let d = tls13_export_keying_material(HashAlgorithm::Sha256, &ems, b"other", b"ctx", 32)
            .unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn test_tls12_export_context_framing() {
        let ms = [0x42; 48];
        let cr = [1u8; 32];
        let sr = [2u8; 32];
        let none =
            tls12_export_keying_material(HashAlgorithm::Sha256, &ms, &cr, &sr, b"l", None, 32)
                .unwrap();
        // An absent context and an empty context are framed differently.
        let empty =
            tls12_export_keying_material(HashAlgorithm::Sha256, &ms, &cr, &sr, b"l", Some(b""), 32)
                .unwrap();
        assert_ne!(none, empty);
        let ctx = tls12_export_keying_material(
            HashAlgorithm::Sha256,
            &ms,
            &cr,
            &sr,
            b"l",
            Some(b"ctx"),
            32,
        )
        .unwrap();
        assert_ne!(none, ctx);
    }

    #[test]
    fn test_tls12_export_non_utf8_label() {
        let ms = [0x42; 48];
        assert!(tls12_export_keying_material(
            HashAlgorithm::Sha256,
            &ms,
            &[1; 32],
            &[2; 32],
            &[0xFF, 0xFE],
            None,
            32
        )
        .is_err());
    }
}
