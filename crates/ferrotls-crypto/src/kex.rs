//! Ephemeral (EC)DHE key agreement: X25519 and secp256r1.

use ferrotls_types::CryptoError;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use zeroize::Zeroize;

use crate::rand::RngSource;

/// Key-exchange groups the provider implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KexGroup {
    X25519,
    Secp256r1,
}

enum Secret {
    X25519(x25519_dalek::StaticSecret),
    Secp256r1(p256::SecretKey),
}

/// An ephemeral key pair for one handshake.
///
/// The secret scalar never leaves this struct; only the public share
/// (`key_share` wire encoding) and the agreed secret come out.
pub struct KexKeyPair {
    group: KexGroup,
    secret: Secret,
    public: Vec<u8>,
}

impl KexKeyPair {
    /// Generate a fresh ephemeral key pair.
    pub fn generate(group: KexGroup, rng: &RngSource) -> Result<Self, CryptoError> {
        match group {
            KexGroup::X25519 => {
                let mut seed: [u8; 32] = rng.random_array()?;
                let secret = x25519_dalek::StaticSecret::from(seed);
                seed.zeroize();
                let public = x25519_dalek::PublicKey::from(&secret).as_bytes().to_vec();
                Ok(Self {
                    group,
                    secret: Secret::X25519(secret),
                    public,
                })
            }
            KexGroup::Secp256r1 => {
                // Rejection-sample until the scalar is in range.
                let secret = loop {
                    let mut seed: [u8; 32] = rng.random_array()?;
                    let candidate = p256::SecretKey::from_slice(&seed);
                    seed.zeroize();
                    if let Ok(sk) = candidate {
                        break sk;
                    }
                };
                let public = secret
                    .public_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                Ok(Self {
                    group,
                    secret: Secret::Secp256r1(secret),
                    public,
                })
            }
        }
    }

    pub fn group(&self) -> KexGroup {
        self.group
    }

    /// The public share, in the group's key_share wire encoding
    /// (32 raw bytes for X25519, uncompressed SEC1 point for secp256r1).
    pub fn public_bytes(&self) -> &[u8] {
        &self.public
    }

    /// Agree with the peer's public share.
    pub fn agree(&self, peer_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match &self.secret {
            Secret::X25519(secret) => {
                let peer: [u8; 32] = peer_public
                    .try_into()
                    .map_err(|_| CryptoError::InvalidPublicKey)?;
                let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer));
                // An all-zero output means the peer sent a low-order point.
                if shared.as_bytes().iter().all(|&b| b == 0) {
                    return Err(CryptoError::InvalidPublicKey);
                }
                Ok(shared.as_bytes().to_vec())
            }
            Secret::Secp256r1(secret) => {
                let peer = p256::PublicKey::from_sec1_bytes(peer_public)
                    .map_err(|_| CryptoError::InvalidPublicKey)?;
                let shared =
                    p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x25519_agreement() {
        let rng = RngSource::system();
        let a = KexKeyPair::generate(KexGroup::X25519, &rng).unwrap();
        let b = KexKeyPair::generate(KexGroup::X25519, &rng).unwrap();
        assert_eq!(a.public_bytes().len(), 32);

        let s1 = a.agree(b.public_bytes()).unwrap();
        let s2 = b.agree(a.public_bytes()).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 32);
    }

    #[test]
    fn test_secp256r1_agreement() {
        let rng = RngSource::system();
        let a = KexKeyPair::generate(KexGroup::Secp256r1, &rng).unwrap();
        let b = KexKeyPair::generate(KexGroup::Secp256r1, &rng).unwrap();
        // Uncompressed point: 0x04 || x(32) || y(32)
        assert_eq!(a.public_bytes().len(), 65);
        assert_eq!(a.public_bytes()[0], 0x04);

        let s1 = a.agree(b.public_bytes()).unwrap();
        let s2 = b.agree(a.public_bytes()).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 32);
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let rng1 = RngSource::seeded([9u8; 32]);
        let rng2 = RngSource::seeded([9u8; 32]);
        let a = KexKeyPair::generate(KexGroup::X25519, &rng1).unwrap();
        let b = KexKeyPair::generate(KexGroup::X25519, &rng2).unwrap();
        assert_eq!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn test_bad_peer_share_rejected() {
        let rng = RngSource::system();
        let a = KexKeyPair::generate(KexGroup::X25519, &rng).unwrap();
        assert!(a.agree(&[0u8; 31]).is_err());
        // All-zero X25519 share is a low-order point.
        assert!(a.agree(&[0u8; 32]).is_err());

        let p = KexKeyPair::generate(KexGroup::Secp256r1, &rng).unwrap();
        assert!(p.agree(&[0x02; 10]).is_err());
    }
}
