//! Randomness source.
//!
//! The default source draws from the operating system. A seeded source
//! (ChaCha20-based) exists for reproducible handshakes in tests and
//! debugging; it must never be used for real connections.

use std::sync::Mutex;

use ferrotls_types::CryptoError;
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// A source of random bytes for the handshake.
pub enum RngSource {
    /// Operating-system entropy (`getrandom`).
    System,
    /// Deterministic stream from a fixed seed.
    Seeded(Mutex<ChaCha20Rng>),
}

impl RngSource {
    pub fn system() -> Self {
        RngSource::System
    }

    pub fn seeded(seed: [u8; 32]) -> Self {
        RngSource::Seeded(Mutex::new(ChaCha20Rng::from_seed(seed)))
    }

    /// Fill `buf` with random bytes.
    pub fn fill(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        match self {
            RngSource::System => {
                getrandom::getrandom(buf).map_err(|_| CryptoError::RandomSource)
            }
            RngSource::Seeded(rng) => {
                let mut rng = rng.lock().map_err(|_| CryptoError::RandomSource)?;
                rng.fill_bytes(buf);
                Ok(())
            }
        }
    }

    /// Fixed-size convenience wrapper.
    pub fn random_array<const N: usize>(&self) -> Result<[u8; N], CryptoError> {
        let mut out = [0u8; N];
        self.fill(&mut out)?;
        Ok(out)
    }
}

impl std::fmt::Debug for RngSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RngSource::System => f.write_str("RngSource::System"),
            RngSource::Seeded(_) => f.write_str("RngSource::Seeded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_fill() {
        let rng = RngSource::system();
        let a: [u8; 32] = rng.random_array().unwrap();
        let b: [u8; 32] = rng.random_array().unwrap();
        // Not a randomness test — just that two draws differ.
        assert_ne!(a, b);
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let rng1 = RngSource::seeded([7u8; 32]);
        let rng2 = RngSource::seeded([7u8; 32]);
        let a: [u8; 32] = rng1.random_array().unwrap();
        let b: [u8; 32] = rng2.random_array().unwrap();
        assert_eq!(a, b);

        // The stream advances.
        let c: [u8; 32] = rng1.random_array().unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_different_seeds_differ() {
        let rng1 = RngSource::seeded([1u8; 32]);
        let rng2 = RngSource::seeded([2u8; 32]);
        let a: [u8; 16] = rng1.random_array().unwrap();
        let b: [u8; 16] = rng2.random_array().unwrap();
        assert_ne!(a, b);
    }
}
