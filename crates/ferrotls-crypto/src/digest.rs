//! Streaming digest abstraction over the `sha2` crate.

use sha2::Digest as _;

/// Hash algorithms used by TLS cipher suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    /// Digest output size in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }

    /// Internal block size in bytes (the HMAC key-block size).
    pub fn block_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha384 => 128,
        }
    }

    /// One-shot digest.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut d = Digest::new(*self);
        d.update(data);
        d.finish()
    }
}

enum Inner {
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
}

/// A streaming digest instance.
pub struct Digest {
    algorithm: HashAlgorithm,
    inner: Inner,
}

impl Digest {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let inner = match algorithm {
            HashAlgorithm::Sha256 => Inner::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha384 => Inner::Sha384(sha2::Sha384::new()),
        };
        Self { algorithm, inner }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha256(d) => d.update(data),
            Inner::Sha384(d) => d.update(data),
        }
    }

    /// Consume the instance and return the digest.
    pub fn finish(self) -> Vec<u8> {
        match self.inner {
            Inner::Sha256(d) => d.finalize().to_vec(),
            Inner::Sha384(d) => d.finalize().to_vec(),
        }
    }
}
