#![forbid(unsafe_code)]
#![doc = "Cryptographic provider for the ferrotls TLS stack."]
//!
//! The protocol core consumes the primitives below through narrow
//! traits and enums; the implementations are backed by the RustCrypto
//! crates. Nothing in this crate knows about TLS framing or the key
//! schedule — it only signs, verifies, hashes, seals, and agrees.

pub mod aead;
pub mod digest;
pub mod kex;
pub mod rand;
pub mod sign;

pub use aead::{new_aead, Aead, AeadAlgorithm};
pub use digest::{Digest, HashAlgorithm};
pub use kex::{KexGroup, KexKeyPair};
pub use rand::RngSource;
pub use sign::{PublicKey, SigningKey};
