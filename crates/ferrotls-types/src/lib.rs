#![forbid(unsafe_code)]
#![doc = "Shared error types for the ferrotls TLS stack."]

pub mod error;

pub use error::{CryptoError, TlsError};
