//! NSS key log format (SSLKEYLOGFILE).
//!
//! Wireshark-compatible lines: `<label> <client_random_hex> <secret_hex>`.
//! TLS 1.3 logs the handshake/application/exporter secrets; TLS 1.2 logs
//! the master secret under `CLIENT_RANDOM`.

use crate::config::KeyLogCallback;

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Emit one key-log line if a callback is installed.
pub fn log_key(
    callback: Option<&KeyLogCallback>,
    label: &str,
    client_random: &[u8; 32],
    secret: &[u8],
) {
    if let Some(cb) = callback {
        let line = format!("{} {} {}", label, to_hex(client_random), to_hex(secret));
        cb(&line);
    }
}

/// TLS 1.2 master secret line.
pub fn log_master_secret(
    callback: Option<&KeyLogCallback>,
    client_random: &[u8; 32],
    master_secret: &[u8],
) {
    log_key(callback, "CLIENT_RANDOM", client_random, master_secret);
}
